//! Transcript-to-Mermaid documentation agent.
//!
//! A model is driven through a step-bounded conversation where each reply is exactly one
//! decision: call a tool, finish with a manifest, or ask the operator for clarification.
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (decoding, confidence and failure policy,
//!   path rewriting, transcript). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting boundaries (providers, renderer, sandboxed tools, config,
//!   run logs). Each sits behind a trait to enable fakes in tests.
//!
//! [`controller`] combines both into the run loop the CLI invokes.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
