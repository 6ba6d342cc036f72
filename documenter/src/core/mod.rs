//! Deterministic, pure logic shared by the documenter core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod cancel;
pub mod decode;
pub mod json_scan;
pub mod path_rewrite;
pub mod policy;
pub mod render_diagnostics;
pub mod transcript;
pub mod types;
pub mod upstream;
