//! Side-effecting boundaries: filesystem, HTTP, subprocesses, and the operator.

pub mod config;
pub mod input;
pub mod operator;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod renderer;
pub mod run_log;
pub mod sandbox;
pub mod tools;
