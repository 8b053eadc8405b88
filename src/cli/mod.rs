//! Command-line interface.

pub mod args;
pub mod client;
pub mod commands;

pub use args::{Cli, Commands};
