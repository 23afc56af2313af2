//! CLI module - argument parsing and subcommand runners

mod args;
pub mod predict;
pub mod train;
pub mod validate;

pub use args::{Cli, Commands};
