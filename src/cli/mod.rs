//! Command Line Interface
// (c) 2024 Ross Younger
mod args;
mod cli_main;
mod styles;
pub use cli_main::cli;
