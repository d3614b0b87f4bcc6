//! CLI module for revrun - command-line interface.

pub mod commands;

pub use commands::Cli;
