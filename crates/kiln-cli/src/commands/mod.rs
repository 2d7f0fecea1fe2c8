//! Command implementations for the kiln CLI.
//!
//! Each command lives in its own module and provides an `execute` function
//! that takes the parsed command arguments and returns a Result.
//!
//! - [`dev`] - Development server

pub mod dev;

pub use dev::execute as dev_execute;
