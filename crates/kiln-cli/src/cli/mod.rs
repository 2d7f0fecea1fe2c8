//! Command-line interface definition for kiln.
//!
//! Defines the CLI structure using clap v4's derive macros.
//!
//! # Command Structure
//!
//! - `kiln dev` - Development server in front of the bundler's build server

mod commands;
pub mod enums;

use clap::Parser;

pub use commands::{Command, DevArgs};
pub use enums::*;

/// kiln - a development server for bundled web projects
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "A development server for bundled web projects",
    long_about = "kiln runs your bundler's build server and serves the project through\n\
                  a transparent proxy in front of it, announcing file changes to\n\
                  connected browsers."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    ///
    /// Shows bundler output, proxied requests and change notifications.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    ///
    /// Outputs plain text without ANSI color codes. Useful for logging to
    /// files or systems that don't support colored terminal output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
