//! Miette diagnostic conversion for CLI errors.
//!
//! This module provides conversion from CLI errors to miette diagnostics
//! for readable error reporting at the binary edge.

use crate::error::{CliError, StartupError};
use miette::Report;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Startup(e) => startup_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

/// Convert StartupError to miette Report
pub fn startup_error_to_miette(err: StartupError) -> Report {
    match err {
        StartupError::ExitedEarly { status, output } if output.is_empty() => {
            miette::miette!(
                "Build server exited before becoming ready ({})\n\nHint: Run with --verbose to see the bundler's output",
                status
            )
        }
        err @ StartupError::ReadyTimeout { .. } => {
            miette::miette!(
                "{}\n\nHint: Raise `bundler.readyTimeoutMs` for large projects",
                err
            )
        }
        _ => miette::miette!("{}", err),
    }
}
