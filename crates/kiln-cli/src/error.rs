//! Error handling for the kiln CLI and dev server.
//!
//! This module provides a hierarchical error type system using `thiserror`.
//! Each error variant is designed to be actionable and to give enough context
//! for users to resolve the issue.
//!
//! # Architecture
//!
//! - **Top-level errors** (`CliError`) represent broad categories of failures
//! - **Domain-specific errors** carry the detail for one part of the server:
//!   - `StartupError`: fatal, aborts the command
//!   - `ProxyError`: recovered per request as a 502
//!   - `ResolutionError`: a URL with no corresponding asset
//!   - `ListenerError`: a change listener failed, logged and isolated
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::error::{CliError, Result};
//! use std::path::Path;
//!
//! fn read_index(root: &Path) -> Result<String> {
//!     let path = root.join("index.html");
//!     std::fs::read_to_string(&path).map_err(|_| CliError::FileNotFound(path))
//! }
//! ```

mod miette;

pub use self::miette::{cli_error_to_miette, startup_error_to_miette};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level CLI error type.
///
/// This is the primary error type returned by CLI commands. It automatically
/// converts from domain-specific errors via `From` implementations.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration loading or validation failed
    #[error("Configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    /// The build server or public listener could not be started
    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors
    #[error("Server error: {0}")]
    Server(String),
}

/// The bundler's build server or the public listener failed to come up.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The bundler executable could not be launched
    #[error("Failed to launch `{command}`: {source}\n\nHint: Install esbuild or point `bundler.command` at its executable")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The bundler process terminated before its build server accepted connections
    #[error("Build server exited before becoming ready ({}){}", .status, output_suffix(.output))]
    ExitedEarly {
        status: String,
        /// Last lines the bundler printed
        output: String,
    },

    /// The build server never accepted a connection
    #[error(
        "Build server did not accept connections on {address} within {}ms{}",
        .timeout.as_millis(),
        output_suffix(.output)
    )]
    ReadyTimeout {
        address: String,
        timeout: Duration,
        output: String,
    },

    /// A hand-built server config breaks an invariant
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(#[from] kiln_config::ConfigError),

    /// The public dev server port could not be bound
    #[error("Failed to bind {address}: {source}\n\nHint: Pick another port with --port")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during startup: {0}")]
    Io(#[from] std::io::Error),
}

fn output_suffix(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!("\n\n{}", output)
    }
}

/// A single proxied exchange failed before the upstream response head arrived.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The build server could not be reached or reset the connection
    #[error("Build server at {url} is unreachable: {message}")]
    Upstream { url: String, message: String },

    /// The outbound URI could not be built from the inbound request
    #[error("Invalid upstream URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    /// The outbound request could not be assembled
    #[error("Failed to build upstream request: {0}")]
    Request(String),

    /// The server cut the exchange off while shutting down
    #[error("Exchange terminated by server shutdown")]
    Terminated,
}

/// A URL could not be resolved to an asset.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The build server has nothing at this URL
    #[error("No asset found for {url}")]
    NotFound { url: String },

    /// The build server answered with a non-success status
    #[error("Build server returned {status} for {url}")]
    Status { url: String, status: u16 },

    /// A package specifier or URL that cannot be mapped
    #[error("Invalid specifier '{0}'")]
    InvalidSpecifier(String),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The response body could not be read to completion
    #[error("Failed to read response body for {url}: {message}")]
    Body { url: String, message: String },
}

/// A change listener failed during dispatch.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener returned an error
    #[error("Change listener {id} failed: {message}")]
    Failed { id: u64, message: String },

    /// The listener panicked
    #[error("Change listener {id} panicked: {message}")]
    Panicked { id: u64, message: String },
}

/// Result type alias using `CliError` as the default error type.
///
/// This simplifies function signatures throughout the CLI.
pub type Result<T, E = CliError> = std::result::Result<T, E>;
