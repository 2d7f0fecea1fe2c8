//! kiln - a development server for bundled web projects.
//!
//! kiln starts an external bundler's build server (esbuild's `--serve` mode
//! by default) and serves the project through a transparent proxy in front
//! of it. The [`dev::DevServer`] facade adds URL resolution, a runtime module
//! loader with invalidation, change notification and graceful shutdown.
//!
//! # Architecture
//!
//! - [`dev`] - Build server lifecycle, proxy and the dev server facade
//! - [`error`] - Error types with actionable messages
//! - [`logger`] - Structured logging with tracing
//! - [`ui`] - Terminal status output
//! - `cli` / `commands` - The `kiln` binary
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::dev::{start_server, EsbuildBundler, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> kiln_cli::Result<()> {
//! let config = ServerConfig::for_root(".", 8080)?;
//! let server = start_server(config, Arc::new(EsbuildBundler::new("esbuild"))).await?;
//!
//! server.on_file_change(|event| {
//!     println!("changed: {}", event.file_path.display());
//!     Ok(())
//! });
//! server.mark_changed("/src/app.ts");
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, ListenerError, ProxyError, ResolutionError, Result, StartupError};
