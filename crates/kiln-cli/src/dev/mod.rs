//! Development server module.
//!
//! Provides the dev server that fronts an external bundler build server:
//! - Build server lifecycle through the [`Bundler`] trait
//! - Transparent HTTP proxying to the build server
//! - URL resolution and a runtime module loader with invalidation
//! - Change notification, including an SSE stream for browsers

pub mod bundler;
pub mod config;
pub mod esbuild;
pub mod mime;
pub mod notifier;
pub mod proxy;
pub mod resolve;
pub mod responses;
pub mod runtime;
pub mod server;
pub mod state;

// Re-exports
pub use bundler::{BuildProcess, BuildServerHandle, BundleOptions, Bundler, ServeRequest, Upstream};
pub use config::ServerConfig;
pub use esbuild::EsbuildBundler;
pub use mime::{ExtensionTable, MimeLookup};
pub use notifier::{ChangeNotifier, Listener, Subscription};
pub use proxy::RequestProxy;
pub use resolve::{scan_imports, UrlLoader, UrlResolution, UrlResolver};
pub use responses::send_response_error;
pub use runtime::{LoadedModule, RuntimeOptions, ServerRuntime};
pub use server::{start_server, DevServer, HMR_PATH};
pub use state::{DevServerState, ServerStatus, SharedState};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file change announced to listeners and HMR clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub file_path: PathBuf,
}
