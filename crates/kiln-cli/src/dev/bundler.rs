//! Bundler build server lifecycle.
//!
//! A [`Bundler`] starts an external build server and hands back a
//! [`BuildServerHandle`]. The handle is owned by the dev server; the proxy only
//! ever sees the [`Upstream`] address.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StartupError;

/// Options forwarded to the bundler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOptions {
    pub bundle: bool,
    pub minify: bool,
    pub outbase: String,
    pub outdir: Option<PathBuf>,
    /// Passed to the bundler verbatim
    pub extra_args: Vec<String>,
}

/// Everything a bundler needs to start serving.
#[derive(Debug, Clone)]
pub struct ServeRequest {
    pub serve_dir: PathBuf,
    pub entry_points: Vec<String>,
    pub options: BundleOptions,
    pub plugins: Vec<String>,
}

/// Starts build servers.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Start a build server and wait until it accepts connections.
    async fn serve(&self, request: ServeRequest) -> Result<BuildServerHandle, StartupError>;
}

/// A running build server process (or an in-process stand-in).
#[async_trait]
pub trait BuildProcess: Send + Sync {
    /// Terminate the server and wait for it to exit.
    async fn terminate(&mut self) -> std::io::Result<()>;
}

/// Address of a running build server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Owned handle to a running build server.
pub struct BuildServerHandle {
    upstream: Upstream,
    process: Mutex<Option<Box<dyn BuildProcess>>>,
}

impl BuildServerHandle {
    pub fn new(host: impl Into<String>, port: u16, process: Box<dyn BuildProcess>) -> Self {
        Self {
            upstream: Upstream {
                host: host.into(),
                port,
            },
            process: Mutex::new(Some(process)),
        }
    }

    pub fn host(&self) -> &str {
        &self.upstream.host
    }

    pub fn port(&self) -> u16 {
        self.upstream.port
    }

    pub fn upstream(&self) -> Upstream {
        self.upstream.clone()
    }

    /// Stop the build server.
    ///
    /// The process is terminated at most once. Returns `true` if this call
    /// stopped it and `false` if it was already stopped.
    pub async fn stop(&self) -> std::io::Result<bool> {
        let Some(mut process) = self.process.lock().await.take() else {
            return Ok(false);
        };

        debug!("stopping build server at {}", self.upstream);
        process.terminate().await?;
        Ok(true)
    }

    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }
}

impl fmt::Debug for BuildServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildServerHandle")
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}
