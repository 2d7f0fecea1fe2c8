//! Development server configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevOptions {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Directory served by the build server (`servedir`)
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub output: OutputMode,

    /// Browser to open on start; `"none"` disables it
    #[serde(default = "default_open")]
    pub open: String,

    #[serde(default = "default_hmr")]
    pub hmr: bool,

    /// Upper bound for draining in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            root: default_root(),
            output: OutputMode::default(),
            open: default_open(),
            hmr: default_hmr(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl DevOptions {
    /// Whether a browser should be launched on start.
    pub fn should_open(&self) -> bool {
        !self.open.is_empty() && self.open != "none"
    }
}

/// How the CLI renders server progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Interactive terminal output with spinners
    #[default]
    Dashboard,
    /// Plain line-oriented output, suitable for piping
    Stream,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_open() -> String {
    "default".into()
}

fn default_hmr() -> bool {
    true
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
