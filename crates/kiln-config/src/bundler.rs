//! Options for the external build server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerOptions {
    /// Executable started in serve mode
    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,

    #[serde(default = "default_outbase")]
    pub outbase: String,

    #[serde(default)]
    pub outdir: Option<PathBuf>,

    #[serde(default)]
    pub plugins: Vec<String>,

    /// Extra arguments appended verbatim to the bundler command line
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            command: default_command(),
            entry_points: default_entry_points(),
            outbase: default_outbase(),
            outdir: None,
            plugins: Vec::new(),
            args: Vec::new(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

fn default_command() -> String {
    "esbuild".into()
}

fn default_entry_points() -> Vec<String> {
    vec!["src/index.jsx".into()]
}

fn default_outbase() -> String {
    "dist".into()
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}
