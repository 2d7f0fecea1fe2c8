//! Development server configuration.
//!
//! Resolves a loaded [`KilnConfig`] into the fixed settings of one server
//! instance.

use kiln_config::{BundlerOptions, ConfigError, KilnConfig, Mode, OutputMode};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dev::bundler::{BundleOptions, ServeRequest};

/// Settings for one dev server instance, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public port, always non-zero
    pub port: u16,

    pub host: String,

    /// Canonicalized directory served by the build server
    pub root_directory: PathBuf,

    pub mode: Mode,

    /// Expose the change notification stream at `/__kiln_hmr__`
    pub hmr_enabled: bool,

    pub output: OutputMode,

    /// Browser to open once running, `None` to skip
    pub open: Option<String>,

    pub bundler: BundlerOptions,

    /// Upper bound for draining in-flight requests on shutdown
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Build from a merged configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Schema validation fails (port, entries, timeouts)
    /// - The root directory doesn't exist or isn't a directory
    pub fn from_config(config: &KilnConfig) -> Result<Self, ConfigError> {
        kiln_config::validate(config)?;

        let dev = &config.dev_options;
        let root_directory = canonical_root(&dev.root)?;

        Ok(Self {
            port: dev.port,
            host: dev.host.clone(),
            root_directory,
            mode: config.mode,
            hmr_enabled: dev.hmr,
            output: dev.output,
            open: dev.should_open().then(|| dev.open.clone()),
            bundler: config.bundler.clone(),
            shutdown_timeout: Duration::from_millis(dev.shutdown_timeout_ms),
        })
    }

    /// Default settings serving `root` on `port`.
    pub fn for_root(root: impl AsRef<Path>, port: u16) -> Result<Self, ConfigError> {
        let mut config = KilnConfig::default();
        config.dev_options.root = root.as_ref().to_path_buf();
        config.dev_options.port = port;
        Self::from_config(&config)
    }

    /// Re-check the invariants of a hand-built config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if !self.root_directory.exists() {
            return Err(ConfigError::RootNotFound(self.root_directory.clone()));
        }
        if !self.root_directory.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.root_directory.clone()));
        }

        Ok(())
    }

    /// `host:port` the public listener binds.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Bundler invocation for this config; production mode minifies.
    pub fn serve_request(&self) -> ServeRequest {
        ServeRequest {
            serve_dir: self.root_directory.clone(),
            entry_points: self.bundler.entry_points.clone(),
            options: BundleOptions {
                bundle: true,
                minify: self.mode.is_production(),
                outbase: self.bundler.outbase.clone(),
                outdir: self.bundler.outdir.clone(),
                extra_args: self.bundler.args.clone(),
            },
            plugins: self.bundler.plugins.clone(),
        }
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, ConfigError> {
    root.canonicalize().map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ConfigError::RootNotFound(root.to_path_buf()),
        _ => ConfigError::Io(err),
    })
}
