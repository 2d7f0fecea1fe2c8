//! Pluggable config validation strategies
//!
//! Separates schema validation (pure, no I/O) from filesystem validation
//! (the served root must exist).

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    /// Validate a fully merged configuration
    fn validate(&self, config: &KilnConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use kiln_config::{ConfigValidator, KilnConfig, SchemaValidator};
///
/// let config = KilnConfig::default();
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()> {
        let dev = &config.dev_options;
        let bundler = &config.bundler;

        if dev.port == 0 {
            return Err(ConfigError::SchemaValidation {
                message: "devOptions.port must be a positive integer".to_string(),
                hint: Some("Pick a free port such as 8080".to_string()),
            });
        }

        if dev.host.trim().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "devOptions.host cannot be empty".to_string(),
                hint: Some("Use 127.0.0.1 to listen on loopback only".to_string()),
            });
        }

        if dev.shutdown_timeout_ms == 0 {
            return Err(ConfigError::SchemaValidation {
                message: "devOptions.shutdownTimeoutMs must be greater than zero".to_string(),
                hint: None,
            });
        }

        if bundler.entry_points.is_empty() {
            return Err(ConfigError::NoEntries);
        }

        if bundler.entry_points.iter().any(|e| e.trim().is_empty()) {
            return Err(ConfigError::SchemaValidation {
                message: "bundler entry points cannot be empty strings".to_string(),
                hint: Some("Remove empty strings from 'bundler.entryPoints'".to_string()),
            });
        }

        if bundler.command.trim().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "bundler.command cannot be empty".to_string(),
                hint: Some("Set it to the esbuild executable, e.g. \"esbuild\"".to_string()),
            });
        }

        if bundler.ready_timeout_ms == 0 {
            return Err(ConfigError::SchemaValidation {
                message: "bundler.readyTimeoutMs must be greater than zero".to_string(),
                hint: None,
            });
        }

        Ok(())
    }
}

/// Filesystem validation: the served root must be an existing directory.
pub struct FsValidator;

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()> {
        let root = &config.dev_options.root;

        let metadata = std::fs::metadata(root).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ConfigError::RootNotFound(root.clone()),
            _ => ConfigError::Io(err),
        })?;

        if !metadata.is_dir() {
            return Err(ConfigError::RootNotDirectory(root.clone()));
        }

        Ok(())
    }
}

/// Run schema and filesystem validation.
pub fn validate(config: &KilnConfig) -> Result<()> {
    SchemaValidator.validate(config)?;
    FsValidator.validate(config)
}
