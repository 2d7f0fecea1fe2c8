//! File-based config discovery and layered loading for CLI use
//!
//! Layers are merged in this order, later layers winning:
//! defaults, config file, `KILN_*` environment variables, CLI overrides.

use std::fs;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Json, Serialized, Toml},
    value::Dict,
    Figment,
};
use serde_json::Value;

use crate::config::{ConfigOverrides, KilnConfig};
use crate::error::{ConfigError, Result};
use crate::validation::{ConfigValidator, SchemaValidator};

/// File names probed in `root`, in priority order.
const CONFIG_FILES: &[&str] = &["kiln.toml", "kiln.config.json"];

/// File-based configuration discovery
///
/// Searches for kiln configuration files in conventional locations and merges
/// them with environment variables and command-line overrides.
///
/// # Example
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
    config_file: Option<PathBuf>,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config_file: None,
        }
    }

    /// Use an explicit config file instead of searching `root`.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Find a config file
    ///
    /// An explicit file always wins. Otherwise searches `root` in this order:
    /// 1. kiln.toml
    /// 2. kiln.config.json
    /// 3. package.json (kiln field)
    pub fn find(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.config_file {
            return Some(self.root.join(explicit));
        }

        for name in CONFIG_FILES {
            let path = self.root.join(name);
            if path.exists() {
                return Some(path);
            }
        }

        let pkg_path = self.root.join("package.json");
        if package_json_section(&pkg_path).is_some() {
            return Some(pkg_path);
        }

        None
    }

    /// Load config with no command-line overrides.
    ///
    /// A missing config file is not an error; defaults apply.
    pub fn load(&self) -> Result<KilnConfig> {
        self.load_with(&ConfigOverrides::default())
    }

    /// Load config, merging `overrides` on top of every other layer.
    pub fn load_with(&self, overrides: &ConfigOverrides) -> Result<KilnConfig> {
        let mut config: KilnConfig = self.figment(overrides)?.extract()?;

        if config.dev_options.root.is_relative() {
            config.dev_options.root = self.root.join(&config.dev_options.root);
        }

        SchemaValidator.validate(&config)?;
        Ok(config)
    }

    /// Build the layered figment without extracting it.
    pub fn figment(&self, overrides: &ConfigOverrides) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(KilnConfig::default()));

        if let Some(path) = self.find() {
            tracing::debug!("loading config from {}", path.display());
            figment = figment.merge(file_provider(&path)?);
        }

        figment = figment
            .merge(Env::prefixed("KILN_").only(&["mode"]))
            .merge(Serialized::default(
                "devOptions",
                env_section("KILN_DEV_", DEV_ENV_KEYS)?,
            ))
            .merge(Serialized::default(
                "bundler",
                env_section("KILN_BUNDLER_", BUNDLER_ENV_KEYS)?,
            ));

        Ok(figment.merge(Serialized::defaults(overrides)))
    }
}

/// Single-word keys readable from `KILN_DEV_*` (e.g. `KILN_DEV_PORT`).
const DEV_ENV_KEYS: &[&str] = &["port", "host", "root", "output", "open", "hmr"];

/// Single-word keys readable from `KILN_BUNDLER_*` (e.g. `KILN_BUNDLER_COMMAND`).
const BUNDLER_ENV_KEYS: &[&str] = &["command", "outbase", "outdir"];

/// Collect prefixed environment variables into a dict that can be nested
/// under a section key. Env keys come out lowercased, so only single-word
/// fields are accepted to keep them aligned with the camelCase file keys.
fn env_section(prefix: &str, keys: &[&str]) -> Result<Dict> {
    Ok(Figment::from(Env::prefixed(prefix).only(keys)).extract()?)
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
        let section = package_json_section(path).ok_or_else(|| ConfigError::InvalidValue {
            field: "kiln".to_string(),
            message: "package.json has no 'kiln' object".to_string(),
        })?;
        return Ok(Figment::from(Serialized::defaults(section)));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(Figment::from(Toml::file(path))),
        Some("json") => Ok(Figment::from(Json::file(path))),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

fn package_json_section(path: &Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&content).ok()?;
    parsed.get("kiln").filter(|v| v.is_object()).cloned()
}

/// Discover and load config from current directory (convenience function)
///
/// # Example
///
/// ```no_run
/// use kiln_config::discover;
///
/// let config = discover().unwrap();
/// ```
pub fn discover() -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        let discovery = ConfigDiscovery::new(dir.path());
        assert!(discovery.find().is_none());
    }

    #[test]
    fn find_prefers_toml_over_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiln.toml"), "mode = \"production\"\n").unwrap();
        fs::write(dir.path().join("kiln.config.json"), "{}").unwrap();

        let discovery = ConfigDiscovery::new(dir.path());
        assert_eq!(discovery.find().unwrap(), dir.path().join("kiln.toml"));
    }

    #[test]
    fn package_json_without_kiln_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "name": "app" }"#).unwrap();

        let discovery = ConfigDiscovery::new(dir.path());
        assert!(discovery.find().is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let discovery = ConfigDiscovery::new(dir.path()).with_config_file("missing.toml");
        let err = discovery.load().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiln.yaml"), "mode: production\n").unwrap();

        let discovery = ConfigDiscovery::new(dir.path()).with_config_file("kiln.yaml");
        let err = discovery.load().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "yaml"));
    }
}
