//! High-level configuration structure for kiln.
//!
//! This module provides the main `KilnConfig` struct and the override layer
//! the CLI merges on top of it. For file discovery and layered loading, see
//! the `discovery` module.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundler::BundlerOptions;
use crate::dev::{DevOptions, OutputMode};
use crate::error::{ConfigError, Result as ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub mode: Mode,

    #[serde(default, rename = "devOptions")]
    pub dev_options: DevOptions,

    #[serde(default)]
    pub bundler: BundlerOptions,
}

/// Build mode; `Production` turns on minification in the bundler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl KilnConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::{KilnConfig, Mode};
    /// use serde_json::json;
    ///
    /// let value = json!({
    ///     "mode": "production",
    ///     "devOptions": { "port": 3000 }
    /// });
    ///
    /// let config = KilnConfig::from_value(value).unwrap();
    /// assert_eq!(config.mode, Mode::Production);
    /// assert_eq!(config.dev_options.port, 3000);
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            message: e.to_string(),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            message: e.to_string(),
        })
    }
}

/// Values supplied on the command line.
///
/// Only fields that are `Some` are serialized, so merging this on top of the
/// other layers leaves unspecified keys untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    #[serde(rename = "devOptions")]
    pub dev_options: DevOverrides,

    pub bundler: BundlerOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmr: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<String>>,
}
