//! Configuration types for tflite-rs.

use serde::Deserialize;
use serde_json::Value;

use crate::options::InterpreterOptions;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Engine library configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Interpreter options, validated by [`Config::interpreter_options`].
    #[serde(default)]
    pub interpreter: Value,
}

/// Engine library configuration.
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Path to the TFLite C library. Falls back to `TFLITE_LIBRARY`, then the
    /// platform default name.
    #[serde(default)]
    pub library: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> crate::error::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Typed interpreter options.
    pub fn interpreter_options(&self) -> crate::error::Result<InterpreterOptions> {
        InterpreterOptions::from_value(&self.interpreter)
    }
}
