//! Convenience entry point that turns a model source and delegate plugins
//! into a ready [`Interpreter`].

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::delegate::DelegatePlugin;
use crate::engine::Engine;
use crate::error::{Result, TfliteError};
use crate::interpreter::Interpreter;
use crate::options::InterpreterOptions;

/// Thread count used when [`LoadOptions::threads`] is left at its default.
pub const DEFAULT_THREADS: i32 = 4;

/// Query that makes TF Hub serve the raw `.tflite` file.
pub const TFHUB_SEARCH_PARAM: &str = "?lite-format=tflite";

/// Where model bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Local model file.
    Path(PathBuf),
    /// Model fetched over HTTP(S).
    Url(String),
    /// Model already in memory.
    Bytes(Vec<u8>),
}

impl ModelSource {
    /// Classify a user-supplied location. Anything starting with `http` is a
    /// URL, everything else a file path.
    pub fn from_location(location: &str) -> Self {
        if location.starts_with("http") {
            Self::Url(tfhub_model_url(location))
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// Read, download or hand over the model bytes.
    ///
    /// # Errors
    ///
    /// - [`TfliteError::FileNotFound`] for a missing path.
    /// - [`TfliteError::Http`] if the request fails or the server answers
    ///   with an error status.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Path(path) => {
                if !path.exists() {
                    return Err(TfliteError::FileNotFound(path));
                }
                Ok(std::fs::read(&path)?)
            }
            Self::Url(url) => {
                debug!("Fetching model from {}", url);
                let response = reqwest::blocking::get(url.as_str())?.error_for_status()?;
                Ok(response.bytes()?.to_vec())
            }
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Point TF Hub `lite-model` links at the downloadable file.
///
/// Other URLs, and links that already carry the query, are returned as is.
pub fn tfhub_model_url(url: &str) -> String {
    if url.contains("tfhub.dev")
        && url.contains("lite-model")
        && !url.ends_with(TFHUB_SEARCH_PARAM)
    {
        format!("{}{}", url, TFHUB_SEARCH_PARAM)
    } else {
        url.to_string()
    }
}

/// Settings for [`load_model`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Worker threads; [`DEFAULT_THREADS`] unless overridden.
    pub threads: Option<i32>,
    /// Only the first plugin is attached.
    pub delegates: Vec<DelegatePlugin>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            threads: Some(DEFAULT_THREADS),
            delegates: Vec::new(),
        }
    }
}

impl LoadOptions {
    /// Interpreter options for these settings, using the first delegate only.
    pub fn to_interpreter_options(&self) -> InterpreterOptions {
        if self.delegates.len() > 1 {
            warn!(
                "Only a single delegate is supported right now. \
                 Only the first one, {}, will be used",
                self.delegates[0].name
            );
        }
        InterpreterOptions {
            threads: self.threads,
            delegate: self.delegates.first().and_then(DelegatePlugin::to_config),
        }
    }
}

/// Read the model and build an interpreter for it.
pub fn load_model<E: Engine>(
    engine: &E,
    source: ModelSource,
    options: &LoadOptions,
) -> Result<Interpreter<E>> {
    let origin = source.to_string();
    let bytes = source.into_bytes()?;
    let interpreter = Interpreter::new(engine, &bytes, &options.to_interpreter_options())?;
    info!(
        "Loaded model {} on {} ({} inputs, {} outputs)",
        origin,
        engine.name(),
        interpreter.inputs().len(),
        interpreter.outputs().len()
    );
    Ok(interpreter)
}
