//! Compiled model plus the bytes it was compiled from.

use std::sync::Arc;

use tracing::debug;

use crate::engine::{Engine, ErrorLog};
use crate::error::{Result, TfliteError};

/// A model compiled by the engine.
///
/// The engine may keep pointers into the serialized bytes, so the handle owns
/// a private copy of them. The compiled model is declared first and is
/// therefore released before the bytes.
pub struct ModelHandle<E: Engine> {
    compiled: E::Model,
    bytes: Box<[u8]>,
}

impl<E: Engine> ModelHandle<E> {
    /// Copy `raw` and compile it.
    ///
    /// Empty input is rejected without calling into the engine.
    pub fn new(engine: &E, raw: &[u8], errors: &Arc<ErrorLog>) -> Result<Self> {
        if raw.is_empty() {
            return Err(TfliteError::ModelCreationFailed {
                log: format!("Model buffer is empty. {}", errors.take()),
            });
        }

        let bytes: Box<[u8]> = raw.into();
        // SAFETY: `bytes` is a heap allocation owned by the returned handle and
        // never moved out of it; `compiled` is dropped first.
        let compiled = unsafe { engine.create_model(&bytes, errors) }.ok_or_else(|| {
            TfliteError::ModelCreationFailed { log: errors.take() }
        })?;

        debug!("{}: compiled model ({} bytes)", engine.name(), bytes.len());
        Ok(Self { compiled, bytes })
    }

    /// The bytes the engine compiled.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Engine handle of the compiled model.
    pub fn compiled(&self) -> &E::Model {
        &self.compiled
    }

    /// Size of the model in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false` for a successfully built handle.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
