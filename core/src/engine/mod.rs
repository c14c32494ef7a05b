//! The boundary to the native inference engine.
//!
//! [`Engine`] and [`EngineInterpreter`] name exactly the calls this crate
//! makes into the engine. [`TfliteEngine`] implements them on top of the
//! TensorFlow Lite C library; [`MockEngine`] runs a tiny JSON-described graph
//! in-process so host code can be exercised without the native library.

mod ffi;
pub mod mock;
mod tflite;

pub use mock::MockEngine;
pub use tflite::{
    TfliteDelegate, TfliteEngine, TfliteInterpreter, TfliteModel, TfliteOptions,
    TFLITE_LIBRARY_ENV,
};

use std::ffi::{CStr, CString};
use std::sync::{Arc, Mutex};

use crate::error::{Result, TfliteError};
use crate::status::Status;

/// Upper bound on delegate key/value pairs accepted by the plugin ABI.
pub const MAX_DELEGATE_OPTIONS: usize = 256;

/// Metadata the engine reports for one tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    /// Raw `TfLiteType` code.
    pub type_code: i32,
    pub dims: Vec<i32>,
    /// `None` when the engine reports no name.
    pub name: Option<String>,
    pub byte_size: usize,
}

/// Per-session log the engine's error reporter appends to.
///
/// Every engine object created for a session reports here. The session
/// drains it whenever it builds an error, and at the start of every run, so
/// messages never leak between calls.
#[derive(Debug, Default)]
pub struct ErrorLog {
    buf: Mutex<String>,
}

impl ErrorLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reported message as a line.
    pub fn push(&self, message: &str) {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(message);
        buf.push('\n');
    }

    /// Drain everything reported so far.
    pub fn take(&self) -> String {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    /// `true` if nothing was reported since the last drain.
    pub fn is_empty(&self) -> bool {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}

/// Configuration handed to an external delegate plugin.
///
/// Owns every key and value as a C string so pointers into them stay valid
/// until the interpreter has been created.
#[derive(Debug, Clone)]
pub struct DelegateOptions {
    path: CString,
    keys: Vec<CString>,
    values: Vec<CString>,
}

impl DelegateOptions {
    /// Options for the delegate library at `path`.
    pub fn new(path: &str) -> Result<Self> {
        let path = CString::new(path).map_err(|_| {
            TfliteError::invalid_option(format!("delegate path contains a NUL byte: {:?}", path))
        })?;
        Ok(Self {
            path,
            keys: Vec::new(),
            values: Vec::new(),
        })
    }

    /// Append one option. Fails once [`MAX_DELEGATE_OPTIONS`] are stored.
    pub fn insert(&mut self, key: &CStr, value: &CStr) -> Status {
        if self.keys.len() >= MAX_DELEGATE_OPTIONS {
            return Status::Error;
        }
        self.keys.push(key.to_owned());
        self.values.push(value.to_owned());
        Status::Ok
    }

    /// Library path of the delegate plugin.
    pub fn path(&self) -> &CStr {
        &self.path
    }

    /// Number of stored options.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// `true` if no option was stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&CStr, &CStr)> {
        self.keys
            .iter()
            .zip(&self.values)
            .map(|(k, v)| (k.as_c_str(), v.as_c_str()))
    }

    pub(crate) fn keys(&self) -> &[CString] {
        &self.keys
    }

    pub(crate) fn values(&self) -> &[CString] {
        &self.values
    }
}

/// Calls into an engine library.
///
/// Handles are plain owned values released on drop; the session orders its
/// fields so that the interpreter goes first, then the delegate, the model
/// and the options.
pub trait Engine {
    type Model;
    type Options;
    type Delegate;
    type Interpreter: EngineInterpreter;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Compile a model from serialized bytes, reporting problems to `errors`.
    ///
    /// # Safety
    ///
    /// The returned model may keep pointers into `bytes`. The caller must keep
    /// `bytes` alive and unmoved until the model is dropped.
    unsafe fn create_model(&self, bytes: &[u8], errors: &Arc<ErrorLog>) -> Option<Self::Model>;

    /// Create an interpreter options object reporting into `errors`.
    fn create_options(&self, errors: &Arc<ErrorLog>) -> Result<Self::Options>;

    /// Set the interpreter thread count.
    fn set_num_threads(&self, options: &mut Self::Options, threads: i32);

    /// Add one delegate option.
    fn insert_delegate_option(
        &self,
        options: &mut DelegateOptions,
        key: &CStr,
        value: &CStr,
    ) -> Status {
        options.insert(key, value)
    }

    /// Load the delegate plugin described by `options`.
    fn create_delegate(
        &self,
        options: &DelegateOptions,
        errors: &Arc<ErrorLog>,
    ) -> Result<Self::Delegate>;

    /// Attach a delegate to interpreter options.
    ///
    /// # Safety
    ///
    /// `delegate` must outlive every interpreter created from `options`.
    unsafe fn add_delegate(&self, options: &mut Self::Options, delegate: &Self::Delegate);

    /// Build an interpreter, or `None` after reporting the reason.
    fn create_interpreter(
        &self,
        model: &Self::Model,
        options: &Self::Options,
    ) -> Option<Self::Interpreter>;
}

/// Calls on one engine interpreter.
pub trait EngineInterpreter {
    fn allocate_tensors(&mut self) -> Status;
    fn input_count(&self) -> usize;
    fn output_count(&self) -> usize;
    fn input_tensor(&self, index: usize) -> Option<TensorMeta>;
    fn output_tensor(&self, index: usize) -> Option<TensorMeta>;
    /// Copy `src` into input tensor `index`; `src` must match its byte size.
    fn copy_to_input(&mut self, index: usize, src: &[u8]) -> Status;
    /// Copy output tensor `index` into `dst`; `dst` must match its byte size.
    fn copy_from_output(&self, index: usize, dst: &mut [u8]) -> Status;
    fn invoke(&mut self) -> Status;
}
