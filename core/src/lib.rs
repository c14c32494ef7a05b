//! tflite-rs: run TensorFlow Lite models through the TFLite C library.
//!
//! The C library is loaded at runtime, so no TensorFlow build is needed to
//! compile this crate. A session owns one engine interpreter and one host
//! buffer per input and output tensor. Buffers are plain owned memory; data
//! reaches the engine only when [`Interpreter::run`] copies it across.
//!
//! # Example
//!
//! ```ignore
//! use tflite_rs::{Interpreter, InterpreterOptions, TfliteEngine};
//!
//! let engine = TfliteEngine::load_default()?;
//! let bytes = std::fs::read("model.tflite")?;
//! let options = InterpreterOptions::new().with_threads(2);
//! let mut interpreter = Interpreter::new(&engine, &bytes, &options)?;
//!
//! interpreter.input_mut(0)?.data_mut().as_slice_mut::<f32>().unwrap().fill(1.0);
//! interpreter.run()?;
//! println!("{:?}", interpreter.output(0)?.data().view());
//! ```
//!
//! # Delegates
//!
//! External delegates are shared libraries exporting the TFLite plugin ABI.
//! Pass one through [`InterpreterOptions::with_delegate`], or use the helpers
//! in [`delegate`] for known plugins such as the Coral Edge TPU.
//!
//! # Library lookup
//!
//! [`TfliteEngine::load_default`] honours `TFLITE_LIBRARY` and otherwise asks
//! the system loader for `libtensorflowlite_c.so` (`.dylib` on macOS,
//! `tensorflowlite_c.dll` on Windows). Engine error messages are captured on
//! unix only; on Windows errors carry the status description alone.
//!
//! # Loading from a URL
//!
//! [`load_model`] accepts a [`ModelSource`]. `ModelSource::from_location`
//! treats `http…` locations as URLs and downloads them with a blocking
//! HTTP client. TF Hub `lite-model` links are rewritten to serve the raw
//! model file.

pub mod cli;
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod interpreter;
pub mod loader;
pub mod model;
pub mod options;
pub mod status;
pub mod tensor;

// Re-export commonly used types
pub use delegate::{coral_delegate, webnn_delegate, DelegatePlugin, Platform};
pub use engine::{Engine, EngineInterpreter, ErrorLog, MockEngine, TfliteEngine};
pub use error::{Result, TfliteError};
pub use interpreter::Interpreter;
pub use loader::{load_model, tfhub_model_url, LoadOptions, ModelSource};
pub use model::ModelHandle;
pub use options::{DelegateConfig, InterpreterOptions};
pub use status::Status;
pub use tensor::{
    ElementType, TensorBuffer, TensorDescriptor, TensorInfo, TensorView, TensorViewMut,
};
