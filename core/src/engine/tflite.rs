//! TensorFlow Lite C library backend.
//!
//! The library is opened at runtime, so building this crate does not need
//! TFLite installed. External delegates are loaded the same way through the
//! `tflite_plugin_create_delegate` plugin ABI.

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ffi;
use super::{DelegateOptions, Engine, EngineInterpreter, ErrorLog, TensorMeta};
use crate::error::{Result, TfliteError};
use crate::status::Status;

/// Environment variable overriding the default library location.
pub const TFLITE_LIBRARY_ENV: &str = "TFLITE_LIBRARY";

/// Longest single message kept from the error reporter.
#[cfg(unix)]
const MAX_ERROR_LEN: usize = 1000;

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY: &str = "tensorflowlite_c.dll";
#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libtensorflowlite_c.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_LIBRARY: &str = "libtensorflowlite_c.so";

/// Function pointers resolved from the TFLite C library.
struct TfliteFunctions {
    version: ffi::FnVersion,
    model_create: ffi::FnModelCreateWithErrorReporter,
    model_delete: ffi::FnModelDelete,
    options_create: ffi::FnOptionsCreate,
    options_delete: ffi::FnOptionsDelete,
    options_set_num_threads: ffi::FnOptionsSetNumThreads,
    options_add_delegate: ffi::FnOptionsAddDelegate,
    options_set_error_reporter: ffi::FnOptionsSetErrorReporter,
    interpreter_create: ffi::FnInterpreterCreate,
    interpreter_delete: ffi::FnInterpreterDelete,
    interpreter_input_count: ffi::FnInterpreterGetTensorCount,
    interpreter_output_count: ffi::FnInterpreterGetTensorCount,
    interpreter_input_tensor: ffi::FnInterpreterGetInputTensor,
    interpreter_output_tensor: ffi::FnInterpreterGetOutputTensor,
    interpreter_allocate_tensors: ffi::FnInterpreterAllocateTensors,
    interpreter_invoke: ffi::FnInterpreterInvoke,
    tensor_type: ffi::FnTensorType,
    tensor_num_dims: ffi::FnTensorNumDims,
    tensor_dim: ffi::FnTensorDim,
    tensor_byte_size: ffi::FnTensorByteSize,
    tensor_name: ffi::FnTensorName,
    tensor_copy_from_buffer: ffi::FnTensorCopyFromBuffer,
    tensor_copy_to_buffer: ffi::FnTensorCopyToBuffer,
}

/// The opened library. Kept alive by every handle created from it.
struct TfliteLibrary {
    funcs: TfliteFunctions,
    _lib: libloading::Library,
}

unsafe fn resolve<T: Copy>(lib: &libloading::Library, name: &str) -> Result<T> {
    lib.get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|e| TfliteError::library(format!("symbol {} not found: {}", name, e)))
}

/// Engine backed by the TensorFlow Lite C library.
#[derive(Clone)]
pub struct TfliteEngine {
    lib: Arc<TfliteLibrary>,
}

impl TfliteEngine {
    /// Open the TFLite C library at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TfliteError::LibraryLoad`] if the library cannot be opened or
    /// a required symbol is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let lib = unsafe {
            libloading::Library::new(path)
                .map_err(|e| TfliteError::library(format!("{}: {}", path.display(), e)))?
        };

        let funcs = unsafe {
            TfliteFunctions {
                version: resolve(&lib, "TfLiteVersion")?,
                model_create: resolve(&lib, "TfLiteModelCreateWithErrorReporter")?,
                model_delete: resolve(&lib, "TfLiteModelDelete")?,
                options_create: resolve(&lib, "TfLiteInterpreterOptionsCreate")?,
                options_delete: resolve(&lib, "TfLiteInterpreterOptionsDelete")?,
                options_set_num_threads: resolve(
                    &lib,
                    "TfLiteInterpreterOptionsSetNumThreads",
                )?,
                options_add_delegate: resolve(&lib, "TfLiteInterpreterOptionsAddDelegate")?,
                options_set_error_reporter: resolve(
                    &lib,
                    "TfLiteInterpreterOptionsSetErrorReporter",
                )?,
                interpreter_create: resolve(&lib, "TfLiteInterpreterCreate")?,
                interpreter_delete: resolve(&lib, "TfLiteInterpreterDelete")?,
                interpreter_input_count: resolve(
                    &lib,
                    "TfLiteInterpreterGetInputTensorCount",
                )?,
                interpreter_output_count: resolve(
                    &lib,
                    "TfLiteInterpreterGetOutputTensorCount",
                )?,
                interpreter_input_tensor: resolve(&lib, "TfLiteInterpreterGetInputTensor")?,
                interpreter_output_tensor: resolve(&lib, "TfLiteInterpreterGetOutputTensor")?,
                interpreter_allocate_tensors: resolve(
                    &lib,
                    "TfLiteInterpreterAllocateTensors",
                )?,
                interpreter_invoke: resolve(&lib, "TfLiteInterpreterInvoke")?,
                tensor_type: resolve(&lib, "TfLiteTensorType")?,
                tensor_num_dims: resolve(&lib, "TfLiteTensorNumDims")?,
                tensor_dim: resolve(&lib, "TfLiteTensorDim")?,
                tensor_byte_size: resolve(&lib, "TfLiteTensorByteSize")?,
                tensor_name: resolve(&lib, "TfLiteTensorName")?,
                tensor_copy_from_buffer: resolve(&lib, "TfLiteTensorCopyFromBuffer")?,
                tensor_copy_to_buffer: resolve(&lib, "TfLiteTensorCopyToBuffer")?,
            }
        };

        debug!("Loaded TFLite library from {}", path.display());
        Ok(Self {
            lib: Arc::new(TfliteLibrary { funcs, _lib: lib }),
        })
    }

    /// Open the library named by `TFLITE_LIBRARY`, or the platform default
    /// name resolved through the system library search path.
    pub fn load_default() -> Result<Self> {
        match std::env::var_os(TFLITE_LIBRARY_ENV) {
            Some(path) => Self::load(path),
            None => Self::load(DEFAULT_LIBRARY),
        }
    }

    /// Platform default library file name.
    pub fn default_library_name() -> &'static str {
        DEFAULT_LIBRARY
    }

    /// Version string reported by the library.
    pub fn version(&self) -> String {
        let ptr = unsafe { (self.lib.funcs.version)() };
        if ptr.is_null() {
            return "unknown".to_string();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// Reporter registered with the engine, if this platform can format its
/// messages.
///
/// Formatting the `va_list` needs the C library's `vsnprintf`, which is only
/// linked on unix. Elsewhere the engine falls back to printing to stderr and
/// errors carry the status description alone.
fn error_reporter() -> Option<ffi::ErrorReporter> {
    #[cfg(unix)]
    {
        Some(report_error)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// Error reporter registered with the engine. `user_data` is the session's
/// [`ErrorLog`].
#[cfg(unix)]
unsafe extern "C" fn report_error(
    user_data: *mut c_void,
    format: *const c_char,
    args: ffi::VaList,
) {
    if user_data.is_null() || format.is_null() {
        return;
    }
    let mut buf = [0 as c_char; MAX_ERROR_LEN];
    if ffi::vsnprintf(buf.as_mut_ptr(), MAX_ERROR_LEN, format, args) < 0 {
        return;
    }
    let log = &*(user_data as *const ErrorLog);
    log.push(&CStr::from_ptr(buf.as_ptr()).to_string_lossy());
}

/// Error callback handed to delegate plugins, which carry no user data.
unsafe extern "C" fn report_delegate_error(message: *const c_char) {
    if !message.is_null() {
        warn!("delegate: {}", CStr::from_ptr(message).to_string_lossy());
    }
}

fn log_ptr(errors: &Arc<ErrorLog>) -> *mut c_void {
    Arc::as_ptr(errors) as *mut c_void
}

/// Compiled model. Borrows the bytes it was created from.
pub struct TfliteModel {
    ptr: NonNull<ffi::TfLiteModel>,
    lib: Arc<TfliteLibrary>,
    _errors: Arc<ErrorLog>,
}

impl Drop for TfliteModel {
    fn drop(&mut self) {
        unsafe { (self.lib.funcs.model_delete)(self.ptr.as_ptr()) }
    }
}

/// Interpreter options object.
pub struct TfliteOptions {
    ptr: NonNull<ffi::TfLiteInterpreterOptions>,
    lib: Arc<TfliteLibrary>,
    errors: Arc<ErrorLog>,
}

impl Drop for TfliteOptions {
    fn drop(&mut self) {
        unsafe { (self.lib.funcs.options_delete)(self.ptr.as_ptr()) }
    }
}

/// Delegate created by an external plugin library.
pub struct TfliteDelegate {
    ptr: NonNull<ffi::TfLiteDelegate>,
    destroy: ffi::FnPluginDestroyDelegate,
    _plugin: libloading::Library,
}

impl Drop for TfliteDelegate {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.ptr.as_ptr()) }
    }
}

/// Interpreter instance.
pub struct TfliteInterpreter {
    ptr: NonNull<ffi::TfLiteInterpreter>,
    lib: Arc<TfliteLibrary>,
    _errors: Arc<ErrorLog>,
}

impl Drop for TfliteInterpreter {
    fn drop(&mut self) {
        unsafe { (self.lib.funcs.interpreter_delete)(self.ptr.as_ptr()) }
    }
}

// SAFETY: each handle is owned by exactly one wrapper and TFLite objects have
// no thread affinity. None of them is Sync: concurrent calls on one
// interpreter are not allowed by the engine.
unsafe impl Send for TfliteModel {}
unsafe impl Send for TfliteOptions {}
unsafe impl Send for TfliteDelegate {}
unsafe impl Send for TfliteInterpreter {}

impl Engine for TfliteEngine {
    type Model = TfliteModel;
    type Options = TfliteOptions;
    type Delegate = TfliteDelegate;
    type Interpreter = TfliteInterpreter;

    fn name(&self) -> &'static str {
        "tflite"
    }

    unsafe fn create_model(&self, bytes: &[u8], errors: &Arc<ErrorLog>) -> Option<TfliteModel> {
        let ptr = (self.lib.funcs.model_create)(
            bytes.as_ptr() as *const c_void,
            bytes.len(),
            error_reporter(),
            log_ptr(errors),
        );
        NonNull::new(ptr).map(|ptr| TfliteModel {
            ptr,
            lib: Arc::clone(&self.lib),
            _errors: Arc::clone(errors),
        })
    }

    fn create_options(&self, errors: &Arc<ErrorLog>) -> Result<TfliteOptions> {
        let ptr = unsafe { (self.lib.funcs.options_create)() };
        let ptr = NonNull::new(ptr).ok_or_else(|| TfliteError::InterpreterCreationFailed {
            log: "TfLiteInterpreterOptionsCreate returned null".to_string(),
        })?;
        unsafe {
            (self.lib.funcs.options_set_error_reporter)(
                ptr.as_ptr(),
                error_reporter(),
                log_ptr(errors),
            );
        }
        Ok(TfliteOptions {
            ptr,
            lib: Arc::clone(&self.lib),
            errors: Arc::clone(errors),
        })
    }

    fn set_num_threads(&self, options: &mut TfliteOptions, threads: i32) {
        unsafe { (self.lib.funcs.options_set_num_threads)(options.ptr.as_ptr(), threads) }
    }

    fn create_delegate(
        &self,
        options: &DelegateOptions,
        _errors: &Arc<ErrorLog>,
    ) -> Result<TfliteDelegate> {
        let path = options.path().to_string_lossy().into_owned();
        let failed = |reason: String| TfliteError::DelegateCreationFailed {
            path: path.clone(),
            reason,
        };

        let plugin = unsafe {
            libloading::Library::new(path.as_str()).map_err(|e| failed(e.to_string()))?
        };
        let (create, destroy) = unsafe {
            let create: ffi::FnPluginCreateDelegate =
                resolve(&plugin, "tflite_plugin_create_delegate")
                    .map_err(|e| failed(e.to_string()))?;
            let destroy: ffi::FnPluginDestroyDelegate =
                resolve(&plugin, "tflite_plugin_destroy_delegate")
                    .map_err(|e| failed(e.to_string()))?;
            (create, destroy)
        };

        let keys: Vec<*const c_char> = options.keys().iter().map(|k| k.as_ptr()).collect();
        let values: Vec<*const c_char> = options.values().iter().map(|v| v.as_ptr()).collect();
        let ptr = unsafe {
            create(
                keys.as_ptr(),
                values.as_ptr(),
                keys.len(),
                Some(report_delegate_error),
            )
        };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| failed("tflite_plugin_create_delegate returned null".to_string()))?;

        debug!("Created delegate from {} with {} options", path, options.len());
        Ok(TfliteDelegate {
            ptr,
            destroy,
            _plugin: plugin,
        })
    }

    unsafe fn add_delegate(&self, options: &mut TfliteOptions, delegate: &TfliteDelegate) {
        (self.lib.funcs.options_add_delegate)(options.ptr.as_ptr(), delegate.ptr.as_ptr());
    }

    fn create_interpreter(
        &self,
        model: &TfliteModel,
        options: &TfliteOptions,
    ) -> Option<TfliteInterpreter> {
        let ptr = unsafe {
            (self.lib.funcs.interpreter_create)(model.ptr.as_ptr(), options.ptr.as_ptr())
        };
        NonNull::new(ptr).map(|ptr| TfliteInterpreter {
            ptr,
            lib: Arc::clone(&self.lib),
            _errors: Arc::clone(&options.errors),
        })
    }
}

impl TfliteInterpreter {
    fn input_ptr(&self, index: usize) -> Option<NonNull<ffi::TfLiteTensor>> {
        if index >= self.input_count() {
            return None;
        }
        let ptr = unsafe {
            (self.lib.funcs.interpreter_input_tensor)(self.ptr.as_ptr(), index as i32)
        };
        NonNull::new(ptr)
    }

    fn output_ptr(&self, index: usize) -> Option<NonNull<ffi::TfLiteTensor>> {
        if index >= self.output_count() {
            return None;
        }
        let ptr = unsafe {
            (self.lib.funcs.interpreter_output_tensor)(self.ptr.as_ptr(), index as i32)
        };
        NonNull::new(ptr as *mut ffi::TfLiteTensor)
    }

    /// # Safety
    ///
    /// `tensor` must belong to this interpreter.
    unsafe fn tensor_meta(&self, tensor: NonNull<ffi::TfLiteTensor>) -> TensorMeta {
        let funcs = &self.lib.funcs;
        let tensor = tensor.as_ptr() as *const ffi::TfLiteTensor;
        let num_dims = (funcs.tensor_num_dims)(tensor).max(0);
        let dims = (0..num_dims)
            .map(|i| (funcs.tensor_dim)(tensor, i))
            .collect();
        let name_ptr = (funcs.tensor_name)(tensor);
        let name = if name_ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(name_ptr).to_string_lossy().into_owned())
        };
        TensorMeta {
            type_code: (funcs.tensor_type)(tensor),
            dims,
            name,
            byte_size: (funcs.tensor_byte_size)(tensor),
        }
    }
}

impl EngineInterpreter for TfliteInterpreter {
    fn allocate_tensors(&mut self) -> Status {
        Status::from(unsafe {
            (self.lib.funcs.interpreter_allocate_tensors)(self.ptr.as_ptr())
        })
    }

    fn input_count(&self) -> usize {
        let count = unsafe { (self.lib.funcs.interpreter_input_count)(self.ptr.as_ptr()) };
        count.max(0) as usize
    }

    fn output_count(&self) -> usize {
        let count = unsafe { (self.lib.funcs.interpreter_output_count)(self.ptr.as_ptr()) };
        count.max(0) as usize
    }

    fn input_tensor(&self, index: usize) -> Option<TensorMeta> {
        self.input_ptr(index).map(|t| unsafe { self.tensor_meta(t) })
    }

    fn output_tensor(&self, index: usize) -> Option<TensorMeta> {
        self.output_ptr(index).map(|t| unsafe { self.tensor_meta(t) })
    }

    fn copy_to_input(&mut self, index: usize, src: &[u8]) -> Status {
        let Some(tensor) = self.input_ptr(index) else {
            return Status::Error;
        };
        Status::from(unsafe {
            (self.lib.funcs.tensor_copy_from_buffer)(
                tensor.as_ptr(),
                src.as_ptr() as *const c_void,
                src.len(),
            )
        })
    }

    fn copy_from_output(&self, index: usize, dst: &mut [u8]) -> Status {
        let Some(tensor) = self.output_ptr(index) else {
            return Status::Error;
        };
        Status::from(unsafe {
            (self.lib.funcs.tensor_copy_to_buffer)(
                tensor.as_ptr(),
                dst.as_mut_ptr() as *mut c_void,
                dst.len(),
            )
        })
    }

    fn invoke(&mut self) -> Status {
        Status::from(unsafe { (self.lib.funcs.interpreter_invoke)(self.ptr.as_ptr()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_name() {
        let name = TfliteEngine::default_library_name();
        assert!(name.contains("tensorflowlite_c"));
    }

    #[test]
    fn test_missing_library() {
        let err = TfliteEngine::load("/nonexistent/libtensorflowlite_c.so")
            .err()
            .expect("loading a missing library must fail");
        assert!(matches!(err, TfliteError::LibraryLoad(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_reporter_registered_on_unix() {
        assert!(error_reporter().is_some());
    }

    #[cfg(not(unix))]
    #[test]
    fn test_no_reporter_without_vsnprintf() {
        assert!(error_reporter().is_none());
    }
}
