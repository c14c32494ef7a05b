//! Raw declarations for the TensorFlow Lite C API and the external delegate
//! plugin ABI.
//!
//! Symbols are resolved at runtime with `libloading`; use the safe wrappers
//! in the `tflite` module instead of calling these directly.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

pub type TfLiteStatus = c_int;
pub type TfLiteType = c_int;

/// `va_list` as received by the error reporter and forwarded to `vsnprintf`.
///
/// Both x86_64 SysV and AArch64 pass `va_list` arguments as a pointer, so the
/// value is only ever handed on, never inspected.
pub type VaList = *mut c_void;

#[repr(C)]
pub struct TfLiteModel {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TfLiteInterpreterOptions {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TfLiteInterpreter {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TfLiteTensor {
    _private: [u8; 0],
}

#[repr(C)]
pub struct TfLiteDelegate {
    _private: [u8; 0],
}

pub type ErrorReporter =
    unsafe extern "C" fn(user_data: *mut c_void, format: *const c_char, args: VaList);

// Library
pub type FnVersion = unsafe extern "C" fn() -> *const c_char;

// Model
pub type FnModelCreateWithErrorReporter = unsafe extern "C" fn(
    model_data: *const c_void,
    model_size: usize,
    reporter: Option<ErrorReporter>,
    user_data: *mut c_void,
) -> *mut TfLiteModel;
pub type FnModelDelete = unsafe extern "C" fn(model: *mut TfLiteModel);

// Interpreter options
pub type FnOptionsCreate = unsafe extern "C" fn() -> *mut TfLiteInterpreterOptions;
pub type FnOptionsDelete = unsafe extern "C" fn(options: *mut TfLiteInterpreterOptions);
pub type FnOptionsSetNumThreads =
    unsafe extern "C" fn(options: *mut TfLiteInterpreterOptions, num_threads: i32);
pub type FnOptionsAddDelegate =
    unsafe extern "C" fn(options: *mut TfLiteInterpreterOptions, delegate: *mut TfLiteDelegate);
pub type FnOptionsSetErrorReporter = unsafe extern "C" fn(
    options: *mut TfLiteInterpreterOptions,
    reporter: Option<ErrorReporter>,
    user_data: *mut c_void,
);

// Interpreter
pub type FnInterpreterCreate = unsafe extern "C" fn(
    model: *const TfLiteModel,
    options: *const TfLiteInterpreterOptions,
) -> *mut TfLiteInterpreter;
pub type FnInterpreterDelete = unsafe extern "C" fn(interpreter: *mut TfLiteInterpreter);
pub type FnInterpreterGetTensorCount =
    unsafe extern "C" fn(interpreter: *const TfLiteInterpreter) -> i32;
pub type FnInterpreterGetInputTensor =
    unsafe extern "C" fn(interpreter: *const TfLiteInterpreter, index: i32) -> *mut TfLiteTensor;
pub type FnInterpreterGetOutputTensor =
    unsafe extern "C" fn(interpreter: *const TfLiteInterpreter, index: i32) -> *const TfLiteTensor;
pub type FnInterpreterAllocateTensors =
    unsafe extern "C" fn(interpreter: *mut TfLiteInterpreter) -> TfLiteStatus;
pub type FnInterpreterInvoke =
    unsafe extern "C" fn(interpreter: *mut TfLiteInterpreter) -> TfLiteStatus;

// Tensor
pub type FnTensorType = unsafe extern "C" fn(tensor: *const TfLiteTensor) -> TfLiteType;
pub type FnTensorNumDims = unsafe extern "C" fn(tensor: *const TfLiteTensor) -> i32;
pub type FnTensorDim = unsafe extern "C" fn(tensor: *const TfLiteTensor, dim_index: i32) -> i32;
pub type FnTensorByteSize = unsafe extern "C" fn(tensor: *const TfLiteTensor) -> usize;
pub type FnTensorName = unsafe extern "C" fn(tensor: *const TfLiteTensor) -> *const c_char;
pub type FnTensorCopyFromBuffer = unsafe extern "C" fn(
    tensor: *mut TfLiteTensor,
    input_data: *const c_void,
    input_data_size: usize,
) -> TfLiteStatus;
pub type FnTensorCopyToBuffer = unsafe extern "C" fn(
    tensor: *const TfLiteTensor,
    output_data: *mut c_void,
    output_data_size: usize,
) -> TfLiteStatus;

// External delegate plugin ABI
pub type DelegateErrorReporter = unsafe extern "C" fn(message: *const c_char);
pub type FnPluginCreateDelegate = unsafe extern "C" fn(
    options_keys: *const *const c_char,
    options_values: *const *const c_char,
    num_options: usize,
    report_error: Option<DelegateErrorReporter>,
) -> *mut TfLiteDelegate;
pub type FnPluginDestroyDelegate = unsafe extern "C" fn(delegate: *mut TfLiteDelegate);

// MSVC's UCRT only exports vsnprintf as an inline wrapper.
#[cfg(unix)]
extern "C" {
    pub fn vsnprintf(buf: *mut c_char, size: usize, format: *const c_char, args: VaList) -> c_int;
}
