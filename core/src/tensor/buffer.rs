//! Host-owned tensor storage.
//!
//! A [`TensorBuffer`] is always an owned copy of the tensor's bytes. It is
//! never built over the engine's own tensor memory, which the engine may move
//! or free between calls; contents cross the boundary only through
//! [`copy_to_engine`](TensorBuffer::copy_to_engine) and
//! [`copy_from_engine`](TensorBuffer::copy_from_engine).

use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn};

use super::descriptor::{ElementType, TensorDescriptor};
use crate::engine::{EngineInterpreter, ErrorLog};
use crate::error::{CopyDirection, Result, TfliteError};

/// Typed backing storage, one variant per primitive element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorStorage {
    U8(Vec<u8>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F64(Vec<f64>),
}

/// Borrowed typed view over a [`TensorBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorView<'a> {
    U8(&'a [u8]),
    I8(&'a [i8]),
    I16(&'a [i16]),
    U16(&'a [u16]),
    I32(&'a [i32]),
    U32(&'a [u32]),
    F32(&'a [f32]),
    I64(&'a [i64]),
    U64(&'a [u64]),
    F64(&'a [f64]),
}

/// Mutable typed view over a [`TensorBuffer`].
#[derive(Debug, PartialEq)]
pub enum TensorViewMut<'a> {
    U8(&'a mut [u8]),
    I8(&'a mut [i8]),
    I16(&'a mut [i16]),
    U16(&'a mut [u16]),
    I32(&'a mut [i32]),
    U32(&'a mut [u32]),
    F32(&'a mut [f32]),
    I64(&'a mut [i64]),
    U64(&'a mut [u64]),
    F64(&'a mut [f64]),
}

macro_rules! dispatch {
    ($value:expr, $enum:ident, $v:ident => $body:expr) => {
        match $value {
            $enum::U8($v) => $body,
            $enum::I8($v) => $body,
            $enum::I16($v) => $body,
            $enum::U16($v) => $body,
            $enum::I32($v) => $body,
            $enum::U32($v) => $body,
            $enum::F32($v) => $body,
            $enum::I64($v) => $body,
            $enum::U64($v) => $body,
            $enum::F64($v) => $body,
        }
    };
}

impl TensorStorage {
    /// Zero-filled storage for `count` elements, or `None` for types that
    /// have no buffer representation.
    pub fn zeroed(element_type: ElementType, count: usize) -> Option<Self> {
        let storage = match element_type {
            ElementType::NoType | ElementType::UInt8 | ElementType::Bool => {
                Self::U8(vec![0; count])
            }
            ElementType::Int8 => Self::I8(vec![0; count]),
            ElementType::Int16 => Self::I16(vec![0; count]),
            ElementType::UInt16 => Self::U16(vec![0; count]),
            ElementType::Int32 => Self::I32(vec![0; count]),
            ElementType::UInt32 => Self::U32(vec![0; count]),
            ElementType::Float32 => Self::F32(vec![0.0; count]),
            ElementType::Int64 => Self::I64(vec![0; count]),
            ElementType::UInt64 => Self::U64(vec![0; count]),
            ElementType::Float64 => Self::F64(vec![0.0; count]),
            ElementType::String
            | ElementType::Float16
            | ElementType::Complex64
            | ElementType::Complex128
            | ElementType::Resource
            | ElementType::Variant
            | ElementType::Unknown(_) => return None,
        };
        Some(storage)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, TensorStorage, v => v.len())
    }

    /// `true` for zero-element storage.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resize(&mut self, count: usize) {
        dispatch!(self, TensorStorage, v => v.resize(count, Default::default()))
    }

    fn as_bytes(&self) -> &[u8] {
        dispatch!(self, TensorStorage, v => pod_bytes(v))
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        dispatch!(self, TensorStorage, v => pod_bytes_mut(v))
    }
}

/// Marker for primitive element types every bit pattern is valid for.
mod sealed {
    pub trait Pod: Copy + 'static {}
    impl Pod for u8 {}
    impl Pod for i8 {}
    impl Pod for i16 {}
    impl Pod for u16 {}
    impl Pod for i32 {}
    impl Pod for u32 {}
    impl Pod for f32 {}
    impl Pod for i64 {}
    impl Pod for u64 {}
    impl Pod for f64 {}
}

fn pod_bytes<T: sealed::Pod>(values: &[T]) -> &[u8] {
    // SAFETY: T is a primitive numeric type with no padding, so every byte of
    // the slice is initialised.
    unsafe {
        std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), std::mem::size_of_val(values))
    }
}

fn pod_bytes_mut<T: sealed::Pod>(values: &mut [T]) -> &mut [u8] {
    let len = std::mem::size_of_val(values);
    // SAFETY: as above; additionally any bit pattern written through the
    // byte view is a valid T.
    unsafe { std::slice::from_raw_parts_mut(values.as_mut_ptr().cast::<u8>(), len) }
}

/// Primitive element types a buffer can be viewed as.
pub trait Element: sealed::Pod {
    fn slice(storage: &TensorStorage) -> Option<&[Self]>;
    fn slice_mut(storage: &mut TensorStorage) -> Option<&mut [Self]>;
}

macro_rules! element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            fn slice(storage: &TensorStorage) -> Option<&[Self]> {
                match storage {
                    TensorStorage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut TensorStorage) -> Option<&mut [Self]> {
                match storage {
                    TensorStorage::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
        }
    };
}

element!(u8, U8);
element!(i8, I8);
element!(i16, I16);
element!(u16, U16);
element!(i32, I32);
element!(u32, U32);
element!(f32, F32);
element!(i64, I64);
element!(u64, U64);
element!(f64, F64);

/// Owned local copy of one tensor's data.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    storage: TensorStorage,
    element_type: ElementType,
}

impl TensorBuffer {
    /// Allocate a zeroed buffer of exactly `descriptor.byte_size()` bytes.
    ///
    /// # Errors
    ///
    /// - [`TfliteError::UnsupportedTensorType`] for string, float16,
    ///   complex, resource, variant and unknown element types.
    /// - [`TfliteError::InvariantViolation`] if the byte size is not a whole
    ///   number of elements.
    pub fn new(descriptor: &TensorDescriptor) -> Result<Self> {
        let element_type = descriptor.element_type();
        let mut storage = TensorStorage::zeroed(element_type, 0).ok_or_else(|| {
            TfliteError::UnsupportedTensorType {
                name: descriptor.name().to_string(),
                element_type,
            }
        })?;
        storage.resize(descriptor.element_count()?);
        Ok(Self {
            storage,
            element_type,
        })
    }

    /// Element type the buffer was created for.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// `true` for zero-element tensors.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.storage.as_bytes().len()
    }

    /// Backing storage.
    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    /// Typed view. Every call views the same allocation.
    pub fn view(&self) -> TensorView<'_> {
        match &self.storage {
            TensorStorage::U8(v) => TensorView::U8(v),
            TensorStorage::I8(v) => TensorView::I8(v),
            TensorStorage::I16(v) => TensorView::I16(v),
            TensorStorage::U16(v) => TensorView::U16(v),
            TensorStorage::I32(v) => TensorView::I32(v),
            TensorStorage::U32(v) => TensorView::U32(v),
            TensorStorage::F32(v) => TensorView::F32(v),
            TensorStorage::I64(v) => TensorView::I64(v),
            TensorStorage::U64(v) => TensorView::U64(v),
            TensorStorage::F64(v) => TensorView::F64(v),
        }
    }

    /// Mutable typed view. Writes are picked up by the next `run()`.
    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        match &mut self.storage {
            TensorStorage::U8(v) => TensorViewMut::U8(v),
            TensorStorage::I8(v) => TensorViewMut::I8(v),
            TensorStorage::I16(v) => TensorViewMut::I16(v),
            TensorStorage::U16(v) => TensorViewMut::U16(v),
            TensorStorage::I32(v) => TensorViewMut::I32(v),
            TensorStorage::U32(v) => TensorViewMut::U32(v),
            TensorStorage::F32(v) => TensorViewMut::F32(v),
            TensorStorage::I64(v) => TensorViewMut::I64(v),
            TensorStorage::U64(v) => TensorViewMut::U64(v),
            TensorStorage::F64(v) => TensorViewMut::F64(v),
        }
    }

    /// Slice of `T`, or `None` if the buffer holds a different primitive.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.storage)
    }

    /// Mutable counterpart of [`as_slice`](Self::as_slice).
    pub fn as_slice_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(&mut self.storage)
    }

    /// Raw bytes in native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        self.storage.as_bytes()
    }

    /// Overwrite the buffer from `f64` values, casting to the element type.
    ///
    /// Used by front ends that carry tensor data as JSON numbers.
    pub fn fill_from_f64(&mut self, values: &[f64], name: &str) -> Result<()> {
        if values.len() != self.len() {
            return Err(TfliteError::LengthMismatch {
                name: name.to_string(),
                expected: self.len(),
                actual: values.len(),
            });
        }
        dispatch!(&mut self.storage, TensorStorage, dst => {
            for (d, &s) in dst.iter_mut().zip(values) {
                *d = s as _;
            }
        });
        Ok(())
    }

    /// Buffer contents widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(&self.storage, TensorStorage, v => v.iter().map(|&x| x as f64).collect())
    }

    /// Copy the whole buffer into the engine's input tensor.
    ///
    /// # Errors
    ///
    /// Returns [`TfliteError::CopyFailed`] if the engine tensor is missing,
    /// its byte size differs from this buffer, or the engine reports an error.
    pub fn copy_to_engine<I: EngineInterpreter>(
        &self,
        descriptor: &TensorDescriptor,
        interpreter: &mut I,
        errors: &ErrorLog,
    ) -> Result<()> {
        let index = descriptor.index();
        let engine_bytes = interpreter.input_tensor(index).map(|meta| meta.byte_size);
        self.check_engine_size(descriptor, engine_bytes, CopyDirection::ToEngine)?;

        let status = interpreter.copy_to_input(index, self.as_bytes());
        if !status.is_ok() {
            return Err(TfliteError::CopyFailed {
                name: descriptor.name().to_string(),
                direction: CopyDirection::ToEngine,
                reason: format!("{}. {}", status.describe(), errors.take()),
            });
        }
        Ok(())
    }

    /// Copy the engine's output tensor into this buffer.
    ///
    /// # Errors
    ///
    /// Same conditions as [`copy_to_engine`](Self::copy_to_engine).
    pub fn copy_from_engine<I: EngineInterpreter>(
        &mut self,
        descriptor: &TensorDescriptor,
        interpreter: &I,
        errors: &ErrorLog,
    ) -> Result<()> {
        let index = descriptor.index();
        let engine_bytes = interpreter.output_tensor(index).map(|meta| meta.byte_size);
        self.check_engine_size(descriptor, engine_bytes, CopyDirection::FromEngine)?;

        let status = interpreter.copy_from_output(index, self.storage.as_bytes_mut());
        if !status.is_ok() {
            return Err(TfliteError::CopyFailed {
                name: descriptor.name().to_string(),
                direction: CopyDirection::FromEngine,
                reason: format!("{}. {}", status.describe(), errors.take()),
            });
        }
        Ok(())
    }

    fn check_engine_size(
        &self,
        descriptor: &TensorDescriptor,
        engine_bytes: Option<usize>,
        direction: CopyDirection,
    ) -> Result<()> {
        let reason = match engine_bytes {
            None => format!("engine has no tensor at index {}", descriptor.index()),
            Some(n) if n != self.byte_len() => format!(
                "byte size mismatch (local {} bytes, engine {} bytes)",
                self.byte_len(),
                n
            ),
            Some(_) => return Ok(()),
        };
        Err(TfliteError::CopyFailed {
            name: descriptor.name().to_string(),
            direction,
            reason,
        })
    }
}

/// ndarray views shaped by the tensor descriptor.
impl TensorBuffer {
    /// Read-only view shaped as `descriptor.shape()`.
    pub fn array_view<T: Element>(
        &self,
        descriptor: &TensorDescriptor,
    ) -> Result<ArrayViewD<'_, T>> {
        let dims = descriptor.dims()?;
        let slice = self.typed_or_err::<T>(descriptor)?;
        ArrayViewD::from_shape(IxDyn(&dims), slice)
            .map_err(|e| TfliteError::invariant(format!("tensor '{}': {}", descriptor.name(), e)))
    }

    /// Writable view shaped as `descriptor.shape()`.
    pub fn array_view_mut<T: Element>(
        &mut self,
        descriptor: &TensorDescriptor,
    ) -> Result<ArrayViewMutD<'_, T>> {
        let dims = descriptor.dims()?;
        let element_type = self.element_type;
        let slice = T::slice_mut(&mut self.storage)
            .ok_or_else(|| wrong_element(descriptor, element_type))?;
        ArrayViewMutD::from_shape(IxDyn(&dims), slice)
            .map_err(|e| TfliteError::invariant(format!("tensor '{}': {}", descriptor.name(), e)))
    }

    fn typed_or_err<T: Element>(&self, descriptor: &TensorDescriptor) -> Result<&[T]> {
        T::slice(&self.storage).ok_or_else(|| wrong_element(descriptor, self.element_type))
    }
}

fn wrong_element(descriptor: &TensorDescriptor, element_type: ElementType) -> TfliteError {
    TfliteError::invariant(format!(
        "tensor '{}' holds {} elements, requested view has a different element type",
        descriptor.name(),
        element_type
    ))
}
