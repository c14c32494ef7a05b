//! Tensor descriptors, host-owned buffers, and the per-tensor object handed
//! to callers.

mod buffer;
mod descriptor;

pub use buffer::{Element, TensorBuffer, TensorStorage, TensorView, TensorViewMut};
pub use descriptor::{ElementType, TensorDescriptor, UNKNOWN_TENSOR_NAME};

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::error::Result;

/// One input or output of an [`Interpreter`](crate::Interpreter).
///
/// Created once when the session is built and reused by every `run()`; only
/// the buffer contents change between runs.
#[derive(Debug)]
pub struct TensorInfo {
    pub(crate) descriptor: TensorDescriptor,
    pub(crate) buffer: TensorBuffer,
}

impl TensorInfo {
    pub(crate) fn new(descriptor: TensorDescriptor) -> Result<Self> {
        let buffer = TensorBuffer::new(&descriptor)?;
        Ok(Self { descriptor, buffer })
    }

    /// Position in the interpreter's input or output list.
    pub fn id(&self) -> usize {
        self.descriptor.index()
    }

    /// Engine-reported name, or `"unknown tensor"`.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Element type of the buffer.
    pub fn data_type(&self) -> ElementType {
        self.descriptor.element_type()
    }

    /// Dimensions as reported by the engine.
    pub fn shape(&self) -> &[i32] {
        self.descriptor.shape()
    }

    /// Full engine metadata for this tensor.
    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    /// The tensor's local buffer.
    pub fn data(&self) -> &TensorBuffer {
        &self.buffer
    }

    /// Writable buffer. Input writes are sent on the next `run()`.
    pub fn data_mut(&mut self) -> &mut TensorBuffer {
        &mut self.buffer
    }

    /// Buffer contents as an array shaped like the tensor.
    pub fn array<T: Element>(&self) -> Result<ArrayViewD<'_, T>> {
        self.buffer.array_view(&self.descriptor)
    }

    /// Writable array view shaped like the tensor.
    pub fn array_mut<T: Element>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        self.buffer.array_view_mut(&self.descriptor)
    }
}
