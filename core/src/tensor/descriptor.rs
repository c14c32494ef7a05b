//! Element types and per-tensor descriptors.

use std::fmt;

use crate::engine::TensorMeta;
use crate::error::{Result, TfliteError};

/// Name reported for tensors the engine did not name.
pub const UNKNOWN_TENSOR_NAME: &str = "unknown tensor";

/// Element type of a tensor (`TfLiteType`).
///
/// Codes the crate does not recognise are kept as [`Unknown`](Self::Unknown)
/// rather than being folded into a neighbouring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    NoType,
    Float32,
    Int32,
    UInt8,
    Int64,
    String,
    Bool,
    Int16,
    Complex64,
    Int8,
    Float16,
    Float64,
    Complex128,
    UInt64,
    Resource,
    Variant,
    UInt32,
    UInt16,
    Unknown(i32),
}

impl ElementType {
    /// Size of a single element in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::NoType
            | Self::UInt8
            | Self::Int8
            | Self::Bool
            | Self::String
            | Self::Resource
            | Self::Variant
            | Self::Unknown(_) => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    /// Whether a [`TensorBuffer`](super::TensorBuffer) can be created for this type.
    pub fn is_supported(self) -> bool {
        super::TensorStorage::zeroed(self, 0).is_some()
    }

    /// Raw `TfLiteType` code.
    pub fn code(self) -> i32 {
        match self {
            Self::NoType => 0,
            Self::Float32 => 1,
            Self::Int32 => 2,
            Self::UInt8 => 3,
            Self::Int64 => 4,
            Self::String => 5,
            Self::Bool => 6,
            Self::Int16 => 7,
            Self::Complex64 => 8,
            Self::Int8 => 9,
            Self::Float16 => 10,
            Self::Float64 => 11,
            Self::Complex128 => 12,
            Self::UInt64 => 13,
            Self::Resource => 14,
            Self::Variant => 15,
            Self::UInt32 => 16,
            Self::UInt16 => 17,
            Self::Unknown(code) => code,
        }
    }

    /// Short display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoType => "no_type",
            Self::Float32 => "float32",
            Self::Int32 => "int32",
            Self::UInt8 => "uint8",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int16 => "int16",
            Self::Complex64 => "complex64",
            Self::Int8 => "int8",
            Self::Float16 => "float16",
            Self::Float64 => "float64",
            Self::Complex128 => "complex128",
            Self::UInt64 => "uint64",
            Self::Resource => "resource",
            Self::Variant => "variant",
            Self::UInt32 => "uint32",
            Self::UInt16 => "uint16",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<i32> for ElementType {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::NoType,
            1 => Self::Float32,
            2 => Self::Int32,
            3 => Self::UInt8,
            4 => Self::Int64,
            5 => Self::String,
            6 => Self::Bool,
            7 => Self::Int16,
            8 => Self::Complex64,
            9 => Self::Int8,
            10 => Self::Float16,
            11 => Self::Float64,
            12 => Self::Complex128,
            13 => Self::UInt64,
            14 => Self::Resource,
            15 => Self::Variant,
            16 => Self::UInt32,
            17 => Self::UInt16,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({})", code),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Read-only description of one input or output tensor.
///
/// Built once per tensor after allocation; shapes are fixed from then on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    element_type: ElementType,
    shape: Vec<i32>,
    index: usize,
    name: String,
    byte_size: usize,
}

impl TensorDescriptor {
    /// Build a descriptor from engine metadata at position `index`.
    pub fn from_meta(meta: &TensorMeta, index: usize) -> Self {
        Self {
            element_type: ElementType::from(meta.type_code),
            shape: meta.dims.clone(),
            index,
            name: meta
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_TENSOR_NAME.to_string()),
            byte_size: meta.byte_size,
        }
    }

    /// Decoded element type.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Dimensions as reported by the engine.
    pub fn shape(&self) -> &[i32] {
        &self.shape
    }

    /// Shape rendered as comma-joined dimensions, e.g. `"1,224,224,3"`.
    pub fn shape_string(&self) -> String {
        self.shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Position in the input or output list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Tensor name, or [`UNKNOWN_TENSOR_NAME`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the engine tensor in bytes.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Number of elements, `byte_size / width`.
    ///
    /// # Errors
    ///
    /// Returns [`TfliteError::InvariantViolation`] when the byte size is not a
    /// whole number of elements.
    pub fn element_count(&self) -> Result<usize> {
        let width = self.element_type.width();
        if self.byte_size % width != 0 {
            return Err(TfliteError::invariant(format!(
                "tensor '{}' has {} bytes, not a multiple of the {}-byte width of {}",
                self.name, self.byte_size, width, self.element_type
            )));
        }
        Ok(self.byte_size / width)
    }

    /// Shape as `usize` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`TfliteError::InvariantViolation`] for negative (unresolved)
    /// dimensions.
    pub fn dims(&self) -> Result<Vec<usize>> {
        self.shape
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| {
                    TfliteError::invariant(format!(
                        "tensor '{}' has unresolved dimension {} in shape [{}]",
                        self.name,
                        d,
                        self.shape_string()
                    ))
                })
            })
            .collect()
    }
}
