//! Core data types for VSR arrays

use crate::error::{Result, VsrError};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Element data types supported by the array store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit integer
    Uint8,
    /// Unsigned 16-bit integer
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// Unsigned 64-bit integer
    Uint64,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Name used in Zarr v3 array metadata
    pub fn zarr_name(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Parse a Zarr v3 data type name
    pub fn from_zarr_name(name: &str) -> Result<Self> {
        match name {
            "uint8" => Ok(DataType::Uint8),
            "uint16" => Ok(DataType::Uint16),
            "uint32" => Ok(DataType::Uint32),
            "uint64" => Ok(DataType::Uint64),
            "int8" => Ok(DataType::Int8),
            "int16" => Ok(DataType::Int16),
            "int32" => Ok(DataType::Int32),
            "int64" => Ok(DataType::Int64),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(VsrError::InvalidDataType(other.to_string())),
        }
    }

    /// Little-endian encoding of a JSON fill value in this data type
    pub fn encode_fill_value(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        let invalid = || {
            VsrError::Metadata(format!(
                "Fill value {} is not representable as {}",
                value, self
            ))
        };
        let bytes = match self {
            DataType::Float32 | DataType::Float64 => {
                let v = match value {
                    serde_json::Value::String(s) if s == "NaN" => f64::NAN,
                    serde_json::Value::String(s) if s == "Infinity" => f64::INFINITY,
                    serde_json::Value::String(s) if s == "-Infinity" => f64::NEG_INFINITY,
                    _ => value.as_f64().ok_or_else(invalid)?,
                };
                if *self == DataType::Float32 {
                    (v as f32).to_le_bytes().to_vec()
                } else {
                    v.to_le_bytes().to_vec()
                }
            }
            DataType::Uint8 | DataType::Uint16 | DataType::Uint32 | DataType::Uint64 => {
                let v = value.as_u64().ok_or_else(invalid)?;
                v.to_le_bytes()[..self.size_in_bytes()].to_vec()
            }
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                let v = value.as_i64().ok_or_else(invalid)?;
                v.to_le_bytes()[..self.size_in_bytes()].to_vec()
            }
        };
        Ok(bytes)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.zarr_name())
    }
}

/// Rust element types that can be stored in an array
pub trait Element:
    zarrs::array::ElementOwned + Copy + Zero + ToPrimitive + Send + Sync + 'static
{
    /// Matching array data type
    const DATA_TYPE: DataType;

    /// Decode one element from exactly `size_of::<Self>()` little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this element
    fn extend_le(&self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DATA_TYPE: DataType = DataType::$dt;

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }

                fn extend_le(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

/// Decode little-endian bytes into typed elements
pub fn decode_elements<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::DATA_TYPE.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(VsrError::InvalidDimensions(
            "Byte length not aligned with data type size".to_string(),
        ));
    }
    Ok(bytes.chunks_exact(size).map(T::from_le_slice).collect())
}

/// Encode typed elements as little-endian bytes
pub fn encode_elements<'a, T: Element>(data: impl IntoIterator<Item = &'a T>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for value in data {
        value.extend_le(&mut bytes);
    }
    bytes
}

/// Named stack/channel dimension of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Stack,
    Channel,
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Stack => f.write_str("stack"),
            LabelKind::Channel => f.write_str("channel"),
        }
    }
}

/// Semantic axis of an image array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Stack,
    Channel,
    Z,
    Y,
    X,
}

/// Axis semantics implied by the dimensionality of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisConvention {
    /// (z, y, x)
    Zyx,
    /// (channel, z, y, x)
    Czyx,
    /// (stack, channel, z, y, x)
    Sczyx,
}

impl AxisConvention {
    /// Convention for an array with `ndim` axes
    pub fn for_ndim(ndim: usize) -> Result<Self> {
        match ndim {
            3 => Ok(AxisConvention::Zyx),
            4 => Ok(AxisConvention::Czyx),
            5 => Ok(AxisConvention::Sczyx),
            _ => Err(VsrError::InvalidDimensions(format!(
                "Image arrays must have 3, 4 or 5 axes, got {}",
                ndim
            ))),
        }
    }

    /// Ordered axes of this convention
    pub fn axes(&self) -> &'static [Axis] {
        match self {
            AxisConvention::Zyx => &[Axis::Z, Axis::Y, Axis::X],
            AxisConvention::Czyx => &[Axis::Channel, Axis::Z, Axis::Y, Axis::X],
            AxisConvention::Sczyx => &[Axis::Stack, Axis::Channel, Axis::Z, Axis::Y, Axis::X],
        }
    }

    pub fn ndim(&self) -> usize {
        self.axes().len()
    }

    /// Position of the axis holding `kind`, if the convention has one
    pub fn label_axis(&self, kind: LabelKind) -> Option<usize> {
        let wanted = match kind {
            LabelKind::Stack => Axis::Stack,
            LabelKind::Channel => Axis::Channel,
        };
        self.axes().iter().position(|axis| *axis == wanted)
    }
}

/// Per-axis range of a region of interest
///
/// A point is the one-element range `Index(i)`; it never drops the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRange {
    /// The whole axis
    Full,
    /// Half-open range `start..end`, clamped to the axis length like a slice
    Range { start: u64, end: u64 },
    /// Single element, kept as a size-1 axis
    Index(u64),
}

impl AxisRange {
    /// Narrow `base` by this range, interpreting offsets relative to `base.start`
    pub fn refine(&self, base: &Range<u64>) -> Result<Range<u64>> {
        let len = base.end - base.start;
        match *self {
            AxisRange::Full => Ok(base.clone()),
            AxisRange::Range { start, end } => {
                if start > end {
                    return Err(VsrError::InvalidDimensions(format!(
                        "Range start {} is after end {}",
                        start, end
                    )));
                }
                let start = start.min(len);
                let end = end.min(len);
                Ok(base.start + start..base.start + end)
            }
            AxisRange::Index(index) => {
                if index >= len {
                    return Err(VsrError::OutOfBounds(format!(
                        "Index {} is out of bounds for axis of length {}",
                        index, len
                    )));
                }
                Ok(base.start + index..base.start + index + 1)
            }
        }
    }
}

impl From<Range<u64>> for AxisRange {
    fn from(range: Range<u64>) -> Self {
        AxisRange::Range {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<u64> for AxisRange {
    fn from(index: u64) -> Self {
        AxisRange::Index(index)
    }
}
