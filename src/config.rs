//! Access modes and creation settings

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{Result, VsrError};
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// How a container (and everything opened from it) may be used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Reads only; every mutating call fails with `PermissionDenied`
    #[default]
    ReadOnly,
    /// Reads plus create-only writes
    Write,
}

impl AccessMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::Write)
    }

    /// Fail with `PermissionDenied` unless writes are allowed
    pub fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(VsrError::PermissionDenied(format!(
                "'{}' requires write access, the container is opened read-only",
                operation
            )))
        }
    }
}

/// Container-level settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VsrConfig {
    /// Access mode of the container handle
    #[serde(default)]
    pub mode: AccessMode,

    /// Target number of chunks decoded concurrently by one read or write
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
}

fn default_chunk_concurrency() -> usize {
    16
}

impl VsrConfig {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn writable() -> Self {
        Self::default().with_mode(AccessMode::Write)
    }

    /// Set the access mode
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the chunk read concurrency
    pub fn with_chunk_concurrency(mut self, chunk_concurrency: usize) -> Self {
        self.chunk_concurrency = chunk_concurrency.max(1);
        self
    }
}

impl Default for VsrConfig {
    fn default() -> Self {
        Self {
            mode: AccessMode::ReadOnly,
            chunk_concurrency: default_chunk_concurrency(),
        }
    }
}

/// Settings for creating one resolution level of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayConfig {
    pub data_type: DataType,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    /// Shards grouping several chunks into one stored object
    pub shard_shape: Option<Vec<u64>>,
    pub compression: CompressionMethod,
    pub compression_level: CompressionLevel,
    pub fill_value: serde_json::Value,
    pub dimension_names: Option<Vec<String>>,
    /// Replace an existing array instead of failing with `AlreadyExists`
    pub overwrite: bool,
}

impl ArrayConfig {
    /// Create a new array configuration with blosc/zstd level 5 chunks
    pub fn new(data_type: DataType, shape: Vec<u64>, chunk_shape: Vec<u64>) -> Self {
        let fill_value = match data_type {
            DataType::Float32 | DataType::Float64 => serde_json::json!(0.0),
            _ => serde_json::json!(0),
        };
        Self {
            data_type,
            shape,
            chunk_shape,
            shard_shape: None,
            compression: CompressionMethod::default(),
            compression_level: CompressionLevel::default(),
            fill_value,
            dimension_names: None,
            overwrite: false,
        }
    }

    /// Group chunks into shards of `shard_shape`, a multiple of the chunk shape
    pub fn with_shard_shape(mut self, shard_shape: Vec<u64>) -> Self {
        self.shard_shape = Some(shard_shape);
        self
    }

    /// Set the compression method and level
    pub fn with_compression(mut self, method: CompressionMethod, level: CompressionLevel) -> Self {
        self.compression = method;
        self.compression_level = level;
        self
    }

    /// Set the fill value used for chunks that were never written
    pub fn with_fill_value(mut self, fill_value: serde_json::Value) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Set the dimension names
    pub fn with_dimension_names<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.dimension_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Allow replacing an existing array
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.shape.is_empty() {
            return Err(VsrError::InvalidDimensions(
                "Arrays must have at least one dimension".to_string(),
            ));
        }
        check_grid("Chunk", &self.chunk_shape, self.shape.len())?;
        if let Some(shard_shape) = &self.shard_shape {
            check_grid("Shard", shard_shape, self.shape.len())?;
            if shard_shape
                .iter()
                .zip(&self.chunk_shape)
                .any(|(shard, chunk)| shard % chunk != 0)
            {
                return Err(VsrError::InvalidDimensions(format!(
                    "Shard shape {:?} is not a multiple of chunk shape {:?}",
                    shard_shape, self.chunk_shape
                )));
            }
        }
        self.data_type.encode_fill_value(&self.fill_value)?;
        if let Some(names) = &self.dimension_names {
            if names.len() != self.shape.len() {
                return Err(VsrError::InvalidDimensions(format!(
                    "Expected {} dimension names, got {}",
                    self.shape.len(),
                    names.len()
                )));
            }
        }
        Ok(())
    }
}

fn check_grid(what: &str, grid: &[u64], ndim: usize) -> Result<()> {
    if grid.len() != ndim {
        return Err(VsrError::InvalidDimensions(format!(
            "{} shape rank {} does not match array rank {}",
            what,
            grid.len(),
            ndim
        )));
    }
    if grid.iter().any(|&n| n == 0) {
        return Err(VsrError::InvalidDimensions(format!(
            "{} shape {:?} has an empty dimension",
            what, grid
        )));
    }
    Ok(())
}
