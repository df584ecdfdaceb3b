//! Chunked array store - one resolution level of one image
//!
//! Arrays are Zarr v3 arrays read and written through `zarrs`. The
//! `zarr.json` document is written here so that new arrays match the layout
//! produced by the acquisition pipeline (blosc/zstd chunks grouped into
//! shards); `zarrs` then handles every codec it supports, including arrays
//! written by other Zarr implementations.

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::config::{AccessMode, ArrayConfig};
use crate::error::{Result, VsrError};
use crate::io::{join_path, IOManager};
use crate::subset::ArraySubset;
use crate::types::{decode_elements, encode_elements, DataType, Element};
use crate::utils::format_bytes;
use bytes::Bytes;
use ndarray::{ArrayD, IxDyn};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task;
use tracing::debug;
use zarrs::array::codec::CodecOptions;
use zarrs::array::Array;
use zarrs::storage::ReadableWritableListableStorageTraits;

/// Name of the metadata document of every Zarr v3 node
pub const ZARR_JSON: &str = "zarr.json";

const SHARDING_CODEC: &str = "sharding_indexed";

type StoredArray = Array<dyn ReadableWritableListableStorageTraits>;

/// `{name, configuration}` pair used throughout Zarr v3 metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

impl NamedConfiguration {
    pub fn new(name: impl Into<String>, configuration: Value) -> Self {
        Self {
            name: name.into(),
            configuration: Some(configuration),
        }
    }

    /// Entry without a configuration object, such as `crc32c`
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.configuration.as_ref().and_then(|c| c.get(key))
    }
}

fn bytes_codec() -> NamedConfiguration {
    NamedConfiguration::new("bytes", json!({ "endian": "little" }))
}

/// Zarr v3 array node document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub node_type: String,
    pub shape: Vec<u64>,
    pub data_type: Value,
    pub chunk_grid: NamedConfiguration,
    pub chunk_key_encoding: NamedConfiguration,
    pub fill_value: Value,
    pub codecs: Vec<NamedConfiguration>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_names: Option<Vec<Option<String>>>,
}

impl ArrayMetadata {
    /// Metadata document for a new array
    ///
    /// With a shard shape the regular grid is laid over shards and each shard
    /// holds `chunk_shape` inner chunks plus a checksummed index at its end.
    pub fn from_config(config: &ArrayConfig) -> Self {
        let element_size = config.data_type.size_in_bytes();
        let mut chunk_codecs = vec![bytes_codec()];
        chunk_codecs.extend(
            config
                .compression
                .codec(config.compression_level, element_size),
        );

        let (grid_shape, codecs) = match &config.shard_shape {
            None => (config.chunk_shape.clone(), chunk_codecs),
            Some(shard_shape) => (
                shard_shape.clone(),
                vec![NamedConfiguration::new(
                    SHARDING_CODEC,
                    json!({
                        "chunk_shape": config.chunk_shape,
                        "codecs": chunk_codecs,
                        "index_codecs": [bytes_codec(), NamedConfiguration::bare("crc32c")],
                        "index_location": "end",
                    }),
                )],
            ),
        };

        Self {
            zarr_format: 3,
            node_type: "array".to_string(),
            shape: config.shape.clone(),
            data_type: Value::String(config.data_type.zarr_name().to_string()),
            chunk_grid: NamedConfiguration::new("regular", json!({ "chunk_shape": grid_shape })),
            chunk_key_encoding: NamedConfiguration::new("default", json!({ "separator": "/" })),
            fill_value: config.fill_value.clone(),
            codecs,
            attributes: Map::new(),
            dimension_names: config
                .dimension_names
                .as_ref()
                .map(|names| names.iter().cloned().map(Some).collect()),
        }
    }

    /// Element type, for the numeric types this crate reads
    pub fn element_type(&self) -> Result<DataType> {
        match &self.data_type {
            Value::String(name) => DataType::from_zarr_name(name),
            other => Err(VsrError::InvalidDataType(other.to_string())),
        }
    }

    fn grid_shape(&self) -> Result<Vec<u64>> {
        self.chunk_grid
            .get("chunk_shape")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| {
                VsrError::Metadata(format!("Chunk grid '{}' without chunk_shape", self.chunk_grid.name))
            })
    }

    fn sharding(&self) -> Option<&NamedConfiguration> {
        self.codecs.iter().find(|codec| codec.name == SHARDING_CODEC)
    }

    /// Shape of one stored chunk (the inner chunk of a sharded array)
    pub fn chunk_shape(&self) -> Result<Vec<u64>> {
        match self.sharding().and_then(|codec| codec.get("chunk_shape")) {
            Some(inner) => Ok(serde_json::from_value(inner.clone())?),
            None => self.grid_shape(),
        }
    }

    /// Shape of one shard, `None` for arrays without sharding
    pub fn shard_shape(&self) -> Result<Option<Vec<u64>>> {
        match self.sharding() {
            Some(_) => self.grid_shape().map(Some),
            None => Ok(None),
        }
    }
}

/// Node path of a storage path, as `zarrs` addresses arrays
fn node_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Handle on one stored array
#[derive(Clone)]
pub struct ArrayHandle {
    path: String,
    metadata: ArrayMetadata,
    data_type: DataType,
    chunk_shape: Vec<u64>,
    shard_shape: Option<Vec<u64>>,
    array: Arc<StoredArray>,
    mode: AccessMode,
    concurrency: usize,
}

impl std::fmt::Debug for ArrayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("path", &self.path)
            .field("shape", &self.metadata.shape)
            .field("data_type", &self.data_type)
            .field("chunk_shape", &self.chunk_shape)
            .field("shard_shape", &self.shard_shape)
            .field("mode", &self.mode)
            .finish()
    }
}

impl ArrayHandle {
    /// Open an existing array stored under `path`
    pub async fn open(io: Arc<dyn IOManager>, path: &str, mode: AccessMode) -> Result<Self> {
        let meta_path = join_path(path, ZARR_JSON);
        let bytes = io.read(&meta_path).await.map_err(|e| match e {
            VsrError::NotFound(_) => VsrError::NotFound(format!("Array metadata {}", meta_path)),
            other => other,
        })?;
        let metadata: ArrayMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| VsrError::Metadata(format!("Failed to parse {}: {}", meta_path, e)))?;
        if metadata.node_type != "array" {
            return Err(VsrError::Metadata(format!(
                "{} describes a '{}' node, not an array",
                meta_path, metadata.node_type
            )));
        }
        Self::from_metadata(io.as_ref(), path, metadata, mode).await
    }

    /// Create a new array under `path`
    ///
    /// Fails with `AlreadyExists` when an array is already stored there, unless
    /// the configuration explicitly allows overwriting.
    pub async fn create(io: Arc<dyn IOManager>, path: &str, config: &ArrayConfig) -> Result<Self> {
        config.validate()?;
        let meta_path = join_path(path, ZARR_JSON);

        if io.exists(&meta_path).await? {
            if !config.overwrite {
                return Err(VsrError::AlreadyExists(format!("Array {}", path)));
            }
            debug!(path, "overwriting existing array");
            io.delete_dir(path).await?;
        }

        let metadata = ArrayMetadata::from_config(config);
        let json = serde_json::to_vec_pretty(&metadata)?;
        io.write_new(&meta_path, &json).await.map_err(|e| match e {
            VsrError::AlreadyExists(_) => VsrError::AlreadyExists(format!("Array {}", path)),
            other => other,
        })?;

        let handle = Self::from_metadata(io.as_ref(), path, metadata, AccessMode::Write).await?;
        let nbytes = handle.shape().iter().product::<u64>() as usize * handle.data_type.size_in_bytes();
        debug!(
            path,
            shape = ?handle.shape(),
            size = %format_bytes(nbytes),
            chunk_shape = ?handle.chunk_shape,
            shard_shape = ?handle.shard_shape,
            "created array"
        );
        Ok(handle)
    }

    async fn from_metadata(
        io: &dyn IOManager,
        path: &str,
        metadata: ArrayMetadata,
        mode: AccessMode,
    ) -> Result<Self> {
        let data_type = metadata.element_type()?;
        let chunk_shape = metadata.chunk_shape()?;
        let shard_shape = metadata.shard_shape()?;

        let store = io.zarr_store()?;
        let node = node_path(path);
        let array = task::spawn_blocking(move || Array::open(store, &node)).await??;

        Ok(Self {
            path: path.to_string(),
            metadata,
            data_type,
            chunk_shape,
            shard_shape,
            array: Arc::new(array),
            mode,
            concurrency: 16,
        })
    }

    /// Limit the number of chunks decoded concurrently
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    pub fn ndim(&self) -> usize {
        self.metadata.shape.len()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    pub fn shard_shape(&self) -> Option<&[u64]> {
        self.shard_shape.as_deref()
    }

    /// Compressor and level of the stored chunks, `None` for compressors
    /// this crate does not write
    pub fn compression(&self) -> Option<(CompressionMethod, CompressionLevel)> {
        CompressionMethod::detect(&self.metadata.codecs)
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    fn codec_options(&self) -> CodecOptions {
        let mut options = CodecOptions::default();
        options.set_concurrent_target(self.concurrency);
        options
    }

    fn check_subset(&self, subset: &ArraySubset) -> Result<()> {
        if subset.ndim() != self.ndim() {
            return Err(VsrError::InvalidDimensions(format!(
                "Subset has {} dimensions, array has {}",
                subset.ndim(),
                self.ndim()
            )));
        }
        if subset.end().iter().zip(self.shape()).any(|(end, len)| end > len) {
            return Err(VsrError::OutOfBounds(format!(
                "Subset {:?} exceeds array shape {:?}",
                subset.ranges(),
                self.shape()
            )));
        }
        Ok(())
    }

    fn check_element<T: Element>(&self) -> Result<()> {
        if T::DATA_TYPE != self.data_type {
            return Err(VsrError::InvalidDataType(format!(
                "Cannot access a {} array as {} elements",
                self.data_type,
                T::DATA_TYPE
            )));
        }
        Ok(())
    }

    async fn retrieve<T: Element>(&self, subset: &ArraySubset) -> Result<Vec<T>> {
        let array = self.array.clone();
        let region = subset.to_zarrs();
        let options = self.codec_options();
        let elements = task::spawn_blocking(move || {
            array.retrieve_array_subset_elements_opt::<T>(&region, &options)
        })
        .await??;
        Ok(elements)
    }

    async fn store<T: Element>(&self, subset: &ArraySubset, elements: Vec<T>) -> Result<()> {
        let array = self.array.clone();
        let region = subset.to_zarrs();
        let options = self.codec_options();
        task::spawn_blocking(move || {
            array.store_array_subset_elements_opt::<T>(&region, &elements, &options)
        })
        .await??;
        Ok(())
    }

    async fn read_as<T: Element>(&self, subset: &ArraySubset) -> Result<Bytes> {
        let elements = self.retrieve::<T>(subset).await?;
        Ok(Bytes::from(encode_elements(&elements)))
    }

    async fn write_as<T: Element>(&self, subset: &ArraySubset, data: &[u8]) -> Result<()> {
        self.store(subset, decode_elements::<T>(data)?).await
    }

    /// Read a region of the array into memory
    pub async fn read(&self, subset: &ArraySubset) -> Result<SubArray> {
        self.check_subset(subset)?;
        let data = match self.data_type {
            DataType::Uint8 => self.read_as::<u8>(subset).await?,
            DataType::Uint16 => self.read_as::<u16>(subset).await?,
            DataType::Uint32 => self.read_as::<u32>(subset).await?,
            DataType::Uint64 => self.read_as::<u64>(subset).await?,
            DataType::Int8 => self.read_as::<i8>(subset).await?,
            DataType::Int16 => self.read_as::<i16>(subset).await?,
            DataType::Int32 => self.read_as::<i32>(subset).await?,
            DataType::Int64 => self.read_as::<i64>(subset).await?,
            DataType::Float32 => self.read_as::<f32>(subset).await?,
            DataType::Float64 => self.read_as::<f64>(subset).await?,
        };

        Ok(SubArray {
            shape: subset.shape().to_vec(),
            data_type: self.data_type,
            data,
        })
    }

    /// Read the whole array
    pub async fn read_all(&self) -> Result<SubArray> {
        self.read(&ArraySubset::full(self.shape())).await
    }

    /// Read a region as an `ndarray` array
    pub async fn read_ndarray<T: Element>(&self, subset: &ArraySubset) -> Result<ArrayD<T>> {
        self.check_subset(subset)?;
        self.check_element::<T>()?;
        let elements = self.retrieve::<T>(subset).await?;
        let shape: Vec<usize> = subset.shape().iter().map(|&n| n as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), elements)
            .map_err(|e| VsrError::InvalidDimensions(e.to_string()))
    }

    /// Write little-endian element bytes into a region of the array
    pub async fn write(&self, subset: &ArraySubset, data: &[u8]) -> Result<()> {
        self.mode.ensure_writable("write array")?;
        self.check_subset(subset)?;

        let expected = subset.num_elements() as usize * self.data_type.size_in_bytes();
        if data.len() != expected {
            return Err(VsrError::InvalidDimensions(format!(
                "Data size mismatch: expected {} bytes, got {}",
                expected,
                data.len()
            )));
        }

        match self.data_type {
            DataType::Uint8 => self.write_as::<u8>(subset, data).await,
            DataType::Uint16 => self.write_as::<u16>(subset, data).await,
            DataType::Uint32 => self.write_as::<u32>(subset, data).await,
            DataType::Uint64 => self.write_as::<u64>(subset, data).await,
            DataType::Int8 => self.write_as::<i8>(subset, data).await,
            DataType::Int16 => self.write_as::<i16>(subset, data).await,
            DataType::Int32 => self.write_as::<i32>(subset, data).await,
            DataType::Int64 => self.write_as::<i64>(subset, data).await,
            DataType::Float32 => self.write_as::<f32>(subset, data).await,
            DataType::Float64 => self.write_as::<f64>(subset, data).await,
        }
    }

    /// Write an `ndarray` array with its origin at `start`
    pub async fn write_ndarray<T: Element>(&self, start: &[u64], array: &ArrayD<T>) -> Result<()> {
        self.mode.ensure_writable("write array")?;
        self.check_element::<T>()?;
        let shape: Vec<u64> = array.shape().iter().map(|&n| n as u64).collect();
        let subset = ArraySubset::new(start.to_vec(), shape)?;
        self.check_subset(&subset)?;
        self.store(&subset, array.iter().copied().collect()).await
    }
}

/// A region of an array materialized in memory (C order, little endian)
#[derive(Debug, Clone, PartialEq)]
pub struct SubArray {
    shape: Vec<u64>,
    data_type: DataType,
    data: Bytes,
}

impl SubArray {
    pub fn new(shape: Vec<u64>, data_type: DataType, data: Bytes) -> Result<Self> {
        let expected = shape.iter().product::<u64>() as usize * data_type.size_in_bytes();
        if data.len() != expected {
            return Err(VsrError::InvalidDimensions(format!(
                "Data size mismatch: expected {} bytes, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data_type,
            data,
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Elements in C order
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return Err(VsrError::InvalidDataType(format!(
                "Requested {} elements from a {} array",
                T::DATA_TYPE,
                self.data_type
            )));
        }
        decode_elements(&self.data)
    }

    /// Convert into an `ndarray` array of the same shape
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        let shape: Vec<usize> = self.shape.iter().map(|&n| n as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), self.to_vec()?)
            .map_err(|e| VsrError::InvalidDimensions(e.to_string()))
    }

    /// Sum of all elements as `f64`
    pub fn sum(&self) -> f64 {
        fn sum_as<T: Element>(bytes: &[u8]) -> f64 {
            let size = T::DATA_TYPE.size_in_bytes();
            bytes
                .chunks_exact(size)
                .map(|b| T::from_le_slice(b).to_f64().unwrap_or(0.0))
                .sum()
        }
        match self.data_type {
            DataType::Uint8 => sum_as::<u8>(&self.data),
            DataType::Uint16 => sum_as::<u16>(&self.data),
            DataType::Uint32 => sum_as::<u32>(&self.data),
            DataType::Uint64 => sum_as::<u64>(&self.data),
            DataType::Int8 => sum_as::<i8>(&self.data),
            DataType::Int16 => sum_as::<i16>(&self.data),
            DataType::Int32 => sum_as::<i32>(&self.data),
            DataType::Int64 => sum_as::<i64>(&self.data),
            DataType::Float32 => sum_as::<f32>(&self.data),
            DataType::Float64 => sum_as::<f64>(&self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_json, MemoryIOManager};
    use ndarray::Array as NdArray;

    fn io() -> Arc<dyn IOManager> {
        Arc::new(MemoryIOManager::new())
    }

    fn config() -> ArrayConfig {
        ArrayConfig::new(DataType::Uint16, vec![2, 2, 4, 4, 4], vec![1, 1, 2, 2, 2])
    }

    fn ramp() -> ArrayD<u16> {
        NdArray::from_iter(0..256u16)
            .into_shape_with_order(IxDyn(&[2, 2, 4, 4, 4]))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_reopen() {
        let io = io();
        let array = ArrayHandle::create(io.clone(), "img.zarr/0", &config())
            .await
            .unwrap();
        assert_eq!(array.shape(), &[2, 2, 4, 4, 4]);
        assert_eq!(
            array.compression(),
            Some((CompressionMethod::Blosc, CompressionLevel::new(5)))
        );

        let reopened = ArrayHandle::open(io.clone(), "img.zarr/0", AccessMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(reopened.chunk_shape(), &[1, 1, 2, 2, 2]);
        assert_eq!(reopened.shard_shape(), None);
        assert_eq!(reopened.data_type(), DataType::Uint16);

        let doc: Value = read_json(io.as_ref(), "img.zarr/0/zarr.json").await.unwrap();
        assert_eq!(doc["data_type"], "uint16");
        assert_eq!(doc["codecs"][0]["name"], "bytes");
        assert_eq!(doc["codecs"][1]["name"], "blosc");
        assert_eq!(doc["codecs"][1]["configuration"]["cname"], "zstd");
        assert_eq!(doc["chunk_grid"]["configuration"]["chunk_shape"], json!([1, 1, 2, 2, 2]));
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let io = io();
        let config = config().with_shard_shape(vec![1, 1, 4, 4, 4]);
        let array = ArrayHandle::create(io.clone(), "img.zarr/0", &config)
            .await
            .unwrap();
        assert_eq!(array.chunk_shape(), &[1, 1, 2, 2, 2]);
        assert_eq!(array.shard_shape(), Some(&[1u64, 1, 4, 4, 4][..]));

        let data = ramp();
        array.write_ndarray(&[0; 5], &data).await.unwrap();

        // One object per shard, not per inner chunk
        assert_eq!(io.list("img.zarr/0/c/1/1/0/0").await.unwrap(), vec!["0"]);
        let doc: Value = read_json(io.as_ref(), "img.zarr/0/zarr.json").await.unwrap();
        assert_eq!(doc["chunk_grid"]["configuration"]["chunk_shape"], json!([1, 1, 4, 4, 4]));
        assert_eq!(doc["codecs"][0]["name"], "sharding_indexed");
        assert_eq!(doc["codecs"][0]["configuration"]["index_codecs"][1]["name"], "crc32c");

        let reopened = ArrayHandle::open(io, "img.zarr/0", AccessMode::ReadOnly)
            .await
            .unwrap();
        let region: ArrayD<u16> = reopened
            .read_ndarray(&ArraySubset::from_ranges(&[1..2, 0..2, 1..3, 1..4, 0..1]))
            .await
            .unwrap();
        assert_eq!(region.shape(), &[1, 2, 2, 3, 1]);
        assert_eq!(region[[0, 1, 1, 2, 0]], data[[1, 1, 2, 3, 0]]);
    }

    #[tokio::test]
    async fn test_create_is_create_only() {
        let io = io();
        ArrayHandle::create(io.clone(), "a/0", &config()).await.unwrap();
        let err = ArrayHandle::create(io.clone(), "a/0", &config())
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::AlreadyExists(_)));

        // Explicit overwrite replaces metadata and drops old chunks
        let array = ArrayHandle::create(io.clone(), "a/0", &config().with_overwrite(true))
            .await
            .unwrap();
        assert_eq!(array.read_all().await.unwrap().sum(), 0.0);
    }

    #[tokio::test]
    async fn test_open_missing() {
        let err = ArrayHandle::open(io(), "nope.zarr/0", AccessMode::ReadOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let array = ArrayHandle::create(io(), "img.zarr/0", &config())
            .await
            .unwrap();
        let data = ramp();
        array.write_ndarray(&[0, 0, 0, 0, 0], &data).await.unwrap();

        let all: ArrayD<u16> = array
            .read_ndarray(&ArraySubset::full(array.shape()))
            .await
            .unwrap();
        assert_eq!(all, data);

        // Region spanning several chunks
        let subset = ArraySubset::from_ranges(&[1..2, 0..2, 1..3, 1..4, 0..1]);
        let region = array.read(&subset).await.unwrap();
        assert_eq!(region.shape(), &[1, 2, 2, 3, 1]);
        assert_eq!(region.to_ndarray::<u16>().unwrap()[[0, 1, 1, 2, 0]], data[[1, 1, 2, 3, 0]]);
    }

    #[tokio::test]
    async fn test_partial_write_keeps_fill() {
        let array = ArrayHandle::create(io(), "img.zarr/1", &config().with_fill_value(json!(7)))
            .await
            .unwrap();
        let block = ArrayD::<u16>::from_elem(IxDyn(&[1, 2, 4, 4, 4]), 1);
        array.write_ndarray(&[0, 0, 0, 0, 0], &block).await.unwrap();

        let untouched = array
            .read(&ArraySubset::from_ranges(&[1..2, 0..2, 0..4, 0..4, 0..4]))
            .await
            .unwrap();
        assert_eq!(untouched.shape(), &[1, 2, 4, 4, 4]);
        assert!(untouched.to_vec::<u16>().unwrap().iter().all(|&v| v == 7));

        // Overlapping partial write merges with the stored chunk
        let small = ArrayD::<u16>::from_elem(IxDyn(&[1, 1, 1, 1, 1]), 9);
        array.write_ndarray(&[0, 0, 1, 1, 1], &small).await.unwrap();
        let chunk = array
            .read(&ArraySubset::from_ranges(&[0..1, 0..1, 0..2, 0..2, 0..2]))
            .await
            .unwrap()
            .to_vec::<u16>()
            .unwrap();
        assert_eq!(chunk, vec![1, 1, 1, 1, 1, 1, 1, 9]);
    }

    #[tokio::test]
    async fn test_read_only_handle_rejects_writes() {
        let io = io();
        ArrayHandle::create(io.clone(), "img.zarr/0", &config())
            .await
            .unwrap();
        let array = ArrayHandle::open(io, "img.zarr/0", AccessMode::ReadOnly)
            .await
            .unwrap();
        let err = array.write_ndarray(&[0, 0, 0, 0, 0], &ramp()).await.unwrap_err();
        assert!(matches!(err, VsrError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_bounds_and_types_checked() {
        let array = ArrayHandle::create(io(), "img.zarr/0", &config())
            .await
            .unwrap();
        let err = array
            .read(&ArraySubset::from_ranges(&[0..3, 0..1, 0..1, 0..1, 0..1]))
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::OutOfBounds(_)));

        let err = array
            .read(&ArraySubset::from_ranges(&[0..1, 0..1, 0..1]))
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::InvalidDimensions(_)));

        let floats = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 1, 1, 1]));
        let err = array.write_ndarray(&[0, 0, 0, 0, 0], &floats).await.unwrap_err();
        assert!(matches!(err, VsrError::InvalidDataType(_)));

        let err = array
            .write(&ArraySubset::full(array.shape()), &[0u8; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::InvalidDimensions(_)));
    }

    #[tokio::test]
    async fn test_other_compressors() {
        for method in [CompressionMethod::Gzip, CompressionMethod::Zstd, CompressionMethod::None] {
            let cfg = ArrayConfig::new(DataType::Float32, vec![3, 5], vec![2, 2])
                .with_compression(method, CompressionLevel::fast());
            let array = ArrayHandle::create(io(), "f.zarr/0", &cfg).await.unwrap();
            let level = match method {
                CompressionMethod::None => CompressionLevel::default(),
                _ => CompressionLevel::fast(),
            };
            assert_eq!(array.compression(), Some((method, level)));

            let data = NdArray::from_iter((0..15).map(|v| v as f32 * 0.5))
                .into_shape_with_order(IxDyn(&[3, 5]))
                .unwrap();
            array.write_ndarray(&[0, 0], &data).await.unwrap();
            let back: ArrayD<f32> = array
                .read_ndarray(&ArraySubset::full(&[3, 5]))
                .await
                .unwrap();
            assert_eq!(back, data);
            assert_eq!(array.read_all().await.unwrap().sum(), 52.5);
        }
    }

    #[tokio::test]
    async fn test_unknown_codec_rejected_on_open() {
        let io = io();
        let mut metadata = ArrayMetadata::from_config(&config());
        metadata.codecs.push(NamedConfiguration::new("no_such_codec", json!({})));
        io.write("odd.zarr/0/zarr.json", &serde_json::to_vec(&metadata).unwrap())
            .await
            .unwrap();
        let err = ArrayHandle::open(io.clone(), "odd.zarr/0", AccessMode::ReadOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::ArrayCreate(_)));

        io.write("grp.zarr/zarr.json", br#"{"zarr_format": 3, "node_type": "group"}"#)
            .await
            .unwrap();
        assert!(ArrayHandle::open(io, "grp.zarr", AccessMode::ReadOnly).await.is_err());
    }

    #[test]
    fn test_metadata_shapes() {
        let plain = ArrayMetadata::from_config(&config());
        assert_eq!(plain.chunk_shape().unwrap(), vec![1, 1, 2, 2, 2]);
        assert_eq!(plain.shard_shape().unwrap(), None);
        assert_eq!(plain.element_type().unwrap(), DataType::Uint16);

        let sharded = ArrayMetadata::from_config(&config().with_shard_shape(vec![1, 1, 4, 4, 4]));
        assert_eq!(sharded.chunk_shape().unwrap(), vec![1, 1, 2, 2, 2]);
        assert_eq!(sharded.shard_shape().unwrap(), Some(vec![1, 1, 4, 4, 4]));
        assert_eq!(node_path("a.zarr/0/"), "/a.zarr/0");
    }

    #[test]
    fn test_sub_array_accessors() {
        let sub = SubArray::new(vec![2, 2], DataType::Uint8, Bytes::from(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(sub.sum(), 10.0);
        assert_eq!(sub.nbytes(), 4);
        assert!(sub.to_vec::<u16>().is_err());
        assert!(SubArray::new(vec![3], DataType::Uint8, Bytes::from(vec![1])).is_err());
    }
}
