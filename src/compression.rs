//! Chunk compression settings
//!
//! Chunks are serialized by the Zarr `bytes` codec (little endian) and then
//! passed through at most one compressor. The default is blosc with an inner
//! zstd compressor at level 5, matching what the acquisition pipeline writes.
//! Levels are clamped to 0..=9 so that one `CompressionLevel` fits every
//! codec.

use crate::array::NamedConfiguration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Compressor applied to serialized chunk bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    None,
    Gzip,
    Zstd,
    /// Blosc with zstd as its inner compressor and byte shuffling
    #[default]
    Blosc,
}

impl CompressionMethod {
    /// Zarr v3 codec name, `None` for uncompressed chunks
    pub fn codec_name(&self) -> Option<&'static str> {
        match self {
            CompressionMethod::None => None,
            CompressionMethod::Gzip => Some("gzip"),
            CompressionMethod::Zstd => Some("zstd"),
            CompressionMethod::Blosc => Some("blosc"),
        }
    }

    /// Codec entry for this compressor, `None` when uncompressed
    ///
    /// `element_size` is the blosc type size used for shuffling.
    pub fn codec(&self, level: CompressionLevel, element_size: usize) -> Option<NamedConfiguration> {
        let level = level.value();
        let configuration = match self {
            CompressionMethod::None => return None,
            CompressionMethod::Gzip => json!({ "level": level }),
            CompressionMethod::Zstd => json!({ "level": level, "checksum": false }),
            CompressionMethod::Blosc => json!({
                "cname": "zstd",
                "clevel": level,
                "shuffle": if element_size > 1 { "shuffle" } else { "noshuffle" },
                "typesize": element_size,
                "blocksize": 0,
            }),
        };
        self.codec_name()
            .map(|name| NamedConfiguration::new(name, configuration))
    }

    /// Compressor and level of a codec chain
    ///
    /// A `sharding_indexed` entry is searched through its inner chain.
    /// Compressors this crate does not write itself (lz4 blosc, bz2, ...)
    /// yield `None`; `zarrs` still decodes them.
    pub fn detect(codecs: &[NamedConfiguration]) -> Option<(CompressionMethod, CompressionLevel)> {
        for codec in codecs {
            let level_of = |key: &str| {
                codec
                    .get(key)
                    .and_then(Value::as_u64)
                    .map(|l| CompressionLevel::new(l.min(9) as u8))
                    .unwrap_or_default()
            };
            match codec.name.as_str() {
                "sharding_indexed" => {
                    let inner: Vec<NamedConfiguration> = codec
                        .get("codecs")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    return Self::detect(&inner);
                }
                "gzip" => return Some((CompressionMethod::Gzip, level_of("level"))),
                "zstd" => return Some((CompressionMethod::Zstd, level_of("level"))),
                "blosc" if codec.get("cname").and_then(Value::as_str) == Some("zstd") => {
                    return Some((CompressionMethod::Blosc, level_of("clevel")));
                }
                "bytes" | "transpose" => continue,
                _ => return None,
            }
        }
        Some((CompressionMethod::None, CompressionLevel::default()))
    }
}

/// Compression effort, clamped to 0..=9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(5)
    }
}
