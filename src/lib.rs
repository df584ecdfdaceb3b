//! VISoR - VSR container format
//!
//! A pure Rust implementation of the VSR container for multi-channel,
//! multi-stack, multi-resolution volumetric microscopy, with the coordinate
//! space transform graph relating raw acquisitions to derived geometries.
//!
//! # Features
//!
//! - `.vsr` containers with dataset metadata and image collections
//! - Zarr v3 arrays per resolution level through `zarrs` (sharding, blosc,
//!   gzip, zstd)
//! - Stack/channel label resolution and rank-preserving sub-array selection
//! - Per-stack, per-channel affine transforms stored as ITK `.tfm` files,
//!   with inverse edges derived on load
//! - Local filesystem and in-memory backends behind the `IOManager` trait
//! - Async I/O throughout
//!
//! # Layout
//!
//! ```text
//! VISOR001.vsr/
//!   info.json
//!   visor_raw_images/selected.json
//!   visor_<type>_images/<name>.zarr/{zarr.json, 0/, 1/, ...}
//!   visor_recon_transforms/<version>/recon.json
//!   visor_recon_transforms/<version>/<slice>/transforms.json
//!   visor_recon_transforms/<version>/<slice>/<edge>/<stack>/<channel>/affine.tfm
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use visor::{Selection, Vsr};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let vsr = Vsr::open("/data/VISOR001.vsr").await?;
//! let image = vsr.image("raw", "slice_1_10x").await?;
//!
//! // One stack and channel of the full resolution level, shape (1, 1, z, y, x)
//! let selection = Selection::new().stack("stack_1").channel("488");
//! let data = image.read("0", &selection).await?;
//!
//! let graph = vsr.transform_graph("xxx_20250525")?;
//! let raw_to_ortho = graph
//!     .load_instance("slice_1_10x", "raw", "ortho", Some(0), Some(0))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod array;
pub mod collection;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod image;
pub mod io;
pub mod label;
pub mod metadata;
pub mod roi;
pub mod subset;
pub mod transform;
pub mod types;
pub mod utils;

// Re-exports
pub use array::{ArrayHandle, SubArray};
pub use collection::ImageRepository;
pub use compression::{CompressionLevel, CompressionMethod};
pub use config::{AccessMode, ArrayConfig, VsrConfig};
pub use container::Vsr;
pub use error::{Result, VsrError};
pub use image::{Image, Selection};
pub use io::{FileSystemIOManager, IOManager, MemoryIOManager, StorageBackend};
pub use label::LabelIndex;
pub use metadata::{
    ChannelDescriptor, DatasetInfo, EdgeDescriptor, ImageAttributes, ImageSummary, ManifestEntry,
    ReconCatalog, StackDescriptor,
};
pub use roi::Roi;
pub use subset::ArraySubset;
pub use transform::{AffineTransform, EdgeDirection, PhysicalRoi, TransformGraph, TransformKind};
pub use types::{AxisConvention, AxisRange, DataType, Element, LabelKind};
pub use utils::derived_image_name;

/// Version of this crate
pub const VISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VISOR_VERSION.is_empty());
    }
}
