//! Discovery of image collections
//!
//! The raw collection is listed from its manifest (`selected.json`); every
//! other collection is listed by scanning its directory for image groups.

use crate::array::ZARR_JSON;
use crate::error::{Result, VsrError};
use crate::io::{join_path, read_json, write_json, IOManager};
use crate::metadata::{GroupMetadata, ImageAttributes, ImageSummary, ManifestEntry};
use crate::utils::{collection_dir, image_dir, parse_collection_dir, parse_image_dir};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Image type whose membership is kept in an explicit manifest
pub const RAW_IMAGE_TYPE: &str = "raw";

/// File name of the raw manifest
pub const MANIFEST_JSON: &str = "selected.json";

/// Path of the raw manifest relative to the container root
pub fn manifest_path() -> String {
    join_path(&collection_dir(RAW_IMAGE_TYPE), MANIFEST_JSON)
}

/// Image listings over a container's storage
#[derive(Clone)]
pub struct ImageRepository {
    io: Arc<dyn IOManager>,
}

impl ImageRepository {
    pub fn new(io: Arc<dyn IOManager>) -> Self {
        Self { io }
    }

    /// Collection types present at the container root, sorted
    pub async fn image_types(&self) -> Result<Vec<String>> {
        let mut types = Vec::new();
        for entry in self.io.list("").await? {
            let Some(image_type) = parse_collection_dir(&entry) else {
                continue;
            };
            if self.io.is_dir(&entry).await? {
                types.push(image_type.to_string());
            }
        }
        types.sort();
        types.dedup();
        Ok(types)
    }

    /// Raw manifest entries as stored
    ///
    /// A manifest holding a JSON object instead of a list (the schema comment
    /// stub some writers leave in a fresh container) lists no images.
    pub async fn manifest(&self) -> Result<Vec<ManifestEntry>> {
        let path = manifest_path();
        let document: Value = read_json(self.io.as_ref(), &path).await?;
        match document {
            Value::Array(_) => serde_json::from_value(document)
                .map_err(|e| VsrError::Metadata(format!("Failed to parse {}: {}", path, e))),
            Value::Object(_) => Ok(Vec::new()),
            other => Err(VsrError::Metadata(format!(
                "{} must hold a list of images, found {}",
                path, other
            ))),
        }
    }

    async fn image_attributes(&self, image_type: &str, name: &str) -> Result<ImageAttributes> {
        let path = join_path(&join_path(&collection_dir(image_type), &image_dir(name)), ZARR_JSON);
        let group: GroupMetadata = read_json(self.io.as_ref(), &path).await?;
        group.image_attributes()
    }

    /// Raw images in manifest order, with resolutions merged in from the
    /// image groups
    pub async fn list_by_manifest(&self) -> Result<Vec<ImageSummary>> {
        let mut images = Vec::new();
        for entry in self.manifest().await? {
            let resolutions = match self.image_attributes(RAW_IMAGE_TYPE, &entry.name).await {
                Ok(attributes) => attributes.resolutions(),
                Err(e) => {
                    warn!(image = %entry.name, error = %e, "manifest entry has no readable image group");
                    Default::default()
                }
            };
            images.push(ImageSummary {
                name: entry.name,
                channels: entry.channels,
                resolutions,
                extra: entry.extra,
            });
        }
        Ok(images)
    }

    /// Images found in the directory of collection `image_type`, sorted by name
    ///
    /// Entries without a readable image group are skipped.
    pub async fn list_by_scan(&self, image_type: &str) -> Result<Vec<ImageSummary>> {
        let dir = collection_dir(image_type);
        if !self.io.is_dir(&dir).await? {
            return Err(VsrError::NotFound(format!("Image collection {}", dir)));
        }

        let mut images = Vec::new();
        for entry in self.io.list(&dir).await? {
            let Some(name) = parse_image_dir(&entry) else {
                continue;
            };
            if !self.io.exists(&join_path(&join_path(&dir, &entry), ZARR_JSON)).await? {
                continue;
            }
            match self.image_attributes(image_type, name).await {
                Ok(attributes) => images.push(ImageSummary {
                    name: name.to_string(),
                    channels: attributes.channel_labels(),
                    resolutions: attributes.resolutions(),
                    extra: Map::new(),
                }),
                Err(e) => debug!(image = name, error = %e, "skipping unreadable image group"),
            }
        }
        Ok(images)
    }

    /// Images of any collection, using the manifest for raw images
    ///
    /// With a `channel` only images acquired in that channel are kept.
    pub async fn list(&self, image_type: &str, channel: Option<&str>) -> Result<Vec<ImageSummary>> {
        let mut images = if image_type == RAW_IMAGE_TYPE {
            self.list_by_manifest().await?
        } else {
            self.list_by_scan(image_type).await?
        };
        if let Some(channel) = channel {
            images.retain(|image| image.channels.iter().any(|c| c == channel));
        }
        Ok(images)
    }

    /// Append an entry to the raw manifest
    pub async fn append_manifest(&self, entry: ManifestEntry) -> Result<()> {
        let mut entries = self.manifest().await?;
        if entries.iter().any(|e| e.name == entry.name) {
            return Err(VsrError::AlreadyExists(format!(
                "Raw image {} is already in {}",
                entry.name,
                manifest_path()
            )));
        }
        entries.push(entry);
        write_json(self.io.as_ref(), &manifest_path(), &entries).await
    }
}
