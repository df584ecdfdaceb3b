//! The VSR container: dataset metadata, image collections and transforms

use crate::array::ArrayHandle;
use crate::collection::{manifest_path, ImageRepository};
use crate::config::{AccessMode, VsrConfig};
use crate::error::{Result, VsrError};
use crate::image::Image;
use crate::io::{create_io_manager, read_json, url_path, write_json, FileSystemIOManager, IOManager};
use crate::metadata::{
    empty_info_document, DatasetInfo, ImageAttributes, ImageSummary, ManifestEntry, ReconCatalog,
};
use crate::transform::{TransformGraph, RECON_TRANSFORMS_DIR};
use crate::utils::{check_vsr_suffix, collection_dir};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Dataset metadata file at the container root
pub const INFO_JSON: &str = "info.json";

/// Keys of [`DatasetInfo`] that are discovered rather than stored
const DISCOVERED_INFO_KEYS: [&str; 2] = ["image_types", "recon_versions"];

/// Handle on a VSR container
///
/// Images and transform graphs obtained from the handle inherit its access
/// mode. Cloning shares the underlying storage.
#[derive(Clone)]
pub struct Vsr {
    io: Arc<dyn IOManager>,
    root: String,
    config: VsrConfig,
}

impl std::fmt::Debug for Vsr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vsr")
            .field("root", &self.root)
            .field("backend", &self.io.backend())
            .field("config", &self.config)
            .finish()
    }
}

impl Vsr {
    /// Open an existing container read-only
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(root, VsrConfig::read_only()).await
    }

    /// Open an existing container on the local file system
    pub async fn open_with_config(root: impl AsRef<Path>, config: VsrConfig) -> Result<Self> {
        let root = root.as_ref();
        check_vsr_suffix(root)?;
        let io = Arc::new(FileSystemIOManager::new(root));
        Self::open_with_io(&root.display().to_string(), io, config).await
    }

    /// Open an existing container addressed by a path or storage URL
    pub async fn open_url(url: &str, config: VsrConfig) -> Result<Self> {
        let root = url_path(url);
        check_vsr_suffix(Path::new(root))?;
        let io = create_io_manager(url)?;
        Self::open_with_io(root, io, config).await
    }

    /// Open an existing container stored behind `io`
    ///
    /// `root` names the container; it must carry the `.vsr` suffix.
    pub async fn open_with_io(root: &str, io: Arc<dyn IOManager>, config: VsrConfig) -> Result<Self> {
        check_vsr_suffix(Path::new(root))?;
        if !io.is_dir("").await? {
            return Err(VsrError::NotFound(format!(
                "The path {} is not a directory.",
                root
            )));
        }
        if !io.exists(INFO_JSON).await? {
            return Err(VsrError::NotFound(format!(
                "Metadata file {} is not found in {}.",
                INFO_JSON, root
            )));
        }

        info!(root, mode = ?config.mode, "opened container");
        Ok(Self {
            io,
            root: root.to_string(),
            config,
        })
    }

    /// Create a new, empty container on the local file system
    ///
    /// The returned handle is writable.
    pub async fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        check_vsr_suffix(root)?;
        let io = Arc::new(FileSystemIOManager::new(root));
        Self::create_with_io(&root.display().to_string(), io).await
    }

    /// Create a new, empty container addressed by a path or storage URL
    ///
    /// `memory://<name>.vsr` creates a scratch container that lives as long
    /// as the returned handle and its clones.
    pub async fn create_url(url: &str) -> Result<Self> {
        let root = url_path(url);
        check_vsr_suffix(Path::new(root))?;
        let io = create_io_manager(url)?;
        Self::create_with_io(root, io).await
    }

    /// Create a new, empty container behind `io`
    pub async fn create_with_io(root: &str, io: Arc<dyn IOManager>) -> Result<Self> {
        check_vsr_suffix(Path::new(root))?;
        if io.exists("").await? {
            return Err(VsrError::AlreadyExists(format!(
                "The path {} already exists.",
                root
            )));
        }

        io.create_dir("").await.map_err(|e| match e {
            VsrError::AlreadyExists(_) => {
                VsrError::AlreadyExists(format!("The path {} already exists.", root))
            }
            other => other,
        })?;
        write_json(io.as_ref(), INFO_JSON, &empty_info_document()).await?;
        write_json(io.as_ref(), &manifest_path(), &Vec::<ManifestEntry>::new()).await?;

        info!(root, "created container");
        Ok(Self {
            io,
            root: root.to_string(),
            config: VsrConfig::writable(),
        })
    }

    /// Name or path the container was opened with
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn config(&self) -> &VsrConfig {
        &self.config
    }

    pub fn mode(&self) -> AccessMode {
        self.config.mode
    }

    /// Storage behind the container
    pub fn io(&self) -> Arc<dyn IOManager> {
        self.io.clone()
    }

    fn repository(&self) -> ImageRepository {
        ImageRepository::new(self.io.clone())
    }

    /// Dataset metadata plus the image types and reconstruction versions
    /// present right now
    ///
    /// Stored `image_types` or `recon_versions` keys are replaced by the
    /// discovered values.
    pub async fn info(&self) -> Result<DatasetInfo> {
        let mut document: Map<String, Value> = read_json(self.io.as_ref(), INFO_JSON).await?;
        for key in DISCOVERED_INFO_KEYS {
            document.remove(key);
        }
        Ok(DatasetInfo {
            document,
            image_types: self.image_types().await?,
            recon_versions: self.recon_versions().await?,
        })
    }

    /// Replace the stored dataset metadata document
    pub async fn set_info(&self, document: &Map<String, Value>) -> Result<()> {
        self.config.mode.ensure_writable("set dataset info")?;
        write_json(self.io.as_ref(), INFO_JSON, document).await
    }

    /// Image collection types, sorted
    pub async fn image_types(&self) -> Result<Vec<String>> {
        self.repository().image_types().await
    }

    /// Reconstruction version names, sorted
    pub async fn recon_versions(&self) -> Result<Vec<String>> {
        let mut versions = Vec::new();
        for entry in self.io.list(RECON_TRANSFORMS_DIR).await? {
            if self
                .io
                .is_dir(&format!("{}/{}", RECON_TRANSFORMS_DIR, entry))
                .await?
            {
                versions.push(entry);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// All image collections keyed by type
    ///
    /// With a `channel` every collection keeps only the images acquired in
    /// that channel; collections left without images stay in the map.
    pub async fn images(&self, channel: Option<&str>) -> Result<BTreeMap<String, Vec<ImageSummary>>> {
        let repository = self.repository();
        let image_types = repository.image_types().await?;
        let listings =
            try_join_all(image_types.iter().map(|image_type| repository.list(image_type, channel)))
                .await?;
        Ok(image_types.into_iter().zip(listings).collect())
    }

    /// One image collection, optionally filtered to a channel
    ///
    /// The raw collection follows its manifest; other collections reflect
    /// the directory contents at call time.
    pub async fn image_collection(
        &self,
        image_type: &str,
        channel: Option<&str>,
    ) -> Result<Vec<ImageSummary>> {
        let dir = collection_dir(image_type);
        if !self.io.is_dir(&dir).await? {
            return Err(VsrError::NotFound(format!("Image collection {}", dir)));
        }
        self.repository().list(image_type, channel).await
    }

    /// Raw manifest entries as stored
    pub async fn raw_manifest(&self) -> Result<Vec<ManifestEntry>> {
        self.repository().manifest().await
    }

    /// Append an image to the raw manifest
    pub async fn add_raw_image(&self, entry: ManifestEntry) -> Result<()> {
        self.config.mode.ensure_writable("add raw image")?;
        let name = entry.name.clone();
        self.repository().append_manifest(entry).await?;
        info!(image = %name, "added raw image to manifest");
        Ok(())
    }

    /// Open an image of a collection
    pub async fn image(&self, image_type: &str, name: &str) -> Result<Image> {
        Image::open(self.io.clone(), image_type, name, self.config.clone()).await
    }

    /// Create an image in a collection
    ///
    /// New raw images still have to be listed with
    /// [`add_raw_image`](Self::add_raw_image).
    pub async fn create_image(
        &self,
        image_type: &str,
        name: &str,
        attributes: ImageAttributes,
    ) -> Result<Image> {
        Image::create(
            self.io.clone(),
            image_type,
            name,
            attributes,
            self.config.clone(),
        )
        .await
    }

    /// Open the array of one resolution level of an image
    pub async fn open_array(
        &self,
        image_type: &str,
        name: &str,
        resolution: &str,
    ) -> Result<ArrayHandle> {
        self.image(image_type, name).await?.open_array(resolution).await
    }

    /// Transform graph of one reconstruction version
    pub fn transform_graph(&self, version: &str) -> Result<TransformGraph> {
        TransformGraph::new(self.io.clone(), version, self.config.mode)
    }

    /// Catalog of one reconstruction version
    pub async fn transform_catalog(&self, version: &str) -> Result<ReconCatalog> {
        self.transform_graph(version)?.catalog().await
    }

    /// Catalogs of all reconstruction versions
    ///
    /// A version directory without `recon.json` yields an empty catalog.
    pub async fn transforms(&self) -> Result<BTreeMap<String, ReconCatalog>> {
        let mut catalogs = BTreeMap::new();
        for version in self.recon_versions().await? {
            let catalog = match self.transform_catalog(&version).await {
                Err(VsrError::NotFound(_)) => ReconCatalog::default(),
                other => other?,
            };
            catalogs.insert(version, catalog);
        }
        Ok(catalogs)
    }
}
