//! Images of a collection and dimension-aware selection

use crate::array::{ArrayHandle, SubArray, ZARR_JSON};
use crate::config::{AccessMode, ArrayConfig, VsrConfig};
use crate::error::{Result, VsrError};
use crate::io::{join_path, read_json, IOManager};
use crate::label::LabelIndex;
use crate::subset::ArraySubset;
use crate::metadata::{GroupMetadata, ImageAttributes};
use crate::types::{AxisConvention, AxisRange, LabelKind};
use crate::utils::{check_segment, image_path};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

/// Stack/channel filters plus explicit per-axis ranges
///
/// Ranges are given in the array's axis order and refine the ranges left by
/// the label filters, so an index of `0` on a filtered axis addresses the
/// selected stack or channel itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub stack: Option<String>,
    pub channel: Option<String>,
    pub ranges: Vec<AxisRange>,
}

impl Selection {
    /// Select everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the stack with this label
    pub fn stack(mut self, label: impl Into<String>) -> Self {
        self.stack = Some(label.into());
        self
    }

    /// Keep only the channel with this label
    pub fn channel(mut self, label: impl Into<String>) -> Self {
        self.channel = Some(label.into());
        self
    }

    /// Refine the selection with per-axis ranges
    pub fn ranges(mut self, ranges: impl IntoIterator<Item = AxisRange>) -> Self {
        self.ranges = ranges.into_iter().collect();
        self
    }

    /// Compose the region this selection addresses in an array of `shape`
    ///
    /// Rank is always preserved: a label filter narrows its axis to one
    /// element instead of dropping it.
    pub fn subset(&self, shape: &[u64], labels: &LabelIndex) -> Result<ArraySubset> {
        let ndim = shape.len();
        let convention = AxisConvention::for_ndim(ndim)?;
        let mut ranges: Vec<Range<u64>> = shape.iter().map(|&len| 0..len).collect();

        for (kind, label) in [
            (LabelKind::Stack, &self.stack),
            (LabelKind::Channel, &self.channel),
        ] {
            let Some(label) = label else { continue };
            let axis = convention
                .label_axis(kind)
                .ok_or_else(|| VsrError::AxisNotPresent {
                    axis: kind.to_string(),
                    ndim,
                })?;
            let index = u64::from(labels.resolve(kind, label)?);
            if index >= shape[axis] {
                return Err(VsrError::OutOfBounds(format!(
                    "{} '{}' has index {} but the {} axis has length {}",
                    kind, label, index, kind, shape[axis]
                )));
            }
            ranges[axis] = index..index + 1;
        }

        if self.ranges.len() > ndim {
            return Err(VsrError::InvalidDimensions(format!(
                "{} ranges given for a {}-dimensional array",
                self.ranges.len(),
                ndim
            )));
        }
        for (range, refinement) in ranges.iter_mut().zip(&self.ranges) {
            *range = refinement.refine(range)?;
        }

        Ok(ArraySubset::from_ranges(&ranges))
    }
}

/// Handle on one image of a collection
///
/// Cloning is cheap; clones share the cached attributes.
#[derive(Clone)]
pub struct Image {
    io: Arc<dyn IOManager>,
    image_type: String,
    name: String,
    path: String,
    config: VsrConfig,
    attributes: Arc<RwLock<ImageAttributes>>,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("image_type", &self.image_type)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("mode", &self.config.mode)
            .finish()
    }
}

impl Image {
    /// Open an existing image of collection `image_type`
    pub async fn open(
        io: Arc<dyn IOManager>,
        image_type: &str,
        name: &str,
        config: VsrConfig,
    ) -> Result<Self> {
        check_segment("image type", image_type)?;
        check_segment("image", name)?;
        let path = image_path(image_type, name);
        let group: GroupMetadata = read_json(io.as_ref(), &join_path(&path, ZARR_JSON))
            .await
            .map_err(|e| match e {
                VsrError::NotFound(_) => {
                    VsrError::NotFound(format!("The image path {} is not valid.", path))
                }
                other => other,
            })?;
        let attributes = group.image_attributes()?;
        LabelIndex::new(&attributes.visor.channels, &attributes.visor.visor_stacks)?;

        debug!(image_type, name, "opened image");
        Ok(Self {
            io,
            image_type: image_type.to_string(),
            name: name.to_string(),
            path,
            config,
            attributes: Arc::new(RwLock::new(attributes)),
        })
    }

    /// Create a new image group; fails with `AlreadyExists` if it is present
    pub async fn create(
        io: Arc<dyn IOManager>,
        image_type: &str,
        name: &str,
        attributes: ImageAttributes,
        config: VsrConfig,
    ) -> Result<Self> {
        config.mode.ensure_writable("create image")?;
        check_segment("image type", image_type)?;
        check_segment("image", name)?;
        validate_descriptors(&attributes)?;

        let path = image_path(image_type, name);
        if io.exists(&path).await? {
            return Err(VsrError::AlreadyExists(format!(
                "The image path {} already exists.",
                path
            )));
        }
        let group = GroupMetadata::from_image_attributes(&attributes)?;
        io.write_new(&join_path(&path, ZARR_JSON), &serde_json::to_vec_pretty(&group)?)
            .await?;

        info!(image_type, name, "created image");
        Ok(Self {
            io,
            image_type: image_type.to_string(),
            name: name.to_string(),
            path,
            config,
            attributes: Arc::new(RwLock::new(attributes)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_type(&self) -> &str {
        &self.image_type
    }

    /// Container-relative path of the image group
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.config.mode
    }

    /// Snapshot of the image attributes
    pub fn attributes(&self) -> ImageAttributes {
        self.attributes.read().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.attributes.read().channel_labels()
    }

    pub fn stacks(&self) -> Vec<String> {
        self.attributes.read().stack_labels()
    }

    /// Resolution level key -> physical scale per axis
    pub fn resolutions(&self) -> BTreeMap<String, Vec<f64>> {
        self.attributes.read().resolutions()
    }

    /// Label index over the current descriptors
    pub fn label_index(&self) -> Result<LabelIndex> {
        let attributes = self.attributes.read();
        LabelIndex::new(&attributes.visor.channels, &attributes.visor.visor_stacks)
    }

    /// Axis index of a stack or channel label
    pub fn label_to_index(&self, kind: LabelKind, label: &str) -> Result<u32> {
        self.label_index()?.resolve(kind, label)
    }

    fn array_path(&self, resolution: &str) -> Result<String> {
        check_segment("resolution", resolution)?;
        Ok(join_path(&self.path, resolution))
    }

    /// Open the array of one resolution level
    pub async fn open_array(&self, resolution: &str) -> Result<ArrayHandle> {
        let path = self.array_path(resolution)?;
        let array = ArrayHandle::open(self.io.clone(), &path, self.config.mode)
            .await
            .map_err(|e| match e {
                VsrError::NotFound(_) => VsrError::NotFound(format!(
                    "Resolution {} of image {}",
                    resolution, self.name
                )),
                other => other,
            })?;
        Ok(array.with_concurrency(self.config.chunk_concurrency))
    }

    /// Create the array of one resolution level
    ///
    /// The stack and channel axes, when present, must match the number of
    /// declared descriptors.
    pub async fn create_array(&self, resolution: &str, config: &ArrayConfig) -> Result<ArrayHandle> {
        self.config.mode.ensure_writable("create array")?;
        let convention = AxisConvention::for_ndim(config.shape.len())?;
        {
            let attributes = self.attributes.read();
            for (kind, declared) in [
                (LabelKind::Stack, attributes.visor.visor_stacks.len()),
                (LabelKind::Channel, attributes.visor.channels.len()),
            ] {
                let Some(axis) = convention.label_axis(kind) else {
                    continue;
                };
                if declared > 0 && config.shape[axis] != declared as u64 {
                    return Err(VsrError::Validation(format!(
                        "The {} axis has length {} but {} {} descriptors are declared",
                        kind, config.shape[axis], declared, kind
                    )));
                }
            }
        }

        let path = self.array_path(resolution)?;
        let array = ArrayHandle::create(self.io.clone(), &path, config).await?;
        info!(image = %self.name, resolution, shape = ?config.shape, "created resolution level");
        Ok(array.with_concurrency(self.config.chunk_concurrency))
    }

    async fn store_attributes(&self, attributes: &ImageAttributes) -> Result<()> {
        let group = GroupMetadata::from_image_attributes(attributes)?;
        self.io
            .write(
                &join_path(&self.path, ZARR_JSON),
                &serde_json::to_vec_pretty(&group)?,
            )
            .await
    }

    /// Replace the image attributes
    pub async fn set_attributes(&self, attributes: ImageAttributes) -> Result<()> {
        self.config.mode.ensure_writable("set image attributes")?;
        validate_descriptors(&attributes)?;
        self.store_attributes(&attributes).await?;
        *self.attributes.write() = attributes;
        Ok(())
    }

    /// Record the physical scale of a resolution level
    pub async fn add_resolution(&self, resolution: &str, scale: Vec<f64>) -> Result<()> {
        self.config.mode.ensure_writable("add resolution")?;
        check_segment("resolution", resolution)?;
        let mut attributes = self.attributes();
        attributes.add_resolution(resolution, scale);
        self.store_attributes(&attributes).await?;
        *self.attributes.write() = attributes;
        Ok(())
    }

    /// Read the region of `array` addressed by `selection`
    pub async fn select(&self, array: &ArrayHandle, selection: &Selection) -> Result<SubArray> {
        let subset = selection.subset(array.shape(), &self.label_index()?)?;
        debug!(
            image = %self.name,
            array = array.path(),
            start = ?subset.start(),
            shape = ?subset.shape(),
            "selecting region"
        );
        array.read(&subset).await
    }

    /// Open a resolution level and read the region addressed by `selection`
    pub async fn read(&self, resolution: &str, selection: &Selection) -> Result<SubArray> {
        let array = self.open_array(resolution).await?;
        self.select(&array, selection).await
    }
}

fn validate_descriptors(attributes: &ImageAttributes) -> Result<()> {
    let index = LabelIndex::new(&attributes.visor.channels, &attributes.visor.visor_stacks)?;
    index.validate_dense(LabelKind::Channel)?;
    index.validate_dense(LabelKind::Stack)
}
