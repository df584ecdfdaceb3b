//! Regions of interest over one resolution level of an image

use crate::array::SubArray;
use crate::container::Vsr;
use crate::error::{Result, VsrError};
use crate::image::{Image, Selection};
use crate::types::AxisRange;
use crate::utils::{parse_collection_dir, parse_image_dir};

/// Per-axis region of one resolution level of an image
#[derive(Debug, Clone)]
pub struct Roi {
    image: Image,
    resolution: String,
    ranges: Vec<AxisRange>,
}

impl Roi {
    pub fn new(image: Image, resolution: impl Into<String>, ranges: Vec<AxisRange>) -> Self {
        Self {
            image,
            resolution: resolution.into(),
            ranges,
        }
    }

    /// Region of the image stored at `image_path`
    ///
    /// `image_path` ends in `visor_<type>_images/<name>.zarr`; anything before
    /// those two components is ignored.
    pub async fn from_image_path(
        vsr: &Vsr,
        image_path: &str,
        resolution: impl Into<String>,
        ranges: Vec<AxisRange>,
    ) -> Result<Self> {
        let (image_type, name) = split_image_path(image_path)?;
        let image = vsr.image(image_type, name).await?;
        Ok(Self::new(image, resolution, ranges))
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn ranges(&self) -> &[AxisRange] {
        &self.ranges
    }

    /// Read the region; every axis of the array is kept
    pub async fn load(&self) -> Result<SubArray> {
        let selection = Selection::new().ranges(self.ranges.iter().copied());
        self.image.read(&self.resolution, &selection).await
    }
}

fn split_image_path(image_path: &str) -> Result<(&str, &str)> {
    let mut parts = image_path.trim_end_matches('/').rsplit('/');
    let image_dir = parts.next().unwrap_or_default();
    let collection = parts.next().unwrap_or_default();

    let name = parse_image_dir(image_dir).ok_or_else(|| {
        VsrError::InvalidFormat(format!(
            "The image path {} does not end with a .zarr directory.",
            image_path
        ))
    })?;
    let image_type = parse_collection_dir(collection).ok_or_else(|| {
        VsrError::InvalidFormat(format!(
            "The image path {} is not inside a visor_<type>_images collection.",
            image_path
        ))
    })?;
    Ok((image_type, name))
}
