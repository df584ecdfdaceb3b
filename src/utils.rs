//! Utility functions

use crate::error::{Result, VsrError};
use chrono::NaiveDate;
use std::path::Path;

/// Suffix of a VSR container root
pub const VSR_SUFFIX: &str = "vsr";

/// Suffix of an image container inside a collection
pub const ZARR_SUFFIX: &str = "zarr";

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Fail with `InvalidFormat` unless `path` carries the `.vsr` suffix
pub fn check_vsr_suffix(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(VSR_SUFFIX) => Ok(()),
        _ => Err(VsrError::InvalidFormat(format!(
            "The path {} does not have .{} extension.",
            path.display(),
            VSR_SUFFIX
        ))),
    }
}

/// Directory name of an image collection, e.g. `visor_raw_images`
pub fn collection_dir(image_type: &str) -> String {
    format!("visor_{}_images", image_type)
}

/// Image type of a collection directory name
///
/// The type is the second underscore-delimited segment, so
/// `visor_compr_images` yields `compr`.
pub fn parse_collection_dir(dir_name: &str) -> Option<&str> {
    if !dir_name.starts_with("visor_") || !dir_name.ends_with("_images") {
        return None;
    }
    dir_name.split('_').nth(1).filter(|t| !t.is_empty())
}

/// Directory name of an image, e.g. `slice_1_10x.zarr`
pub fn image_dir(name: &str) -> String {
    format!("{}.{}", name, ZARR_SUFFIX)
}

/// Image name of an image directory entry, if it is one
pub fn parse_image_dir(entry: &str) -> Option<&str> {
    entry
        .strip_suffix(ZARR_SUFFIX)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|name| !name.is_empty())
}

/// Container-relative path of an image
pub fn image_path(image_type: &str, name: &str) -> String {
    format!("{}/{}", collection_dir(image_type), image_dir(name))
}

/// Name of a derived image, `{personnel}_{raw_name}_{YYYYMMDD}`
pub fn derived_image_name(personnel: &str, raw_name: &str, date: NaiveDate) -> String {
    let raw_name = raw_name
        .strip_suffix(&format!(".{}", ZARR_SUFFIX))
        .unwrap_or(raw_name);
    format!("{}_{}_{}", personnel, raw_name, date.format("%Y%m%d"))
}

/// Name of a path segment that must be a single, non-empty directory name
pub fn check_segment(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(VsrError::Validation(format!(
            "Invalid {} name '{}'",
            kind, name
        )));
    }
    Ok(())
}
