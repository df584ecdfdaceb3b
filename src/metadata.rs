//! JSON documents persisted inside a VSR container
//!
//! Schema reference: <https://visor-tech.github.io/visor-data-schema/>

use crate::error::{Result, VsrError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Comment written into freshly created metadata documents
pub const SCHEMA_COMMENT: &str = "see https://visor-tech.github.io/visor-data-schema/";

/// Dataset metadata (`info.json`) augmented with the discovered layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    /// Free-form document as stored on disk
    #[serde(flatten)]
    pub document: Map<String, Value>,

    /// Image collection types found at call time
    pub image_types: Vec<String>,

    /// Reconstruction versions found at call time
    pub recon_versions: Vec<String>,
}

impl DatasetInfo {
    /// Look up a key of the stored document
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// String value of a key of the stored document
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.document.get(key).and_then(Value::as_str)
    }
}

/// The minimal `info.json` written for a new container
pub fn empty_info_document() -> Map<String, Value> {
    let mut document = Map::new();
    document.insert("_comment".to_string(), Value::from(SCHEMA_COMMENT));
    document
}

/// One entry of the raw image manifest (`visor_raw_images/selected.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Image name, without the `.zarr` suffix
    pub name: String,

    /// Channel labels of the image
    #[serde(default)]
    pub channels: Vec<String>,

    /// Any other keys, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ManifestEntry {
    pub fn new<S: Into<String>>(name: impl Into<String>, channels: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            channels: channels.into_iter().map(Into::into).collect(),
            extra: Map::new(),
        }
    }
}

/// Summary of one image in a collection listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub name: String,
    pub channels: Vec<String>,
    /// Resolution level key -> physical scale per axis
    pub resolutions: BTreeMap<String, Vec<f64>>,
    /// Manifest keys beyond name and channels (raw collection only)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Channel descriptor of an image (`visor.channels[]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    #[serde(alias = "label", deserialize_with = "label_from_json")]
    pub wavelength: String,
    pub index: u32,
}

impl ChannelDescriptor {
    pub fn new(wavelength: impl Into<String>, index: u32) -> Self {
        Self {
            wavelength: wavelength.into(),
            index,
        }
    }
}

/// Stack descriptor of an image (`visor.visor_stacks[]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    #[serde(deserialize_with = "label_from_json")]
    pub label: String,
    pub index: u32,
}

impl StackDescriptor {
    pub fn new(label: impl Into<String>, index: u32) -> Self {
        Self {
            label: label.into(),
            index,
        }
    }
}

// Wavelengths are sometimes written as bare numbers.
fn label_from_json<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number label, got {}",
            other
        ))),
    }
}

/// OME-NGFF coordinate transformation of a multiscale dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Identity,
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

/// One resolution level of a multiscale image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub path: String,

    #[serde(rename = "coordinateTransformations", default)]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

impl Dataset {
    /// The scale vector of this level, if it declares one
    pub fn scale(&self) -> Option<&[f64]> {
        self.coordinate_transformations.iter().find_map(|t| match t {
            CoordinateTransformation::Scale { scale } => Some(scale.as_slice()),
            _ => None,
        })
    }
}

/// OME-NGFF axis description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMetadata {
    pub name: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// OME-NGFF multiscale description
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub downscaling_type: Option<String>,

    #[serde(default)]
    pub axes: Vec<AxisMetadata>,

    // ordered by largest (i.e. highest resolution) to smallest.
    #[serde(default)]
    pub datasets: Vec<Dataset>,

    // are applied after `coordinate_transformations` in `datasets`
    #[serde(rename = "coordinateTransformations", skip_serializing_if = "Option::is_none")]
    pub coordinate_transformations: Option<Vec<CoordinateTransformation>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// `ome` attribute namespace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OmeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub multiscales: Vec<Multiscale>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `visor` attribute namespace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisorMetadata {
    #[serde(default)]
    pub channels: Vec<ChannelDescriptor>,

    #[serde(default)]
    pub visor_stacks: Vec<StackDescriptor>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Attributes of an image group (`<name>.zarr/zarr.json`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageAttributes {
    #[serde(default)]
    pub ome: OmeMetadata,

    #[serde(default)]
    pub visor: VisorMetadata,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageAttributes {
    /// Attributes describing the given channels and stacks, without resolutions
    pub fn new(channels: Vec<ChannelDescriptor>, visor_stacks: Vec<StackDescriptor>) -> Self {
        Self {
            ome: OmeMetadata::default(),
            visor: VisorMetadata {
                channels,
                visor_stacks,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    /// Resolution level key -> scale, taken from the first multiscale
    pub fn resolutions(&self) -> BTreeMap<String, Vec<f64>> {
        self.ome
            .multiscales
            .first()
            .map(|multiscale| {
                multiscale
                    .datasets
                    .iter()
                    .map(|d| (d.path.clone(), d.scale().map(<[f64]>::to_vec).unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Channel labels in declaration order
    pub fn channel_labels(&self) -> Vec<String> {
        self.visor
            .channels
            .iter()
            .map(|c| c.wavelength.clone())
            .collect()
    }

    /// Stack labels in declaration order
    pub fn stack_labels(&self) -> Vec<String> {
        self.visor
            .visor_stacks
            .iter()
            .map(|s| s.label.clone())
            .collect()
    }

    /// Register (or replace) the scale of a resolution level
    pub fn add_resolution(&mut self, path: impl Into<String>, scale: Vec<f64>) {
        let path = path.into();
        if self.ome.multiscales.is_empty() {
            self.ome.multiscales.push(Multiscale::default());
        }
        let datasets = &mut self.ome.multiscales[0].datasets;
        let dataset = Dataset {
            path: path.clone(),
            coordinate_transformations: vec![CoordinateTransformation::Scale { scale }],
        };
        match datasets.iter_mut().find(|d| d.path == path) {
            Some(existing) => *existing = dataset,
            None => datasets.push(dataset),
        }
    }
}

/// Zarr v3 group node document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub zarr_format: u8,
    pub node_type: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl GroupMetadata {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            zarr_format: 3,
            node_type: "group".to_string(),
            attributes,
        }
    }

    /// Group document carrying image attributes
    pub fn from_image_attributes(attrs: &ImageAttributes) -> Result<Self> {
        match serde_json::to_value(attrs)? {
            Value::Object(map) => Ok(Self::new(map)),
            _ => Err(VsrError::Metadata(
                "Image attributes must serialize to an object".to_string(),
            )),
        }
    }

    /// Decode the attributes as image attributes
    pub fn image_attributes(&self) -> Result<ImageAttributes> {
        if self.node_type != "group" {
            return Err(VsrError::Metadata(format!(
                "Expected a group node, found '{}'",
                self.node_type
            )));
        }
        serde_json::from_value(Value::Object(self.attributes.clone()))
            .map_err(|e| VsrError::Metadata(format!("Invalid image attributes: {}", e)))
    }
}

/// One slice entry of a reconstruction catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceEntry {
    pub name: String,
    #[serde(default)]
    pub transforms: Vec<String>,
}

/// Reconstruction version catalog (`visor_recon_transforms/<version>/recon.json`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconCatalog {
    #[serde(default)]
    pub spaces: Vec<String>,
    #[serde(default)]
    pub slices: Vec<SliceEntry>,
}

impl ReconCatalog {
    pub fn slice(&self, name: &str) -> Option<&SliceEntry> {
        self.slices.iter().find(|s| s.name == name)
    }

    pub fn has_space(&self, name: &str) -> bool {
        self.spaces.iter().any(|s| s == name)
    }
}

/// One edge of a slice's transform list (`<slice>/transforms.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_attributes() -> Value {
        json!({
            "ome": {
                "version": "0.5",
                "multiscales": [{
                    "axes": [
                        {"name": "vs"}, {"name": "ch", "type": "channel"},
                        {"name": "z", "type": "space", "unit": "micrometer"},
                        {"name": "y", "type": "space", "unit": "micrometer"},
                        {"name": "x", "type": "space", "unit": "micrometer"}
                    ],
                    "datasets": [
                        {"path": "0", "coordinateTransformations": [
                            {"type": "scale", "scale": [1.0, 1.0, 2.5, 1.0, 1.0]}
                        ]},
                        {"path": "1", "coordinateTransformations": [
                            {"type": "scale", "scale": [1.0, 1.0, 5.0, 2.0, 2.0]}
                        ]}
                    ]
                }]
            },
            "visor": {
                "channels": [{"wavelength": "488", "index": 0}, {"wavelength": 561, "index": 1}],
                "visor_stacks": [{"label": "stack_1", "index": 0}, {"label": "stack_2", "index": 1}],
                "acquisition": {"objective": "10x"}
            }
        })
    }

    #[test]
    fn test_parse_image_attributes() {
        let attrs: ImageAttributes = serde_json::from_value(sample_attributes()).unwrap();
        assert_eq!(attrs.channel_labels(), vec!["488", "561"]);
        assert_eq!(attrs.stack_labels(), vec!["stack_1", "stack_2"]);

        let resolutions = attrs.resolutions();
        assert_eq!(resolutions["0"], vec![1.0, 1.0, 2.5, 1.0, 1.0]);
        assert_eq!(resolutions["1"], vec![1.0, 1.0, 5.0, 2.0, 2.0]);

        // Unknown keys survive a round trip
        let back = serde_json::to_value(&attrs).unwrap();
        assert_eq!(back["visor"]["acquisition"]["objective"], "10x");
    }

    #[test]
    fn test_channel_label_alias() {
        let channel: ChannelDescriptor =
            serde_json::from_value(json!({"label": "640", "index": 3})).unwrap();
        assert_eq!(channel, ChannelDescriptor::new("640", 3));
    }

    #[test]
    fn test_add_resolution() {
        let mut attrs = ImageAttributes::default();
        attrs.add_resolution("0", vec![2.5, 1.0, 1.0]);
        attrs.add_resolution("1", vec![5.0, 2.0, 2.0]);
        attrs.add_resolution("0", vec![3.0, 1.0, 1.0]);
        let resolutions = attrs.resolutions();
        assert_eq!(resolutions.len(), 2);
        assert_eq!(resolutions["0"], vec![3.0, 1.0, 1.0]);
    }

    #[test]
    fn test_group_metadata() {
        let attrs: ImageAttributes = serde_json::from_value(sample_attributes()).unwrap();
        let group = GroupMetadata::from_image_attributes(&attrs).unwrap();
        assert_eq!(group.zarr_format, 3);
        assert_eq!(group.node_type, "group");
        assert_eq!(group.image_attributes().unwrap(), attrs);

        let mut array_node = group.clone();
        array_node.node_type = "array".to_string();
        assert!(array_node.image_attributes().is_err());
    }

    #[test]
    fn test_manifest_entry_keeps_extra_keys() {
        let entry: ManifestEntry = serde_json::from_value(json!({
            "name": "slice_1_10x",
            "channels": ["488", "561"],
            "operator": "xxx"
        }))
        .unwrap();
        assert_eq!(entry.name, "slice_1_10x");
        assert_eq!(entry.extra["operator"], "xxx");
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["operator"], "xxx");
    }

    #[test]
    fn test_recon_catalog() {
        let catalog: ReconCatalog = serde_json::from_value(json!({
            "spaces": ["raw", "ortho", "brain"],
            "slices": [{"name": "slice_1_10x", "transforms": ["raw_to_ortho"]}]
        }))
        .unwrap();
        assert!(catalog.has_space("ortho"));
        assert_eq!(
            catalog.slice("slice_1_10x").unwrap().transforms,
            vec!["raw_to_ortho"]
        );
        assert!(catalog.slice("slice_2_10x").is_none());

        let edge: EdgeDescriptor = serde_json::from_value(
            json!({"name": "raw_to_ortho", "type": "affine", "format": "tfm"}),
        )
        .unwrap();
        assert_eq!(edge.kind, "affine");
    }

    #[test]
    fn test_dataset_info_flattened() {
        let info = DatasetInfo {
            document: empty_info_document(),
            image_types: vec!["raw".to_string()],
            recon_versions: vec![],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["_comment"], SCHEMA_COMMENT);
        assert_eq!(json["image_types"], json!(["raw"]));
        assert_eq!(info.get_str("_comment"), Some(SCHEMA_COMMENT));
    }
}
