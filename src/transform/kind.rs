//! Supported transform types and their storage codecs

use super::affine::AffineTransform;
use super::tfm::{read_tfm, write_tfm};
use crate::error::{Result, VsrError};
use crate::metadata::EdgeDescriptor;
use std::fmt;

/// Transform type plus storage format of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Affine transform stored as an ITK `.tfm` text file
    AffineTfm,
}

impl TransformKind {
    /// Kind declared by an edge's `type` and `format` fields
    pub fn parse(kind: &str, format: &str) -> Result<Self> {
        match (kind, format) {
            ("affine", "tfm") => Ok(TransformKind::AffineTfm),
            _ => Err(VsrError::UnsupportedTransformKind {
                kind: kind.to_string(),
                format: format.to_string(),
            }),
        }
    }

    pub fn from_edge(edge: &EdgeDescriptor) -> Result<Self> {
        Self::parse(&edge.kind, &edge.format)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TransformKind::AffineTfm => "affine",
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            TransformKind::AffineTfm => "tfm",
        }
    }

    /// File name of one stored instance, `<type>.<format>`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.type_name(), self.format_name())
    }

    /// Catalog entry for an edge of this kind
    pub fn descriptor(&self, name: impl Into<String>) -> EdgeDescriptor {
        EdgeDescriptor {
            name: name.into(),
            kind: self.type_name().to_string(),
            format: self.format_name().to_string(),
        }
    }

    pub fn encode(&self, transform: &AffineTransform) -> Vec<u8> {
        match self {
            TransformKind::AffineTfm => write_tfm(transform).into_bytes(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<AffineTransform> {
        match self {
            TransformKind::AffineTfm => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    VsrError::Metadata(format!("Transform file is not UTF-8: {}", e))
                })?;
                read_tfm(text)
            }
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_name(), self.format_name())
    }
}
