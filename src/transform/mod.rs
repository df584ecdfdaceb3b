//! Coordinate spaces and the transforms between them
//!
//! A reconstruction version declares named spaces. Each slice of the version
//! lists edges `"<from>_to_<to>"`, and every edge stores one transform per
//! (stack, channel) pair. Only one direction of an edge is ever stored; the
//! other direction is derived by inversion.

pub mod affine;
pub mod graph;
pub mod kind;
pub mod tfm;

pub use affine::{AffineTransform, PhysicalRoi};
pub use graph::{EdgeDirection, TransformGraph};
pub use kind::TransformKind;

/// Directory holding all reconstruction versions
pub const RECON_TRANSFORMS_DIR: &str = "visor_recon_transforms";

/// Per-version catalog file
pub const RECON_JSON: &str = "recon.json";

/// Per-slice edge list file
pub const TRANSFORMS_JSON: &str = "transforms.json";

/// Name of the edge from `from` to `to`
pub fn edge_name(from: &str, to: &str) -> String {
    format!("{}_to_{}", from, to)
}
