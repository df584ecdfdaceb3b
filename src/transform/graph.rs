//! Transform catalogs of one reconstruction version

use super::affine::{AffineTransform, PhysicalRoi};
use super::kind::TransformKind;
use super::{edge_name, RECON_JSON, RECON_TRANSFORMS_DIR, TRANSFORMS_JSON};
use crate::config::AccessMode;
use crate::error::{Result, VsrError};
use crate::io::{join_path, read_json, write_json, IOManager};
use crate::metadata::{EdgeDescriptor, ReconCatalog, SliceEntry};
use crate::utils::check_segment;
use std::sync::Arc;
use tracing::{debug, info};

/// Which way a stored edge is traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// The edge is stored under the requested name
    Forward,
    /// Only the opposite edge is stored; its transform is inverted
    Inverse,
}

/// Spaces, edges and transform instances of one reconstruction version
///
/// Catalog reads return owned snapshots. All mutation goes through
/// [`declare_spaces`](Self::declare_spaces), [`declare_edge`](Self::declare_edge)
/// and [`save_instance`](Self::save_instance), each a single read-modify-write
/// of the affected documents.
#[derive(Clone)]
pub struct TransformGraph {
    io: Arc<dyn IOManager>,
    version: String,
    mode: AccessMode,
}

impl std::fmt::Debug for TransformGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformGraph")
            .field("version", &self.version)
            .field("mode", &self.mode)
            .finish()
    }
}

impl TransformGraph {
    pub fn new(io: Arc<dyn IOManager>, version: &str, mode: AccessMode) -> Result<Self> {
        check_segment("reconstruction version", version)?;
        Ok(Self {
            io,
            version: version.to_string(),
            mode,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Container-relative directory of this version
    pub fn path(&self) -> String {
        join_path(RECON_TRANSFORMS_DIR, &self.version)
    }

    /// Container-relative directory of one slice
    pub fn slice_path(&self, slice: &str) -> String {
        join_path(&self.path(), slice)
    }

    fn catalog_path(&self) -> String {
        join_path(&self.path(), RECON_JSON)
    }

    fn edges_path(&self, slice: &str) -> String {
        join_path(&self.slice_path(slice), TRANSFORMS_JSON)
    }

    /// Path of the instance of `edge` for one (stack, channel) pair
    pub fn instance_path(
        &self,
        slice: &str,
        edge: &str,
        kind: TransformKind,
        stack: usize,
        channel: usize,
    ) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.slice_path(slice),
            edge,
            stack,
            channel,
            kind.file_name()
        )
    }

    /// Whether the version directory exists
    pub async fn exists(&self) -> Result<bool> {
        self.io.is_dir(&self.path()).await
    }

    /// Snapshot of `recon.json`
    pub async fn catalog(&self) -> Result<ReconCatalog> {
        read_json(self.io.as_ref(), &self.catalog_path())
            .await
            .map_err(|e| match e {
                VsrError::NotFound(_) => VsrError::NotFound(format!(
                    "Metadata file {} is not found in {}",
                    RECON_JSON,
                    self.path()
                )),
                other => other,
            })
    }

    async fn catalog_or_default(&self) -> Result<ReconCatalog> {
        match self.catalog().await {
            Err(VsrError::NotFound(_)) => Ok(ReconCatalog::default()),
            other => other,
        }
    }

    /// Snapshot of a slice's edge list; empty when the slice has none
    pub async fn slice_edges(&self, slice: &str) -> Result<Vec<EdgeDescriptor>> {
        check_segment("slice", slice)?;
        match read_json(self.io.as_ref(), &self.edges_path(slice)).await {
            Err(VsrError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Add spaces to the version, creating its catalog if needed
    pub async fn declare_spaces(&self, names: &[&str]) -> Result<()> {
        self.mode.ensure_writable("declare spaces")?;
        for name in names {
            check_segment("space", name)?;
        }

        let mut catalog = self.catalog_or_default().await?;
        for name in names {
            if !catalog.has_space(name) {
                catalog.spaces.push(name.to_string());
            }
        }
        write_json(self.io.as_ref(), &self.catalog_path(), &catalog).await?;
        info!(version = %self.version, spaces = ?catalog.spaces, "declared spaces");
        Ok(())
    }

    /// Declare the edge `from -> to` of a slice
    ///
    /// Both spaces must be declared. Fails with `Conflict` when the edge or its
    /// inverse is already declared for the slice.
    pub async fn declare_edge(
        &self,
        slice: &str,
        from: &str,
        to: &str,
        kind: &str,
        format: &str,
    ) -> Result<EdgeDescriptor> {
        let kind = TransformKind::parse(kind, format)?;
        self.declare_edge_kind(slice, from, to, kind).await
    }

    async fn check_spaces(&self, from: &str, to: &str) -> Result<ReconCatalog> {
        if from == to {
            return Err(VsrError::Validation(format!(
                "An edge needs two different spaces, got '{}' twice",
                from
            )));
        }
        let catalog = self.catalog_or_default().await?;
        for space in [from, to] {
            if !catalog.has_space(space) {
                return Err(VsrError::Validation(format!(
                    "Space '{}' is not declared in {}",
                    space,
                    self.path()
                )));
            }
        }
        Ok(catalog)
    }

    async fn declare_edge_kind(
        &self,
        slice: &str,
        from: &str,
        to: &str,
        kind: TransformKind,
    ) -> Result<EdgeDescriptor> {
        self.mode.ensure_writable("declare edge")?;
        check_segment("slice", slice)?;
        let mut catalog = self.check_spaces(from, to).await?;

        let name = edge_name(from, to);
        let inverse = edge_name(to, from);
        let mut edges = self.slice_edges(slice).await?;
        if let Some(existing) = edges.iter().find(|e| e.name == name || e.name == inverse) {
            return Err(VsrError::Conflict(format!(
                "Edge {} is already declared for {}",
                existing.name,
                self.slice_path(slice)
            )));
        }

        let descriptor = kind.descriptor(&name);
        edges.push(descriptor.clone());
        write_json(self.io.as_ref(), &self.edges_path(slice), &edges).await?;

        match catalog.slices.iter_mut().find(|s| s.name == slice) {
            Some(entry) => {
                if !entry.transforms.contains(&name) {
                    entry.transforms.push(name.clone());
                }
            }
            None => catalog.slices.push(SliceEntry {
                name: slice.to_string(),
                transforms: vec![name.clone()],
            }),
        }
        write_json(self.io.as_ref(), &self.catalog_path(), &catalog).await?;

        info!(version = %self.version, slice, edge = %name, kind = %kind, "declared edge");
        Ok(descriptor)
    }

    /// Find the stored edge relating `from` and `to`
    ///
    /// The literal name wins over the inverse; the whole list is scanned for
    /// each before giving up.
    pub async fn find_edge(
        &self,
        slice: &str,
        from: &str,
        to: &str,
    ) -> Result<(EdgeDescriptor, EdgeDirection)> {
        let name = edge_name(from, to);
        let inverse = edge_name(to, from);
        let edges = self.slice_edges(slice).await?;

        if let Some(edge) = edges.iter().find(|e| e.name == name) {
            return Ok((edge.clone(), EdgeDirection::Forward));
        }
        if let Some(edge) = edges.iter().find(|e| e.name == inverse) {
            return Ok((edge.clone(), EdgeDirection::Inverse));
        }
        Err(VsrError::TransformNotFound {
            edge: name,
            path: self.slice_path(slice),
        })
    }

    /// Store the transform of edge `from -> to` for one (stack, channel) pair
    ///
    /// `matrix` holds the 9 row-major entries of `A` and `translation` the 3
    /// entries of `t`, for `p' = p·A + t`.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_instance(
        &self,
        slice: &str,
        from: &str,
        to: &str,
        stack: usize,
        channel: usize,
        matrix: &[f64],
        translation: &[f64],
    ) -> Result<()> {
        let transform = AffineTransform::from_params(matrix, translation)?;
        self.save_transform(slice, from, to, stack, channel, &transform)
            .await
    }

    /// Store an already built transform, see [`save_instance`](Self::save_instance)
    ///
    /// An undeclared edge is declared as affine/tfm once the instance file
    /// is written.
    pub async fn save_transform(
        &self,
        slice: &str,
        from: &str,
        to: &str,
        stack: usize,
        channel: usize,
        transform: &AffineTransform,
    ) -> Result<()> {
        self.mode.ensure_writable("save transform")?;
        check_segment("slice", slice)?;

        let (kind, declared) = match self.find_edge(slice, from, to).await {
            Ok((edge, EdgeDirection::Forward)) => (TransformKind::from_edge(&edge)?, true),
            Ok((edge, EdgeDirection::Inverse)) => {
                return Err(VsrError::Conflict(format!(
                    "Edge {} is stored as its inverse {} in {}",
                    edge_name(from, to),
                    edge.name,
                    self.slice_path(slice)
                )))
            }
            Err(VsrError::TransformNotFound { .. }) => {
                self.check_spaces(from, to).await?;
                (TransformKind::AffineTfm, false)
            }
            Err(e) => return Err(e),
        };

        let name = edge_name(from, to);
        let path = self.instance_path(slice, &name, kind, stack, channel);
        self.io
            .write_new(&path, &kind.encode(transform))
            .await
            .map_err(|e| match e {
                VsrError::AlreadyExists(_) => {
                    VsrError::Conflict(format!("Transform instance {} already exists", path))
                }
                other => other,
            })?;
        debug!(path = %path, "wrote transform instance");

        // Catalog last: a failure here leaves an unreferenced instance file.
        if !declared {
            self.declare_edge_kind(slice, from, to, kind).await?;
        }
        info!(version = %self.version, slice, edge = %name, stack, channel, "saved transform");
        Ok(())
    }

    /// Transform from `from` to `to` for one (stack, channel) pair
    ///
    /// When only the opposite edge is stored its transform is inverted.
    pub async fn load_instance(
        &self,
        slice: &str,
        from: &str,
        to: &str,
        stack: Option<usize>,
        channel: Option<usize>,
    ) -> Result<AffineTransform> {
        let (Some(stack), Some(channel)) = (stack, channel) else {
            return Err(VsrError::Validation(
                "Affine transforms are stored per stack and channel, both indices are required"
                    .to_string(),
            ));
        };

        let (edge, direction) = self.find_edge(slice, from, to).await?;
        let kind = TransformKind::from_edge(&edge)?;
        let path = self.instance_path(slice, &edge.name, kind, stack, channel);
        let bytes = self.io.read(&path).await.map_err(|e| match e {
            VsrError::NotFound(_) => VsrError::NotFound(format!("Transform instance {}", path)),
            other => other,
        })?;
        let transform = kind.decode(&bytes)?;

        match direction {
            EdgeDirection::Forward => Ok(transform),
            EdgeDirection::Inverse => transform.inverse(),
        }
    }

    /// Map a region from `from` to `to` space
    ///
    /// The region is in physical units; a point is a region with
    /// `start == stop`.
    pub async fn apply(
        &self,
        slice: &str,
        roi: &PhysicalRoi,
        from: &str,
        to: &str,
        stack: Option<usize>,
        channel: Option<usize>,
    ) -> Result<PhysicalRoi> {
        let transform = self.load_instance(slice, from, to, stack, channel).await?;
        Ok(roi.transform(&transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIOManager;

    const SHEAR: [f64; 9] = [2.0, 0.0, 0.0, -0.5, 1.0, 0.0, 0.0, 0.0, 1.0];

    async fn graph() -> (Arc<dyn IOManager>, TransformGraph) {
        let io: Arc<dyn IOManager> = Arc::new(MemoryIOManager::new());
        let graph = TransformGraph::new(io.clone(), "xxx_20250525", AccessMode::Write).unwrap();
        graph.declare_spaces(&["raw", "ortho", "brain"]).await.unwrap();
        (io, graph)
    }

    #[tokio::test]
    async fn test_declare_spaces_is_idempotent() {
        let (_io, graph) = graph().await;
        graph.declare_spaces(&["ortho", "atlas"]).await.unwrap();
        assert_eq!(
            graph.catalog().await.unwrap().spaces,
            vec!["raw", "ortho", "brain", "atlas"]
        );
    }

    #[tokio::test]
    async fn test_declare_edge_updates_both_catalogs() {
        let (_io, graph) = graph().await;
        graph
            .declare_edge("slice_1_10x", "raw", "ortho", "affine", "tfm")
            .await
            .unwrap();

        let edges = graph.slice_edges("slice_1_10x").await.unwrap();
        assert_eq!(edges, vec![TransformKind::AffineTfm.descriptor("raw_to_ortho")]);
        let catalog = graph.catalog().await.unwrap();
        assert_eq!(
            catalog.slice("slice_1_10x").unwrap().transforms,
            vec!["raw_to_ortho"]
        );
    }

    #[tokio::test]
    async fn test_declare_edge_conflicts() {
        let (_io, graph) = graph().await;
        graph
            .declare_edge("slice_1_10x", "raw", "ortho", "affine", "tfm")
            .await
            .unwrap();

        for (from, to) in [("raw", "ortho"), ("ortho", "raw")] {
            let err = graph
                .declare_edge("slice_1_10x", from, to, "affine", "tfm")
                .await
                .unwrap_err();
            assert!(matches!(err, VsrError::Conflict(_)));
        }

        let err = graph
            .declare_edge("slice_1_10x", "raw", "moon", "affine", "tfm")
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::Validation(_)));

        let err = graph
            .declare_edge("slice_1_10x", "ortho", "brain", "bspline", "h5")
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::UnsupportedTransformKind { .. }));
    }

    #[tokio::test]
    async fn test_save_and_load_instances() {
        let (io, graph) = graph().await;
        graph
            .save_instance("slice_1_10x", "raw", "ortho", 0, 1, &SHEAR, &[1.0, 2.0, 3.0])
            .await
            .unwrap();
        assert!(io
            .exists("visor_recon_transforms/xxx_20250525/slice_1_10x/raw_to_ortho/0/1/affine.tfm")
            .await
            .unwrap());

        // A second instance of the now declared edge
        graph
            .save_instance("slice_1_10x", "raw", "ortho", 1, 1, &SHEAR, &[0.0; 3])
            .await
            .unwrap();
        assert_eq!(graph.slice_edges("slice_1_10x").await.unwrap().len(), 1);

        let forward = graph
            .load_instance("slice_1_10x", "raw", "ortho", Some(0), Some(1))
            .await
            .unwrap();
        assert_eq!(forward, AffineTransform::from_params(&SHEAR, &[1.0, 2.0, 3.0]).unwrap());

        let backward = graph
            .load_instance("slice_1_10x", "ortho", "raw", Some(0), Some(1))
            .await
            .unwrap();
        let p = [3.0, -2.0, 7.0];
        let round = backward.apply_point(&forward.apply_point(&p));
        for i in 0..3 {
            assert!((round[i] - p[i]).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_save_instance_is_create_only() {
        let (_io, graph) = graph().await;
        graph
            .save_instance("slice_1_10x", "raw", "ortho", 0, 0, &SHEAR, &[0.0; 3])
            .await
            .unwrap();

        let err = graph
            .save_instance("slice_1_10x", "raw", "ortho", 0, 0, &SHEAR, &[0.0; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::Conflict(_)));

        let err = graph
            .save_instance("slice_1_10x", "ortho", "raw", 0, 0, &SHEAR, &[0.0; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::Conflict(_)));

        let err = graph
            .save_instance("slice_1_10x", "raw", "ortho", 0, 1, &SHEAR[..8], &[0.0; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::Validation(_)));
    }

    #[tokio::test]
    async fn test_load_errors() {
        let (_io, graph) = graph().await;
        graph
            .declare_edge("slice_1_10x", "raw", "ortho", "affine", "tfm")
            .await
            .unwrap();

        let err = graph
            .load_instance("slice_1_10x", "raw", "ortho", Some(0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::Validation(_)));

        let err = graph
            .load_instance("slice_1_10x", "ortho", "brain", Some(0), Some(0))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transform ortho_to_brain is not in visor_recon_transforms/xxx_20250525/slice_1_10x"
        );

        // Declared, but no instance stored for this pair
        let err = graph
            .load_instance("slice_1_10x", "raw", "ortho", Some(0), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_only_graph() {
        let (io, _graph) = graph().await;
        let graph = TransformGraph::new(io, "xxx_20250525", AccessMode::ReadOnly).unwrap();
        assert!(graph.catalog().await.is_ok());
        let err = graph.declare_spaces(&["atlas"]).await.unwrap_err();
        assert!(matches!(err, VsrError::PermissionDenied(_)));
        let err = graph
            .save_instance("slice_1_10x", "raw", "ortho", 0, 0, &SHEAR, &[0.0; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VsrError::PermissionDenied(_)));
    }
}
