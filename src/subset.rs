//! Array subsets - the regions a selection resolves to

use crate::error::{Result, VsrError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Hyper-rectangular region of an array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArraySubset {
    start: Vec<u64>,
    shape: Vec<u64>,
}

impl ArraySubset {
    /// Create a subset from its origin and extent
    pub fn new(start: Vec<u64>, shape: Vec<u64>) -> Result<Self> {
        if start.len() != shape.len() {
            return Err(VsrError::InvalidDimensions(
                "Subset start and shape must have the same length".to_string(),
            ));
        }
        Ok(Self { start, shape })
    }

    /// Subset covering an entire array of `shape`
    pub fn full(shape: &[u64]) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape: shape.to_vec(),
        }
    }

    /// Subset from half-open per-axis ranges
    pub fn from_ranges(ranges: &[Range<u64>]) -> Self {
        Self {
            start: ranges.iter().map(|r| r.start).collect(),
            shape: ranges
                .iter()
                .map(|r| r.end.saturating_sub(r.start))
                .collect(),
        }
    }

    pub fn start(&self) -> &[u64] {
        &self.start
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Exclusive end coordinate in each dimension
    pub fn end(&self) -> Vec<u64> {
        self.start
            .iter()
            .zip(self.shape.iter())
            .map(|(s, n)| s + n)
            .collect()
    }

    /// Per-axis half-open ranges
    pub fn ranges(&self) -> Vec<Range<u64>> {
        self.start
            .iter()
            .zip(self.shape.iter())
            .map(|(&s, &n)| s..s + n)
            .collect()
    }

    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&n| n == 0)
    }

    /// The same region as a `zarrs` subset
    pub fn to_zarrs(&self) -> zarrs::array_subset::ArraySubset {
        zarrs::array_subset::ArraySubset::new_with_ranges(&self.ranges())
    }
}
