//! 3D affine transforms and physical regions

use crate::error::{Result, VsrError};

/// 3D affine transform in row-vector form, `p' = p·A + t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn new(matrix: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            matrix,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            [0.0; 3],
        )
    }

    /// Build from a row-major 3×3 matrix and a translation vector
    ///
    /// Fails with `Validation` unless exactly 9 + 3 parameters are given.
    pub fn from_params(matrix: &[f64], translation: &[f64]) -> Result<Self> {
        if matrix.len() != 9 || translation.len() != 3 {
            return Err(VsrError::Validation(format!(
                "Affine parameters must be 9 matrix + 3 translation values, got {} + {}",
                matrix.len(),
                translation.len()
            )));
        }
        if matrix.iter().chain(translation).any(|v| !v.is_finite()) {
            return Err(VsrError::Validation(
                "Affine parameters must be finite".to_string(),
            ));
        }
        let mut m = [[0.0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            row.copy_from_slice(&matrix[i * 3..i * 3 + 3]);
        }
        let mut t = [0.0; 3];
        t.copy_from_slice(translation);
        Ok(Self::new(m, t))
    }

    pub fn matrix(&self) -> &[[f64; 3]; 3] {
        &self.matrix
    }

    pub fn translation(&self) -> &[f64; 3] {
        &self.translation
    }

    /// Row-major matrix entries
    pub fn matrix_params(&self) -> [f64; 9] {
        let mut params = [0.0; 9];
        for (i, row) in self.matrix.iter().enumerate() {
            params[i * 3..i * 3 + 3].copy_from_slice(row);
        }
        params
    }

    pub fn apply_point(&self, p: &[f64; 3]) -> [f64; 3] {
        let mut out = self.translation;
        for (j, o) in out.iter_mut().enumerate() {
            for (i, pi) in p.iter().enumerate() {
                *o += pi * self.matrix[i][j];
            }
        }
        out
    }

    pub fn apply_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        points.iter().map(|p| self.apply_point(p)).collect()
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.matrix;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Transform undoing this one: `A' = A⁻¹`, `t' = -t·A⁻¹`
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(VsrError::Validation(
                "Affine matrix is singular and cannot be inverted".to_string(),
            ));
        }

        let m = &self.matrix;
        let cofactor = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        // inv[i][j] = cofactor(j, i) / det
        let inv = [
            [
                cofactor(1, 2, 1, 2) / det,
                -cofactor(0, 2, 1, 2) / det,
                cofactor(0, 1, 1, 2) / det,
            ],
            [
                -cofactor(1, 2, 0, 2) / det,
                cofactor(0, 2, 0, 2) / det,
                -cofactor(0, 1, 0, 2) / det,
            ],
            [
                cofactor(1, 2, 0, 1) / det,
                -cofactor(0, 2, 0, 1) / det,
                cofactor(0, 1, 0, 1) / det,
            ],
        ];

        let linear = Self::new(inv, [0.0; 3]);
        let shifted = linear.apply_point(&self.translation);
        Ok(Self::new(inv, [-shifted[0], -shifted[1], -shifted[2]]))
    }

    /// Transform applying `self` first and `next` second
    pub fn compose(&self, next: &AffineTransform) -> Self {
        let mut matrix = [[0.0; 3]; 3];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = (0..3).map(|k| self.matrix[i][k] * next.matrix[k][j]).sum();
            }
        }
        Self::new(matrix, next.apply_point(&self.translation))
    }
}

/// Axis-aligned box in physical coordinates; a point has `start == stop`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalRoi {
    pub start: [f64; 3],
    pub stop: [f64; 3],
}

impl PhysicalRoi {
    pub fn new(start: [f64; 3], stop: [f64; 3]) -> Self {
        Self { start, stop }
    }

    pub fn point(p: [f64; 3]) -> Self {
        Self::new(p, p)
    }

    /// Box spanned by voxel ranges `start..stop` scaled by a per-axis voxel size
    pub fn from_voxels(start: [u64; 3], stop: [u64; 3], scale: [f64; 3]) -> Self {
        let mut roi = Self::new([0.0; 3], [0.0; 3]);
        for axis in 0..3 {
            roi.start[axis] = start[axis] as f64 * scale[axis];
            roi.stop[axis] = stop[axis] as f64 * scale[axis];
        }
        roi
    }

    pub fn is_point(&self) -> bool {
        self.start == self.stop
    }

    /// The 8 corners of the box (repeated for degenerate axes)
    pub fn corners(&self) -> [[f64; 3]; 8] {
        let mut corners = [[0.0; 3]; 8];
        for (n, corner) in corners.iter_mut().enumerate() {
            for (axis, value) in corner.iter_mut().enumerate() {
                *value = if n & (1 << axis) == 0 {
                    self.start[axis]
                } else {
                    self.stop[axis]
                };
            }
        }
        corners
    }

    /// Bounding box of the transformed corners
    pub fn transform(&self, transform: &AffineTransform) -> Self {
        if self.is_point() {
            return Self::point(transform.apply_point(&self.start));
        }
        let mapped = transform.apply_points(&self.corners());
        let mut start = [f64::INFINITY; 3];
        let mut stop = [f64::NEG_INFINITY; 3];
        for p in &mapped {
            for axis in 0..3 {
                start[axis] = start[axis].min(p[axis]);
                stop[axis] = stop[axis].max(p[axis]);
            }
        }
        Self::new(start, stop)
    }
}
