//! ITK transform files (`.tfm`, "Insight Transform File V1.0")
//!
//! ITK maps column vectors, `y = M·(x - c) + c + t`, so the stored 3×3
//! parameters are the transpose of the row-vector matrix used by
//! [`AffineTransform`]. `c` is the `FixedParameters` centre.

use super::affine::AffineTransform;
use crate::error::{Result, VsrError};

const HEADER: &str = "#Insight Transform File V1.0";

/// Transform class names accepted on read
const AFFINE_CLASSES: &[&str] = &[
    "AffineTransform_double_3_3",
    "MatrixOffsetTransformBase_double_3_3",
];

/// Serialize an affine transform as an ITK transform file
pub fn write_tfm(transform: &AffineTransform) -> String {
    let m = transform.matrix();
    let t = transform.translation();
    let mut params = Vec::with_capacity(12);
    for row in 0..3 {
        for col in 0..3 {
            params.push(m[col][row]);
        }
    }
    params.extend_from_slice(t);

    format!(
        "{}\n#Transform 0\nTransform: {}\nParameters: {}\nFixedParameters: 0 0 0\n",
        HEADER,
        AFFINE_CLASSES[0],
        join(&params)
    )
}

/// Parse the first transform of an ITK transform file
pub fn read_tfm(text: &str) -> Result<AffineTransform> {
    let mut class = None;
    let mut params = None;
    let mut fixed = None;

    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if line.starts_with('#') {
            continue;
        }
        let value = value.trim();
        match key.trim() {
            // Only the first transform of a composite file is read
            "Transform" if class.is_some() => break,
            "Transform" => class = Some(value.to_string()),
            "Parameters" => params = Some(parse_values(value)?),
            "FixedParameters" => fixed = Some(parse_values(value)?),
            _ => {}
        }
    }

    let class = class.ok_or_else(|| invalid("missing 'Transform' line"))?;
    if !AFFINE_CLASSES.contains(&class.as_str()) {
        return Err(invalid(&format!("unsupported transform class '{}'", class)));
    }
    let params = params.ok_or_else(|| invalid("missing 'Parameters' line"))?;
    if params.len() != 12 {
        return Err(invalid(&format!(
            "expected 12 parameters, found {}",
            params.len()
        )));
    }
    let center = match fixed {
        Some(values) if values.len() == 3 => [values[0], values[1], values[2]],
        Some(values) if values.is_empty() => [0.0; 3],
        Some(values) => {
            return Err(invalid(&format!(
                "expected 3 fixed parameters, found {}",
                values.len()
            )))
        }
        None => [0.0; 3],
    };

    // M is stored row-major; the row-vector matrix is its transpose.
    let mut matrix = [[0.0; 3]; 3];
    for row in 0..3 {
        for col in 0..3 {
            matrix[col][row] = params[row * 3 + col];
        }
    }
    let mut translation = [0.0; 3];
    for (i, t) in translation.iter_mut().enumerate() {
        let m_c: f64 = (0..3).map(|j| params[i * 3 + j] * center[j]).sum();
        *t = params[9 + i] + center[i] - m_c;
    }
    Ok(AffineTransform::new(matrix, translation))
}

fn parse_values(value: &str) -> Result<Vec<f64>> {
    value
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| invalid(&format!("'{}' is not a number", v)))
        })
        .collect()
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn invalid(message: &str) -> VsrError {
    VsrError::Metadata(format!("Invalid transform file: {}", message))
}
