//! Overlap test between the covariance hyperellipsoids of two point clouds.
//!
//! An ellipsoid with centre `c` and covariance `Σ` at scale `s` is the set
//! `{x : (x - c)ᵗ Σ⁻¹ (x - c) ≤ s²}`. The test whitens the space with the
//! inverse Cholesky factor of the first ellipsoid, so that it becomes the unit
//! ball at the origin, then checks the point of the second ellipsoid's boundary
//! that lies on the ray from its centre towards the origin.

use nalgebra::{Cholesky, DMatrix, DVector};
use psp_core::{Chain, ErrorInfo, PspError};

use crate::diagnostics::{Diagnostic, DiagnosticSink};

/// Scale used when callers do not choose one.
pub const DEFAULT_SCALE: f64 = 2.0;

/// Mean absolute asymmetry tolerated before a diagnostic is raised.
pub const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Centre and covariance describing a point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Ellipsoid {
    center: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl Ellipsoid {
    /// Builds an ellipsoid from an explicit centre and covariance.
    pub fn new(center: DVector<f64>, covariance: DMatrix<f64>) -> Result<Self, PspError> {
        if center.is_empty() {
            return Err(PspError::Numerical(ErrorInfo::new(
                "dimension-mismatch",
                "ellipsoid centre has no coordinates",
            )));
        }
        if covariance.nrows() != center.len() || covariance.ncols() != center.len() {
            return Err(PspError::Numerical(
                ErrorInfo::new(
                    "dimension-mismatch",
                    "covariance must be square with the centre's dimension",
                )
                .with_context("center", center.len())
                .with_context("rows", covariance.nrows())
                .with_context("cols", covariance.ncols()),
            ));
        }
        Ok(Self { center, covariance })
    }

    /// Builds an ellipsoid from row-major plain vectors.
    pub fn from_rows(center: &[f64], covariance: &[Vec<f64>]) -> Result<Self, PspError> {
        let dim = center.len();
        if covariance.len() != dim || covariance.iter().any(|row| row.len() != dim) {
            return Err(PspError::Numerical(
                ErrorInfo::new("dimension-mismatch", "covariance rows do not match the centre")
                    .with_context("dimension", dim),
            ));
        }
        let matrix = DMatrix::from_fn(dim, dim, |i, j| covariance[i][j]);
        Self::new(DVector::from_column_slice(center), matrix)
    }

    /// Sample mean and sample covariance of `samples`.
    ///
    /// Dimensions with a variance below `variance_floor` get the floor as their
    /// variance. Fewer samples than dimensions is an error.
    pub fn from_samples(samples: &[Vec<f64>], variance_floor: f64) -> Result<Self, PspError> {
        let dim = samples.first().map_or(0, Vec::len);
        if dim == 0 {
            return Err(PspError::Numerical(ErrorInfo::new(
                "insufficient-samples",
                "cannot build an ellipsoid from an empty sample",
            )));
        }
        if samples.iter().any(|sample| sample.len() != dim) {
            return Err(PspError::Numerical(
                ErrorInfo::new("dimension-mismatch", "samples have differing dimensions")
                    .with_context("dimension", dim),
            ));
        }
        let count = samples.len();
        if count < dim {
            return Err(PspError::Numerical(
                ErrorInfo::new(
                    "insufficient-samples",
                    "fewer samples than parameter dimensions",
                )
                .with_context("samples", count)
                .with_context("dimension", dim)
                .with_hint("advance the chain further before testing it"),
            ));
        }

        let mut center = DVector::<f64>::zeros(dim);
        for sample in samples {
            for (slot, value) in sample.iter().enumerate() {
                center[slot] += value;
            }
        }
        center /= count as f64;

        let mut covariance = DMatrix::<f64>::zeros(dim, dim);
        for sample in samples {
            for i in 0..dim {
                let di = sample[i] - center[i];
                for j in i..dim {
                    covariance[(i, j)] += di * (sample[j] - center[j]);
                }
            }
        }
        let denominator = count.saturating_sub(1).max(1) as f64;
        for i in 0..dim {
            for j in i..dim {
                let value = covariance[(i, j)] / denominator;
                covariance[(i, j)] = value;
                covariance[(j, i)] = value;
            }
            if covariance[(i, i)] < variance_floor {
                covariance[(i, i)] = variance_floor;
            }
        }
        Ok(Self { center, covariance })
    }

    /// Ellipsoid of the points visited by `chain`.
    pub fn from_chain<P>(chain: &Chain<P>, variance_floor: f64) -> Result<Self, PspError> {
        Self::from_samples(chain.all_parms(), variance_floor)
    }

    /// Centre of the ellipsoid.
    pub fn center(&self) -> &DVector<f64> {
        &self.center
    }

    /// Unscaled covariance of the ellipsoid.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Number of coordinates.
    pub fn dimension(&self) -> usize {
        self.center.len()
    }
}

/// Returns `U` with `matrix = Uᵗ U`.
pub(crate) fn upper_factor(matrix: &DMatrix<f64>, which: &str) -> Result<DMatrix<f64>, PspError> {
    Cholesky::new(matrix.clone())
        .map(|chol| chol.l().transpose())
        .ok_or_else(|| {
            PspError::Numerical(
                ErrorInfo::new(
                    "covariance-not-positive-definite",
                    "Cholesky decomposition failed",
                )
                .with_context("matrix", which)
                .with_context("dimension", matrix.nrows())
                .with_hint("samples may be collinear or too few"),
            )
        })
}

fn invert_upper(upper: &DMatrix<f64>, which: &str) -> Result<DMatrix<f64>, PspError> {
    let identity = DMatrix::<f64>::identity(upper.nrows(), upper.ncols());
    upper.solve_upper_triangular(&identity).ok_or_else(|| {
        PspError::Numerical(
            ErrorInfo::new("covariance-not-positive-definite", "Cholesky factor is singular")
                .with_context("matrix", which),
        )
    })
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Returns the symmetric part of `matrix`, reporting a diagnostic when the
/// mean absolute difference from its transpose exceeds [`SYMMETRY_TOLERANCE`].
pub(crate) fn symmetrized(matrix: DMatrix<f64>, sink: &dyn DiagnosticSink) -> DMatrix<f64> {
    let transposed = matrix.transpose();
    let cells = (matrix.nrows() * matrix.ncols()).max(1) as f64;
    let asymmetry = (&matrix - &transposed)
        .iter()
        .map(|value| value.abs())
        .sum::<f64>()
        / cells;
    if asymmetry > SYMMETRY_TOLERANCE {
        sink.report(Diagnostic::AsymmetricWhitenedCovariance {
            mean_abs_difference: asymmetry,
        });
    }
    (matrix + transposed) * 0.5
}

/// Decides whether the two ellipsoids overlap at the given scale.
///
/// Besides the exact boundary check, the pair is also reported as
/// intersecting when the tested boundary point and the second centre have
/// opposite signs on every axis of the whitened frame.
pub fn intersects(
    first: &Ellipsoid,
    second: &Ellipsoid,
    scale: f64,
    sink: &dyn DiagnosticSink,
) -> Result<bool, PspError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(PspError::Config(
            ErrorInfo::new("invalid-scale", "intersection scale must be positive")
                .with_context("scale", scale),
        ));
    }
    if first.dimension() != second.dimension() {
        return Err(PspError::Numerical(
            ErrorInfo::new("dimension-mismatch", "ellipsoids live in different spaces")
                .with_context("first", first.dimension())
                .with_context("second", second.dimension()),
        ));
    }
    let factor = scale * scale;
    let cov1 = &first.covariance * factor;
    let cov2 = &second.covariance * factor;

    let inv1 = invert_upper(&upper_factor(&cov1, "first")?, "first")?;
    let inv1_t = inv1.transpose();

    let q2b = symmetrized(&inv1_t * &cov2 * &inv1, sink);
    let c2b = &inv1_t * (&second.center - &first.center);
    if c2b.iter().all(|value| *value == 0.0) {
        return Ok(true);
    }

    let upper2 = upper_factor(&q2b, "second-whitened")?;
    let inv2 = invert_upper(&upper2, "second-whitened")?;
    let c2c = (c2b.transpose() * &inv2).transpose();
    let v2c = -&c2c / c2c.norm();
    let test_point = upper2.transpose() * v2c + &c2b;

    if test_point.dot(&test_point) < 1.0 {
        return Ok(true);
    }
    Ok(test_point
        .iter()
        .zip(c2b.iter())
        .all(|(a, b)| sign(*a) != sign(*b)))
}

/// Overlap test on the sample ellipsoids of two chains.
pub fn chains_intersect<P>(
    first: &Chain<P>,
    second: &Chain<P>,
    scale: f64,
    variance_floor: f64,
    sink: &dyn DiagnosticSink,
) -> Result<bool, PspError> {
    let e1 = Ellipsoid::from_chain(first, variance_floor)?;
    let e2 = Ellipsoid::from_chain(second, variance_floor)?;
    intersects(&e1, &e2, scale, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;

    fn diag(center: &[f64], variances: &[f64]) -> Ellipsoid {
        Ellipsoid::new(
            DVector::from_column_slice(center),
            DMatrix::from_diagonal(&DVector::from_column_slice(variances)),
        )
        .unwrap()
    }

    #[test]
    fn upper_factor_reconstructs_matrix() {
        let matrix = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let upper = upper_factor(&matrix, "test").unwrap();
        let rebuilt = upper.transpose() * &upper;
        assert!((rebuilt - matrix).norm() < 1e-12);
        assert_eq!(upper[(1, 0)], 0.0);
    }

    #[test]
    fn touching_unit_circles_overlap_just_inside() {
        let sink = CollectingSink::new();
        let a = diag(&[0.0, 0.0], &[1.0, 1.0]);
        let near = diag(&[3.9, 0.0], &[1.0, 1.0]);
        let far = diag(&[4.1, 0.0], &[1.0, 1.0]);
        assert!(intersects(&a, &near, 2.0, &sink).unwrap());
        assert!(!intersects(&a, &far, 2.0, &sink).unwrap());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn asymmetric_whitened_matrix_is_reported_and_symmetrised() {
        let sink = CollectingSink::new();
        let skewed = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.3, 1.0]);
        let fixed = symmetrized(skewed, &sink);
        let expected = DMatrix::from_row_slice(2, 2, &[2.0, 0.4, 0.4, 1.0]);
        assert!((fixed - expected).norm() < 1e-12);
        match sink.events().as_slice() {
            [Diagnostic::AsymmetricWhitenedCovariance {
                mean_abs_difference,
            }] => assert!((mean_abs_difference - 0.1).abs() < 1e-12),
            other => panic!("unexpected diagnostics {other:?}"),
        }
    }

    #[test]
    fn rounding_level_asymmetry_is_tolerated() {
        let sink = CollectingSink::new();
        let nearly = DMatrix::from_row_slice(2, 2, &[1.0, 0.25, 0.25 + 1e-14, 1.0]);
        symmetrized(nearly, &sink);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn sign_treats_zero_as_its_own_class() {
        assert_eq!(sign(0.0), 0);
        assert_eq!(sign(-0.0), 0);
        assert_eq!(sign(2.0), 1);
        assert_eq!(sign(-2.0), -1);
    }

    #[test]
    fn zero_variance_dimension_is_floored() {
        let samples = vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]];
        let ellipsoid = Ellipsoid::from_samples(&samples, 1e-6).unwrap();
        assert!((ellipsoid.covariance()[(0, 0)] - 1.0).abs() < 1e-12);
        assert_eq!(ellipsoid.covariance()[(1, 1)], 1e-6);
        assert!((ellipsoid.center()[0] - 1.0).abs() < 1e-12);
    }
}
