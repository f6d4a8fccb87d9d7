//! Cholesky factorization and triangular solves for the symmetric
//! positive-definite 2×2 matrices that arise as blade-cluster covariances.
//!
//! [`cholesky`] is the single numerical-degeneracy gate of the whole
//! pipeline: every covariance is pushed through it once per EM iteration,
//! and a `None` there is what ultimately becomes a recoverable
//! [`FitError::DegenerateCovariance`](crate::mixture::FitError) for the
//! frame. Nothing downstream re-checks for singular matrices.

use crate::{Matrix2, Vector2};

/// Smallest diagonal pivot accepted by [`cholesky`].
///
/// A pivot below this bound means the covariance ellipse has collapsed to
/// (numerically) zero thickness and whitening through the factor would
/// divide by a vanishing quantity.
pub const MIN_PIVOT: f64 = 1e-8;

/// Factor a symmetric positive-definite matrix `M` into `L·Lᵗ = M` with `L`
/// lower-triangular.
///
/// Returns `None` when `M` is not usable: a diagonal entry would be the
/// square root of a negative number, or a diagonal pivot falls below
/// [`MIN_PIVOT`]. Callers must treat `None` as a recoverable degeneracy,
/// not a bug.
pub fn cholesky(m: &Matrix2) -> Option<Matrix2> {
    if m[(0, 0)] < 0.0 {
        return None;
    }
    let l00 = m[(0, 0)].sqrt();
    if l00.is_nan() || l00 < MIN_PIVOT {
        return None;
    }

    let l10 = m[(1, 0)] / l00;

    let rem = m[(1, 1)] - l10 * l10;
    if rem < 0.0 {
        return None;
    }
    let l11 = rem.sqrt();
    if l11.is_nan() || l11 < MIN_PIVOT {
        return None;
    }

    Some(Matrix2::new(l00, 0.0, l10, l11))
}

/// Solve `L·x = b` for lower-triangular `L` by forward substitution:
/// `x[i] = (b[i] − Σ_{j<i} L[i][j]·x[j]) / L[i][i]`.
///
/// Undefined for a zero diagonal; the caller must have validated `L`
/// through [`cholesky`] first.
pub fn solve_lower_triangular(l: &Matrix2, b: Vector2) -> Vector2 {
    let x0 = b[0] / l[(0, 0)];
    let x1 = (b[1] - l[(1, 0)] * x0) / l[(1, 1)];
    Vector2::new(x0, x1)
}
