use crate::error::{GridError, Result};
use ndarray::{ArrayBase, Data, Ix1};

/// Pearson correlation of two equal-length vectors.
///
/// Moments use the population formula and are accumulated in one pass. When
/// either vector has zero standard deviation (constant or all-zero input, or
/// `n == 0`) the result is `0.0` rather than `NaN`.
///
/// The cross-product sum is divided by `std(a) * std(b)` and then once more by
/// `n`; with population deviations that last step makes it the classical
/// coefficient, so `corr(a, a) == 1` up to rounding for non-constant `a`.
pub fn corr(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "corr requires equal-length vectors");
    let n = a.len();
    if n == 0 {
        return 0.0;
    }

    let mut a_mean = 0.0;
    let mut b_mean = 0.0;
    let mut aa_mean = 0.0;
    let mut bb_mean = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        a_mean += x;
        b_mean += y;
        aa_mean += x * x;
        bb_mean += y * y;
    }

    let nf = n as f64;
    a_mean /= nf;
    b_mean /= nf;
    aa_mean /= nf;
    bb_mean /= nf;

    let a_std = (aa_mean - a_mean * a_mean).sqrt();
    let b_std = (bb_mean - b_mean * b_mean).sqrt();

    let mut rtn = 0.0;
    if a_std != 0.0 && b_std != 0.0 {
        for (&x, &y) in a.iter().zip(b) {
            rtn += (x - a_mean) * (y - b_mean);
        }
        rtn /= a_std * b_std;
    }

    rtn / nf
}

/// Checked pairwise entry point over two 1-D arrays.
///
/// Non-contiguous views are copied into standard layout before the kernel runs.
pub fn pearson_pair<S1, S2>(a: &ArrayBase<S1, Ix1>, b: &ArrayBase<S2, Ix1>) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    if a.len() != b.len() {
        return Err(GridError::DimensionMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }

    let a = a.as_standard_layout();
    let b = b.as_standard_layout();
    let a = a
        .as_slice()
        .ok_or_else(|| GridError::Type("vector is not contiguous".into()))?;
    let b = b
        .as_slice()
        .ok_or_else(|| GridError::Type("vector is not contiguous".into()))?;

    Ok(corr(a, b))
}
