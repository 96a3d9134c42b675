//! Dense inversion, symmetric diagonalization and random orthogonal matrices.
//!
//! Every routine checks its input and computes into scratch storage; the caller's
//! matrix is only written once the result is known.

use log::debug;

use crate::backend::Transpose;
use crate::blas::mult_dgemm_into;
use crate::error::{MResult, MatrixError, OperationErrorKind};
use crate::method::Uplo;
use crate::{BaseDataMut, Matrix, MatrixData};

const MAX_JACOBI_SWEEPS: usize = 100;

fn require_square_non_empty<S: BaseDataMut>(
    op: &'static str,
    a: &MatrixData<S>,
) -> MResult<usize> {
    if !a.is_square() {
        return Err(MatrixError::op(op, OperationErrorKind::NotSquare(a.shape())));
    }
    if a.is_empty() {
        return Err(MatrixError::op(op, OperationErrorKind::Empty));
    }
    Ok(a.row())
}

fn symmetrized<S: BaseDataMut>(a: &MatrixData<S>, uplo: Uplo) -> MResult<Matrix> {
    let mut s = a.to_matrix();
    s.to_symmetric(uplo)?;
    Ok(s)
}

// Gauss-Jordan with partial pivoting on row-major n x n storage.
fn gauss_jordan(op: &'static str, mut w: Vec<f64>, n: usize) -> MResult<Vec<f64>> {
    let mut inv = vec![0.0; n * n];
    for i in 0..n {
        inv[i * n + i] = 1.0;
    }
    for col in 0..n {
        let mut p = col;
        for r in col + 1..n {
            if w[r * n + col].abs() > w[p * n + col].abs() {
                p = r;
            }
        }
        let pivot = w[p * n + col];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(MatrixError::op(op, OperationErrorKind::Singular));
        }
        if p != col {
            for j in 0..n {
                w.swap(p * n + j, col * n + j);
                inv.swap(p * n + j, col * n + j);
            }
        }
        for j in 0..n {
            w[col * n + j] /= pivot;
            inv[col * n + j] /= pivot;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let f = w[r * n + col];
            if f == 0.0 {
                continue;
            }
            for j in 0..n {
                w[r * n + j] -= f * w[col * n + j];
                inv[r * n + j] -= f * inv[col * n + j];
            }
        }
    }
    Ok(inv)
}

/// Replaces a general square matrix with its inverse.
pub fn invert_gen_matrix<S: BaseDataMut>(a: &mut MatrixData<S>) -> MResult<()> {
    let n = require_square_non_empty("invert_gen_matrix", a)?;
    let inv = gauss_jordan("invert_gen_matrix", a.as_slice().to_vec(), n)?;
    a.as_slice_mut().copy_from_slice(&inv);
    Ok(())
}

/// Replaces a symmetric positive definite matrix, given by its `uplo` triangle, with
/// its full symmetric inverse.
pub fn invert_spd_matrix<S: BaseDataMut>(uplo: Uplo, a: &mut MatrixData<S>) -> MResult<()> {
    let op = "invert_spd_matrix";
    let n = require_square_non_empty(op, a)?;
    let s = symmetrized(a, uplo)?;

    // s = L * Lᵗ
    let mut l = Matrix::new(n, n)?;
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum();
            if i == j {
                let diag = s[(j, j)] - sum;
                if !(diag > 0.0) || !diag.is_finite() {
                    return Err(MatrixError::op(
                        op,
                        OperationErrorKind::NotPositiveDefinite,
                    ));
                }
                l[(j, j)] = diag.sqrt();
            } else {
                l[(i, j)] = (s[(i, j)] - sum) / l[(j, j)];
            }
        }
    }

    // L⁻¹ by forward substitution, column by column
    let mut linv = Matrix::new(n, n)?;
    for j in 0..n {
        linv[(j, j)] = 1.0 / l[(j, j)];
        for i in j + 1..n {
            let sum: f64 = (j..i).map(|k| l[(i, k)] * linv[(k, j)]).sum();
            linv[(i, j)] = -sum / l[(i, i)];
        }
    }

    // s⁻¹ = L⁻ᵗ * L⁻¹
    mult_dgemm_into(1.0, &linv, Transpose::Ordinary, &linv, Transpose::None, 0.0, a)
}

/// Replaces a symmetric matrix, given by its `uplo` triangle, with its full symmetric
/// inverse. The matrix may be indefinite.
pub fn invert_sym_matrix<S: BaseDataMut>(uplo: Uplo, a: &mut MatrixData<S>) -> MResult<()> {
    let op = "invert_sym_matrix";
    let n = require_square_non_empty(op, a)?;
    let s = symmetrized(a, uplo)?;
    let inv = gauss_jordan(op, s.into_vec(), n)?;
    let out = a.as_slice_mut();
    for i in 0..n {
        for j in 0..n {
            out[i * n + j] = 0.5 * (inv[i * n + j] + inv[j * n + i]);
        }
    }
    Ok(())
}

/// Eigen-decomposition of a symmetric matrix given by its `uplo` triangle.
///
/// Returns the eigenvalues in ascending order. On success row `i` of `a` holds the
/// normalized eigenvector of the `i`-th eigenvalue.
pub fn diagonalize_sym_matrix<S: BaseDataMut>(
    uplo: Uplo,
    a: &mut MatrixData<S>,
) -> MResult<Vec<f64>> {
    let op = "diagonalize_sym_matrix";
    if !a.is_square() {
        return Err(MatrixError::op(op, OperationErrorKind::NotSquare(a.shape())));
    }
    let n = a.row();
    let mut s = symmetrized(a, uplo)?.into_vec();
    // eigenvectors are the columns of v
    let mut v = Matrix::identity(n)?.into_vec();

    let norm = s.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mut sweeps = 0;
    loop {
        let off: f64 = (0..n)
            .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
            .map(|(p, q)| s[p * n + q] * s[p * n + q])
            .sum();
        if off.sqrt() <= f64::EPSILON * norm {
            break;
        }
        if !off.is_finite() || sweeps == MAX_JACOBI_SWEEPS {
            return Err(MatrixError::op(
                op,
                OperationErrorKind::NoConvergence(MAX_JACOBI_SWEEPS),
            ));
        }
        sweeps += 1;
        for p in 0..n {
            for q in p + 1..n {
                let apq = s[p * n + q];
                let (app, aqq) = (s[p * n + p], s[q * n + q]);
                if apq == 0.0 {
                    continue;
                }
                // negligible next to both diagonal entries
                if app.abs() + 100.0 * apq.abs() == app.abs()
                    && aqq.abs() + 100.0 * apq.abs() == aqq.abs()
                {
                    s[p * n + q] = 0.0;
                    s[q * n + p] = 0.0;
                    continue;
                }
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
                let c = 1.0 / t.hypot(1.0);
                let sn = t * c;
                for k in 0..n {
                    let (skp, skq) = (s[k * n + p], s[k * n + q]);
                    s[k * n + p] = c * skp - sn * skq;
                    s[k * n + q] = sn * skp + c * skq;
                }
                for k in 0..n {
                    let (spk, sqk) = (s[p * n + k], s[q * n + k]);
                    s[p * n + k] = c * spk - sn * sqk;
                    s[q * n + k] = sn * spk + c * sqk;
                }
                s[p * n + q] = 0.0;
                s[q * n + p] = 0.0;
                for k in 0..n {
                    let (vkp, vkq) = (v[k * n + p], v[k * n + q]);
                    v[k * n + p] = c * vkp - sn * vkq;
                    v[k * n + q] = sn * vkp + c * vkq;
                }
            }
        }
    }
    debug!("{}: {}x{} converged after {} sweeps", op, n, n, sweeps);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| s[i * n + i].total_cmp(&s[j * n + j]));
    let out = a.as_slice_mut();
    for (row, &idx) in order.iter().enumerate() {
        for k in 0..n {
            out[row * n + k] = v[k * n + idx];
        }
    }
    Ok(order.iter().map(|&i| s[i * n + i]).collect())
}

/// Fills a square matrix with a random orthogonal matrix: a uniform `[0, 1)` sample
/// orthonormalized column by column, with the diagonal of the implied `R` positive.
///
/// With `using_fixed_seed` the sample comes from the process-wide generator seeded with
/// 1, so the sequence of results is repeatable across runs.
pub fn set_matrix_random_orthogonal<S: BaseDataMut>(
    q: &mut MatrixData<S>,
    using_fixed_seed: bool,
) -> MResult<()> {
    let op = "set_matrix_random_orthogonal";
    if !q.is_square() {
        return Err(MatrixError::op(op, OperationErrorKind::NotSquare(q.shape())));
    }
    let n = q.row();
    let mut w = Matrix::new(n, n)?;
    if using_fixed_seed {
        w.randomize_seed_fixed(0.0, 1.0)?;
    } else {
        w.randomize(0.0, 1.0)?;
    }

    // modified Gram-Schmidt, two passes per column
    for j in 0..n {
        for _ in 0..2 {
            for i in 0..j {
                let r: f64 = (0..n).map(|k| w[(k, i)] * w[(k, j)]).sum();
                for k in 0..n {
                    w[(k, j)] -= r * w[(k, i)];
                }
            }
        }
        let norm = (0..n).map(|k| w[(k, j)] * w[(k, j)]).sum::<f64>().sqrt();
        if !(norm > f64::EPSILON) {
            return Err(MatrixError::op(op, OperationErrorKind::Singular));
        }
        for k in 0..n {
            w[(k, j)] /= norm;
        }
    }
    q.copy_from(&w)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;
    use crate::{matrix, mult_dgemm, MatrixViewMut};

    fn assert_identity(m: &Matrix, eps: f64) {
        assert!(m.is_square());
        for i in 0..m.row() {
            for j in 0..m.col() {
                let e = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(m[(i, j)], e, epsilon = eps);
            }
        }
    }

    #[test]
    fn test_invert_gen_matrix() {
        let a = matrix![[4, 7, 2], [3, 6, 1], [2, 5, 3]].unwrap();
        let mut inv = a.clone();
        invert_gen_matrix(&mut inv).unwrap();
        assert_identity(&mult_dgemm(&a, &inv).unwrap(), 1e-12);
        assert_identity(&mult_dgemm(&inv, &a).unwrap(), 1e-12);
    }

    #[test]
    fn test_invert_needs_pivoting() {
        let a = matrix![[0, 1], [1, 0]].unwrap();
        let mut inv = a.clone();
        invert_gen_matrix(&mut inv).unwrap();
        assert_eq!(inv, a);
    }

    #[rstest]
    #[case(matrix![[1, 2], [2, 4]].unwrap(), OperationErrorKind::Singular)]
    #[case(Matrix::new(2, 3).unwrap(), OperationErrorKind::NotSquare([2, 3]))]
    #[case(Matrix::default(), OperationErrorKind::Empty)]
    fn test_invert_gen_errors(#[case] a: Matrix, #[case] kind: OperationErrorKind) {
        let mut m = a.clone();
        let e = invert_gen_matrix(&mut m).unwrap_err();
        assert_eq!(e.operation_kind(), Some(&kind));
        assert!(m == a);
    }

    #[rstest]
    #[case(Uplo::Upper)]
    #[case(Uplo::Lower)]
    fn test_invert_spd_matrix(#[case] uplo: Uplo) {
        let a = matrix![[4, 2, 2], [2, 10, 7], [2, 7, 21]].unwrap();
        // only the referenced triangle is read
        let mut m = a.clone();
        match uplo {
            Uplo::Upper => m[(2, 0)] = f64::NAN,
            Uplo::Lower => m[(0, 2)] = f64::NAN,
        }
        invert_spd_matrix(uplo, &mut m).unwrap();
        assert!(m.is_symmetric_within(1e-14));
        assert_identity(&mult_dgemm(&a, &m).unwrap(), 1e-12);
    }

    #[test]
    fn test_invert_spd_rejects_indefinite() {
        let a = matrix![[1, 2], [2, 1]].unwrap();
        let mut m = a.clone();
        let e = invert_spd_matrix(Uplo::Lower, &mut m).unwrap_err();
        assert_eq!(
            e.operation_kind(),
            Some(&OperationErrorKind::NotPositiveDefinite)
        );
        assert_eq!(m, a);

        // indefinite is fine for the symmetric inverse
        invert_sym_matrix(Uplo::Lower, &mut m).unwrap();
        assert!(m.is_symmetric());
        assert_identity(&mult_dgemm(&a, &m).unwrap(), 1e-12);
    }

    #[test]
    fn test_diagonalize_sym_matrix() {
        let a = matrix![[2, -1, 0], [-1, 2, -1], [0, -1, 2]].unwrap();
        let mut v = a.clone();
        let eig = diagonalize_sym_matrix(Uplo::Upper, &mut v).unwrap();
        let s2 = 2f64.sqrt();
        assert_abs_diff_eq!(eig[0], 2.0 - s2, epsilon = 1e-12);
        assert_abs_diff_eq!(eig[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eig[2], 2.0 + s2, epsilon = 1e-12);

        // rows are orthonormal eigenvectors: V * A * Vᵗ is diagonal
        assert_identity(&mult_dgemm(&v, &v.transposed()).unwrap(), 1e-12);
        let d = crate::mult_dgemm_abat(&v, &a).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let e = if i == j { eig[i] } else { 0.0 };
                assert_abs_diff_eq!(d[(i, j)], e, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_diagonalize_diagonal_and_empty() {
        let mut a = matrix![[3, 0], [0, -1]].unwrap();
        let eig = diagonalize_sym_matrix(Uplo::Lower, &mut a).unwrap();
        assert_eq!(eig, vec![-1.0, 3.0]);
        assert_eq!(a, matrix![[0, 1], [1, 0]].unwrap());

        let mut e = Matrix::default();
        assert!(diagonalize_sym_matrix(Uplo::Lower, &mut e).unwrap().is_empty());
        let mut r = Matrix::new(1, 2).unwrap();
        assert!(diagonalize_sym_matrix(Uplo::Lower, &mut r).is_err());
    }

    #[test]
    fn test_random_orthogonal() {
        let mut q = Matrix::new(6, 6).unwrap();
        set_matrix_random_orthogonal(&mut q, true).unwrap();
        assert_identity(&mult_dgemm(&q.transposed(), &q).unwrap(), 1e-12);
        assert_identity(&mult_dgemm(&q, &q.transposed()).unwrap(), 1e-12);

        let mut buf = vec![0.0; 9];
        let mut v = MatrixViewMut::from_slice_mut(3, 3, &mut buf).unwrap();
        set_matrix_random_orthogonal(&mut v, false).unwrap();
        assert_identity(&mult_dgemm(&v.transposed(), &v).unwrap(), 1e-12);

        let mut r = Matrix::new(2, 3).unwrap();
        assert!(set_matrix_random_orthogonal(&mut r, true).is_err());
        assert!(r.is_zeros());
    }
}
