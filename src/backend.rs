//! The linear-algebra kernel capability consumed by the matrix layer.
//!
//! Every routine uses the row-major convention: element `(i, j)` of a stored operand
//! with leading dimension `ld` lives at `x[i * ld + j]`.

use std::str::FromStr;

use lazy_static::lazy_static;
use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::kernels::{self, Gemm};

pub const ENV_NUM_THREADS: &str = "MATRIX_NUM_THREADS";
pub const ENV_PARALLEL_THRESHOLD: &str = "MATRIX_PARALLEL_THRESHOLD";
pub const ENV_CHECK_FINITE: &str = "MATRIX_CHECK_FINITE";

/// How a stored operand enters a product: as stored, or as `opᵗ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    None,
    Ordinary,
}

impl Transpose {
    pub fn is_transpose(&self) -> bool {
        matches!(self, Transpose::Ordinary)
    }

    /// `stored` for `None`, `swapped` for `Ordinary`.
    pub fn forward<T>(&self, stored: T, swapped: T) -> T {
        if self.is_transpose() {
            swapped
        } else {
            stored
        }
    }

    /// Lazy form of [`Transpose::forward`], only the chosen closure runs.
    pub fn call<T>(&self, stored: impl FnOnce() -> T, swapped: impl FnOnce() -> T) -> T {
        if self.is_transpose() {
            swapped()
        } else {
            stored()
        }
    }

    /// Shape of the operand as the product sees it.
    pub fn apply(&self, [rows, cols]: [usize; 2]) -> [usize; 2] {
        self.forward([rows, cols], [cols, rows])
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Parameter positions follow the reference BLAS argument lists.
    #[error("parameter {position} of `{routine}` had an illegal value")]
    IllegalArgument {
        routine: &'static str,
        position: usize,
    },
    #[error("non-finite value in operand `{operand}` of `{routine}`")]
    NonFinite {
        routine: &'static str,
        operand: &'static str,
    },
    #[error("`{routine}` failed: {msg}")]
    Internal { routine: &'static str, msg: String },
}

/// Dense double-precision kernels in the shape of BLAS `dgemm` and `dscal`.
pub trait LinearAlgebraBackend {
    fn name(&self) -> &'static str;

    /// `c = alpha * op(a) * op(b) + beta * c` with `op(a)` of shape `m x k`, `op(b)`
    /// of shape `k x n` and `c` of shape `m x n`.
    ///
    /// When `beta == 0` the previous contents of `c` are ignored.
    #[allow(clippy::too_many_arguments)]
    fn dgemm(
        &self,
        transa: Transpose,
        transb: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        beta: f64,
        c: &mut [f64],
        ldc: usize,
    ) -> Result<(), BackendError>;

    /// `x = alpha * x` over `n` elements spaced `incx` apart.
    fn dscal(&self, n: usize, alpha: f64, x: &mut [f64], incx: usize)
        -> Result<(), BackendError>;
}

fn required_len(rows: usize, cols: usize, ld: usize) -> Option<usize> {
    if rows == 0 || cols == 0 {
        return Some(0);
    }
    (rows - 1).checked_mul(ld)?.checked_add(cols)
}

fn illegal(routine: &'static str, position: usize) -> BackendError {
    BackendError::IllegalArgument { routine, position }
}

/// Argument checks of reference `dgemm`, extended with buffer lengths.
#[allow(clippy::too_many_arguments)]
pub fn check_dgemm_args(
    transa: Transpose,
    transb: Transpose,
    m: usize,
    n: usize,
    k: usize,
    a_len: usize,
    lda: usize,
    b_len: usize,
    ldb: usize,
    c_len: usize,
    ldc: usize,
) -> Result<(), BackendError> {
    let (a_rows, a_cols) = transa.forward((m, k), (k, m));
    let (b_rows, b_cols) = transb.forward((k, n), (n, k));
    if lda < usize::max(1, a_cols) {
        return Err(illegal("dgemm", 8));
    }
    if ldb < usize::max(1, b_cols) {
        return Err(illegal("dgemm", 10));
    }
    if ldc < usize::max(1, n) {
        return Err(illegal("dgemm", 13));
    }
    if required_len(a_rows, a_cols, lda).map_or(true, |r| a_len < r) {
        return Err(illegal("dgemm", 7));
    }
    if required_len(b_rows, b_cols, ldb).map_or(true, |r| b_len < r) {
        return Err(illegal("dgemm", 9));
    }
    if required_len(m, n, ldc).map_or(true, |r| c_len < r) {
        return Err(illegal("dgemm", 12));
    }
    Ok(())
}

/// Argument checks of reference `dscal`, extended with the buffer length.
pub fn check_dscal_args(n: usize, x_len: usize, incx: usize) -> Result<(), BackendError> {
    if incx == 0 {
        return Err(illegal("dscal", 4));
    }
    if required_len(n, 1, incx).map_or(true, |r| x_len < r) {
        return Err(illegal("dscal", 3));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Number of row blocks a large product is split into.
    pub num_threads: usize,
    /// Minimum `m * n * k` (or `n` for `dscal`) before work is split.
    pub parallel_threshold: usize,
    /// Reject NaN and infinite operands instead of computing with them.
    pub check_finite: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            num_threads: num_cpus::get(),
            parallel_threshold: 64 * 64 * 64,
            check_finite: false,
        }
    }
}

impl BackendConfig {
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = usize::max(1, num_threads);
        self
    }

    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    pub fn with_check_finite(mut self, check_finite: bool) -> Self {
        self.check_finite = check_finite;
        self
    }

    /// Defaults overridden by `MATRIX_NUM_THREADS`, `MATRIX_PARALLEL_THRESHOLD` and
    /// `MATRIX_CHECK_FINITE` (`true`/`false`). Malformed values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BackendConfig::default();
        if let Some(n) = parse_var::<usize, _>(&lookup, ENV_NUM_THREADS) {
            config = config.with_num_threads(n);
        }
        if let Some(t) = parse_var::<usize, _>(&lookup, ENV_PARALLEL_THRESHOLD) {
            config = config.with_parallel_threshold(t);
        }
        if let Some(c) = parse_var::<bool, _>(&lookup, ENV_CHECK_FINITE) {
            config = config.with_check_finite(c);
        }
        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}

/// In-process reference kernels, optionally split by rows across the rayon pool.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    config: BackendConfig,
}

impl Default for NativeBackend {
    fn default() -> Self {
        NativeBackend::new(BackendConfig::default())
    }
}

impl NativeBackend {
    pub fn new(config: BackendConfig) -> Self {
        debug!(
            "native backend: {} threads, parallel threshold {}, check finite {}",
            config.num_threads, config.parallel_threshold, config.check_finite
        );
        NativeBackend { config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn split(&self, work: usize, rows: usize) -> Option<usize> {
        let threads = self.config.num_threads;
        if threads <= 1 || rows <= 1 || work < self.config.parallel_threshold {
            return None;
        }
        Some((rows + threads - 1) / threads)
    }
}

fn check_finite(
    routine: &'static str,
    operand: &'static str,
    xs: &[f64],
) -> Result<(), BackendError> {
    if xs.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(BackendError::NonFinite { routine, operand })
    }
}

impl LinearAlgebraBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn dgemm(
        &self,
        transa: Transpose,
        transb: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: f64,
        a: &[f64],
        lda: usize,
        b: &[f64],
        ldb: usize,
        beta: f64,
        c: &mut [f64],
        ldc: usize,
    ) -> Result<(), BackendError> {
        check_dgemm_args(
            transa,
            transb,
            m,
            n,
            k,
            a.len(),
            lda,
            b.len(),
            ldb,
            c.len(),
            ldc,
        )?;
        if m == 0 || n == 0 {
            return Ok(());
        }
        if self.config.check_finite {
            check_finite("dgemm", "alpha", &[alpha])?;
            check_finite("dgemm", "beta", &[beta])?;
            check_finite("dgemm", "a", a)?;
            check_finite("dgemm", "b", b)?;
            if beta != 0.0 {
                check_finite("dgemm", "c", c)?;
            }
        }

        let c = &mut c[..(m - 1) * ldc + n];
        let g = Gemm {
            transa,
            transb,
            n,
            k,
            alpha,
            a,
            lda,
            b,
            ldb,
            beta,
            ldc,
        };
        let work = m.saturating_mul(n).saturating_mul(k);
        match self.split(work, m) {
            Some(rows_per_task) => c
                .par_chunks_mut(rows_per_task * ldc)
                .enumerate()
                .for_each(|(t, block)| kernels::dgemm_rows(&g, t * rows_per_task, block)),
            None => kernels::dgemm_rows(&g, 0, c),
        }
        Ok(())
    }

    fn dscal(
        &self,
        n: usize,
        alpha: f64,
        x: &mut [f64],
        incx: usize,
    ) -> Result<(), BackendError> {
        check_dscal_args(n, x.len(), incx)?;
        if n == 0 {
            return Ok(());
        }
        if self.config.check_finite {
            check_finite("dscal", "alpha", &[alpha])?;
            if x.iter().step_by(incx).take(n).any(|v| !v.is_finite()) {
                return Err(BackendError::NonFinite {
                    routine: "dscal",
                    operand: "x",
                });
            }
        }
        if incx == 1 && self.split(n, n).is_some() {
            x[..n].par_iter_mut().for_each(|v| *v *= alpha);
        } else {
            kernels::dscal(n, alpha, x, incx);
        }
        Ok(())
    }
}

lazy_static! {
    static ref NATIVE_BACKEND: NativeBackend = NativeBackend::new(BackendConfig::from_env());
}

/// The process-wide native backend, configured from the environment on first use.
pub fn native_backend() -> &'static NativeBackend {
    &NATIVE_BACKEND
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::kernels::reference;

    #[test]
    fn test_is_transpose() {
        assert!(!(Transpose::None).is_transpose());
        assert!((Transpose::Ordinary).is_transpose());
        assert_eq!((Transpose::None).forward(1, 2), 1);
        assert_eq!((Transpose::Ordinary).forward(1, 2), 2);
        assert_eq!((Transpose::Ordinary).call(|| "n", || "t"), "t");
        assert_eq!(Transpose::None.apply([2, 5]), [2, 5]);
        assert_eq!(Transpose::Ordinary.apply([2, 5]), [5, 2]);
    }

    #[test]
    fn test_reference_problems_sequential() {
        let backend = NativeBackend::new(BackendConfig::default().with_num_threads(1));
        for (i, problem) in reference::test_dgemm_problems().iter().enumerate() {
            if let Err(err) = problem.check(&backend) {
                panic!("{} on iteration {}. Problem: {:?}", err, i, problem);
            }
        }
    }

    #[test]
    fn test_reference_problems_split() {
        let backend = NativeBackend::new(
            BackendConfig::default()
                .with_num_threads(2)
                .with_parallel_threshold(0),
        );
        for (i, problem) in reference::test_dgemm_problems().iter().enumerate() {
            if let Err(err) = problem.check(&backend) {
                panic!("{} on iteration {}. Problem: {:?}", err, i, problem);
            }
        }
    }

    #[test]
    fn test_split_matches_sequential() {
        let (m, n, k) = (37, 23, 19);
        let a: Vec<f64> = (0..m * k).map(|i| (i as f64 * 0.37).sin()).collect();
        let seq = NativeBackend::new(BackendConfig::default().with_num_threads(1));
        let par = NativeBackend::new(
            BackendConfig::default()
                .with_num_threads(4)
                .with_parallel_threshold(1),
        );
        let mut c1 = vec![1.0; m * n];
        let mut c2 = vec![1.0; m * n];
        // stored n x k, used transposed
        let bt: Vec<f64> = (0..n * k).map(|i| (i as f64 * 0.11).cos()).collect();
        seq.dgemm(
            Transpose::None,
            Transpose::Ordinary,
            m,
            n,
            k,
            0.5,
            &a,
            k,
            &bt,
            k,
            2.0,
            &mut c1,
            n,
        )
        .unwrap();
        par.dgemm(
            Transpose::None,
            Transpose::Ordinary,
            m,
            n,
            k,
            0.5,
            &a,
            k,
            &bt,
            k,
            2.0,
            &mut c2,
            n,
        )
        .unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_leading_dimension_padding() {
        // 2x2 operands stored inside 2x3 buffers, last column is padding
        let a = [1.0, 2.0, f64::NAN, 3.0, 4.0, f64::NAN];
        let b = [5.0, 6.0, f64::NAN, 7.0, 8.0, f64::NAN];
        let mut c = [0.0, 0.0, -1.0, 0.0, 0.0, -1.0];
        let backend = NativeBackend::new(BackendConfig::default().with_num_threads(1));
        backend
            .dgemm(
                Transpose::None,
                Transpose::None,
                2,
                2,
                2,
                1.0,
                &a,
                3,
                &b,
                3,
                0.0,
                &mut c,
                3,
            )
            .unwrap();
        assert_eq!(c, [19.0, 22.0, -1.0, 43.0, 50.0, -1.0]);
    }

    #[test]
    fn test_beta_zero_ignores_nan() {
        let backend = NativeBackend::default();
        let mut c = [f64::NAN];
        backend
            .dgemm(
                Transpose::None,
                Transpose::None,
                1,
                1,
                1,
                2.0,
                &[3.0],
                1,
                &[4.0],
                1,
                0.0,
                &mut c,
                1,
            )
            .unwrap();
        assert_eq!(c, [24.0]);
    }

    #[test]
    fn test_illegal_arguments() {
        let backend = NativeBackend::default();
        let a = [0.0; 6];
        let b = [0.0; 6];
        let mut c = [0.0; 4];
        let err = |lda, ldb, ldc, c: &mut [f64]| {
            backend
                .dgemm(
                    Transpose::None,
                    Transpose::None,
                    2,
                    2,
                    3,
                    1.0,
                    &a,
                    lda,
                    &b,
                    ldb,
                    0.0,
                    c,
                    ldc,
                )
                .unwrap_err()
        };
        assert_eq!(err(2, 2, 2, &mut c), illegal("dgemm", 8));
        assert_eq!(err(3, 1, 2, &mut c), illegal("dgemm", 10));
        assert_eq!(err(3, 2, 1, &mut c), illegal("dgemm", 13));
        assert_eq!(err(4, 2, 2, &mut c), illegal("dgemm", 7));
        assert_eq!(err(3, 3, 2, &mut c), illegal("dgemm", 9));
        assert_eq!(err(3, 2, 2, &mut c[..3]), illegal("dgemm", 12));

        let mut x = [1.0; 4];
        assert_eq!(backend.dscal(2, 2.0, &mut x, 0), Err(illegal("dscal", 4)));
        assert_eq!(backend.dscal(3, 2.0, &mut x, 2), Err(illegal("dscal", 3)));
    }

    #[test]
    fn test_check_finite() {
        let backend = NativeBackend::new(BackendConfig::default().with_check_finite(true));
        let mut c = [0.0];
        let r = backend.dgemm(
            Transpose::None,
            Transpose::None,
            1,
            1,
            1,
            1.0,
            &[f64::INFINITY],
            1,
            &[1.0],
            1,
            0.0,
            &mut c,
            1,
        );
        assert_eq!(
            r,
            Err(BackendError::NonFinite {
                routine: "dgemm",
                operand: "a"
            })
        );
        assert_eq!(c, [0.0]);

        let mut x = [1.0, f64::NAN];
        assert!(backend.dscal(2, 3.0, &mut x, 1).is_err());
        assert_eq!(x[0], 1.0);
    }

    #[test]
    fn test_dscal_stride() {
        let backend = NativeBackend::default();
        let mut x = [1.0, 2.0, 3.0, 4.0, 5.0];
        backend.dscal(3, -2.0, &mut x, 2).unwrap();
        assert_eq!(x, [-2.0, 2.0, -6.0, 4.0, -10.0]);
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_NUM_THREADS, "3"),
            (ENV_PARALLEL_THRESHOLD, "not-a-number"),
            (ENV_CHECK_FINITE, "true"),
        ]
        .into_iter()
        .collect();
        let config = BackendConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.num_threads, 3);
        assert_eq!(
            config.parallel_threshold,
            BackendConfig::default().parallel_threshold
        );
        assert!(config.check_finite);

        let config = BackendConfig::from_lookup(|k| (k == ENV_NUM_THREADS).then(|| "0".into()));
        assert_eq!(config.num_threads, 1);
    }

    #[test]
    fn test_native_backend_singleton() {
        let a = native_backend() as *const NativeBackend;
        let b = native_backend() as *const NativeBackend;
        assert_eq!(a, b);
        assert_eq!(native_backend().name(), "native");
    }
}
