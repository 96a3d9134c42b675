use std::fmt::Write;
use std::sync::Mutex;

use lazy_static::lazy_static;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dimension::Dim;
use crate::error::{MResult, MatrixError, OperationErrorKind};
use crate::{BaseData, BaseDataMut, Matrix, MatrixData};

/// Tolerance used by the predicates without a `_within` suffix.
pub const DEFAULT_THRESHOLD: f64 = 1e-10;

lazy_static! {
    static ref SEED_FIXED_RNG: Mutex<StdRng> = Mutex::new(StdRng::seed_from_u64(1));
}

/// Which triangle of a square matrix holds the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

fn not_square(op: &'static str, shape: [usize; 2]) -> MatrixError {
    MatrixError::op(op, OperationErrorKind::NotSquare(shape))
}

fn uniform(a: f64, b: f64) -> MResult<Uniform<f64>> {
    if !(a < b) || !(b - a).is_finite() {
        return Err(MatrixError::op(
            "randomize",
            OperationErrorKind::InvalidRange { low: a, high: b },
        ));
    }
    Ok(Uniform::new(a, b))
}

impl<S: BaseData> MatrixData<S> {
    pub fn is_symmetric(&self) -> bool {
        self.is_symmetric_within(DEFAULT_THRESHOLD)
    }

    pub fn is_symmetric_within(&self, threshold: f64) -> bool {
        let threshold = threshold.abs();
        if !self.is_square() {
            return false;
        }
        let n = self.row();
        (0..n).all(|i| (0..i).all(|j| (self[(i, j)] - self[(j, i)]).abs() <= threshold))
    }

    /// True when every off-diagonal element is within `threshold` of zero.
    pub fn is_diagonal(&self) -> bool {
        self.is_diagonal_within(DEFAULT_THRESHOLD)
    }

    pub fn is_diagonal_within(&self, threshold: f64) -> bool {
        let threshold = threshold.abs();
        if !self.is_square() {
            return false;
        }
        let n = self.row();
        (0..n).all(|i| {
            (0..i).all(|j| self[(i, j)].abs() <= threshold && self[(j, i)].abs() <= threshold)
        })
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity_within(DEFAULT_THRESHOLD)
    }

    pub fn is_identity_within(&self, threshold: f64) -> bool {
        let threshold = threshold.abs();
        self.is_square()
            && (0..self.row()).all(|i| (self[(i, i)] - 1.0).abs() <= threshold)
            && self.is_diagonal_within(threshold)
    }

    pub fn is_zeros(&self) -> bool {
        self.is_zeros_within(DEFAULT_THRESHOLD)
    }

    pub fn is_zeros_within(&self, threshold: f64) -> bool {
        let threshold = threshold.abs();
        self.iter().all(|x| x.abs() <= threshold)
    }

    pub fn is_equal_to<T: BaseData>(&self, other: &MatrixData<T>) -> bool {
        self.is_equal_to_within(other, DEFAULT_THRESHOLD)
    }

    pub fn is_equal_to_within<T: BaseData>(&self, other: &MatrixData<T>, threshold: f64) -> bool {
        let threshold = threshold.abs();
        self.is_same_dimension_to(other)
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| (a - b).abs() <= threshold)
    }

    pub fn is_same_dimension_to<T: BaseData>(&self, other: &MatrixData<T>) -> bool {
        self.shape() == other.shape()
    }

    pub fn trace(&self) -> MResult<f64> {
        if !self.is_square() {
            return Err(not_square("trace", self.shape()));
        }
        Ok((0..self.row()).map(|i| self[(i, i)]).sum())
    }

    pub fn transposed(&self) -> Matrix {
        let dim = self.dim.transpose();
        let rows = self.row();
        let mut v = vec![0.0; self.size()];
        for ([i, j], &x) in self.dim.iter().zip(self.iter()) {
            v[j * rows + i] = x;
        }
        MatrixData {
            data: crate::OwnerSlice::from(v),
            dim,
        }
    }

    /// Copy with a new shape. Elements keep their memory order; new positions are zero.
    pub fn resized(&self, rows: usize, cols: usize) -> MResult<Matrix> {
        let mut v = self.as_slice().to_vec();
        let dim = Dim::new("resize", rows, cols)?;
        v.resize(dim.elem_count(), 0.0);
        Matrix::from_vec(rows, cols, v)
    }

    pub fn show_full(&self, per_line: usize) -> String {
        let per_line = usize::max(1, per_line);
        let mut s = format!(
            "dimension: {} x {}, showing in full.\n",
            self.row(),
            self.col()
        );
        for i in 0..self.row() {
            let _ = writeln!(s, " {:5}:", i + 1);
            for j in 1..=self.col() {
                let _ = write!(s, " {:15.8e},", self[(i, j - 1)]);
                if j % per_line == 0 && j != self.col() {
                    s.push('\n');
                }
            }
            s.push('\n');
        }
        s
    }

    /// Lower triangle of a square matrix, row by row.
    pub fn show_lower(&self, per_line: usize) -> String {
        let per_line = usize::max(1, per_line);
        let mut s = format!(
            "dimension: {} x {}, showing the lower triangular parts.\n",
            self.row(),
            self.col()
        );
        for i in 0..self.row() {
            let _ = writeln!(s, " {:5}:", i + 1);
            let last = usize::min(i + 1, self.col());
            for j in 0..last {
                let _ = write!(s, " {:15.8e},", self[(i, j)]);
                if (j + 1) % per_line == 0 && j + 1 != last {
                    s.push('\n');
                }
            }
            s.push('\n');
        }
        s.push('\n');
        s
    }
}

impl<S: BaseDataMut> MatrixData<S> {
    /// Copies the `uplo` triangle onto the other one.
    pub fn to_symmetric(&mut self, uplo: Uplo) -> MResult<&mut Self> {
        if !self.is_square() {
            return Err(not_square("to_symmetric", self.shape()));
        }
        for i in 0..self.row() {
            for j in 0..i {
                match uplo {
                    Uplo::Upper => self[(i, j)] = self[(j, i)],
                    Uplo::Lower => self[(j, i)] = self[(i, j)],
                }
            }
        }
        Ok(self)
    }

    pub fn fill_all(&mut self, a: f64) -> &mut Self {
        self.as_slice_mut().iter_mut().for_each(|x| *x = a);
        self
    }

    pub fn set_identity(&mut self) -> MResult<&mut Self> {
        if !self.is_square() {
            return Err(not_square("set_identity", self.shape()));
        }
        self.fill_all(0.0);
        for i in 0..self.row() {
            self[(i, i)] = 1.0;
        }
        Ok(self)
    }

    /// `self = alpha * self` through the native backend.
    pub fn scale(&mut self, alpha: f64) -> MResult<&mut Self> {
        crate::blas::mult_dscal_in_place(self, alpha)?;
        Ok(self)
    }

    /// Transposes in place; the shape is swapped.
    pub fn transpose(&mut self) -> &mut Self {
        let t = self.transposed();
        self.as_slice_mut().copy_from_slice(t.as_slice());
        self.dim = t.dim;
        self
    }

    /// Uniform values in `[a, b)` from a freshly seeded generator.
    pub fn randomize(&mut self, a: f64, b: f64) -> MResult<&mut Self> {
        self.randomize_with(a, b, &mut rand::thread_rng())
    }

    /// Uniform values in `[a, b)` drawn from the process-wide generator seeded with 1.
    /// The sequence is repeatable across runs for the same call order.
    pub fn randomize_seed_fixed(&mut self, a: f64, b: f64) -> MResult<&mut Self> {
        let dist = uniform(a, b)?;
        let mut rng = SEED_FIXED_RNG.lock().unwrap_or_else(|e| e.into_inner());
        self.as_slice_mut()
            .iter_mut()
            .for_each(|x| *x = dist.sample(&mut *rng));
        Ok(self)
    }

    pub fn randomize_with<R: Rng + ?Sized>(
        &mut self,
        a: f64,
        b: f64,
        rng: &mut R,
    ) -> MResult<&mut Self> {
        let dist = uniform(a, b)?;
        self.as_slice_mut()
            .iter_mut()
            .for_each(|x| *x = dist.sample(&mut *rng));
        Ok(self)
    }
}

impl Matrix {
    /// Reshapes in place. Elements keep their memory order; new positions are zero.
    pub fn resize(&mut self, rows: usize, cols: usize) -> MResult<&mut Self> {
        let dim = Dim::new("resize", rows, cols)?;
        let mut v = self.data.take_as_vec();
        v.resize(dim.elem_count(), 0.0);
        self.data = crate::OwnerSlice::from(v);
        self.dim = dim;
        Ok(self)
    }
}
