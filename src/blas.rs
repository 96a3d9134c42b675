//! BLAS-style products and scaling over [`MatrixData`].
//!
//! The free functions run on [`native_backend`]; [`Blas`] runs the same operations on
//! any [`LinearAlgebraBackend`].
//!
//! ```
//! use matrix::{matrix, mult_dgemm};
//!
//! let a = matrix![[1, 2], [3, 4]]?;
//! let b = matrix![[5, 6], [7, 8]]?;
//! assert_eq!(mult_dgemm(&a, &b)?, matrix![[19, 22], [43, 50]]?);
//! # Ok::<(), matrix::MatrixError>(())
//! ```

use crate::backend::{native_backend, LinearAlgebraBackend, NativeBackend, Transpose};
use crate::binding::{self, check_shape, gemm_shape};
use crate::error::{MResult, MatrixError, OperationErrorKind};
use crate::{BaseData, BaseDataMut, Matrix, MatrixData};

pub struct Blas<'b, L: LinearAlgebraBackend + ?Sized> {
    backend: &'b L,
}

impl Blas<'static, NativeBackend> {
    pub fn native() -> Self {
        Blas {
            backend: native_backend(),
        }
    }
}

fn require_square<S: BaseData>(op: &'static str, b: &MatrixData<S>) -> MResult<()> {
    if !b.is_square() {
        return Err(MatrixError::op(op, OperationErrorKind::NotSquare(b.shape())));
    }
    Ok(())
}

impl<'b, L: LinearAlgebraBackend + ?Sized> Blas<'b, L> {
    pub fn new(backend: &'b L) -> Self {
        Blas { backend }
    }

    pub fn backend(&self) -> &'b L {
        self.backend
    }

    /// `A * B` into a new matrix.
    pub fn mult_dgemm<A: BaseData, B: BaseData>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
    ) -> MResult<Matrix> {
        let [m, n] = gemm_shape(
            "mult_dgemm",
            a.shape(),
            Transpose::None,
            b.shape(),
            Transpose::None,
        )?;
        let mut c = Matrix::new(m, n)?;
        binding::gemm(
            self.backend,
            "mult_dgemm",
            1.0,
            a,
            Transpose::None,
            b,
            Transpose::None,
            0.0,
            &mut c,
        )?;
        Ok(c)
    }

    /// `C = alpha * op(A) * op(B) + beta * C`. With `beta == 0` the old contents of
    /// `C` are not read.
    #[allow(clippy::too_many_arguments)]
    pub fn mult_dgemm_into<A: BaseData, B: BaseData, C: BaseDataMut>(
        &self,
        alpha: f64,
        a: &MatrixData<A>,
        op_a: Transpose,
        b: &MatrixData<B>,
        op_b: Transpose,
        beta: f64,
        c: &mut MatrixData<C>,
    ) -> MResult<()> {
        binding::gemm(self.backend, "mult_dgemm", alpha, a, op_a, b, op_b, beta, c)
    }

    fn abat_shape<A: BaseData, B: BaseData>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
    ) -> MResult<[usize; 2]> {
        require_square("mult_dgemm_abat", b)?;
        gemm_shape(
            "mult_dgemm_abat",
            a.shape(),
            Transpose::None,
            b.shape(),
            Transpose::None,
        )?;
        Ok([a.row(), a.row()])
    }

    fn atba_shape<A: BaseData, B: BaseData>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
    ) -> MResult<[usize; 2]> {
        require_square("mult_dgemm_atba", b)?;
        gemm_shape(
            "mult_dgemm_atba",
            a.shape(),
            Transpose::Ordinary,
            b.shape(),
            Transpose::None,
        )?;
        Ok([a.col(), a.col()])
    }

    /// `A * B * Aᵗ` into a new matrix. `B` must be square.
    pub fn mult_dgemm_abat<A: BaseData, B: BaseData>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
    ) -> MResult<Matrix> {
        let [m, n] = self.abat_shape(a, b)?;
        let mut c = Matrix::new(m, n)?;
        self.mult_dgemm_abat_into(a, b, &mut c)?;
        Ok(c)
    }

    pub fn mult_dgemm_abat_into<A: BaseData, B: BaseData, C: BaseDataMut>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
        c: &mut MatrixData<C>,
    ) -> MResult<()> {
        let shape = self.abat_shape(a, b)?;
        check_shape("mult_dgemm_abat", shape, c.shape())?;
        let mut ab = Matrix::new(a.row(), b.col())?;
        let op = "mult_dgemm_abat";
        let (n, t) = (Transpose::None, Transpose::Ordinary);
        binding::gemm(self.backend, op, 1.0, a, n, b, n, 0.0, &mut ab)?;
        binding::gemm(self.backend, op, 1.0, &ab, n, a, t, 0.0, c)
    }

    /// `Aᵗ * B * A` into a new matrix. `B` must be square.
    pub fn mult_dgemm_atba<A: BaseData, B: BaseData>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
    ) -> MResult<Matrix> {
        let [m, n] = self.atba_shape(a, b)?;
        let mut c = Matrix::new(m, n)?;
        self.mult_dgemm_atba_into(a, b, &mut c)?;
        Ok(c)
    }

    pub fn mult_dgemm_atba_into<A: BaseData, B: BaseData, C: BaseDataMut>(
        &self,
        a: &MatrixData<A>,
        b: &MatrixData<B>,
        c: &mut MatrixData<C>,
    ) -> MResult<()> {
        let shape = self.atba_shape(a, b)?;
        check_shape("mult_dgemm_atba", shape, c.shape())?;
        let mut atb = Matrix::new(a.col(), b.col())?;
        let op = "mult_dgemm_atba";
        let (n, t) = (Transpose::None, Transpose::Ordinary);
        binding::gemm(self.backend, op, 1.0, a, t, b, n, 0.0, &mut atb)?;
        binding::gemm(self.backend, op, 1.0, &atb, n, a, n, 0.0, c)
    }

    /// `alpha * A` into a new matrix; `A` is left as is.
    pub fn mult_dscal<A: BaseData>(&self, a: &MatrixData<A>, alpha: f64) -> MResult<Matrix> {
        let mut c = a.to_matrix();
        self.scale(&mut c, "mult_dscal", alpha)?;
        Ok(c)
    }

    /// `dest = alpha * A`. On a shape mismatch `dest` is not touched. If the backend
    /// fails after the copy, `dest` holds the unscaled copy of `A`.
    pub fn mult_dscal_to<A: BaseData, C: BaseDataMut>(
        &self,
        a: &MatrixData<A>,
        alpha: f64,
        dest: &mut MatrixData<C>,
    ) -> MResult<()> {
        check_shape("mult_dscal_to", a.shape(), dest.shape())?;
        dest.as_slice_mut().copy_from_slice(a.as_slice());
        self.scale(dest, "mult_dscal_to", alpha)
    }

    /// `A = alpha * A`.
    pub fn mult_dscal_in_place<S: BaseDataMut>(
        &self,
        a: &mut MatrixData<S>,
        alpha: f64,
    ) -> MResult<()> {
        self.scale(a, "mult_dscal_in_place", alpha)
    }

    fn scale<S: BaseDataMut>(
        &self,
        x: &mut MatrixData<S>,
        op: &'static str,
        alpha: f64,
    ) -> MResult<()> {
        if alpha == 1.0 {
            return Ok(());
        }
        if alpha == 0.0 {
            x.fill_all(0.0);
            return Ok(());
        }
        binding::scal(self.backend, op, alpha, x)
    }
}

pub fn mult_dgemm<A: BaseData, B: BaseData>(
    a: &MatrixData<A>,
    b: &MatrixData<B>,
) -> MResult<Matrix> {
    Blas::native().mult_dgemm(a, b)
}

#[allow(clippy::too_many_arguments)]
pub fn mult_dgemm_into<A: BaseData, B: BaseData, C: BaseDataMut>(
    alpha: f64,
    a: &MatrixData<A>,
    op_a: Transpose,
    b: &MatrixData<B>,
    op_b: Transpose,
    beta: f64,
    c: &mut MatrixData<C>,
) -> MResult<()> {
    Blas::native().mult_dgemm_into(alpha, a, op_a, b, op_b, beta, c)
}

pub fn mult_dgemm_abat<A: BaseData, B: BaseData>(
    a: &MatrixData<A>,
    b: &MatrixData<B>,
) -> MResult<Matrix> {
    Blas::native().mult_dgemm_abat(a, b)
}

pub fn mult_dgemm_abat_into<A: BaseData, B: BaseData, C: BaseDataMut>(
    a: &MatrixData<A>,
    b: &MatrixData<B>,
    c: &mut MatrixData<C>,
) -> MResult<()> {
    Blas::native().mult_dgemm_abat_into(a, b, c)
}

pub fn mult_dgemm_atba<A: BaseData, B: BaseData>(
    a: &MatrixData<A>,
    b: &MatrixData<B>,
) -> MResult<Matrix> {
    Blas::native().mult_dgemm_atba(a, b)
}

pub fn mult_dgemm_atba_into<A: BaseData, B: BaseData, C: BaseDataMut>(
    a: &MatrixData<A>,
    b: &MatrixData<B>,
    c: &mut MatrixData<C>,
) -> MResult<()> {
    Blas::native().mult_dgemm_atba_into(a, b, c)
}

pub fn mult_dscal<A: BaseData>(a: &MatrixData<A>, alpha: f64) -> MResult<Matrix> {
    Blas::native().mult_dscal(a, alpha)
}

pub fn mult_dscal_to<A: BaseData, C: BaseDataMut>(
    a: &MatrixData<A>,
    alpha: f64,
    dest: &mut MatrixData<C>,
) -> MResult<()> {
    Blas::native().mult_dscal_to(a, alpha, dest)
}

pub fn mult_dscal_in_place<S: BaseDataMut>(a: &mut MatrixData<S>, alpha: f64) -> MResult<()> {
    Blas::native().mult_dscal_in_place(a, alpha)
}
