use log::trace;

use crate::backend::{LinearAlgebraBackend, Transpose};
use crate::error::{MResult, MatrixError, OperationErrorKind};
use crate::{BaseData, BaseDataMut, Ix2, MatrixData};

fn op_shape(shape: Ix2, trans: Transpose) -> Ix2 {
    trans.apply(shape)
}

/// Shape of `op(a) * op(b)`. On a mismatch the error compares the shape `op(b)` must
/// have, `[op(a).cols, op(b).cols]`, with the shape it has.
pub(crate) fn gemm_shape(
    op: &'static str,
    a: Ix2,
    transa: Transpose,
    b: Ix2,
    transb: Transpose,
) -> MResult<Ix2> {
    let [m, k] = op_shape(a, transa);
    let [kb, n] = op_shape(b, transb);
    if k != kb {
        return Err(MatrixError::op(
            op,
            OperationErrorKind::DimensionMismatch {
                expected: [k, n],
                got: [kb, n],
            },
        ));
    }
    Ok([m, n])
}

pub(crate) fn check_shape(op: &'static str, expected: Ix2, got: Ix2) -> MResult<()> {
    if expected != got {
        return Err(MatrixError::op(
            op,
            OperationErrorKind::DimensionMismatch { expected, got },
        ));
    }
    Ok(())
}

/// `c = alpha * op(a) * op(b) + beta * c`, all shapes checked before the call.
#[allow(clippy::too_many_arguments)]
pub(crate) fn gemm<L, A, B, C>(
    backend: &L,
    op: &'static str,
    alpha: f64,
    a: &MatrixData<A>,
    transa: Transpose,
    b: &MatrixData<B>,
    transb: Transpose,
    beta: f64,
    c: &mut MatrixData<C>,
) -> MResult<()>
where
    L: LinearAlgebraBackend + ?Sized,
    A: BaseData,
    B: BaseData,
    C: BaseDataMut,
{
    let [m, n] = gemm_shape(op, a.shape(), transa, b.shape(), transb)?;
    check_shape(op, [m, n], c.shape())?;
    if m == 0 || n == 0 {
        return Ok(());
    }
    let k = op_shape(a.shape(), transa)[1];
    let (lda, ldb, ldc) = (
        a.dim().leading_dim(),
        b.dim().leading_dim(),
        c.dim().leading_dim(),
    );
    trace!(
        "{}: {}::dgemm({:?}, {:?}) m={} n={} k={}",
        op,
        backend.name(),
        transa,
        transb,
        m,
        n,
        k
    );
    backend
        .dgemm(
            transa,
            transb,
            m,
            n,
            k,
            alpha,
            a.as_slice(),
            lda,
            b.as_slice(),
            ldb,
            beta,
            c.as_slice_mut(),
            ldc,
        )
        .map_err(|e| MatrixError::op(op, e.into()))
}

/// `x = alpha * x` over every element.
pub(crate) fn scal<L, S>(
    backend: &L,
    op: &'static str,
    alpha: f64,
    x: &mut MatrixData<S>,
) -> MResult<()>
where
    L: LinearAlgebraBackend + ?Sized,
    S: BaseDataMut,
{
    let n = x.size();
    if n == 0 {
        return Ok(());
    }
    trace!("{}: {}::dscal n={}", op, backend.name(), n);
    backend
        .dscal(n, alpha, x.as_slice_mut(), 1)
        .map_err(|e| MatrixError::op(op, e.into()))
}
