mod backend;
mod binding;
pub mod blas;
mod comma;
mod dimension;
mod error;
pub mod io;
mod kernels;
pub mod lapack;
mod method;

use core::ptr::NonNull;
use num_traits::ToPrimitive;
use rawpointer::PointerExt;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Index, IndexMut};

pub use backend::{
    native_backend, BackendConfig, BackendError, LinearAlgebraBackend, NativeBackend, Transpose,
    ENV_CHECK_FINITE, ENV_NUM_THREADS, ENV_PARALLEL_THRESHOLD,
};
pub use blas::{
    mult_dgemm, mult_dgemm_abat, mult_dgemm_abat_into, mult_dgemm_atba, mult_dgemm_atba_into,
    mult_dgemm_into, mult_dscal, mult_dscal_in_place, mult_dscal_to, Blas,
};
pub use comma::MatrixCommaInitializer;
pub use dimension::{Dim, Ix2, ShapeIter};
pub use error::{ErrorKind, IoErrorKind, MResult, MatrixError, OperationErrorKind};
pub use method::{Uplo, DEFAULT_THRESHOLD};

/// Builds an owning matrix from row literals.
///
/// ```
/// let m = matrix::matrix![[1, 2, 3], [4, 5, 6]].unwrap();
/// assert_eq!(m.shape(), [2, 3]);
/// ```
#[macro_export]
macro_rules! matrix {
    ($([$($x:expr),* $(,)*]),+ $(,)*) => {{
        $crate::Matrix::from_rows(vec![$([$($x,)*],)*])
    }};
}

//拥有数据 or 借用数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owns,
    View,
}

pub trait BaseData {
    const OWNERSHIP: Ownership;

    fn as_ptr(&self) -> NonNull<f64>;

    fn as_slice(&self) -> &[f64];

    fn len(&self) -> usize;
}

pub trait BaseDataMut: BaseData {
    fn as_slice_mut(&mut self) -> &mut [f64];
}

pub type Matrix = MatrixData<OwnerSlice>;

pub type MatrixView<'a> = MatrixData<ViewSlice<'a>>;

pub type MatrixViewMut<'a> = MatrixData<ViewSliceMut<'a>>;

pub struct OwnerSlice {
    ptr: NonNull<f64>,
    len: usize,
    cap: usize,
}

unsafe impl Send for OwnerSlice {}
unsafe impl Sync for OwnerSlice {}

impl OwnerSlice {
    pub(crate) fn from(v: Vec<f64>) -> Self {
        let mut v = ManuallyDrop::new(v);
        let len = v.len();
        let cap = v.capacity();
        let ptr = unsafe { NonNull::new_unchecked(v.as_mut_ptr()) };
        Self { ptr, len, cap }
    }

    pub(crate) fn take_as_vec(&mut self) -> Vec<f64> {
        let (len, cap) = (self.len, self.cap);
        let ptr = self.ptr;
        self.ptr = NonNull::dangling();
        self.len = 0;
        self.cap = 0;
        unsafe { Vec::from_raw_parts(ptr.as_ptr(), len, cap) }
    }
}

impl Drop for OwnerSlice {
    fn drop(&mut self) {
        if self.cap != 0 {
            drop(self.take_as_vec());
        }
    }
}

impl Clone for OwnerSlice {
    fn clone(&self) -> Self {
        OwnerSlice::from(self.as_slice().to_vec())
    }
}

impl BaseData for OwnerSlice {
    const OWNERSHIP: Ownership = Ownership::Owns;

    fn as_ptr(&self) -> NonNull<f64> {
        self.ptr
    }

    fn as_slice(&self) -> &[f64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const f64, self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl BaseDataMut for OwnerSlice {
    fn as_slice_mut(&mut self) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

pub struct ViewSlice<'a> {
    ptr: NonNull<f64>,
    len: usize,
    _marker: PhantomData<&'a [f64]>,
}

unsafe impl Send for ViewSlice<'_> {}
unsafe impl Sync for ViewSlice<'_> {}

impl<'a> BaseData for ViewSlice<'a> {
    const OWNERSHIP: Ownership = Ownership::View;

    fn as_ptr(&self) -> NonNull<f64> {
        self.ptr
    }

    fn as_slice(&self) -> &[f64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const f64, self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

pub struct ViewSliceMut<'a> {
    ptr: NonNull<f64>,
    len: usize,
    _marker: PhantomData<&'a mut [f64]>,
}

unsafe impl Send for ViewSliceMut<'_> {}
unsafe impl Sync for ViewSliceMut<'_> {}

impl<'a> BaseData for ViewSliceMut<'a> {
    const OWNERSHIP: Ownership = Ownership::View;

    fn as_ptr(&self) -> NonNull<f64> {
        self.ptr
    }

    fn as_slice(&self) -> &[f64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const f64, self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl<'a> BaseDataMut for ViewSliceMut<'a> {
    fn as_slice_mut(&mut self) -> &mut [f64] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Dense row-major `f64` matrix over an owning or borrowed buffer.
pub struct MatrixData<S: BaseData> {
    data: S,
    dim: Dim,
}

fn length_checked(op: &'static str, rows: usize, cols: usize, got: usize) -> MResult<Dim> {
    let dim = Dim::new(op, rows, cols)?;
    if got < dim.elem_count() {
        return Err(MatrixError::op(
            op,
            OperationErrorKind::LengthMismatch {
                expected: dim.elem_count(),
                got,
            },
        ));
    }
    Ok(dim)
}

fn non_null(op: &'static str, ptr: *const f64, n: usize) -> MResult<NonNull<f64>> {
    if n == 0 {
        return Ok(NonNull::dangling());
    }
    NonNull::new(ptr as *mut f64).ok_or(MatrixError::op(op, OperationErrorKind::NullPointer))
}

impl<S: BaseData> MatrixData<S> {
    pub fn row(&self) -> usize {
        self.dim.shape()[0]
    }

    pub fn col(&self) -> usize {
        self.dim.shape()[1]
    }

    pub fn size(&self) -> usize {
        self.dim.elem_count()
    }

    pub fn shape(&self) -> Ix2 {
        self.dim.shape()
    }

    pub fn dim(&self) -> &Dim {
        &self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_square(&self) -> bool {
        self.row() == self.col()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data.as_slice()
    }

    pub fn as_ptr(&self) -> *const f64 {
        self.data.as_ptr().as_ptr()
    }

    pub fn ownership(&self) -> Ownership {
        S::OWNERSHIP
    }

    /// True when the elements live in memory this matrix does not own.
    pub fn is_data_stored_outside(&self) -> bool {
        S::OWNERSHIP == Ownership::View && !self.is_empty()
    }

    pub(crate) fn check_index(&self, op: &'static str, row: usize, col: usize) -> MResult<usize> {
        if !self.dim.contains(row, col) {
            return Err(MatrixError::op(
                op,
                OperationErrorKind::IndexOutOfRange {
                    row,
                    col,
                    shape: self.shape(),
                },
            ));
        }
        Ok(self.dim.offset(row, col))
    }

    pub fn get(&self, row: usize, col: usize) -> MResult<f64> {
        let i = self.check_index("get", row, col)?;
        Ok(self.as_slice()[i])
    }

    /// Elements of one row.
    pub fn row_slice(&self, row: usize) -> MResult<&[f64]> {
        if row >= self.row() {
            return Err(MatrixError::op(
                "row_slice",
                OperationErrorKind::IndexOutOfRange {
                    row,
                    col: 0,
                    shape: self.shape(),
                },
            ));
        }
        let start = row * self.dim.stride()[0];
        Ok(&self.as_slice()[start..start + self.col()])
    }

    pub fn view(&self) -> MatrixView<'_> {
        MatrixData {
            data: ViewSlice {
                ptr: self.data.as_ptr(),
                len: self.data.len(),
                _marker: PhantomData,
            },
            dim: self.dim,
        }
    }

    /// Deep copy into a new owning matrix.
    pub fn to_matrix(&self) -> Matrix {
        MatrixData {
            data: OwnerSlice::from(self.as_slice().to_vec()),
            dim: self.dim,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.as_slice().iter()
    }
}

impl<S: BaseDataMut> MatrixData<S> {
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        self.data.as_slice_mut()
    }

    pub fn as_mut_ptr(&mut self) -> *mut f64 {
        self.data.as_ptr().as_ptr()
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> MResult<&mut f64> {
        let i = self.check_index("get_mut", row, col)?;
        Ok(&mut self.as_slice_mut()[i])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> MResult<()> {
        let i = self.check_index("set", row, col)?;
        self.as_slice_mut()[i] = value;
        Ok(())
    }

    pub fn view_mut(&mut self) -> MatrixViewMut<'_> {
        MatrixData {
            data: ViewSliceMut {
                ptr: self.data.as_ptr(),
                len: self.data.len(),
                _marker: PhantomData,
            },
            dim: self.dim,
        }
    }

    /// Overwrites every element in row-major order. `values` must hold exactly
    /// `size()` elements.
    pub fn assign(&mut self, values: &[f64]) -> MResult<()> {
        if values.len() != self.size() {
            return Err(MatrixError::op(
                "assign",
                OperationErrorKind::LengthMismatch {
                    expected: self.size(),
                    got: values.len(),
                },
            ));
        }
        self.as_slice_mut().copy_from_slice(values);
        Ok(())
    }

    /// Copies every element of `other`, which must have the same shape.
    pub fn copy_from<T: BaseData>(&mut self, other: &MatrixData<T>) -> MResult<()> {
        if self.shape() != other.shape() {
            return Err(MatrixError::op(
                "copy_from",
                OperationErrorKind::DimensionMismatch {
                    expected: self.shape(),
                    got: other.shape(),
                },
            ));
        }
        self.as_slice_mut().copy_from_slice(other.as_slice());
        Ok(())
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, f64> {
        self.as_slice_mut().iter_mut()
    }
}

impl Matrix {
    /// Zero-filled `rows x cols` matrix.
    pub fn new(rows: usize, cols: usize) -> MResult<Matrix> {
        Self::from_elem(rows, cols, 0.0)
    }

    pub fn from_elem(rows: usize, cols: usize, elem: f64) -> MResult<Matrix> {
        let dim = Dim::new("new", rows, cols)?;
        //申请内存
        let v = vec![elem; dim.elem_count()];
        Ok(MatrixData {
            data: OwnerSlice::from(v),
            dim,
        })
    }

    pub fn identity(n: usize) -> MResult<Matrix> {
        let mut m = Self::new(n, n)?;
        let ld = m.dim.leading_dim();
        for i in 0..n {
            m.as_slice_mut()[i * ld + i] = 1.0;
        }
        Ok(m)
    }

    /// Takes ownership of `v`, which must hold exactly `rows * cols` elements.
    pub fn from_vec(rows: usize, cols: usize, v: Vec<f64>) -> MResult<Matrix> {
        let dim = Dim::new("from_vec", rows, cols)?;
        if v.len() != dim.elem_count() {
            return Err(MatrixError::op(
                "from_vec",
                OperationErrorKind::LengthMismatch {
                    expected: dim.elem_count(),
                    got: v.len(),
                },
            ));
        }
        Ok(MatrixData {
            data: OwnerSlice::from(v),
            dim,
        })
    }

    /// Deep copy of the first `rows * cols` elements of `data`.
    pub fn from_slice(rows: usize, cols: usize, data: &[f64]) -> MResult<Matrix> {
        let dim = length_checked("from_slice", rows, cols, data.len())?;
        Ok(MatrixData {
            data: OwnerSlice::from(data[..dim.elem_count()].to_vec()),
            dim,
        })
    }

    /// Deep copy of `rows * cols` elements read from `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `rows * cols` reads of `f64`.
    pub unsafe fn from_raw_parts(rows: usize, cols: usize, ptr: *const f64) -> MResult<Matrix> {
        let dim = Dim::new("from_raw_parts", rows, cols)?;
        let n = dim.elem_count();
        let ptr = non_null("from_raw_parts", ptr, n)?;
        let src = std::slice::from_raw_parts(ptr.as_ptr() as *const f64, n);
        Ok(MatrixData {
            data: OwnerSlice::from(src.to_vec()),
            dim,
        })
    }

    pub fn from_rows<T: ToPrimitive, const N: usize>(xs: Vec<[T; N]>) -> MResult<Matrix> {
        let dim = Dim::new("from_rows", xs.len(), N)?;
        let mut v = Vec::with_capacity(dim.elem_count());
        for x in xs.iter().flat_map(|r| r.iter()) {
            let x = x.to_f64().ok_or(MatrixError::op(
                "from_rows",
                OperationErrorKind::NotRepresentable,
            ))?;
            v.push(x);
        }
        Ok(MatrixData {
            data: OwnerSlice::from(v),
            dim,
        })
    }

    pub fn into_vec(mut self) -> Vec<f64> {
        self.data.take_as_vec()
    }
}

impl<'a> MatrixView<'a> {
    /// Read-only view over the first `rows * cols` elements of `data`.
    pub fn from_slice(rows: usize, cols: usize, data: &'a [f64]) -> MResult<MatrixView<'a>> {
        let dim = length_checked("from_slice", rows, cols, data.len())?;
        Ok(MatrixData {
            data: ViewSlice {
                ptr: NonNull::from(data).cast(),
                len: dim.elem_count(),
                _marker: PhantomData,
            },
            dim,
        })
    }

    /// Read-only view over caller memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `rows * cols` reads of `f64` for `'a`, and the memory
    /// must not be written through another alias while the view reads it.
    pub unsafe fn from_raw_parts(
        rows: usize,
        cols: usize,
        ptr: *const f64,
    ) -> MResult<MatrixView<'a>> {
        let dim = Dim::new("from_raw_parts", rows, cols)?;
        let ptr = non_null("from_raw_parts", ptr, dim.elem_count())?;
        Ok(MatrixData {
            data: ViewSlice {
                ptr,
                len: dim.elem_count(),
                _marker: PhantomData,
            },
            dim,
        })
    }
}

impl<'a> MatrixViewMut<'a> {
    /// Writable view over the first `rows * cols` elements of `data`.
    pub fn from_slice_mut(
        rows: usize,
        cols: usize,
        data: &'a mut [f64],
    ) -> MResult<MatrixViewMut<'a>> {
        let dim = length_checked("from_slice_mut", rows, cols, data.len())?;
        Ok(MatrixData {
            data: ViewSliceMut {
                ptr: NonNull::from(data).cast(),
                len: dim.elem_count(),
                _marker: PhantomData,
            },
            dim,
        })
    }

    /// Writable view over caller memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `rows * cols` reads and writes of `f64` for `'a` and
    /// must not be accessed through any other alias meanwhile.
    pub unsafe fn from_raw_parts_mut(
        rows: usize,
        cols: usize,
        ptr: *mut f64,
    ) -> MResult<MatrixViewMut<'a>> {
        let dim = Dim::new("from_raw_parts_mut", rows, cols)?;
        let ptr = non_null("from_raw_parts_mut", ptr, dim.elem_count())?;
        Ok(MatrixData {
            data: ViewSliceMut {
                ptr,
                len: dim.elem_count(),
                _marker: PhantomData,
            },
            dim,
        })
    }
}

impl Default for Matrix {
    fn default() -> Self {
        MatrixData {
            data: OwnerSlice::from(Vec::new()),
            dim: Dim::default(),
        }
    }
}

impl Clone for Matrix {
    fn clone(&self) -> Self {
        MatrixData {
            data: self.data.clone(),
            dim: self.dim,
        }
    }
}

impl<S: BaseData> Index<(usize, usize)> for MatrixData<S> {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            self.dim.contains(row, col),
            "index ({}, {}) out of range for shape {:?}",
            row,
            col,
            self.shape()
        );
        unsafe { &*self.data.as_ptr().stride_offset(1, self.dim.offset(row, col)).as_ptr() }
    }
}

impl<S: BaseDataMut> IndexMut<(usize, usize)> for MatrixData<S> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            self.dim.contains(row, col),
            "index ({}, {}) out of range for shape {:?}",
            row,
            col,
            self.shape()
        );
        unsafe {
            &mut *self
                .data
                .as_ptr()
                .stride_offset(1, self.dim.offset(row, col))
                .as_ptr()
        }
    }
}

impl<S: BaseData, T: BaseData> PartialEq<MatrixData<T>> for MatrixData<S> {
    fn eq(&self, other: &MatrixData<T>) -> bool {
        self.shape() == other.shape()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl<S: BaseData> fmt::Debug for MatrixData<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_matrix(self.view(), f)
    }
}

fn format_matrix(m: MatrixView<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;
    let ld = m.dim.leading_dim();
    for i in 0..m.row() {
        let v = &m.as_slice()[i * ld..i * ld + m.col()];
        if i > 0 {
            f.write_str(",")?;
        }
        f.write_str("\n [")?;
        for (j, x) in v.iter().enumerate() {
            if j > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&format!("{:?}", x))?;
        }
        f.write_str("]")?;
    }
    if m.row() > 0 {
        f.write_str("\n")?;
    }
    f.write_str("]")
}

impl<S: BaseData> fmt::Display for MatrixData<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.show_full(5))
    }
}

#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
