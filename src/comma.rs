use std::fmt;

use log::warn;

use crate::error::{MResult, MatrixError, OperationErrorKind};
use crate::{BaseDataMut, MatrixData};

/// Row-major fill cursor created by [`MatrixData::append`].
///
/// ```
/// # use matrix::Matrix;
/// let mut m = Matrix::new(2, 2)?;
/// m.append(1.0)?.append(2.0)?.append(3.0)?.append(4.0)?.finish()?;
/// assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
/// # Ok::<(), matrix::MatrixError>(())
/// ```
pub struct MatrixCommaInitializer<'m, S: BaseDataMut> {
    matrix: &'m mut MatrixData<S>,
    counter: usize,
    finished: bool,
}

impl<S: BaseDataMut> MatrixData<S> {
    /// Writes `first` at `(0, 0)` and returns a cursor for the following elements.
    pub fn append(&mut self, first: f64) -> MResult<MatrixCommaInitializer<'_, S>> {
        let mut init = MatrixCommaInitializer {
            matrix: self,
            counter: 0,
            finished: false,
        };
        init.append(first)?;
        Ok(init)
    }
}

impl<'m, S: BaseDataMut> MatrixCommaInitializer<'m, S> {
    pub fn capacity(&self) -> usize {
        self.matrix.size()
    }

    pub fn filled(&self) -> usize {
        self.counter
    }

    pub fn is_complete(&self) -> bool {
        self.counter == self.capacity()
    }

    fn overflow(&self) -> MatrixError {
        MatrixError::op(
            "append",
            OperationErrorKind::TooManyElements {
                capacity: self.capacity(),
            },
        )
    }

    pub fn append(&mut self, a: f64) -> MResult<&mut Self> {
        if self.counter >= self.capacity() {
            return Err(self.overflow());
        }
        self.matrix.as_slice_mut()[self.counter] = a;
        self.counter += 1;
        Ok(self)
    }

    /// Appends every value or none of them.
    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) -> MResult<&mut Self> {
        let values: Vec<f64> = values.into_iter().collect();
        let end = self.counter + values.len();
        if end > self.capacity() {
            return Err(self.overflow());
        }
        self.matrix.as_slice_mut()[self.counter..end].copy_from_slice(&values);
        self.counter = end;
        Ok(self)
    }

    /// Fails unless every element of the matrix has been written.
    pub fn finish(&mut self) -> MResult<()> {
        self.finished = true;
        if !self.is_complete() {
            return Err(MatrixError::op(
                "finish",
                OperationErrorKind::TooFewElements {
                    filled: self.counter,
                    capacity: self.capacity(),
                },
            ));
        }
        Ok(())
    }
}

impl<'m, S: BaseDataMut> fmt::Debug for MatrixCommaInitializer<'m, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixCommaInitializer")
            .field("shape", &self.matrix.shape())
            .field("filled", &self.counter)
            .finish()
    }
}

impl<'m, S: BaseDataMut> Drop for MatrixCommaInitializer<'m, S> {
    fn drop(&mut self) {
        if !self.finished && !self.is_complete() && !std::thread::panicking() {
            warn!(
                "comma initializer dropped after {} of {} elements",
                self.counter,
                self.capacity()
            );
        }
    }
}
