use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backend::BackendError;

pub type MResult<T> = Result<T, MatrixError>;

/// Discriminant of [`MatrixError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Operation,
    Io,
}

#[derive(Error, Debug, PartialEq)]
pub enum OperationErrorKind {
    #[error("dimension mismatch, expected {expected:?} but got {got:?}")]
    DimensionMismatch { expected: [usize; 2], got: [usize; 2] },
    #[error("length mismatch, expected {expected} elements but got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("index ({row}, {col}) is out of range for shape {shape:?}")]
    IndexOutOfRange {
        row: usize,
        col: usize,
        shape: [usize; 2],
    },
    #[error("storage size of a {rows}x{cols} matrix overflows")]
    SizeOverflow { rows: usize, cols: usize },
    #[error("null data pointer")]
    NullPointer,
    #[error("too many elements, capacity is {capacity}")]
    TooManyElements { capacity: usize },
    #[error("too few elements, got {filled} of {capacity}")]
    TooFewElements { filled: usize, capacity: usize },
    #[error("matrix with shape {0:?} is not square")]
    NotSquare([usize; 2]),
    #[error("matrix is empty")]
    Empty,
    #[error("matrix is singular")]
    Singular,
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("no convergence after {0} sweeps")]
    NoConvergence(usize),
    #[error("invalid range [{low}, {high})")]
    InvalidRange { low: f64, high: f64 },
    #[error("value is not representable as f64")]
    NotRepresentable,
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum IoErrorKind {
    #[error("{0}")]
    Stream(#[from] io::Error),
    #[error("matrix #{index} has shape {found:?} but {expected:?} is expected")]
    DimensionMismatch {
        index: usize,
        expected: [usize; 2],
        found: [usize; 2],
    },
    #[error("malformed data at line {line}: {msg}")]
    Malformed { line: usize, msg: String },
    #[error("matrix #{index} is truncated")]
    Truncated { index: usize },
}

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("matrix operation error in `{op}`: {kind}")]
    Operation {
        op: &'static str,
        kind: OperationErrorKind,
    },
    #[error("matrix i/o error on {}: {kind}", path.display())]
    Io { path: PathBuf, kind: IoErrorKind },
}

impl MatrixError {
    pub(crate) fn op(op: &'static str, kind: OperationErrorKind) -> Self {
        MatrixError::Operation { op, kind }
    }

    pub(crate) fn io<P: AsRef<Path>, K: Into<IoErrorKind>>(path: P, kind: K) -> Self {
        MatrixError::Io {
            path: path.as_ref().to_path_buf(),
            kind: kind.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MatrixError::Operation { .. } => ErrorKind::Operation,
            MatrixError::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_operation(&self) -> bool {
        self.kind() == ErrorKind::Operation
    }

    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Name of the failing operation, for operation errors.
    pub fn op_name(&self) -> Option<&'static str> {
        match self {
            MatrixError::Operation { op, .. } => Some(op),
            MatrixError::Io { .. } => None,
        }
    }

    pub fn operation_kind(&self) -> Option<&OperationErrorKind> {
        match self {
            MatrixError::Operation { kind, .. } => Some(kind),
            MatrixError::Io { .. } => None,
        }
    }

    pub fn io_kind(&self) -> Option<&IoErrorKind> {
        match self {
            MatrixError::Io { kind, .. } => Some(kind),
            MatrixError::Operation { .. } => None,
        }
    }
}

impl From<MatrixError> for String {
    fn from(e: MatrixError) -> Self {
        format!("{}", e)
    }
}
