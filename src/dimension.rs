use std::mem;

use crate::error::{MResult, MatrixError, OperationErrorKind};

pub type Ix2 = [usize; 2];

/// Shape and row-major strides of a matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Dim {
    s: Ix2,
    stride: Ix2,
}

impl Dim {
    pub(crate) fn new(op: &'static str, rows: usize, cols: usize) -> MResult<Dim> {
        if checked_size(rows, cols).is_none() {
            return Err(MatrixError::op(
                op,
                OperationErrorKind::SizeOverflow { rows, cols },
            ));
        }
        let s = [rows, cols];
        Ok(Dim {
            s,
            stride: contiguous_stride(&s),
        })
    }

    pub fn shape(&self) -> Ix2 {
        self.s
    }

    pub fn stride(&self) -> Ix2 {
        self.stride
    }

    pub fn elem_count(&self) -> usize {
        self.s[0] * self.s[1]
    }

    /// Distance between the starts of two consecutive rows, never below 1.
    pub fn leading_dim(&self) -> usize {
        usize::max(1, self.stride[0])
    }

    /// Shape of the transpose, laid out contiguously.
    pub fn transpose(&self) -> Dim {
        let s = [self.s[1], self.s[0]];
        Dim {
            s,
            stride: contiguous_stride(&s),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.s[0] && col < self.s[1]
    }

    #[inline(always)]
    pub(crate) fn offset(&self, row: usize, col: usize) -> usize {
        row * self.stride[0] + col * self.stride[1]
    }

    /// Row-major walk over every `[row, col]` index.
    pub fn iter(&self) -> ShapeIter {
        ShapeIter {
            s: self.s,
            index: first_index(&self.s),
        }
    }
}

// [a, b] => strides [b, 1]
fn contiguous_stride(s: &Ix2) -> Ix2 {
    let mut x = [0; 2];
    let mut prod = 1;
    let mut temp = 1;
    for (m, dim) in x.iter_mut().rev().zip(s.iter().rev()) {
        prod *= temp;
        *m = prod;
        temp = *dim;
    }
    x
}

/// Element count of a `rows x cols` matrix, if both the count and its byte size fit.
pub(crate) fn checked_size(rows: usize, cols: usize) -> Option<usize> {
    let n = rows.checked_mul(cols)?;
    let bytes = n.checked_mul(mem::size_of::<f64>())?;
    if bytes > isize::MAX as usize {
        return None;
    }
    Some(n)
}

#[inline]
fn first_index(s: &Ix2) -> Option<Ix2> {
    if s.iter().any(|&ax| ax == 0) {
        return None;
    }
    Some([0, 0])
}

#[inline]
fn next_for(s: &Ix2, mut index: Ix2) -> Option<Ix2> {
    for (&dim, ix) in s.iter().zip(index.iter_mut()).rev() {
        *ix += 1;
        if *ix == dim {
            *ix = 0;
        } else {
            return Some(index);
        }
    }
    None
}

pub struct ShapeIter {
    s: Ix2,
    index: Option<Ix2>,
}

impl Iterator for ShapeIter {
    type Item = Ix2;

    #[inline]
    fn next(&mut self) -> Option<Ix2> {
        let current = self.index?;
        self.index = next_for(&self.s, current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides() {
        let d = Dim::new("test", 4, 3).unwrap();
        assert_eq!(d.stride(), [3, 1]);
        assert_eq!(d.leading_dim(), 3);
        assert_eq!(d.offset(2, 1), 7);

        let t = d.transpose();
        assert_eq!(t.shape(), [3, 4]);
        assert_eq!(t.stride(), [4, 1]);
    }

    #[test]
    fn test_empty_leading_dim() {
        let d = Dim::new("test", 5, 0).unwrap();
        assert_eq!(d.elem_count(), 0);
        assert_eq!(d.leading_dim(), 1);
        assert_eq!(Dim::default().shape(), [0, 0]);
    }

    #[test]
    fn test_overflow() {
        let e = Dim::new("test", usize::MAX, 2).unwrap_err();
        assert_eq!(
            e.operation_kind(),
            Some(&OperationErrorKind::SizeOverflow {
                rows: usize::MAX,
                cols: 2
            })
        );
        // element count fits but the byte size does not
        assert!(checked_size(usize::MAX / 4, 1).is_none());
        assert_eq!(checked_size(3, 7), Some(21));
    }

    #[test]
    fn test_shape_iter() {
        let d = Dim::new("test", 2, 3).unwrap();
        let v: Vec<Ix2> = d.iter().collect();
        assert_eq!(v, vec![[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]);
        assert_eq!(Dim::new("test", 0, 3).unwrap().iter().count(), 0);
    }
}
