//! Strides, flat offsets, and the canonical enumeration of coordinates.

use std::iter::FusedIterator;
use thiserror::Error;

/// Maximum number of dimensions of an array.
pub const MAX_DIM: usize = 32;

/// Storage order of the elements in the data region.
///
/// This only affects where an element is stored. Enumeration with
/// [`Indices`] always visits coordinates with the last axis varying fastest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Row-major: the last axis varies fastest in storage.
    #[default]
    C,
    /// Column-major: the first axis varies fastest in storage.
    Fortran,
}

impl Order {
    /// Returns `true` for column-major order, the `fortran_order` header flag.
    pub const fn is_fortran(self) -> bool {
        matches!(self, Self::Fortran)
    }

    pub(crate) const fn from_fortran(fortran_order: bool) -> Self {
        if fortran_order {
            Self::Fortran
        } else {
            Self::C
        }
    }
}

/// An index that does not address an element of the array.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The index has the wrong number of components.
    #[error("index has {got} components but the array has {expected} dimensions")]
    WrongNdim {
        /// Number of dimensions of the array.
        expected: usize,
        /// Number of components of the index.
        got: usize,
    },
    /// A component is greater than or equal to the length of its axis.
    #[error("index {index} is out of bounds for axis {axis} with length {len}")]
    OutOfBounds {
        /// The offending axis.
        axis: usize,
        /// The offending component.
        index: usize,
        /// Length of the axis.
        len: usize,
    },
}

/// Shape and strides of an array, in units of elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
    order: Order,
    len: usize,
}

impl Layout {
    /// Computes the strides of `shape` in `order`.
    ///
    /// Returns `None` if the number of elements overflows `usize`.
    ///
    /// ```
    /// use npymap::{Layout, Order};
    ///
    /// let c = Layout::new(&[2, 3, 4], Order::C).unwrap();
    /// assert_eq!(c.strides(), [12, 4, 1]);
    /// let f = Layout::new(&[2, 3, 4], Order::Fortran).unwrap();
    /// assert_eq!(f.strides(), [1, 2, 6]);
    /// assert_eq!(f.flatten(&[1, 2, 3])?, 1 + 2 * 2 + 3 * 6);
    /// # Ok::<_, npymap::IndexError>(())
    /// ```
    pub fn new(shape: &[usize], order: Order) -> Option<Self> {
        let len = checked_len(shape)?;
        let ndim = shape.len();
        let mut strides = vec![1_usize; ndim];
        match order {
            Order::C => {
                for axis in (0..ndim.saturating_sub(1)).rev() {
                    strides[axis] = strides[axis + 1].saturating_mul(shape[axis + 1]);
                }
            }
            Order::Fortran => {
                for axis in 1..ndim {
                    strides[axis] = strides[axis - 1].saturating_mul(shape[axis - 1]);
                }
            }
        }
        Some(Self { shape: shape.to_vec(), strides, order, len })
    }

    /// Length of each axis.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Offset multiplier of each axis, in elements.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Storage order.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if some axis has length zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checks `index` against the shape and returns its flat offset in
    /// elements.
    pub fn flatten(&self, index: &[usize]) -> Result<usize, IndexError> {
        if index.len() != self.ndim() {
            return Err(IndexError::WrongNdim { expected: self.ndim(), got: index.len() });
        }
        let mut offset = 0;
        let axes = self.shape.iter().zip(&self.strides);
        for (axis, (&i, (&len, &stride))) in index.iter().zip(axes).enumerate() {
            if i >= len {
                return Err(IndexError::OutOfBounds { axis, index: i, len });
            }
            offset += i * stride;
        }
        Ok(offset)
    }

    /// Enumerates every valid index.
    pub fn indices(&self) -> Indices {
        Indices::new(&self.shape)
    }
}

fn checked_len(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1_usize, |acc, &n| acc.checked_mul(n))
}

/// Returns the first index of the canonical enumeration of `shape`, or
/// `None` if the shape has no elements.
pub fn reset_index(shape: &[usize]) -> Option<Vec<usize>> {
    if shape.contains(&0) {
        None
    } else {
        Some(vec![0; shape.len()])
    }
}

/// Advances `index` to the next index of the canonical enumeration of `shape`
/// (the last axis varies fastest).
///
/// Returns `false` once the enumeration is exhausted, in which case `index`
/// has wrapped around to all zeros. A component outside its axis wraps to
/// zero and carries into the next slower axis.
///
/// ```
/// use npymap::{next_index, reset_index};
///
/// let shape = [2, 2];
/// let mut index = reset_index(&shape).unwrap();
/// let mut seen = vec![index.clone()];
/// while next_index(&shape, &mut index) {
///     seen.push(index.clone());
/// }
/// assert_eq!(seen, [[0, 0], [0, 1], [1, 0], [1, 1]]);
/// ```
pub fn next_index(shape: &[usize], index: &mut [usize]) -> bool {
    for (i, &len) in index.iter_mut().zip(shape).rev() {
        match i.checked_add(1) {
            Some(next) if next < len => {
                *i = next;
                return true;
            }
            _ => *i = 0,
        }
    }
    false
}

/// A restartable cursor over all indices of a shape, with the last axis
/// varying fastest.
///
/// As an [`Iterator`] it yields the current index and then advances.
/// Independent cursors over the same array may coexist.
#[derive(Clone, Debug)]
pub struct Indices {
    shape: Vec<usize>,
    cursor: Option<Vec<usize>>,
    remaining: usize,
}

impl Indices {
    /// Creates a cursor positioned at the first index.
    pub fn new(shape: &[usize]) -> Self {
        let mut indices = Self { shape: shape.to_vec(), cursor: None, remaining: 0 };
        indices.reset();
        indices
    }

    /// Moves the cursor back to the first index, returning it, or `None` if
    /// the shape has no elements.
    pub fn reset(&mut self) -> Option<&[usize]> {
        self.cursor = reset_index(&self.shape);
        self.remaining = match self.cursor {
            Some(_) => checked_len(&self.shape).unwrap_or(usize::MAX),
            None => 0,
        };
        self.current()
    }

    /// The index under the cursor, or `None` once exhausted.
    pub fn current(&self) -> Option<&[usize]> {
        self.cursor.as_deref()
    }

    /// Moves the cursor forward, returning the new index, or `None` once
    /// exhausted.
    pub fn advance(&mut self) -> Option<&[usize]> {
        if let Some(cursor) = &mut self.cursor {
            if next_index(&self.shape, cursor) {
                self.remaining -= 1;
            } else {
                self.cursor = None;
                self.remaining = 0;
            }
        }
        self.current()
    }
}

impl Iterator for Indices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor.clone()?;
        self.advance();
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Indices {}

impl FusedIterator for Indices {}
