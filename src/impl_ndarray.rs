use crate::{header::Descriptor, Element, NpyArray, NpyError, Order};
use ndarray::{prelude::*, Data, ShapeBuilder as _};
use std::path::Path;

impl NpyArray {
    /// Copies the elements into an owned array with the same shape and memory
    /// order.
    ///
    /// `A` must match the element type of the array.
    pub fn to_ndarray<A: Element>(&self) -> Result<ArrayD<A>, NpyError> {
        self.check_dtype(A::DTYPE)?;
        let byte_order = self.byte_order();
        let data = self
            .data()
            .chunks_exact(A::DTYPE.size())
            .map(|bytes| A::decode(bytes, byte_order))
            .collect::<Result<Vec<_>, _>>()?;
        let shape = IxDyn(self.shape()).set_f(self.order().is_fortran());
        ArrayD::from_shape_vec(shape, data).map_err(|_| NpyError::LengthOverflow)
    }
}

/// Extension trait for copying an `ndarray` array into an [`NpyArray`].
///
/// The array is stored in Fortran order if its reversed axes are in standard
/// layout, and in C order otherwise.
///
/// ```
/// use ndarray::array;
/// use npymap::{Order, ToNpyArrayExt};
///
/// let arr = array![[1, 2, 3], [4, 5, 6]];
/// let npy = arr.t().to_npy_array(None)?;
/// assert_eq!(npy.shape(), [3, 2]);
/// assert_eq!(npy.order(), Order::Fortran);
/// assert_eq!(npy.get::<i32>(&[2, 1])?, 6);
/// # Ok::<_, npymap::NpyError>(())
/// ```
pub trait ToNpyArrayExt {
    /// Copies the array into a new `.npy` file at `path`, or into an
    /// anonymous array if `path` is `None`.
    ///
    /// Zero-dimensional arrays are rejected with [`NpyError::Ndim`].
    fn to_npy_array(&self, path: Option<&Path>) -> Result<NpyArray, NpyError>;
}

impl<A, S, D> ToNpyArrayExt for ArrayBase<S, D>
where
    A: Element,
    S: Data<Elem = A>,
    D: Dimension,
{
    fn to_npy_array(&self, path: Option<&Path>) -> Result<NpyArray, NpyError> {
        let order = if !self.is_standard_layout()
            && self.view().reversed_axes().is_standard_layout()
        {
            Order::Fortran
        } else {
            Order::C
        };
        let descriptor = Descriptor::new(A::DTYPE, self.shape()).with_order(order);
        let mut npy = match path {
            Some(path) => NpyArray::create(path, descriptor)?,
            None => NpyArray::create_anonymous(descriptor)?,
        };
        for (index, &value) in npy.indices().zip(self.iter()) {
            npy.set(&index, value)?;
        }
        Ok(npy)
    }
}
