#![doc = include_str!("../README.md")]
//! ## Working with arrays
//!
//! - Opening: [`NpyArray::open`], or [`NpyArray::open_with`] for
//!   copy-on-write mappings ([`OpenMode`])
//! - Creating: [`NpyArray::create`] for a new file (sparse if possible) and
//!   [`NpyArray::create_anonymous`] for an array without a file, both
//!   described by a [`header::Descriptor`]
//! - Element access: [`NpyArray::get`] and [`NpyArray::set`] for any
//!   [`Element`] type, [`NpyArray::get_value`] and [`NpyArray::set_value`]
//!   for a dynamically typed [`Scalar`]
//! - Enumeration: [`NpyArray::indices`], or the [`reset_index`] and
//!   [`next_index`] pair
//! - Resizing: [`NpyArray::grow`]
//! - Writing out: [`NpyArray::save`], [`NpyArray::write_npy`], and
//!   [`NpyArray::copy_with`] to change byte order or storage order
//!
//! With the `ndarray` feature, [`NpyArray::to_ndarray`] and the
//! `ToNpyArrayExt` extension trait convert to and from `ndarray` arrays.
//!
//! ## Limitations
//!
//! - The `descr` field of the [header dictionary] must be a string naming a
//!   boolean, integer, floating point or complex type. Structured, string
//!   and object types, and `float16`, are not supported.
//!
//! - An array has between 1 and [`MAX_DIM`] dimensions.
//!
//! [header dictionary]: https://numpy.org/doc/stable/reference/generated/numpy.lib.format.html#format-version-1-0
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs)]

mod npy;

#[cfg(feature = "ndarray")]
mod impl_ndarray;

#[cfg(feature = "ndarray")]
pub use crate::impl_ndarray::ToNpyArrayExt;
pub use crate::npy::{
    header, next_index, reset_index, ByteOrder, DType, Element, ErrorKind, IndexError, Indices,
    Layout, NpyArray, NpyError, OpenMode, Order, ParseBoolError, ParseDescriptorError, Scalar,
    MAX_DIM,
};
pub use num_complex::{Complex32, Complex64};
