mod elements;
pub mod header;
mod index;
mod storage;

pub use self::{
    elements::{ByteOrder, DType, Element, ParseBoolError, ParseDescriptorError, Scalar},
    header::{Descriptor, FormatHeaderError, ParseHeaderError},
    index::{next_index, reset_index, IndexError, Indices, Layout, Order, MAX_DIM},
    storage::OpenMode,
};
use self::{header::ReadHeaderError, storage::Storage};
use std::{
    fs, io,
    ops::Range,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// A typed, N-dimensional view of an `.npy` file, backed by a memory map.
///
/// The element type, byte order, storage order and shape are read from the
/// header when the file is opened, or chosen by the caller when it is
/// created. Elements are decoded and encoded one at a time, directly in the
/// mapped region, so the array is never copied into a separate buffer.
///
/// # Writability
///
/// An array opened with [`OpenMode::ReadOnly`] rejects every mutation with
/// [`NpyError::ReadOnly`]. To modify elements in memory without touching the
/// file, open it with [`OpenMode::CopyOnWrite`].
///
/// # Persistence
///
/// Writes to an array opened with [`OpenMode::ReadWrite`] or created at a
/// path modify mapped pages. [`flush`](Self::flush) and
/// [`close`](Self::close) write them back synchronously. Dropping the array
/// unmaps it without waiting for the write-back and without reporting errors.
///
/// # Example
///
/// ```
/// use npymap::{header::Descriptor, ByteOrder, DType, NpyArray};
/// use std::f64::consts::PI;
///
/// let descriptor = Descriptor::new(DType::F64, [2, 101]).with_byte_order(ByteOrder::Little);
/// let mut array = NpyArray::create_anonymous(descriptor)?;
/// for i in 0..101 {
///     let t = 2. * PI * i as f64 / 100.;
///     array.set(&[0, i], t)?;
///     array.set(&[1, i], t.sin())?;
/// }
/// assert_eq!(array.get::<f64>(&[0, 0])?, 0.);
/// assert!(array.get::<f64>(&[1, 50])?.abs() < 1e-12);
/// assert!((array.get::<f64>(&[0, 100])? - 2. * PI).abs() < 1e-12);
/// # Ok::<_, npymap::NpyError>(())
/// ```
#[derive(Debug)]
pub struct NpyArray {
    storage: Storage,
    descriptor: Descriptor,
    layout: Layout,
    header_len: usize,
    path: Option<PathBuf>,
}

impl NpyArray {
    /// Opens the `.npy` file at `path`, read-only or read-write.
    ///
    /// This is a convenience function for [`NpyArray::open_with`] with
    /// [`OpenMode::ReadOnly`] or [`OpenMode::ReadWrite`].
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self, NpyError> {
        let mode = if writable { OpenMode::ReadWrite } else { OpenMode::ReadOnly };
        Self::open_with(path, mode)
    }

    /// Opens the `.npy` file at `path`, mapped according to `mode`.
    ///
    /// The header is parsed before anything is mapped. The file must be at
    /// least as long as the header plus the data described by it; any bytes
    /// after the data are ignored.
    pub fn open_with<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, NpyError> {
        let path = path.as_ref();
        let file = mode.open_options().open(path)?;
        let (descriptor, header_len) =
            Descriptor::from_reader(io::BufReader::new(&file)).map_err(read_header_error)?;
        let layout = Layout::new(&descriptor.shape, descriptor.order)
            .ok_or(NpyError::LengthOverflow)?;
        let required = descriptor
            .data_len()
            .and_then(|data_len| data_len.checked_add(header_len))
            .ok_or(NpyError::LengthOverflow)?;
        let file_len = file.metadata()?.len();
        if file_len < required as u64 {
            return Err(NpyError::MissingBytes(required - file_len as usize));
        }
        let storage = Storage::open(file, mode)?;
        log::debug!(
            "opened {} as {:?}: {}, shape {:?}, header {} bytes",
            path.display(),
            mode,
            descriptor.dtype,
            descriptor.shape,
            header_len,
        );
        Ok(Self { storage, descriptor, layout, header_len, path: Some(path.to_owned()) })
    }

    /// Creates (or truncates) the `.npy` file at `path` with all elements
    /// zeroed, and maps it read-write.
    ///
    /// On filesystems that support sparse files, the zeroed data does not
    /// occupy disk space until it is written.
    pub fn create<P: AsRef<Path>>(path: P, descriptor: Descriptor) -> Result<Self, NpyError> {
        Self::create_in(Some(path.as_ref()), descriptor)
    }

    /// Creates an array with all elements zeroed that is not backed by a
    /// file.
    ///
    /// The region still holds a complete `.npy` image, so it can be written
    /// out later with [`save`](Self::save).
    pub fn create_anonymous(descriptor: Descriptor) -> Result<Self, NpyError> {
        Self::create_in(None, descriptor)
    }

    fn create_in(path: Option<&Path>, descriptor: Descriptor) -> Result<Self, NpyError> {
        let descriptor = validate(descriptor)?;
        let layout = Layout::new(&descriptor.shape, descriptor.order)
            .ok_or(NpyError::LengthOverflow)?;
        let header = descriptor.to_bytes()?;
        let len = descriptor
            .data_len()
            .and_then(|data_len| data_len.checked_add(header.len()))
            .ok_or(NpyError::LengthOverflow)?;
        let storage = match path {
            Some(path) => Storage::create(path, &header, len)?,
            None => Storage::anonymous(&header, len)?,
        };
        log::debug!(
            "created {}: {}, shape {:?}, header {} bytes",
            path.map_or_else(|| "anonymous array".into(), |path| path.display().to_string()),
            descriptor.dtype,
            descriptor.shape,
            header.len(),
        );
        Ok(Self {
            storage,
            descriptor,
            layout,
            header_len: header.len(),
            path: path.map(Path::to_owned),
        })
    }

    /// Type, byte order, storage order and shape.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.descriptor.dtype
    }

    /// Byte order of the elements.
    pub fn byte_order(&self) -> ByteOrder {
        self.descriptor.byte_order
    }

    /// Storage order of the elements.
    pub fn order(&self) -> Order {
        self.descriptor.order
    }

    /// Length of each axis.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Strides in units of elements.
    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Length of the header in bytes, i.e. the offset of the data region.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// The file the array was opened from or created at, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns `true` unless the array was opened with
    /// [`OpenMode::ReadOnly`].
    pub fn is_writable(&self) -> bool {
        self.storage.is_writable()
    }

    /// Returns `true` if writes reach the backing file.
    pub fn is_persistent(&self) -> bool {
        self.storage.is_persistent()
    }

    fn data_len(&self) -> usize {
        self.layout.len() * self.descriptor.dtype.size()
    }

    /// The data region, in the array's byte order and storage order.
    pub fn data(&self) -> &[u8] {
        &self.storage.bytes()[self.header_len..self.header_len + self.data_len()]
    }

    /// Returns the flat offset of `index`, in elements from the start of the
    /// data region.
    pub fn flatten_index(&self, index: &[usize]) -> Result<usize, IndexError> {
        self.layout.flatten(index)
    }

    /// A cursor over every index, with the last axis varying fastest
    /// regardless of the storage order.
    pub fn indices(&self) -> Indices {
        self.layout.indices()
    }

    /// The first index of the enumeration, or `None` if the array is empty.
    pub fn reset_index(&self) -> Option<Vec<usize>> {
        reset_index(self.shape())
    }

    /// Advances `index` to the next index of the enumeration. Returns
    /// `false` when the enumeration is exhausted.
    pub fn next_index(&self, index: &mut [usize]) -> bool {
        next_index(self.shape(), index)
    }

    fn element_range(&self, index: &[usize]) -> Result<Range<usize>, IndexError> {
        let size = self.descriptor.dtype.size();
        let start = self.header_len + self.layout.flatten(index)? * size;
        Ok(start..start + size)
    }

    pub(crate) fn check_dtype(&self, requested: DType) -> Result<(), NpyError> {
        if requested == self.descriptor.dtype {
            Ok(())
        } else {
            Err(NpyError::WrongType { actual: self.descriptor.dtype, requested })
        }
    }

    /// The stored bytes of the element at `index`, in the array's byte order.
    pub fn element_bytes(&self, index: &[usize]) -> Result<&[u8], NpyError> {
        let range = self.element_range(index)?;
        Ok(&self.storage.bytes()[range])
    }

    /// Reads the element at `index`.
    ///
    /// `A` must match the element type of the array; otherwise
    /// [`NpyError::WrongType`] is returned.
    pub fn get<A: Element>(&self, index: &[usize]) -> Result<A, NpyError> {
        self.check_dtype(A::DTYPE)?;
        let bytes = self.element_bytes(index)?;
        Ok(A::decode(bytes, self.descriptor.byte_order)?)
    }

    /// Writes the element at `index`.
    ///
    /// `A` must match the element type of the array; otherwise
    /// [`NpyError::WrongType`] is returned.
    pub fn set<A: Element>(&mut self, index: &[usize], value: A) -> Result<(), NpyError> {
        self.check_dtype(A::DTYPE)?;
        let byte_order = self.descriptor.byte_order;
        let bytes = self.element_bytes_mut(index)?;
        value.encode(bytes, byte_order);
        Ok(())
    }

    /// Reads the element at `index` as a [`Scalar`] of the array's type.
    pub fn get_value(&self, index: &[usize]) -> Result<Scalar, NpyError> {
        let bytes = self.element_bytes(index)?;
        Ok(Scalar::decode(self.descriptor.dtype, bytes, self.descriptor.byte_order)?)
    }

    /// Writes a [`Scalar`], which must be of the array's type, at `index`.
    pub fn set_value(&mut self, index: &[usize], value: Scalar) -> Result<(), NpyError> {
        self.check_dtype(value.dtype())?;
        let byte_order = self.descriptor.byte_order;
        let bytes = self.element_bytes_mut(index)?;
        value.encode(bytes, byte_order);
        Ok(())
    }

    fn element_bytes_mut(&mut self, index: &[usize]) -> Result<&mut [u8], NpyError> {
        let range = self.element_range(index)?;
        let bytes = self.storage.bytes_mut().ok_or(NpyError::ReadOnly)?;
        Ok(&mut bytes[range])
    }

    /// Copies the array into a new anonymous array with the given byte order
    /// and storage order.
    pub fn copy_with(&self, byte_order: ByteOrder, order: Order) -> Result<NpyArray, NpyError> {
        let descriptor = self.descriptor.clone().with_byte_order(byte_order).with_order(order);
        let mut copy = NpyArray::create_anonymous(descriptor)?;
        for index in self.indices() {
            copy.set_value(&index, self.get_value(&index)?)?;
        }
        Ok(copy)
    }

    /// Extends the axis that varies slowest in storage by `additional`
    /// elements: axis 0 in C order, the last axis in Fortran order.
    ///
    /// Existing elements keep their indices and values, and the new elements
    /// are zeroed. The header is rewritten, moving the data if its padded
    /// length changes, and the region is remapped. A copy-on-write array
    /// is detached from its file.
    ///
    /// ```
    /// use npymap::{header::Descriptor, DType, NpyArray};
    ///
    /// let mut array = NpyArray::create_anonymous(Descriptor::new(DType::I32, [1, 3]))?;
    /// array.set(&[0, 2], 7)?;
    /// array.grow(2)?;
    /// assert_eq!(array.shape(), [3, 3]);
    /// assert_eq!(array.get::<i32>(&[0, 2])?, 7);
    /// assert_eq!(array.get::<i32>(&[2, 2])?, 0);
    /// # Ok::<_, npymap::NpyError>(())
    /// ```
    pub fn grow(&mut self, additional: usize) -> Result<(), NpyError> {
        if !self.storage.is_writable() {
            return Err(NpyError::ReadOnly);
        }
        let axis = match self.descriptor.order {
            Order::C => 0,
            Order::Fortran => self.descriptor.ndim() - 1,
        };
        let mut descriptor = self.descriptor.clone();
        descriptor.shape[axis] = descriptor.shape[axis]
            .checked_add(additional)
            .ok_or(NpyError::LengthOverflow)?;
        let layout = Layout::new(&descriptor.shape, descriptor.order)
            .ok_or(NpyError::LengthOverflow)?;
        let header = descriptor.to_bytes()?;
        let len = descriptor
            .data_len()
            .and_then(|data_len| data_len.checked_add(header.len()))
            .ok_or(NpyError::LengthOverflow)?;

        let old_data = self.header_len..self.header_len + self.data_len();
        let old_len = self.storage.bytes().len();
        self.storage.resize(len)?;
        let bytes = self.storage.bytes_mut().ok_or(NpyError::ReadOnly)?;
        let data_end = header.len() + old_data.len();
        if header.len() != self.header_len {
            bytes.copy_within(old_data, header.len());
        }
        bytes[..header.len()].copy_from_slice(&header);
        // Bytes past the old data that existed before resizing may be stale.
        if data_end < old_len.min(len) {
            bytes[data_end..old_len.min(len)].fill(0);
        }

        log::debug!(
            "grew axis {} of {} by {}: shape {:?}, header {} bytes",
            axis,
            self.path
                .as_deref()
                .map_or_else(|| "anonymous array".into(), |path| path.display().to_string()),
            additional,
            descriptor.shape,
            header.len(),
        );
        self.descriptor = descriptor;
        self.layout = layout;
        self.header_len = header.len();
        Ok(())
    }

    /// Synchronously writes modified pages back to the file. This does
    /// nothing unless writes reach a file.
    pub fn flush(&self) -> Result<(), NpyError> {
        log::trace!("flushing {:?}", self.path);
        Ok(self.storage.flush()?)
    }

    /// Writes the header and data to `writer` in `.npy` format.
    ///
    /// For the sake of convenience, this method calls
    /// [`io::Write::flush()`] on the writer before returning.
    pub fn write_npy<W: io::Write>(&self, mut writer: W) -> Result<(), NpyError> {
        writer.write_all(&self.storage.bytes()[..self.header_len + self.data_len()])?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the array to a new `.npy` file at `path`.
    ///
    /// This function will create the file if it does not exist, or overwrite
    /// it if it does. It is the way to persist an anonymous array.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NpyError> {
        self.write_npy(io::BufWriter::new(fs::File::create(path)?))
    }

    /// Flushes modified pages of a persistent array and unmaps it.
    ///
    /// The array is consumed, so it cannot be used or closed again.
    pub fn close(self) -> Result<(), NpyError> {
        log::debug!("closing {:?}", self.path);
        Ok(self.storage.close()?)
    }
}

fn validate(descriptor: Descriptor) -> Result<Descriptor, NpyError> {
    let ndim = descriptor.ndim();
    if !(1..=MAX_DIM).contains(&ndim) {
        return Err(NpyError::Ndim(ndim));
    }
    let byte_order = descriptor.dtype.normalize(descriptor.byte_order);
    if byte_order == ByteOrder::NotApplicable && !descriptor.dtype.is_single_byte() {
        return Err(NpyError::MissingByteOrder(descriptor.dtype));
    }
    Ok(Descriptor { byte_order, ..descriptor })
}

/// The category of an [`NpyError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file is not a valid `.npy` file, or holds invalid data.
    Format,
    /// The platform failed to open, create, map, resize or flush a file.
    Storage,
    /// An index does not address an element of the array.
    Bounds,
    /// The caller asked for something the array cannot do.
    Misuse,
}

/// An error opening, creating or accessing an [`NpyArray`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NpyError {
    /// An error caused by I/O.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An error parsing the file header.
    #[error("error parsing header: {0}")]
    ParseHeader(#[from] ParseHeaderError),
    /// An error formatting the header.
    #[error("error formatting header: {0}")]
    FormatHeader(#[from] FormatHeaderError),
    /// The file ended before the end of the header.
    #[error("reached EOF before the end of the header")]
    TruncatedHeader,
    /// The file does not contain all the data described in the header.
    #[error("missing {0} bytes of data specified in header")]
    MissingBytes(usize),
    /// Overflow while computing the length of the array (in units of bytes or
    /// the number of elements) from the shape.
    #[error("overflow computing length from shape")]
    LengthOverflow,
    /// The number of dimensions is zero or greater than [`MAX_DIM`].
    #[error("ndim {0} is outside of the supported range 1..={max}", max = MAX_DIM)]
    Ndim(usize),
    /// A multi-byte element type was given [`ByteOrder::NotApplicable`].
    #[error("{0} elements need a byte order")]
    MissingByteOrder(DType),
    /// An index does not address an element of the array.
    #[error("{0}")]
    Index(#[from] IndexError),
    /// The requested element type does not match the array.
    #[error("requested {requested} elements from an array of {actual}")]
    WrongType {
        /// Element type of the array.
        actual: DType,
        /// Element type of the access.
        requested: DType,
    },
    /// A stored `bool` is neither 0 nor 1.
    #[error("invalid data for element type: {0}")]
    ParseBool(#[from] ParseBoolError),
    /// The array was opened read-only.
    #[error("array is read-only")]
    ReadOnly,
}

impl NpyError {
    /// The category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Storage,
            Self::ParseHeader(_)
            | Self::FormatHeader(_)
            | Self::TruncatedHeader
            | Self::MissingBytes(_)
            | Self::LengthOverflow
            | Self::ParseBool(_) => ErrorKind::Format,
            Self::Index(_) => ErrorKind::Bounds,
            Self::Ndim(_) | Self::MissingByteOrder(_) | Self::WrongType { .. } | Self::ReadOnly => {
                ErrorKind::Misuse
            }
        }
    }

    /// The platform error code of an I/O error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

// An `UnexpectedEof` while reading the header means the file is too short.
fn read_header_error(err: ReadHeaderError) -> NpyError {
    match err {
        ReadHeaderError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            NpyError::TruncatedHeader
        }
        ReadHeaderError::Io(err) => NpyError::Io(err),
        ReadHeaderError::Parse(err) => NpyError::ParseHeader(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_normalizes_and_rejects() {
        let descriptor = Descriptor {
            dtype: DType::U8,
            byte_order: ByteOrder::Big,
            order: Order::C,
            shape: vec![3],
        };
        assert_eq!(validate(descriptor).unwrap().byte_order, ByteOrder::NotApplicable);

        let descriptor = Descriptor {
            dtype: DType::F32,
            byte_order: ByteOrder::NotApplicable,
            order: Order::C,
            shape: vec![3],
        };
        assert!(matches!(validate(descriptor), Err(NpyError::MissingByteOrder(DType::F32))));

        assert!(matches!(
            validate(Descriptor::new(DType::F32, Vec::new())),
            Err(NpyError::Ndim(0))
        ));
        assert!(matches!(
            validate(Descriptor::new(DType::F32, vec![1; MAX_DIM + 1])),
            Err(NpyError::Ndim(33))
        ));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(NpyError::TruncatedHeader.kind(), ErrorKind::Format);
        assert_eq!(NpyError::ReadOnly.kind(), ErrorKind::Misuse);
        assert_eq!(
            NpyError::from(IndexError::WrongNdim { expected: 2, got: 1 }).kind(),
            ErrorKind::Bounds
        );
        let err = NpyError::from(io::Error::from_raw_os_error(28));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.raw_os_error(), Some(28));
        assert_eq!(NpyError::ReadOnly.raw_os_error(), None);
    }

    #[test]
    fn truncated_header_conversion() {
        let err = ReadHeaderError::Io(io::ErrorKind::UnexpectedEof.into());
        assert!(matches!(read_header_error(err), NpyError::TruncatedHeader));
    }

    #[test]
    fn element_ranges_follow_layout() {
        let descriptor = Descriptor::new(DType::I16, [2, 3]).with_order(Order::Fortran);
        let array = NpyArray::create_anonymous(descriptor).unwrap();
        let header_len = array.header_len();
        assert_eq!(header_len % header::HEADER_DIVISOR, 0);
        assert_eq!(array.element_range(&[1, 2]).unwrap(), header_len + 10..header_len + 12);
        assert_eq!(array.data().len(), 12);
    }

    #[test]
    fn set_encodes_in_stored_byte_order() {
        let descriptor = Descriptor::new(DType::U32, [2]).with_byte_order(ByteOrder::Big);
        let mut array = NpyArray::create_anonymous(descriptor).unwrap();
        array.set(&[0], 0x0102_0304_u32).unwrap();
        array.set_value(&[1], Scalar::U32(0x0a0b_0c0d)).unwrap();
        assert_eq!(array.data(), [1, 2, 3, 4, 0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(array.get::<u32>(&[0]).unwrap(), 0x0102_0304);
        assert_eq!(array.get_value(&[1]).unwrap(), Scalar::U32(0x0a0b_0c0d));
    }
}
