//! Parsing and formatting of the `.npy` header.
//!
//! The header is the magic string, a version number, the length of the
//! header dictionary, and the dictionary itself as a Python literal, padded
//! so that the data region starts at a multiple of 64 bytes.

use super::{
    elements::{ByteOrder, DType, ParseDescriptorError},
    index::{Order, MAX_DIM},
};
use byteorder::{ByteOrder as _, LittleEndian, ReadBytesExt};
use num_traits::ToPrimitive;
use py_literal::{
    FormatError as PyValueFormatError, ParseError as PyValueParseError, Value as PyValue,
};
use std::{
    convert::TryFrom,
    error::Error,
    fmt,
    io::{self, Read},
};

/// Magic string to indicate npy format.
pub const MAGIC_STRING: &[u8] = b"\x93NUMPY";

/// The total header length (including magic string, version number, header
/// length value, array format description, padding, and final newline) must be
/// evenly divisible by this value.
pub const HEADER_DIVISOR: usize = 64;

/// An error parsing the header of a `.npy` file.
#[derive(Debug)]
pub enum ParseHeaderError {
    /// The start of the file does not match the magic string.
    MagicString,
    /// The version number is not recognized.
    Version {
        /// Major version number.
        major: u8,
        /// Minor version number.
        minor: u8,
    },
    /// Indicates that the `HEADER_LEN` doesn't fit in `usize`.
    HeaderLengthOverflow(u32),
    /// Indicates that the array format string contains non-ASCII characters.
    /// This is an error for .npy format versions 1.0 and 2.0.
    NonAscii,
    /// Error parsing the array format string as UTF-8. This does not apply to
    /// .npy format versions 1.0 and 2.0, which require the array format string
    /// to be ASCII.
    Utf8Parse(std::str::Utf8Error),
    /// An unknown key was found in the metadata dictionary.
    UnknownKey(PyValue),
    /// A required key was missing from the metadata dictionary.
    MissingKey(&'static str),
    /// An illegal value was found for a key in the metadata dictionary.
    IllegalValue {
        /// The key for which the value was illegal.
        key: &'static str,
        /// The illegal value.
        value: PyValue,
    },
    /// Error parsing the metadata dictionary.
    DictParse(PyValueParseError),
    /// The metadata is not a dictionary.
    MetaNotDict(PyValue),
    /// The header is missing a newline at the end.
    MissingNewline,
    /// The `descr` string does not describe a supported element type.
    Descriptor(ParseDescriptorError),
}

impl Error for ParseHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MagicString => None,
            Self::Version { .. } => None,
            Self::HeaderLengthOverflow(_) => None,
            Self::NonAscii => None,
            Self::Utf8Parse(err) => Some(err),
            Self::UnknownKey(_) => None,
            Self::MissingKey(_) => None,
            Self::IllegalValue { .. } => None,
            Self::DictParse(err) => Some(err),
            Self::MetaNotDict(_) => None,
            Self::MissingNewline => None,
            Self::Descriptor(err) => Some(err),
        }
    }
}

impl fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MagicString => write!(f, "start does not match magic string"),
            Self::Version { major, minor } => write!(f, "unknown version number: {major}.{minor}"),
            Self::HeaderLengthOverflow(len) => write!(f, "HEADER_LEN {len} does not fit in `usize`"),
            Self::NonAscii => write!(f, "non-ascii in array format string; this is not supported in .npy format versions 1.0 and 2.0"),
            Self::Utf8Parse(err) => write!(f, "error parsing array format string as UTF-8: {err}"),
            Self::UnknownKey(key) => write!(f, "unknown key: {key}"),
            Self::MissingKey(key) => write!(f, "missing key: {key}"),
            Self::IllegalValue { key, value } => write!(f, "illegal value for key {key}: {value}"),
            Self::DictParse(err) => write!(f, "error parsing metadata dict: {err}"),
            Self::MetaNotDict(value) => write!(f, "metadata is not a dict: {value}"),
            Self::MissingNewline => write!(f, "newline missing at end of header"),
            Self::Descriptor(err) => write!(f, "error parsing descr: {err}"),
        }
    }
}

impl From<std::str::Utf8Error> for ParseHeaderError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Utf8Parse(err)
    }
}

impl From<ParseDescriptorError> for ParseHeaderError {
    fn from(err: ParseDescriptorError) -> Self {
        Self::Descriptor(err)
    }
}

impl From<PyValueParseError> for ParseHeaderError {
    fn from(err: PyValueParseError) -> Self {
        Self::DictParse(err)
    }
}

#[derive(Debug)]
pub(crate) enum ReadHeaderError {
    Io(io::Error),
    Parse(ParseHeaderError),
}

impl From<io::Error> for ReadHeaderError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ParseHeaderError> for ReadHeaderError {
    fn from(err: ParseHeaderError) -> Self {
        Self::Parse(err)
    }
}

#[derive(Clone, Copy)]
#[allow(non_camel_case_types)]
#[non_exhaustive]
enum Version {
    V1_0,
    V2_0,
    V3_0,
}

impl Version {
    /// Number of bytes taken up by version number (1 byte for major version, 1
    /// byte for minor version).
    const VERSION_NUM_BYTES: usize = 2;

    fn from_array(bytes: [u8; Self::VERSION_NUM_BYTES]) -> Result<Self, ParseHeaderError> {
        match bytes {
            [0x01, 0x00] => Ok(Version::V1_0),
            [0x02, 0x00] => Ok(Version::V2_0),
            [0x03, 0x00] => Ok(Version::V3_0),
            [major, minor] => Err(ParseHeaderError::Version { major, minor }),
        }
    }

    /// Major version number.
    const fn major_version(self) -> u8 {
        match self {
            Version::V1_0 => 1,
            Version::V2_0 => 2,
            Version::V3_0 => 3,
        }
    }

    /// Minor version number.
    const fn minor_version(self) -> u8 {
        match self {
            Version::V1_0 => 0,
            Version::V2_0 => 0,
            Version::V3_0 => 0,
        }
    }

    /// Number of bytes in representation of header length.
    const fn header_len_num_bytes(self) -> usize {
        match self {
            Version::V1_0 => 2,
            Version::V2_0 | Version::V3_0 => 4,
        }
    }

    /// Read header length.
    fn read_header_len<R: io::Read>(self, mut reader: R) -> Result<usize, ReadHeaderError> {
        match self {
            Version::V1_0 => Ok(usize::from(reader.read_u16::<LittleEndian>()?)),
            Version::V2_0 | Version::V3_0 => {
                let header_len: u32 = reader.read_u32::<LittleEndian>()?;
                Ok(usize::try_from(header_len)
                    .map_err(|_| ParseHeaderError::HeaderLengthOverflow(header_len))?)
            }
        }
    }

    /// Format header length as bytes for writing to file.
    ///
    /// Returns `None` if the value of `header_len` is too large for this .npy
    /// version.
    fn format_header_len(self, header_len: usize) -> Option<Vec<u8>> {
        match self {
            Version::V1_0 => {
                let header_len = u16::try_from(header_len).ok()?;
                let mut out = vec![0; self.header_len_num_bytes()];
                LittleEndian::write_u16(&mut out, header_len);
                Some(out)
            }
            Version::V2_0 | Version::V3_0 => {
                let header_len: u32 = u32::try_from(header_len).ok()?;
                let mut out = vec![0; self.header_len_num_bytes()];
                LittleEndian::write_u32(&mut out, header_len);
                Some(out)
            }
        }
    }

    /// Computes the total header length, formatted `HEADER_LEN` value, and
    /// padding length for this .npy version.
    ///
    /// `unpadded_arr_format` is the Python literal describing the array
    /// format, formatted as an ASCII string without any padding.
    ///
    /// Returns `None` if the total header length overflows `usize` or if the
    /// value of `HEADER_LEN` is too large for this .npy version.
    fn compute_lengths(self, unpadded_arr_format: &[u8]) -> Option<HeaderLengthInfo> {
        /// Length of a '\n' char in bytes.
        const NEWLINE_LEN: usize = b"\n".len();

        let prefix_len =
            MAGIC_STRING.len() + Version::VERSION_NUM_BYTES + self.header_len_num_bytes();
        let unpadded_total_len = prefix_len
            .checked_add(unpadded_arr_format.len())?
            .checked_add(NEWLINE_LEN)?;
        let padding_len = HEADER_DIVISOR - unpadded_total_len % HEADER_DIVISOR;
        let total_len = unpadded_total_len.checked_add(padding_len)?;
        let header_len = total_len - prefix_len;
        let formatted_header_len = self.format_header_len(header_len)?;
        Some(HeaderLengthInfo { total_len, formatted_header_len })
    }
}

struct HeaderLengthInfo {
    /// Total header length (including magic string, version number, header
    /// length value, array format description, padding, and final newline).
    total_len: usize,
    /// Formatted `HEADER_LEN` value. (This is the number of bytes in the array
    /// format description, padding, and final newline.)
    formatted_header_len: Vec<u8>,
}

/// An error formatting the header of a `.npy` file.
#[derive(Debug)]
pub enum FormatHeaderError {
    /// Error formatting the metadata dictionary.
    PyValue(PyValueFormatError),
    /// The total header length overflows `usize`, or `HEADER_LEN` exceeds the
    /// maximum encodable value.
    HeaderTooLong,
}

impl Error for FormatHeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PyValue(err) => Some(err),
            Self::HeaderTooLong => None,
        }
    }
}

impl fmt::Display for FormatHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PyValue(err) => write!(f, "error formatting Python value: {err}"),
            Self::HeaderTooLong => write!(f, "the header is too long"),
        }
    }
}

impl From<PyValueFormatError> for FormatHeaderError {
    fn from(err: PyValueFormatError) -> Self {
        Self::PyValue(err)
    }
}

/// Type, byte order, storage order and shape of an array.
///
/// This is the information carried by the header dictionary. It is fixed
/// once an array is opened or created, except that [`NpyArray::grow`]
/// extends one axis.
///
/// [`NpyArray::grow`]: crate::NpyArray::grow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// Element type.
    pub dtype: DType,
    /// Byte order of the elements.
    pub byte_order: ByteOrder,
    /// Storage order of the elements.
    pub order: Order,
    /// Length of each axis.
    pub shape: Vec<usize>,
}

impl Descriptor {
    /// Creates a descriptor in native byte order and C order.
    ///
    /// ```
    /// use npymap::{header::Descriptor, ByteOrder, DType, Order};
    ///
    /// let descriptor = Descriptor::new(DType::F64, [2, 101])
    ///     .with_byte_order(ByteOrder::Big)
    ///     .with_order(Order::Fortran);
    /// assert_eq!(
    ///     descriptor.to_string(),
    ///     "{'descr': '>f8', 'fortran_order': True, 'shape': (2, 101)}",
    /// );
    /// ```
    pub fn new(dtype: DType, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            byte_order: dtype.normalize(ByteOrder::native()),
            order: Order::C,
            shape: shape.into(),
        }
    }

    /// Sets the byte order. It is ignored for one-byte element types.
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = self.dtype.normalize(byte_order);
        self
    }

    /// Sets the storage order.
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements, or `None` on overflow.
    pub fn len(&self) -> Option<usize> {
        self.shape.iter().try_fold(1_usize, |acc, &n| acc.checked_mul(n))
    }

    /// Size of the data region in bytes.
    ///
    /// Returns `None` if the number of elements or the length in bytes would
    /// overflow `isize`.
    pub fn data_len(&self) -> Option<usize> {
        const MAX: usize = isize::MAX as usize;
        let len = self.len()?.checked_mul(self.dtype.size())?;
        (len < MAX).then_some(len)
    }

    fn from_py_value(value: PyValue) -> Result<Self, ParseHeaderError> {
        let PyValue::Dict(dict) = value else {
            return Err(ParseHeaderError::MetaNotDict(value));
        };
        let mut type_descriptor = None;
        let mut fortran_order = None;
        let mut shape = None;
        for (key, value) in dict {
            match &key {
                PyValue::String(k) if k == "descr" => {
                    if let PyValue::String(descr) = &value {
                        type_descriptor = Some(DType::parse_descriptor(descr)?);
                    } else {
                        return Err(ParseHeaderError::IllegalValue { key: "descr", value });
                    }
                }
                PyValue::String(k) if k == "fortran_order" => {
                    if let PyValue::Boolean(b) = value {
                        fortran_order = Some(b);
                    } else {
                        return Err(ParseHeaderError::IllegalValue { key: "fortran_order", value });
                    }
                }
                PyValue::String(k) if k == "shape" => {
                    fn parse_shape(value: &PyValue) -> Option<Vec<usize>> {
                        let shape = value
                            .as_tuple()?
                            .iter()
                            .map(|elem| elem.as_integer()?.to_usize())
                            .collect::<Option<Vec<_>>>()?;
                        (1..=MAX_DIM).contains(&shape.len()).then_some(shape)
                    }
                    if let Some(s) = parse_shape(&value) {
                        shape = Some(s);
                    } else {
                        return Err(ParseHeaderError::IllegalValue { key: "shape", value });
                    }
                }
                _ => return Err(ParseHeaderError::UnknownKey(key)),
            }
        }
        let (dtype, byte_order) = type_descriptor.ok_or(ParseHeaderError::MissingKey("descr"))?;
        let fortran_order = fortran_order.ok_or(ParseHeaderError::MissingKey("fortran_order"))?;
        let shape = shape.ok_or(ParseHeaderError::MissingKey("shape"))?;
        Ok(Self { dtype, byte_order, order: Order::from_fortran(fortran_order), shape })
    }

    /// Reads the header, returning the descriptor and the total header length
    /// (the offset of the data region).
    pub(crate) fn from_reader<R: io::Read>(
        mut reader: R,
    ) -> Result<(Self, usize), ReadHeaderError> {
        // Check for magic string
        {
            let mut buf = [0; MAGIC_STRING.len()];
            reader.read_exact(&mut buf)?;
            if buf != MAGIC_STRING {
                Err(ParseHeaderError::MagicString)?;
            }
        }

        // Get version number
        let mut buf = [0; Version::VERSION_NUM_BYTES];
        reader.read_exact(&mut buf)?;
        let version = Version::from_array(buf)?;

        // Get `HEADER_LEN`
        let header_len = version.read_header_len(&mut reader)?;
        let prefix_len =
            MAGIC_STRING.len() + Version::VERSION_NUM_BYTES + version.header_len_num_bytes();

        // Parse the dictionary describing the array's format
        // `HEADER_LEN` is untrusted, so the buffer only grows as bytes arrive.
        let mut buf = Vec::new();
        reader.by_ref().take(header_len as u64).read_to_end(&mut buf)?;
        if buf.len() < header_len {
            return Err(ReadHeaderError::Io(io::ErrorKind::UnexpectedEof.into()));
        }
        let without_newline = match buf.split_last() {
            Some((&b'\n', rest)) => rest,
            Some(_) | None => Err(ParseHeaderError::MissingNewline)?,
        };
        let header_str = match version {
            Version::V1_0 | Version::V2_0 => {
                if without_newline.is_ascii() {
                    // ASCII strings are always valid UTF-8
                    unsafe { std::str::from_utf8_unchecked(without_newline) }
                } else {
                    Err(ParseHeaderError::NonAscii)?
                }
            }
            Version::V3_0 => {
                std::str::from_utf8(without_newline).map_err(ParseHeaderError::from)?
            }
        };
        let arr_format = header_str.parse().map_err(ParseHeaderError::from)?;
        Ok((Self::from_py_value(arr_format)?, prefix_len + header_len))
    }

    fn to_py_value(&self) -> PyValue {
        PyValue::Dict(vec![
            (
                PyValue::String("descr".to_string()),
                PyValue::String(self.dtype.descriptor(self.byte_order)),
            ),
            (
                PyValue::String("fortran_order".to_string()),
                PyValue::Boolean(self.order.is_fortran()),
            ),
            (
                PyValue::String("shape".to_string()),
                PyValue::Tuple(
                    self.shape
                        .iter()
                        .map(|&elem| PyValue::Integer(elem.into()))
                        .collect(),
                ),
            ),
        ])
    }

    /// Formats the complete header, padded to a multiple of
    /// [`HEADER_DIVISOR`] bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatHeaderError> {
        // Metadata describing array's format as ASCII string
        let mut arr_format = Vec::new();
        self.to_py_value().write_ascii(&mut arr_format)?;

        // Determine appropriate version based on header length, and compute
        // length information.
        let (version, length_info) = [Version::V1_0, Version::V2_0]
            .iter()
            .find_map(|&version| Some((version, version.compute_lengths(&arr_format)?)))
            .ok_or(FormatHeaderError::HeaderTooLong)?;

        // Write the header
        let mut out = Vec::with_capacity(length_info.total_len);
        out.extend_from_slice(MAGIC_STRING);
        out.push(version.major_version());
        out.push(version.minor_version());
        out.extend_from_slice(&length_info.formatted_header_len);
        out.extend_from_slice(&arr_format);
        out.resize(length_info.total_len - 1, b' ');
        out.push(b'\n');

        // Verify the length of the header
        debug_assert_eq!(out.len(), length_info.total_len);
        debug_assert_eq!(out.len() % HEADER_DIVISOR, 0);

        Ok(out)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        fmt::Display::fmt(&self.to_py_value(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder as _;

    fn parse(bytes: &[u8]) -> Result<(Descriptor, usize), ReadHeaderError> {
        Descriptor::from_reader(bytes)
    }

    fn raw_header(version: [u8; 2], dict: &str) -> Vec<u8> {
        let mut out = MAGIC_STRING.to_vec();
        out.extend_from_slice(&version);
        let len = dict.len() + 1;
        if version[0] == 1 {
            out.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
        out.extend_from_slice(dict.as_bytes());
        out.push(b'\n');
        out
    }

    #[test]
    fn format_is_padded_and_parses_back() {
        let descriptor = Descriptor::new(DType::C64, [3, 4, 5])
            .with_byte_order(ByteOrder::Big)
            .with_order(Order::Fortran);
        let bytes = descriptor.to_bytes().unwrap();
        assert_eq!(bytes.len() % HEADER_DIVISOR, 0);
        assert_eq!(&bytes[..8], b"\x93NUMPY\x01\x00");
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(usize::from(LittleEndian::read_u16(&bytes[8..10])), bytes.len() - 10);
        let text = std::str::from_utf8(&bytes[10..]).unwrap();
        assert!(text.starts_with("{'descr': '>c8', 'fortran_order': True, 'shape': (3, 4, 5)}"));

        let (parsed, total_len) = parse(&bytes).unwrap();
        assert_eq!(parsed, descriptor);
        assert_eq!(total_len, bytes.len());
    }

    #[test]
    fn one_dimensional_shape_has_trailing_comma() {
        let bytes = Descriptor::new(DType::U8, [7]).to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes[10..]).unwrap();
        assert!(text.starts_with("{'descr': '|u1', 'fortran_order': False, 'shape': (7,)}"));
    }

    #[test]
    fn long_header_needs_version_2() {
        let arr_format = vec![b' '; 70_000];
        assert!(Version::V1_0.compute_lengths(&arr_format).is_none());
        let info = Version::V2_0.compute_lengths(&arr_format).unwrap();
        assert_eq!(info.total_len % HEADER_DIVISOR, 0);
        assert_eq!(
            LittleEndian::read_u32(&info.formatted_header_len) as usize,
            info.total_len - MAGIC_STRING.len() - 2 - 4
        );
    }

    #[test]
    fn version_2_header_parses() {
        let bytes = raw_header([2, 0], "{'descr': '<f4', 'fortran_order': False, 'shape': (3, 1)}");
        let (descriptor, total_len) = parse(&bytes).unwrap();
        assert_eq!(descriptor.shape, [3, 1]);
        assert_eq!(total_len, bytes.len());
    }

    #[test]
    fn parses_numpy_written_header() {
        let bytes =
            raw_header([1, 0], "{'descr': '<i4', 'fortran_order': False, 'shape': (2, 3), }");
        let (descriptor, total_len) = parse(&bytes).unwrap();
        assert_eq!(
            descriptor,
            Descriptor::new(DType::I32, [2, 3]).with_byte_order(ByteOrder::Little)
        );
        assert_eq!(total_len, bytes.len());

        let bytes = raw_header([3, 0], "{'shape': (4,), 'fortran_order': True, 'descr': '>u2'}");
        let (descriptor, _) = parse(&bytes).unwrap();
        assert_eq!(descriptor.dtype, DType::U16);
        assert_eq!(descriptor.byte_order, ByteOrder::Big);
        assert_eq!(descriptor.order, Order::Fortran);
    }

    #[test]
    fn single_byte_order_is_normalized() {
        let bytes = raw_header([1, 0], "{'descr': '<b1', 'fortran_order': False, 'shape': (1,)}");
        let (descriptor, _) = parse(&bytes).unwrap();
        assert_eq!(descriptor.dtype, DType::Bool);
        assert_eq!(descriptor.byte_order, ByteOrder::NotApplicable);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Descriptor::new(DType::F64, [1]).to_bytes().unwrap();
        bytes[1] = b'X';
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Parse(ParseHeaderError::MagicString))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = Descriptor::new(DType::F64, [1]).to_bytes().unwrap();
        bytes[6] = 4;
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Parse(ParseHeaderError::Version { major: 4, minor: 0 }))
        ));
    }

    #[test]
    fn rejects_bad_dictionaries() {
        let cases = [
            "{'descr': '<f2', 'fortran_order': False, 'shape': (1,)}",
            "{'descr': '<f8', 'fortran_order': 0, 'shape': (1,)}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': ()}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (-1,)}",
            "{'descr': '<f8', 'fortran_order': False}",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (1,), 'extra': 1}",
            "['descr', 'fortran_order', 'shape']",
            "{'descr': '<f8', 'fortran_order': False, 'shape': (1,)",
        ];
        for dict in cases {
            let bytes = raw_header([1, 0], dict);
            assert!(
                matches!(parse(&bytes), Err(ReadHeaderError::Parse(_))),
                "accepted {dict}"
            );
        }
    }

    #[test]
    fn rejects_too_many_dimensions() {
        let shape = vec!["1"; MAX_DIM + 1].join(", ");
        let dict = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': ({shape})}}");
        let bytes = raw_header([1, 0], &dict);
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Parse(ParseHeaderError::IllegalValue { key: "shape", .. }))
        ));
    }

    #[test]
    fn rejects_missing_newline() {
        let mut bytes =
            raw_header([1, 0], "{'descr': '<f8', 'fortran_order': False, 'shape': (1,)}");
        *bytes.last_mut().unwrap() = b' ';
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Parse(ParseHeaderError::MissingNewline))
        ));
    }

    #[test]
    fn versions_1_and_2_require_ascii() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (1,), 'é': 0}";
        for version in [[1, 0], [2, 0]] {
            assert!(matches!(
                parse(&raw_header(version, dict)),
                Err(ReadHeaderError::Parse(ParseHeaderError::NonAscii))
            ));
        }
    }

    #[test]
    fn version_3_allows_utf8() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (1,), 'é': 0}";
        match parse(&raw_header([3, 0], dict)) {
            Err(ReadHeaderError::Parse(ParseHeaderError::UnknownKey(PyValue::String(key)))) => {
                assert_eq!(key, "é");
            }
            other => panic!("expected an unknown key, got {other:?}"),
        }

        let mut bytes =
            raw_header([3, 0], "{'descr': '<f8', 'fortran_order': False, 'shape': (1,)}");
        bytes[13] = 0xff;
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Parse(ParseHeaderError::Utf8Parse(_)))
        ));
    }

    #[test]
    fn header_len_beyond_input_is_truncated() {
        let mut bytes = MAGIC_STRING.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&0xffff_fff0_u32.to_le_bytes());
        bytes.extend_from_slice(b"{'descr'");
        assert!(matches!(
            parse(&bytes),
            Err(ReadHeaderError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn truncated_header_is_an_io_error() {
        let bytes = Descriptor::new(DType::F64, [1]).to_bytes().unwrap();
        assert!(matches!(
            parse(&bytes[..20]),
            Err(ReadHeaderError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof
        ));
    }
}
