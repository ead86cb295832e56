//! Element types, their sizes, and their encodings in the data region.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use num_complex::{Complex32, Complex64};
use std::fmt;
use thiserror::Error;

/// Byte order of the elements stored in an `.npy` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Little-endian, written as `<`.
    Little,
    /// Big-endian, written as `>`.
    Big,
    /// Not applicable, written as `|`. Only valid for one-byte element types.
    NotApplicable,
}

impl ByteOrder {
    /// The byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    const fn prefix(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::NotApplicable => '|',
        }
    }

    fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '<' => Some(Self::Little),
            '>' => Some(Self::Big),
            '|' => Some(Self::NotApplicable),
            '=' => Some(Self::native()),
            _ => None,
        }
    }
}

/// The element types supported in the data region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// `bool`, one byte holding 0 or 1.
    Bool,
    /// `int8`
    I8,
    /// `int16`
    I16,
    /// `int32`
    I32,
    /// `int64`
    I64,
    /// `uint8`
    U8,
    /// `uint16`
    U16,
    /// `uint32`
    U32,
    /// `uint64`
    U64,
    /// `float32`
    F32,
    /// `float64`
    F64,
    /// `complex64`, a pair of `float32`.
    C64,
    /// `complex128`, a pair of `float64`.
    C128,
}

impl DType {
    /// Every supported element type.
    pub const ALL: [DType; 13] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::C64,
        Self::C128,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 | Self::C64 => 8,
            Self::C128 => 16,
        }
    }

    /// Returns `true` if byte order is meaningless for this type.
    pub const fn is_single_byte(self) -> bool {
        self.size() == 1
    }

    /// The byte order actually used for this type: `NotApplicable` for
    /// one-byte types, `order` otherwise.
    pub const fn normalize(self, order: ByteOrder) -> ByteOrder {
        if self.is_single_byte() {
            ByteOrder::NotApplicable
        } else {
            order
        }
    }

    const fn type_code(self) -> &'static str {
        match self {
            Self::Bool => "b1",
            Self::I8 => "i1",
            Self::I16 => "i2",
            Self::I32 => "i4",
            Self::I64 => "i8",
            Self::U8 => "u1",
            Self::U16 => "u2",
            Self::U32 => "u4",
            Self::U64 => "u8",
            Self::F32 => "f4",
            Self::F64 => "f8",
            Self::C64 => "c8",
            Self::C128 => "c16",
        }
    }

    fn from_type_code(code: &str) -> Option<Self> {
        if code == "?" {
            return Some(Self::Bool);
        }
        Self::ALL.into_iter().find(|dtype| dtype.type_code() == code)
    }

    /// Formats the `descr` string of the header, e.g. `<f8`.
    pub fn descriptor(self, order: ByteOrder) -> String {
        format!("{}{}", self.normalize(order).prefix(), self.type_code())
    }

    /// Parses a `descr` string of the header into a type and byte order.
    ///
    /// `=` and a missing prefix both resolve to [`ByteOrder::native()`]. The
    /// byte order of one-byte types is always [`ByteOrder::NotApplicable`].
    ///
    /// ```
    /// use npymap::{ByteOrder, DType};
    ///
    /// assert_eq!(DType::parse_descriptor(">c16")?, (DType::C128, ByteOrder::Big));
    /// assert_eq!(DType::parse_descriptor("<u1")?, (DType::U8, ByteOrder::NotApplicable));
    /// # Ok::<_, npymap::ParseDescriptorError>(())
    /// ```
    pub fn parse_descriptor(descr: &str) -> Result<(Self, ByteOrder), ParseDescriptorError> {
        let mut chars = descr.chars();
        let (order, code) = match chars.next().and_then(ByteOrder::from_prefix) {
            Some(order) => (order, chars.as_str()),
            None => (ByteOrder::native(), descr),
        };
        let dtype = Self::from_type_code(code)
            .ok_or_else(|| ParseDescriptorError::Unsupported(descr.to_string()))?;
        if order == ByteOrder::NotApplicable && !dtype.is_single_byte() {
            return Err(ParseDescriptorError::MissingByteOrder(descr.to_string()));
        }
        Ok((dtype, dtype.normalize(order)))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::C64 => "complex64",
            Self::C128 => "complex128",
        };
        f.write_str(name)
    }
}

/// An error parsing the `descr` string of a header.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseDescriptorError {
    /// The type code is not one of the supported element types.
    #[error("unsupported type descriptor {0:?}")]
    Unsupported(String),
    /// A multi-byte type was declared with `|` instead of `<` or `>`.
    #[error("type descriptor {0:?} needs an explicit byte order")]
    MissingByteOrder(String),
}

/// An error parsing a `bool` from a byte.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("error parsing value {bad_value:#04x} as a bool")]
pub struct ParseBoolError {
    bad_value: u8,
}

/// An array element type that can be read from and written to the data
/// region of an `.npy` file.
///
/// `decode` and `encode` receive a slice of exactly `DTYPE.size()` bytes.
pub trait Element: Copy {
    /// The element type this Rust type corresponds to.
    const DTYPE: DType;

    /// Decodes an element stored in `order`.
    fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self, ParseBoolError>;

    /// Encodes the element in `order`.
    fn encode(self, bytes: &mut [u8], order: ByteOrder);

    /// Wraps the element in a [`Scalar`].
    fn into_scalar(self) -> Scalar;

    /// Unwraps a [`Scalar`] of the matching variant.
    fn from_scalar(value: Scalar) -> Option<Self>;
}

macro_rules! impl_scalar_conversion {
    ($variant:ident) => {
        fn into_scalar(self) -> Scalar {
            Scalar::$variant(self)
        }

        fn from_scalar(value: Scalar) -> Option<Self> {
            match value {
                Scalar::$variant(value) => Some(value),
                _ => None,
            }
        }
    };
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn decode(bytes: &[u8], _: ByteOrder) -> Result<Self, ParseBoolError> {
        match bytes[0] {
            0 => Ok(false),
            1 => Ok(true),
            bad_value => Err(ParseBoolError { bad_value }),
        }
    }

    fn encode(self, bytes: &mut [u8], _: ByteOrder) {
        bytes[0] = u8::from(self);
    }

    impl_scalar_conversion!(Bool);
}

impl Element for i8 {
    const DTYPE: DType = DType::I8;

    fn decode(bytes: &[u8], _: ByteOrder) -> Result<Self, ParseBoolError> {
        Ok(i8::from_ne_bytes([bytes[0]]))
    }

    fn encode(self, bytes: &mut [u8], _: ByteOrder) {
        bytes[0] = self.to_ne_bytes()[0];
    }

    impl_scalar_conversion!(I8);
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;

    fn decode(bytes: &[u8], _: ByteOrder) -> Result<Self, ParseBoolError> {
        Ok(bytes[0])
    }

    fn encode(self, bytes: &mut [u8], _: ByteOrder) {
        bytes[0] = self;
    }

    impl_scalar_conversion!(U8);
}

macro_rules! impl_multi_byte {
    ($elem:ty, $variant:ident, $read:ident, $write:ident) => {
        impl Element for $elem {
            const DTYPE: DType = DType::$variant;

            fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self, ParseBoolError> {
                Ok(match order {
                    ByteOrder::Big => BigEndian::$read(bytes),
                    ByteOrder::Little | ByteOrder::NotApplicable => LittleEndian::$read(bytes),
                })
            }

            fn encode(self, bytes: &mut [u8], order: ByteOrder) {
                match order {
                    ByteOrder::Big => BigEndian::$write(bytes, self),
                    ByteOrder::Little | ByteOrder::NotApplicable => {
                        LittleEndian::$write(bytes, self);
                    }
                }
            }

            impl_scalar_conversion!($variant);
        }
    };
}

impl_multi_byte!(i16, I16, read_i16, write_i16);
impl_multi_byte!(i32, I32, read_i32, write_i32);
impl_multi_byte!(i64, I64, read_i64, write_i64);
impl_multi_byte!(u16, U16, read_u16, write_u16);
impl_multi_byte!(u32, U32, read_u32, write_u32);
impl_multi_byte!(u64, U64, read_u64, write_u64);
impl_multi_byte!(f32, F32, read_f32, write_f32);
impl_multi_byte!(f64, F64, read_f64, write_f64);

// The real and imaginary parts are swapped independently.
macro_rules! impl_complex {
    ($elem:ty, $variant:ident, $part:ty) => {
        impl Element for $elem {
            const DTYPE: DType = DType::$variant;

            fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self, ParseBoolError> {
                let (re, im) = bytes.split_at(std::mem::size_of::<$part>());
                Ok(<$elem>::new(
                    <$part>::decode(re, order)?,
                    <$part>::decode(im, order)?,
                ))
            }

            fn encode(self, bytes: &mut [u8], order: ByteOrder) {
                let (re, im) = bytes.split_at_mut(std::mem::size_of::<$part>());
                self.re.encode(re, order);
                self.im.encode(im, order);
            }

            impl_scalar_conversion!($variant);
        }
    };
}

impl_complex!(Complex32, C64, f32);
impl_complex!(Complex64, C128, f64);

/// A single element of any supported type.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Scalar {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    C64(Complex32),
    C128(Complex64),
}

impl Scalar {
    /// The element type of the value.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::U16(_) => DType::U16,
            Self::U32(_) => DType::U32,
            Self::U64(_) => DType::U64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::C64(_) => DType::C64,
            Self::C128(_) => DType::C128,
        }
    }

    /// Decodes `dtype.size()` bytes stored in `order`.
    pub fn decode(dtype: DType, bytes: &[u8], order: ByteOrder) -> Result<Self, ParseBoolError> {
        fn decode<A: Element>(bytes: &[u8], order: ByteOrder) -> Result<Scalar, ParseBoolError> {
            A::decode(bytes, order).map(A::into_scalar)
        }
        match dtype {
            DType::Bool => decode::<bool>(bytes, order),
            DType::I8 => decode::<i8>(bytes, order),
            DType::I16 => decode::<i16>(bytes, order),
            DType::I32 => decode::<i32>(bytes, order),
            DType::I64 => decode::<i64>(bytes, order),
            DType::U8 => decode::<u8>(bytes, order),
            DType::U16 => decode::<u16>(bytes, order),
            DType::U32 => decode::<u32>(bytes, order),
            DType::U64 => decode::<u64>(bytes, order),
            DType::F32 => decode::<f32>(bytes, order),
            DType::F64 => decode::<f64>(bytes, order),
            DType::C64 => decode::<Complex32>(bytes, order),
            DType::C128 => decode::<Complex64>(bytes, order),
        }
    }

    /// Encodes the value into `self.dtype().size()` bytes in `order`.
    pub fn encode(self, bytes: &mut [u8], order: ByteOrder) {
        match self {
            Self::Bool(v) => v.encode(bytes, order),
            Self::I8(v) => v.encode(bytes, order),
            Self::I16(v) => v.encode(bytes, order),
            Self::I32(v) => v.encode(bytes, order),
            Self::I64(v) => v.encode(bytes, order),
            Self::U8(v) => v.encode(bytes, order),
            Self::U16(v) => v.encode(bytes, order),
            Self::U32(v) => v.encode(bytes, order),
            Self::U64(v) => v.encode(bytes, order),
            Self::F32(v) => v.encode(bytes, order),
            Self::F64(v) => v.encode(bytes, order),
            Self::C64(v) => v.encode(bytes, order),
            Self::C128(v) => v.encode(bytes, order),
        }
    }

    /// Bitwise equality: NaNs with equal payloads compare equal and `0.0`
    /// differs from `-0.0`.
    pub fn bits_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::C64(a), Self::C64(b)) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            (Self::C128(a), Self::C128(b)) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bool(v) => fmt::Display::fmt(v, f),
            Self::I8(v) => fmt::Display::fmt(v, f),
            Self::I16(v) => fmt::Display::fmt(v, f),
            Self::I32(v) => fmt::Display::fmt(v, f),
            Self::I64(v) => fmt::Display::fmt(v, f),
            Self::U8(v) => fmt::Display::fmt(v, f),
            Self::U16(v) => fmt::Display::fmt(v, f),
            Self::U32(v) => fmt::Display::fmt(v, f),
            Self::U64(v) => fmt::Display::fmt(v, f),
            Self::F32(v) => fmt::Display::fmt(v, f),
            Self::F64(v) => fmt::Display::fmt(v, f),
            Self::C64(v) => fmt::Display::fmt(v, f),
            Self::C128(v) => fmt::Display::fmt(v, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_strings() {
        for dtype in DType::ALL {
            for order in [ByteOrder::Little, ByteOrder::Big] {
                let descr = dtype.descriptor(order);
                assert_eq!(
                    DType::parse_descriptor(&descr),
                    Ok((dtype, dtype.normalize(order)))
                );
            }
        }
        assert_eq!(DType::F64.descriptor(ByteOrder::Little), "<f8");
        assert_eq!(DType::Bool.descriptor(ByteOrder::Big), "|b1");
        assert_eq!(DType::C128.descriptor(ByteOrder::Big), ">c16");
    }

    #[test]
    fn descriptor_prefixes() {
        assert_eq!(DType::parse_descriptor("|?"), Ok((DType::Bool, ByteOrder::NotApplicable)));
        assert_eq!(DType::parse_descriptor(">i1"), Ok((DType::I8, ByteOrder::NotApplicable)));
        assert_eq!(DType::parse_descriptor("=u4"), Ok((DType::U32, ByteOrder::native())));
        assert_eq!(DType::parse_descriptor("f4"), Ok((DType::F32, ByteOrder::native())));
        assert_eq!(
            DType::parse_descriptor("|f8"),
            Err(ParseDescriptorError::MissingByteOrder("|f8".into()))
        );
        for bad in ["<f2", "<U10", "|O", "", "<"] {
            assert_eq!(
                DType::parse_descriptor(bad),
                Err(ParseDescriptorError::Unsupported(bad.into()))
            );
        }
    }

    #[test]
    fn sizes() {
        let sizes: Vec<usize> = DType::ALL.iter().map(|dtype| dtype.size()).collect();
        assert_eq!(sizes, [1, 1, 2, 4, 8, 1, 2, 4, 8, 4, 8, 8, 16]);
    }

    #[test]
    fn multi_byte_swap() {
        let mut bytes = [0; 4];
        0x0102_0304_u32.encode(&mut bytes, ByteOrder::Big);
        assert_eq!(bytes, [1, 2, 3, 4]);
        0x0102_0304_u32.encode(&mut bytes, ByteOrder::Little);
        assert_eq!(bytes, [4, 3, 2, 1]);
        assert_eq!(u32::decode(&bytes, ByteOrder::Little), Ok(0x0102_0304));
        assert_eq!(u32::decode(&bytes, ByteOrder::Big), Ok(0x0403_0201));
    }

    #[test]
    fn complex_halves_swap_independently() {
        let value = Complex32::new(1.0, -2.5);
        let mut bytes = [0; 8];
        value.encode(&mut bytes, ByteOrder::Big);
        assert_eq!(bytes[..4], 1.0_f32.to_be_bytes());
        assert_eq!(bytes[4..], (-2.5_f32).to_be_bytes());
        assert_eq!(Complex32::decode(&bytes, ByteOrder::Big), Ok(value));
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert_eq!(bool::decode(&[1], ByteOrder::NotApplicable), Ok(true));
        assert_eq!(
            bool::decode(&[2], ByteOrder::NotApplicable),
            Err(ParseBoolError { bad_value: 2 })
        );
    }

    #[test]
    fn scalar_bits_eq() {
        let nan = Scalar::F64(f64::from_bits(0x7ff8_0000_0000_0001));
        assert!(nan.bits_eq(&nan));
        assert_ne!(nan, nan);
        assert!(!Scalar::F32(0.0).bits_eq(&Scalar::F32(-0.0)));
        assert!(!Scalar::I32(1).bits_eq(&Scalar::I64(1)));

        let mut bytes = [0; 16];
        let value = Scalar::C128(Complex64::new(f64::NAN, -0.0));
        value.encode(&mut bytes, ByteOrder::Big);
        let decoded = Scalar::decode(DType::C128, &bytes, ByteOrder::Big).unwrap();
        assert!(decoded.bits_eq(&value));
        assert_eq!(decoded.dtype(), DType::C128);
    }
}
