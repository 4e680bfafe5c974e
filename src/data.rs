//! In-memory pixel data.
//!
//! This module provides [`ImageData`], a dynamically typed N-dimensional
//! array covering every element kind the format supports, together with the
//! byte-level encode/decode between the in-memory and on-disk layouts.
//!
//! # Axis conventions
//!
//! On disk the payload is row-major over the *reversed* in-memory axis
//! order: the first in-memory axis varies fastest in the byte stream, and a
//! channel axis (in-memory trailing) is outermost on disk. Encoding and
//! decoding therefore both reduce to iterating an axis-reversed view.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::{ArrayD, IxDyn};

use crate::element::ElementType;
use crate::error::MetaImageError;

// =============================================================================
// Element
// =============================================================================

/// Scalar types that can live in an [`ImageData`] array.
///
/// Each implementor knows its element kind and how to put/get itself to a
/// byte slice of exactly `size_in_bytes` length in either byte order.
pub(crate) trait Element: Copy {
    const KIND: ElementType;

    fn put(self, out: &mut [u8], msb: bool);
    fn get(inp: &[u8], msb: bool) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $kind:ident, $write:ident, $read:ident) => {
        impl Element for $t {
            const KIND: ElementType = ElementType::$kind;

            #[inline]
            fn put(self, out: &mut [u8], msb: bool) {
                if msb {
                    BigEndian::$write(out, self);
                } else {
                    LittleEndian::$write(out, self);
                }
            }

            #[inline]
            fn get(inp: &[u8], msb: bool) -> Self {
                if msb {
                    BigEndian::$read(inp)
                } else {
                    LittleEndian::$read(inp)
                }
            }
        }
    };
}

impl_element!(u16, UShort, write_u16, read_u16);
impl_element!(i16, Short, write_i16, read_i16);
impl_element!(u32, UInt, write_u32, read_u32);
impl_element!(i32, Int, write_i32, read_i32);
impl_element!(u64, ULong, write_u64, read_u64);
impl_element!(i64, Long, write_i64, read_i64);
impl_element!(f32, Float, write_f32, read_f32);
impl_element!(f64, Double, write_f64, read_f64);

// Single-byte kinds have no byte order.
impl Element for u8 {
    const KIND: ElementType = ElementType::UChar;

    #[inline]
    fn put(self, out: &mut [u8], _msb: bool) {
        out[0] = self;
    }

    #[inline]
    fn get(inp: &[u8], _msb: bool) -> Self {
        inp[0]
    }
}

impl Element for i8 {
    const KIND: ElementType = ElementType::Char;

    #[inline]
    fn put(self, out: &mut [u8], _msb: bool) {
        out[0] = self as u8;
    }

    #[inline]
    fn get(inp: &[u8], _msb: bool) -> Self {
        inp[0] as i8
    }
}

// Boolean-as-byte: serialized as 0/1 under the unsigned byte kind.
// Decoding never produces `bool`; the `get` direction exists only to keep
// the trait total.
impl Element for bool {
    const KIND: ElementType = ElementType::UChar;

    #[inline]
    fn put(self, out: &mut [u8], _msb: bool) {
        out[0] = u8::from(self);
    }

    #[inline]
    fn get(inp: &[u8], _msb: bool) -> Self {
        inp[0] != 0
    }
}

// =============================================================================
// ImageData
// =============================================================================

/// Dynamically typed N-dimensional pixel array.
///
/// One variant per supported element kind, each holding an
/// [`ndarray::ArrayD`]. The `Bool` variant is accepted on input and stored
/// on disk as unsigned bytes; decoding a file always yields a numeric
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    UChar(ArrayD<u8>),
    Char(ArrayD<i8>),
    UShort(ArrayD<u16>),
    Short(ArrayD<i16>),
    UInt(ArrayD<u32>),
    Int(ArrayD<i32>),
    ULong(ArrayD<u64>),
    Long(ArrayD<i64>),
    Float(ArrayD<f32>),
    Double(ArrayD<f64>),
    Bool(ArrayD<bool>),
}

/// Dispatch a type-independent expression over every variant.
macro_rules! each {
    ($self:expr, $a:ident => $e:expr) => {
        match $self {
            ImageData::UChar($a) => $e,
            ImageData::Char($a) => $e,
            ImageData::UShort($a) => $e,
            ImageData::Short($a) => $e,
            ImageData::UInt($a) => $e,
            ImageData::Int($a) => $e,
            ImageData::ULong($a) => $e,
            ImageData::Long($a) => $e,
            ImageData::Float($a) => $e,
            ImageData::Double($a) => $e,
            ImageData::Bool($a) => $e,
        }
    };
}

/// Cast a numeric array to the variant matching a target kind.
macro_rules! cast_to {
    ($a:expr, $kind:expr) => {
        match $kind {
            ElementType::UChar => ImageData::UChar($a.mapv(|v| v as u8)),
            ElementType::Char => ImageData::Char($a.mapv(|v| v as i8)),
            ElementType::UShort => ImageData::UShort($a.mapv(|v| v as u16)),
            ElementType::Short => ImageData::Short($a.mapv(|v| v as i16)),
            ElementType::UInt => ImageData::UInt($a.mapv(|v| v as u32)),
            ElementType::Int => ImageData::Int($a.mapv(|v| v as i32)),
            ElementType::ULong => ImageData::ULong($a.mapv(|v| v as u64)),
            ElementType::Long => ImageData::Long($a.mapv(|v| v as i64)),
            ElementType::Float => ImageData::Float($a.mapv(|v| v as f32)),
            ElementType::Double => ImageData::Double($a.mapv(|v| v as f64)),
        }
    };
}

impl ImageData {
    /// Element kind of this array.
    ///
    /// `Bool` reports the unsigned byte kind, its on-disk representation.
    pub fn element_type(&self) -> ElementType {
        fn kind_of<T: Element>(_: &ArrayD<T>) -> ElementType {
            T::KIND
        }
        each!(self, a => kind_of(a))
    }

    /// Logical (in-memory) shape.
    pub fn shape(&self) -> &[usize] {
        each!(self, a => a.shape())
    }

    /// Number of axes, including a channel axis if present.
    pub fn ndim(&self) -> usize {
        each!(self, a => a.ndim())
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        each!(self, a => a.len())
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reshape in place, preserving row-major element order.
    ///
    /// # Errors
    /// `ShapeMismatch` if the element count of `shape` differs from the
    /// current length.
    pub fn reshape(&mut self, shape: &[usize]) -> Result<(), MetaImageError> {
        fn go<T: Element>(a: &ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>, MetaImageError> {
            let elems: Vec<T> = a.iter().copied().collect();
            ArrayD::from_shape_vec(IxDyn(shape), elems).map_err(|_| {
                MetaImageError::ShapeMismatch {
                    tag: "DimSize",
                    message: format!("cannot reshape {} elements to {:?}", a.len(), shape),
                }
            })
        }
        each!(self, a => *a = go(a, shape)?);
        Ok(())
    }

    /// Convert every element to `kind`.
    ///
    /// Numeric conversions follow Rust `as` semantics; booleans map to 0/1.
    pub fn cast(&self, kind: ElementType) -> ImageData {
        match self {
            ImageData::Bool(a) => ImageData::UChar(a.mapv(u8::from)).cast(kind),
            ImageData::UChar(a) => cast_to!(a, kind),
            ImageData::Char(a) => cast_to!(a, kind),
            ImageData::UShort(a) => cast_to!(a, kind),
            ImageData::Short(a) => cast_to!(a, kind),
            ImageData::UInt(a) => cast_to!(a, kind),
            ImageData::Int(a) => cast_to!(a, kind),
            ImageData::ULong(a) => cast_to!(a, kind),
            ImageData::Long(a) => cast_to!(a, kind),
            ImageData::Float(a) => cast_to!(a, kind),
            ImageData::Double(a) => cast_to!(a, kind),
        }
    }

    /// Serialize to the on-disk byte layout.
    ///
    /// Iterates the axis-reversed view in row-major order, so the first
    /// in-memory axis varies fastest in the output and a trailing channel
    /// axis becomes the outermost on-disk axis.
    pub fn to_disk_bytes(&self, msb: bool) -> Vec<u8> {
        fn encode<T: Element>(a: &ArrayD<T>, msb: bool) -> Vec<u8> {
            let width = T::KIND.size_in_bytes();
            let mut out = vec![0u8; a.len() * width];
            let view = a.view().reversed_axes();
            for (chunk, v) in out.chunks_exact_mut(width).zip(view.iter()) {
                v.put(chunk, msb);
            }
            out
        }
        each!(self, a => encode(a, msb))
    }

    /// Decode raw payload bytes into an array.
    ///
    /// `disk_shape` is the row-major on-disk shape (channel count first if
    /// greater than one, then `DimSize` as written in the header); the
    /// returned array carries the reversed, in-memory axis order.
    ///
    /// # Errors
    /// `ShapeMismatch` if the byte count does not equal the product of
    /// `disk_shape` times the element width.
    pub fn from_disk_bytes(
        bytes: &[u8],
        kind: ElementType,
        msb: bool,
        disk_shape: &[usize],
    ) -> Result<ImageData, MetaImageError> {
        fn decode<T: Element>(
            bytes: &[u8],
            msb: bool,
            disk_shape: &[usize],
        ) -> Result<ArrayD<T>, MetaImageError> {
            let width = T::KIND.size_in_bytes();
            let count: usize = disk_shape.iter().product();
            if bytes.len() != count * width {
                return Err(MetaImageError::ShapeMismatch {
                    tag: "DimSize",
                    message: format!(
                        "payload holds {} bytes, shape {:?} needs {}",
                        bytes.len(),
                        disk_shape,
                        count * width
                    ),
                });
            }
            let elems: Vec<T> = bytes.chunks_exact(width).map(|c| T::get(c, msb)).collect();
            let arr = ArrayD::from_shape_vec(IxDyn(disk_shape), elems).map_err(|e| {
                MetaImageError::ShapeMismatch {
                    tag: "DimSize",
                    message: e.to_string(),
                }
            })?;
            Ok(arr.reversed_axes())
        }

        Ok(match kind {
            ElementType::UChar => ImageData::UChar(decode(bytes, msb, disk_shape)?),
            ElementType::Char => ImageData::Char(decode(bytes, msb, disk_shape)?),
            ElementType::UShort => ImageData::UShort(decode(bytes, msb, disk_shape)?),
            ElementType::Short => ImageData::Short(decode(bytes, msb, disk_shape)?),
            ElementType::UInt => ImageData::UInt(decode(bytes, msb, disk_shape)?),
            ElementType::Int => ImageData::Int(decode(bytes, msb, disk_shape)?),
            ElementType::ULong => ImageData::ULong(decode(bytes, msb, disk_shape)?),
            ElementType::Long => ImageData::Long(decode(bytes, msb, disk_shape)?),
            ElementType::Float => ImageData::Float(decode(bytes, msb, disk_shape)?),
            ElementType::Double => ImageData::Double(decode(bytes, msb, disk_shape)?),
        })
    }
}

macro_rules! impl_from {
    ($t:ty, $variant:ident) => {
        impl<D: ndarray::Dimension> From<ndarray::Array<$t, D>> for ImageData {
            fn from(a: ndarray::Array<$t, D>) -> Self {
                ImageData::$variant(a.into_dyn())
            }
        }
    };
}

impl_from!(u8, UChar);
impl_from!(i8, Char);
impl_from!(u16, UShort);
impl_from!(i16, Short);
impl_from!(u32, UInt);
impl_from!(i32, Int);
impl_from!(u64, ULong);
impl_from!(i64, Long);
impl_from!(f32, Float);
impl_from!(f64, Double);
impl_from!(bool, Bool);

// =============================================================================
// Tests
// =============================================================================
