//! Element type definitions.
//!
//! This module defines the vocabulary for pixel data, including:
//! - The closed set of element kinds an image can hold
//! - The mapping between element kinds and their on-disk MetaIO tokens
//!
//! Both directions of the token mapping are functions: every recognized
//! token resolves to exactly one kind, and every kind serializes to exactly
//! one canonical token (legacy spellings resolve but are never emitted).

use crate::error::TagError;

// =============================================================================
// ElementType
// =============================================================================

/// MetaIO type tokens that are valid in the format but do not describe an
/// array element. Resolving one of these is `UnsupportedType`, not
/// `UnknownElementType`.
const NON_ELEMENT_TOKENS: [&str; 3] = ["MET_NONE", "MET_STRING", "MET_OTHER"];

/// Element kind of a single array value.
///
/// Each kind has a fixed byte width and a canonical on-disk token.
/// Boolean data has no kind of its own: it is stored as `UChar`
/// (boolean-as-byte) and reads back as unsigned bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Unsigned 8-bit integer (`MET_UCHAR`)
    UChar,
    /// Signed 8-bit integer (`MET_CHAR`)
    Char,
    /// Unsigned 16-bit integer (`MET_USHORT`)
    UShort,
    /// Signed 16-bit integer (`MET_SHORT`)
    Short,
    /// Unsigned 32-bit integer (`MET_UINT`)
    UInt,
    /// Signed 32-bit integer (`MET_INT`)
    Int,
    /// Unsigned 64-bit integer (`MET_ULONG`)
    ULong,
    /// Signed 64-bit integer (`MET_LONG`, legacy `MET_LONG_LONG`)
    Long,
    /// 32-bit IEEE float (`MET_FLOAT`)
    Float,
    /// 64-bit IEEE float (`MET_DOUBLE`)
    Double,
}

impl ElementType {
    /// Size of a single element of this kind in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            ElementType::UChar | ElementType::Char => 1,
            ElementType::UShort | ElementType::Short => 2,
            ElementType::UInt | ElementType::Int | ElementType::Float => 4,
            ElementType::ULong | ElementType::Long | ElementType::Double => 8,
        }
    }

    /// Canonical on-disk token for this kind.
    ///
    /// This is the value written to the `ElementType` header tag.
    #[inline]
    pub const fn metaio_token(self) -> &'static str {
        match self {
            ElementType::UChar => "MET_UCHAR",
            ElementType::Char => "MET_CHAR",
            ElementType::UShort => "MET_USHORT",
            ElementType::Short => "MET_SHORT",
            ElementType::UInt => "MET_UINT",
            ElementType::Int => "MET_INT",
            ElementType::ULong => "MET_ULONG",
            ElementType::Long => "MET_LONG",
            ElementType::Float => "MET_FLOAT",
            ElementType::Double => "MET_DOUBLE",
        }
    }

    /// Resolve an on-disk token to an element kind.
    ///
    /// `MET_LONG_LONG` is a historical spelling of the 64-bit signed kind
    /// and resolves to [`ElementType::Long`].
    ///
    /// # Errors
    /// - `UnsupportedType` for valid MetaIO tokens that are not array
    ///   element types (`MET_STRING` and friends)
    /// - `UnknownElementType` for anything else
    pub fn from_metaio_token(token: &str) -> Result<Self, TagError> {
        match token {
            "MET_UCHAR" => Ok(ElementType::UChar),
            "MET_CHAR" => Ok(ElementType::Char),
            "MET_USHORT" => Ok(ElementType::UShort),
            "MET_SHORT" => Ok(ElementType::Short),
            "MET_UINT" => Ok(ElementType::UInt),
            "MET_INT" => Ok(ElementType::Int),
            "MET_ULONG" => Ok(ElementType::ULong),
            "MET_LONG" | "MET_LONG_LONG" => Ok(ElementType::Long),
            "MET_FLOAT" => Ok(ElementType::Float),
            "MET_DOUBLE" => Ok(ElementType::Double),
            _ if NON_ELEMENT_TOKENS.contains(&token) => {
                Err(TagError::UnsupportedType(token.to_string()))
            }
            _ => Err(TagError::UnknownElementType(token.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
