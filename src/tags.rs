//! Tag schema definitions.
//!
//! This module defines the vocabulary of the header: every tag the format
//! knows is described by a [`TagTrait`] giving its canonical name, accepted
//! alias spellings, arity, value kind, optional default and requiredness.
//!
//! The registry [`TAG_TRAITS`] is ordered: collections are built and
//! serialized in declaration order, which places the data-dependent tags
//! (`ElementType`, `ElementDataFile`) last so they can see the shape tags
//! resolved before them.

use std::fmt;

use crate::error::TagError;

// =============================================================================
// Arity and value kinds
// =============================================================================

/// How many values a tag holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one value
    Singleton,
    /// A vector of exactly N values
    Fixed(usize),
    /// A vector of any length
    Variable,
}

/// The type each value of a tag must coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Int,
    Float,
    Bool,
    Str,
    /// String restricted to a closed choice set
    Choice(&'static [&'static str]),
}

// =============================================================================
// TagValue
// =============================================================================

/// A validated, typed tag value.
///
/// Singleton-arity tags hold a scalar variant; vector-arity tags hold a
/// list variant preserving token order.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl TagValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            TagValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            TagValue::FloatList(v) => Some(v),
            _ => None,
        }
    }

    /// Number of values carried (1 for scalars).
    pub fn count(&self) -> usize {
        match self {
            TagValue::IntList(v) => v.len(),
            TagValue::FloatList(v) => v.len(),
            _ => 1,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{v}")?;
            }
            Ok(())
        }
        match self {
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Bool(true) => write!(f, "True"),
            TagValue::Bool(false) => write!(f, "False"),
            TagValue::Str(v) => write!(f, "{v}"),
            TagValue::IntList(v) => join(f, v),
            TagValue::FloatList(v) => join(f, v),
        }
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<Vec<i64>> for TagValue {
    fn from(v: Vec<i64>) -> Self {
        TagValue::IntList(v)
    }
}

impl From<Vec<usize>> for TagValue {
    fn from(v: Vec<usize>) -> Self {
        TagValue::IntList(v.into_iter().map(|x| x as i64).collect())
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(v: Vec<f64>) -> Self {
        TagValue::FloatList(v)
    }
}

// =============================================================================
// TagTrait
// =============================================================================

/// Schema entry governing one tag.
///
/// Immutable; the process-wide registry is built once as static data and is
/// safe for unsynchronized concurrent reads.
#[derive(Debug, Clone, Copy)]
pub struct TagTrait {
    /// Canonical name, the only spelling ever serialized
    pub name: &'static str,
    /// Alternate spellings accepted on input
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub kind: TagKind,
    /// Default, stored as header text and cast through the trait itself
    pub default: Option<&'static str>,
    pub required: bool,
}

impl TagTrait {
    /// Whether `raw` names this tag, canonically or by alias.
    pub fn matches(&self, raw: &str) -> bool {
        self.name == raw || self.aliases.contains(&raw)
    }

    fn arity_error(&self, actual: usize) -> TagError {
        let expected = match self.arity {
            Arity::Singleton => "1".to_string(),
            Arity::Fixed(n) => n.to_string(),
            Arity::Variable => "any number of".to_string(),
        };
        TagError::ArityMismatch {
            tag: self.name,
            expected,
            actual,
        }
    }

    fn check_arity(&self, actual: usize) -> Result<(), TagError> {
        match self.arity {
            Arity::Singleton if actual != 1 => Err(self.arity_error(actual)),
            Arity::Fixed(n) if actual != n => Err(self.arity_error(actual)),
            _ => Ok(()),
        }
    }

    /// Validate and coerce a raw value against this trait.
    ///
    /// Textual input is whitespace-collapsed and tokenized first; typed
    /// input goes through the same arity and kind checks, with int-to-float
    /// promotion for float traits.
    pub fn cast(&self, value: TagValue) -> Result<TagValue, TagError> {
        match value {
            TagValue::Str(text) => self.cast_text(&text),
            typed => self.cast_typed(typed),
        }
    }

    fn cast_text(&self, text: &str) -> Result<TagValue, TagError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        self.check_arity(tokens.len())?;

        if self.arity == Arity::Singleton {
            return self.scalar_from_token(tokens[0]);
        }
        match self.kind {
            TagKind::Int => {
                let mut out = Vec::with_capacity(tokens.len());
                for t in &tokens {
                    out.push(self.parse_int(t)?);
                }
                Ok(TagValue::IntList(out))
            }
            TagKind::Float => {
                let mut out = Vec::with_capacity(tokens.len());
                for t in &tokens {
                    out.push(self.parse_float(t)?);
                }
                Ok(TagValue::FloatList(out))
            }
            _ => Err(TagError::InvalidValue {
                tag: self.name,
                value: text.to_string(),
            }),
        }
    }

    fn cast_typed(&self, value: TagValue) -> Result<TagValue, TagError> {
        match self.arity {
            Arity::Singleton => match (self.kind, value) {
                (_, v @ (TagValue::IntList(_) | TagValue::FloatList(_))) => {
                    Err(self.arity_error(v.count()))
                }
                (TagKind::Int, TagValue::Int(v)) => Ok(TagValue::Int(v)),
                (TagKind::Float, TagValue::Float(v)) => Ok(TagValue::Float(v)),
                (TagKind::Float, TagValue::Int(v)) => Ok(TagValue::Float(v as f64)),
                (TagKind::Bool, TagValue::Bool(v)) => Ok(TagValue::Bool(v)),
                (_, v) => Err(TagError::InvalidValue {
                    tag: self.name,
                    value: v.to_string(),
                }),
            },
            Arity::Fixed(_) | Arity::Variable => {
                let list = match value {
                    TagValue::IntList(v) => TagValue::IntList(v),
                    TagValue::FloatList(v) => TagValue::FloatList(v),
                    // A lone scalar is a vector of one.
                    TagValue::Int(v) => TagValue::IntList(vec![v]),
                    TagValue::Float(v) => TagValue::FloatList(vec![v]),
                    v => {
                        return Err(TagError::InvalidValue {
                            tag: self.name,
                            value: v.to_string(),
                        })
                    }
                };
                self.check_arity(list.count())?;
                match (self.kind, list) {
                    (TagKind::Int, TagValue::IntList(v)) => Ok(TagValue::IntList(v)),
                    (TagKind::Float, TagValue::FloatList(v)) => Ok(TagValue::FloatList(v)),
                    (TagKind::Float, TagValue::IntList(v)) => Ok(TagValue::FloatList(
                        v.into_iter().map(|x| x as f64).collect(),
                    )),
                    (_, v) => Err(TagError::InvalidValue {
                        tag: self.name,
                        value: v.to_string(),
                    }),
                }
            }
        }
    }

    fn scalar_from_token(&self, token: &str) -> Result<TagValue, TagError> {
        match self.kind {
            TagKind::Int => Ok(TagValue::Int(self.parse_int(token)?)),
            TagKind::Float => Ok(TagValue::Float(self.parse_float(token)?)),
            // Only the literal tokens, case-sensitive.
            TagKind::Bool => match token {
                "True" => Ok(TagValue::Bool(true)),
                "False" => Ok(TagValue::Bool(false)),
                _ => Err(TagError::InvalidBoolean {
                    tag: self.name,
                    value: token.to_string(),
                }),
            },
            TagKind::Str => Ok(TagValue::Str(token.to_string())),
            TagKind::Choice(choices) => {
                if choices.contains(&token) {
                    Ok(TagValue::Str(token.to_string()))
                } else {
                    Err(TagError::InvalidChoice {
                        tag: self.name,
                        value: token.to_string(),
                    })
                }
            }
        }
    }

    fn parse_int(&self, token: &str) -> Result<i64, TagError> {
        token.parse().map_err(|_| TagError::InvalidValue {
            tag: self.name,
            value: token.to_string(),
        })
    }

    fn parse_float(&self, token: &str) -> Result<f64, TagError> {
        token.parse().map_err(|_| TagError::InvalidValue {
            tag: self.name,
            value: token.to_string(),
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Shorthand for registry entries; most tags are optional singletons.
const fn tag(name: &'static str, kind: TagKind) -> TagTrait {
    TagTrait {
        name,
        aliases: &[],
        arity: Arity::Singleton,
        kind,
        default: None,
        required: false,
    }
}

/// A defaulted singleton; present in every well-formed header.
const fn defaulted(name: &'static str, kind: TagKind, default: &'static str) -> TagTrait {
    TagTrait {
        name,
        aliases: &[],
        arity: Arity::Singleton,
        kind,
        default: Some(default),
        required: true,
    }
}

/// A vector tag.
const fn vector(
    name: &'static str,
    aliases: &'static [&'static str],
    arity: Arity,
    kind: TagKind,
    required: bool,
) -> TagTrait {
    TagTrait {
        name,
        aliases,
        arity,
        kind,
        default: None,
        required,
    }
}

/// The tag registry, in header declaration order.
///
/// Serialization follows this order exactly. The shape-bearing tags come
/// before `ElementType` and `ElementDataFile`, which always close the
/// header (everything after the `ElementDataFile` line is payload).
pub static TAG_TRAITS: &[TagTrait] = &[
    defaulted("ObjectType", TagKind::Choice(&["Image"]), "Image"),
    tag("NDims", TagKind::Int),
    defaulted("BinaryData", TagKind::Bool, "True"),
    defaulted("BinaryDataByteOrderMSB", TagKind::Bool, "False"),
    defaulted("CompressedData", TagKind::Bool, "False"),
    defaulted("AnatomicalOrientation", TagKind::Str, "RAI"),
    vector("Offset", &["Position"], Arity::Variable, TagKind::Float, true),
    vector(
        "TransformMatrix",
        &["Rotation", "Orientation"],
        Arity::Variable,
        TagKind::Float,
        true,
    ),
    vector("ElementSpacing", &[], Arity::Variable, TagKind::Float, true),
    vector("CenterOfRotation", &[], Arity::Variable, TagKind::Float, false),
    tag("HeaderSize", TagKind::Int),
    tag("CompressedDataSize", TagKind::Int),
    tag("Comment", TagKind::Str),
    tag("ObjectSubType", TagKind::Str),
    tag("TransformType", TagKind::Str),
    tag("Name", TagKind::Str),
    tag("ID", TagKind::Int),
    tag("ParentID", TagKind::Int),
    vector("Color", &[], Arity::Fixed(4), TagKind::Float, false),
    tag("Modality", TagKind::Str),
    vector("SequenceID", &[], Arity::Fixed(4), TagKind::Int, false),
    tag("ElementByteOrderMSB", TagKind::Str),
    tag("ElementMin", TagKind::Float),
    tag("ElementMax", TagKind::Float),
    tag("ElementNumberOfChannels", TagKind::Int),
    vector("DimSize", &[], Arity::Variable, TagKind::Int, true),
    tag("ElementSize", TagKind::Float),
    TagTrait {
        name: "ElementType",
        aliases: &[],
        arity: Arity::Singleton,
        kind: TagKind::Str,
        default: Some("MET_USHORT"),
        required: false,
    },
    TagTrait {
        name: "ElementDataFile",
        aliases: &[],
        arity: Arity::Singleton,
        kind: TagKind::Str,
        default: Some("LOCAL"),
        required: false,
    },
];

/// Find the trait owning `raw` as canonical name or alias.
pub(crate) fn find(raw: &str) -> Option<&'static TagTrait> {
    TAG_TRAITS.iter().find(|t| t.matches(raw))
}

/// Resolve a raw tag name to its canonical name.
///
/// # Errors
/// `UnknownTag` if no trait owns the name. Callers decide whether that is
/// fatal; header parsing warns and drops instead.
pub fn resolve(raw_name: &str) -> Result<&'static str, TagError> {
    find(raw_name)
        .map(|t| t.name)
        .ok_or_else(|| TagError::UnknownTag(raw_name.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
