//! Tag collection building and serialization.
//!
//! A [`MetaTags`] is the validated, typed form of a header: canonical names
//! mapped to [`TagValue`]s. Building and serialization both walk the
//! registry in declaration order, never the input order, so shape-bearing
//! tags are always resolved before the data tags that depend on them and
//! the emitted header is stable regardless of how the input was assembled.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::{debug, warn};

use crate::error::{MetaImageError, TagError};
use crate::tags::{find, TagValue, TAG_TRAITS};

/// Raw, unvalidated tag input: (name or alias, value) pairs.
///
/// Textual values are tokenized and coerced during building; typed values
/// go through the same arity and kind checks.
pub type RawTags = Vec<(String, TagValue)>;

// =============================================================================
// MetaTags
// =============================================================================

/// Ordered collection of validated header tags.
///
/// Keys are always canonical names; aliases are resolved on the way in.
/// Iteration and serialization follow registry declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaTags {
    values: HashMap<&'static str, TagValue>,
}

impl MetaTags {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from raw input.
    ///
    /// Walks the registry in declaration order. For each trait the first
    /// present alias wins; absent tags fall back to their default; absent
    /// required tags without a default fail `MissingRequiredTag` unless
    /// `ignore_errors`. Raw names no trait owns are warned about and
    /// dropped, never fatal.
    pub fn build(raw: RawTags, ignore_errors: bool) -> Result<Self, TagError> {
        let mut tags = Self::new();
        tags.update(raw, ignore_errors)?;
        Ok(tags)
    }

    /// Merge raw input into the collection.
    ///
    /// Tags absent from `raw` keep their pre-existing value (which is
    /// re-validated, so a collection can never hold a value its trait
    /// rejects).
    pub fn update(&mut self, raw: RawTags, ignore_errors: bool) -> Result<(), TagError> {
        debug!("update tags");
        let mut raw: HashMap<String, TagValue> = raw.into_iter().collect();

        for trait_ in TAG_TRAITS {
            let names = std::iter::once(&trait_.name).chain(trait_.aliases);
            let provided = names.into_iter().find_map(|n| raw.remove(*n));

            let value = match provided {
                Some(v) => v,
                None => {
                    if let Some(existing) = self.values.get(trait_.name) {
                        existing.clone()
                    } else if let Some(default) = trait_.default {
                        TagValue::from(default)
                    } else if trait_.required && !ignore_errors {
                        return Err(TagError::MissingRequiredTag(trait_.name));
                    } else {
                        continue;
                    }
                }
            };

            let value = trait_.cast(value)?;
            self.values.insert(trait_.name, value);
        }

        // Vendor extensions and misspellings: reported, never fatal.
        for name in raw.keys() {
            warn!("Unknown tag: {name}");
        }
        Ok(())
    }

    /// Look up a tag by canonical name or alias.
    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.values.get(find(name)?.name)
    }

    /// Whether a tag is present, by canonical name or alias.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name)?.as_int()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    pub fn get_int_list(&self, name: &str) -> Option<&[i64]> {
        self.get(name)?.as_int_list()
    }

    pub fn get_float_list(&self, name: &str) -> Option<&[f64]> {
        self.get(name)?.as_float_list()
    }

    /// Number of tags present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Present tags in registry declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TagValue)> + '_ {
        TAG_TRAITS
            .iter()
            .filter_map(|t| self.values.get(t.name).map(|v| (t.name, v)))
    }

    /// Serialize to header text, one `name = value` line per present tag
    /// in registry order.
    ///
    /// Exact inverse of parsing for any collection `build` produced, and
    /// idempotent: serializing a re-parsed header is byte-identical.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(&value.to_string());
            out.push('\n');
        }
        out
    }

    /// Read raw header lines from a stream.
    ///
    /// Consumes lines up to and including the `ElementDataFile` line; for
    /// inline storage everything after that point in the same stream is
    /// payload and is left unread. Each non-empty line splits on the first
    /// `=`; lines without one are skipped with a warning.
    pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<RawTags, MetaImageError> {
        let mut raw = RawTags::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((name, value)) = trimmed.split_once('=') else {
                warn!("Skipping malformed header line: {trimmed}");
                continue;
            };
            let name = name.trim().to_string();
            let stop = name == "ElementDataFile";
            raw.push((name, TagValue::from(value.trim())));
            if stop {
                break;
            }
        }
        Ok(raw)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn geometric_raw() -> RawTags {
        vec![
            ("NDims".to_string(), TagValue::from(3i64)),
            ("DimSize".to_string(), vec![30i64, 20, 10].into()),
            ("Offset".to_string(), vec![0.0, 0.0, 0.0].into()),
            ("ElementSpacing".to_string(), vec![1.0, 1.0, 1.0].into()),
            (
                "TransformMatrix".to_string(),
                vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0].into(),
            ),
        ]
    }

    #[test]
    fn test_build_applies_defaults() {
        let tags = MetaTags::build(geometric_raw(), false).unwrap();
        assert_eq!(tags.get_str("ObjectType"), Some("Image"));
        assert_eq!(tags.get_bool("BinaryData"), Some(true));
        assert_eq!(tags.get_bool("CompressedData"), Some(false));
        assert_eq!(tags.get_str("ElementDataFile"), Some("LOCAL"));
        // No default and not provided
        assert!(!tags.contains("ElementNumberOfChannels"));
    }

    #[test]
    fn test_missing_required_tag() {
        let mut raw = geometric_raw();
        raw.retain(|(name, _)| name != "Offset");
        let err = MetaTags::build(raw.clone(), false).unwrap_err();
        assert!(matches!(err, TagError::MissingRequiredTag("Offset")));

        // Relaxed building skips the tag instead.
        let tags = MetaTags::build(raw, true).unwrap();
        assert!(!tags.contains("Offset"));
    }

    #[test]
    fn test_alias_equivalence() {
        let mut by_alias = geometric_raw();
        for (name, _) in by_alias.iter_mut() {
            if name == "Offset" {
                *name = "Position".to_string();
            }
        }
        let a = MetaTags::build(geometric_raw(), false).unwrap();
        let b = MetaTags::build(by_alias, false).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.get_float_list("Offset"), Some(&[0.0, 0.0, 0.0][..]));
        // Alias lookup resolves to the canonical entry
        assert_eq!(b.get_float_list("Position"), Some(&[0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_unknown_tags_dropped() {
        let mut raw = geometric_raw();
        raw.push(("VendorSecretSauce".to_string(), TagValue::from("42")));
        let tags = MetaTags::build(raw, false).unwrap();
        assert!(!tags.contains("VendorSecretSauce"));
    }

    #[test]
    fn test_update_keeps_existing_values() {
        let mut tags = MetaTags::build(geometric_raw(), false).unwrap();
        tags.update(
            vec![("CompressedData".to_string(), true.into())],
            false,
        )
        .unwrap();
        assert_eq!(tags.get_bool("CompressedData"), Some(true));
        // Untouched tags survive the update
        assert_eq!(tags.get_int_list("DimSize"), Some(&[30i64, 20, 10][..]));
    }

    #[test]
    fn test_serialization_registry_order() {
        let mut raw = geometric_raw();
        // Deliberately provide input in scrambled order
        raw.reverse();
        let tags = MetaTags::build(raw, false).unwrap();
        let text = tags.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ObjectType = Image");
        assert_eq!(lines.last().unwrap(), &"ElementDataFile = LOCAL");
        let ndims_at = lines.iter().position(|l| l.starts_with("NDims")).unwrap();
        let dimsize_at = lines.iter().position(|l| l.starts_with("DimSize")).unwrap();
        assert!(ndims_at < dimsize_at);
    }

    #[test]
    fn test_round_trip_idempotent() {
        let tags = MetaTags::build(geometric_raw(), false).unwrap();
        let text = tags.to_text();

        let mut reader = std::io::Cursor::new(text.as_bytes());
        let raw = MetaTags::parse_header(&mut reader).unwrap();
        let reparsed = MetaTags::build(raw, false).unwrap();

        assert_eq!(reparsed, tags);
        assert_eq!(reparsed.to_text(), text);
    }

    #[test]
    fn test_parse_header_stops_at_data_tag() {
        let header = b"NDims = 2\nElementDataFile = LOCAL\n\x00\x01\x02\x03".to_vec();
        let mut reader = std::io::Cursor::new(header);
        let raw = MetaTags::parse_header(&mut reader).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1].0, "ElementDataFile");

        // Payload bytes are still in the stream
        let mut rest = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut rest).unwrap();
        assert_eq!(rest, vec![0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_parse_header_collapses_whitespace() {
        let header = "NDims = 2\nDimSize =   4    3\nOffset = 0 0\nElementSpacing = 1 1\nTransformMatrix = 1 0 0 1\nElementDataFile = LOCAL\n";
        let mut reader = std::io::Cursor::new(header.as_bytes());
        let raw = MetaTags::parse_header(&mut reader).unwrap();
        let tags = MetaTags::build(raw, false).unwrap();
        assert_eq!(tags.get_int_list("DimSize"), Some(&[4i64, 3][..]));
    }
}
