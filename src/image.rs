//! The image container.
//!
//! A [`MetaImage`] couples one pixel array with one validated tag
//! collection and keeps the two consistent: tags are derived from the array
//! on construction, every tag update reconciles the shape-bearing tags
//! before anything else (reshaping the array if needed), and [`check`]
//! re-validates the coupling invariants.
//!
//! Shape and element-type violations are always fatal; the payload decode
//! depends on them. Geometric-tag violations can be suppressed with
//! `ignore_errors`, since legacy files often carry no geometry at all.
//!
//! [`check`]: MetaImage::check

use tracing::debug;

use crate::collection::{MetaTags, RawTags};
use crate::data::ImageData;
use crate::element::ElementType;
use crate::error::{MetaImageError, TagError};
use crate::tags::{self, TagValue};

// =============================================================================
// MetaImage
// =============================================================================

/// An N-dimensional image with its header tags.
///
/// The array owns its storage and the container owns both parts
/// exclusively; independent containers never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaImage {
    data: ImageData,
    tags: MetaTags,
}

impl MetaImage {
    /// Pixel data.
    pub fn data(&self) -> &ImageData {
        &self.data
    }

    /// Header tags.
    pub fn tags(&self) -> &MetaTags {
        &self.tags
    }

    /// Consume the container, yielding array and tags.
    pub fn into_parts(self) -> (ImageData, MetaTags) {
        (self.data, self.tags)
    }

    /// Build a container from an array with all tags derived.
    pub fn new(data: ImageData) -> Result<Self, MetaImageError> {
        Self::from_array(data, false, RawTags::new(), false)
    }

    /// Build a container from an array plus tag overrides.
    ///
    /// When `vector` is set the trailing axis is the channel axis and is
    /// excluded from the spatial shape. Derived tags: `NDims`, `DimSize`
    /// (spatial shape reversed, so the on-disk fastest axis comes first),
    /// `ElementNumberOfChannels` (vector only), `ElementType`, and
    /// identity geometry. `overrides` are applied last through
    /// [`update`](Self::update).
    pub fn from_array(
        data: ImageData,
        vector: bool,
        overrides: RawTags,
        ignore_errors: bool,
    ) -> Result<Self, MetaImageError> {
        debug!("init metaimage");
        let shape = data.shape();
        let ndims = if vector { shape.len() - 1 } else { shape.len() };
        let spatial = &shape[..ndims];

        let mut dim_size: Vec<usize> = spatial.to_vec();
        dim_size.reverse();

        let mut derived: RawTags = vec![
            ("NDims".to_string(), TagValue::from(ndims)),
            ("DimSize".to_string(), TagValue::from(dim_size)),
            (
                "ElementType".to_string(),
                TagValue::from(data.element_type().metaio_token()),
            ),
            (
                "Offset".to_string(),
                TagValue::FloatList(vec![0.0; ndims]),
            ),
            (
                "ElementSpacing".to_string(),
                TagValue::FloatList(vec![1.0; ndims]),
            ),
            (
                "TransformMatrix".to_string(),
                TagValue::FloatList(identity_matrix(ndims)),
            ),
        ];
        if vector {
            derived.push((
                "ElementNumberOfChannels".to_string(),
                TagValue::from(shape[ndims]),
            ));
        }

        let tags = MetaTags::build(derived, ignore_errors)?;
        let mut image = MetaImage { data, tags };
        image.update(overrides, ignore_errors)?;
        Ok(image)
    }

    /// Merge tag updates, keeping array and tags consistent.
    ///
    /// Shape-bearing tags (`NDims`, `DimSize`, `ElementNumberOfChannels`)
    /// are reconciled first: if any is present the array is reshaped to
    /// the new shape before element-type and byte-order tags are handled,
    /// so a caller changing the channel count and the flat size in one
    /// call never observes a half-updated shape. An `ElementType` update
    /// casts the array; an absent one is re-derived from the array.
    pub fn update(&mut self, raw: RawTags, ignore_errors: bool) -> Result<(), MetaImageError> {
        if raw.is_empty() {
            return Ok(());
        }
        debug!("update metaimage");
        let mut raw = raw;

        // Shape first.
        let ndims = match self.raw_int(&raw, "NDims")? {
            Some(n) => n as usize,
            None => self
                .tags
                .get_int("NDims")
                .map(|n| n as usize)
                .unwrap_or_else(|| self.data.ndim()),
        };
        let nchan = match self.raw_int(&raw, "ElementNumberOfChannels")? {
            Some(n) => n as usize,
            None => self
                .tags
                .get_int("ElementNumberOfChannels")
                .map(|n| n as usize)
                .unwrap_or(1),
        };
        let shape_touched = raw
            .iter()
            .any(|(k, _)| k == "DimSize" || k == "ElementNumberOfChannels");
        if shape_touched {
            let dim_size = match self.raw_cast(&raw, "DimSize")? {
                Some(v) => v.as_int_list().map(<[i64]>::to_vec).unwrap_or_default(),
                None => self
                    .tags
                    .get_int_list("DimSize")
                    .map(<[i64]>::to_vec)
                    .unwrap_or_default(),
            };
            // DimSize is on-disk order; the in-memory shape is its reverse,
            // truncated if the dimensionality shrank.
            let mut new_shape: Vec<usize> = dim_size.iter().rev().map(|&v| v as usize).collect();
            new_shape.truncate(ndims);
            if nchan > 1 {
                new_shape.push(nchan);
            }
            self.data.reshape(&new_shape)?;
        }

        // Element type: an update casts the array, otherwise the tag is
        // pinned to what the array already holds.
        match self.raw_cast(&raw, "ElementType")? {
            Some(v) => {
                let token = v.as_str().unwrap_or_default().to_string();
                let kind = ElementType::from_metaio_token(&token)?;
                if kind != self.data.element_type() {
                    self.data = self.data.cast(kind);
                }
            }
            None => raw.push((
                "ElementType".to_string(),
                TagValue::from(self.data.element_type().metaio_token()),
            )),
        }

        // Byte order: in memory the array is always native; the tag only
        // directs encoding, so absent everywhere it records the platform.
        if self.raw_cast(&raw, "BinaryDataByteOrderMSB")?.is_none()
            && !self.tags.contains("BinaryDataByteOrderMSB")
        {
            raw.push((
                "BinaryDataByteOrderMSB".to_string(),
                TagValue::from(cfg!(target_endian = "big")),
            ));
        }

        // Anatomical orientation codes only describe up to three axes.
        if ndims > 3 {
            raw.push(("AnatomicalOrientation".to_string(), TagValue::from("???")));
        }

        let mut tags = self.tags.clone();
        tags.update(raw, ignore_errors)?;
        Self::check(&self.data, &tags, ignore_errors)?;
        self.tags = tags;
        Ok(())
    }

    /// Validate the coupling between an array and a tag collection.
    ///
    /// Always enforced: dimensionality (`NDims`, channel-aware), shape
    /// (`DimSize` reversed against the spatial axes, channel count against
    /// the trailing axis) and element type. With `ignore_errors` the
    /// geometric-tag length checks are skipped; the shape and type checks
    /// never are, because the payload decode relies on them.
    pub fn check(
        data: &ImageData,
        tags: &MetaTags,
        ignore_errors: bool,
    ) -> Result<(), MetaImageError> {
        debug!("check metaimage");
        let ndims = tags
            .get_int("NDims")
            .ok_or(TagError::MissingRequiredTag("NDims"))? as usize;
        let nchan = tags.get_int("ElementNumberOfChannels").unwrap_or(1) as usize;
        let channel_axes = usize::from(nchan > 1);

        if data.ndim() != ndims + channel_axes {
            return Err(MetaImageError::ShapeMismatch {
                tag: "NDims",
                message: format!(
                    "tag declares {} dimension(s), array has {} axis(es)",
                    ndims,
                    data.ndim()
                ),
            });
        }

        let dim_size = tags
            .get_int_list("DimSize")
            .ok_or(TagError::MissingRequiredTag("DimSize"))?;
        let mut expected: Vec<usize> = dim_size.iter().rev().map(|&v| v as usize).collect();
        if nchan > 1 {
            expected.push(nchan);
        }
        if data.shape() != expected {
            return Err(MetaImageError::ShapeMismatch {
                tag: "DimSize",
                message: format!("tag implies shape {:?}, array has {:?}", expected, data.shape()),
            });
        }

        let declared = tags
            .get_str("ElementType")
            .ok_or(TagError::MissingRequiredTag("ElementType"))?;
        let declared_kind = ElementType::from_metaio_token(declared)?;
        if declared_kind != data.element_type() {
            return Err(MetaImageError::TypeMismatch {
                declared: declared.to_string(),
                actual: data.element_type().metaio_token().to_string(),
            });
        }

        if ignore_errors {
            return Ok(());
        }

        // Geometric tags, when present, have the lengths the
        // dimensionality implies.
        for (name, expected_len) in [
            ("Offset", ndims),
            ("ElementSpacing", ndims),
            ("TransformMatrix", ndims * ndims),
            ("CenterOfRotation", ndims),
        ] {
            if let Some(values) = tags.get_float_list(name) {
                if values.len() != expected_len {
                    return Err(MetaImageError::InvalidGeometry {
                        tag: name,
                        expected: expected_len,
                        actual: values.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Cast the raw value provided for `name` (or an alias), if any,
    /// through its trait. The raw entry itself stays in place for the
    /// collection update.
    fn raw_cast(&self, raw: &RawTags, name: &str) -> Result<Option<TagValue>, TagError> {
        let Some(trait_) = tags::find(name) else {
            return Ok(None);
        };
        // Later duplicates win, as in the collection's merge.
        match raw.iter().rev().find(|(k, _)| trait_.matches(k)) {
            Some((_, v)) => trait_.cast(v.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn raw_int(&self, raw: &RawTags, name: &str) -> Result<Option<i64>, TagError> {
        Ok(self.raw_cast(raw, name)?.and_then(|v| v.as_int()))
    }
}

/// Row-major identity matrix entries for an `ndims`-dimensional image.
fn identity_matrix(ndims: usize) -> Vec<f64> {
    (0..ndims * ndims)
        .map(|i| if i % (ndims + 1) == 0 { 1.0 } else { 0.0 })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
