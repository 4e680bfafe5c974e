//! Reading and writing image files.
//!
//! A file is a text header (one `tag = value` line per tag, closed by the
//! `ElementDataFile` line) followed by a raw, optionally zlib-compressed
//! payload. `.mha` files carry the payload inline after the header;
//! `.mhd` headers reference a sibling `.raw`/`.zraw` file.
//!
//! Loading is tag-driven: the header alone determines element kind, byte
//! order and shape, and the payload is decoded to match. Saving derives
//! the storage layout from the destination extension and always runs a
//! strict consistency check before any bytes are written.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::collection::{MetaTags, RawTags};
use crate::data::ImageData;
use crate::element::ElementType;
use crate::error::{MetaImageError, TagError};
use crate::image::MetaImage;
use crate::tags::TagValue;

// =============================================================================
// Constants
// =============================================================================

/// Header file extensions the codec recognizes.
pub const FILE_EXTENSIONS: [&str; 2] = [".mha", ".mhd"];

/// Sentinel `ElementDataFile` value for inline payload storage.
pub const LOCAL_DATA: &str = "LOCAL";

// =============================================================================
// Load
// =============================================================================

impl MetaImage {
    /// Load an image from a header file.
    ///
    /// The header is parsed up to the `ElementDataFile` line; the payload
    /// is the remainder of the same stream for inline storage, or the
    /// referenced sibling file otherwise. A non-negative `HeaderSize`
    /// skips that many leading bytes of an external payload file; it is
    /// advisory and never required.
    ///
    /// With `ignore_errors` the geometric tags become optional and their
    /// length checks are skipped. Shape and element-type consistency is
    /// enforced regardless.
    ///
    /// # Errors
    /// - `MissingRequiredTag` for headers without shape tags
    /// - `PayloadNotFound` if the referenced data file does not exist
    /// - `UnknownCompression` if a compressed payload is neither zlib nor
    ///   gzip
    /// - `ShapeMismatch` if the payload byte count disagrees with the tags
    pub fn load(
        path: impl AsRef<Path>,
        ignore_errors: bool,
    ) -> Result<MetaImage, MetaImageError> {
        let path = path.as_ref();
        debug!("load metaimage from {}", path.display());

        let mut reader = BufReader::new(File::open(path)?);
        let raw = MetaTags::parse_header(&mut reader)?;
        let tags = MetaTags::build(raw.clone(), ignore_errors)?;

        // Payload bytes, inline or external.
        let data_file = tags.get_str("ElementDataFile").unwrap_or(LOCAL_DATA);
        let mut payload = Vec::new();
        if data_file == LOCAL_DATA {
            reader.read_to_end(&mut payload)?;
        } else {
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            let data_path = dir.join(data_file);
            let mut file = File::open(&data_path)
                .map_err(|_| MetaImageError::PayloadNotFound(path.display().to_string()))?;
            file.read_to_end(&mut payload)?;

            let skip = tags.get_int("HeaderSize").unwrap_or(0);
            if skip > 0 {
                payload = payload.get(skip as usize..).unwrap_or(&[]).to_vec();
            }
        }

        if tags.get_bool("CompressedData").unwrap_or(false) {
            payload = decompress(&payload)?;
        }

        // Decode the element layout declared by the tags.
        let token = tags
            .get_str("ElementType")
            .ok_or(TagError::MissingRequiredTag("ElementType"))?;
        let kind = ElementType::from_metaio_token(token)?;
        let msb = tags.get_bool("BinaryDataByteOrderMSB").unwrap_or(false);
        let dim_size = tags
            .get_int_list("DimSize")
            .ok_or(TagError::MissingRequiredTag("DimSize"))?;
        let nchan = tags.get_int("ElementNumberOfChannels").unwrap_or(1) as usize;

        // On-disk shape: channel axis outermost, then DimSize as written.
        // Reversing yields the in-memory order (channel trailing).
        let mut disk_shape: Vec<usize> = Vec::with_capacity(dim_size.len() + 1);
        if nchan > 1 {
            disk_shape.push(nchan);
        }
        disk_shape.extend(dim_size.iter().map(|&v| v as usize));
        let data = ImageData::from_disk_bytes(&payload, kind, msb, &disk_shape)?;

        // The parsed tags are authoritative over the derived ones.
        MetaImage::from_array(data, nchan > 1, raw, ignore_errors)
    }

    /// Write the image to `path`.
    ///
    /// `overrides` are merged first. The storage layout follows the
    /// destination extension: `.mha` (and unrecognized extensions) store
    /// the payload inline after the header; `.mhd` writes a sibling
    /// `<base>.raw` (or `.zraw` when compressed); a missing extension
    /// becomes `.mha`. Compression is controlled by the `CompressedData`
    /// tag, and the consistency check is strict: an inconsistent
    /// tag/array pair never reaches storage.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        overrides: RawTags,
    ) -> Result<(), MetaImageError> {
        let path = path.as_ref();
        debug!("save metaimage to {}", path.display());

        let mut image = self.clone();
        image.update(overrides, false)?;

        let msb = image
            .tags()
            .get_bool("BinaryDataByteOrderMSB")
            .unwrap_or(false);
        let compressed = image.tags().get_bool("CompressedData").unwrap_or(false);

        let mut payload = image.data().to_disk_bytes(msb);
        let mut final_tags: RawTags = Vec::new();
        if compressed {
            payload = compress(&payload)?;
            final_tags.push((
                "CompressedDataSize".to_string(),
                TagValue::from(payload.len()),
            ));
        }

        // Storage location from the destination extension.
        let (header_path, dest) = match path.extension().and_then(|e| e.to_str()) {
            None => (path.with_extension("mha"), LOCAL_DATA.to_string()),
            Some("mhd") => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                let suffix = if compressed { "zraw" } else { "raw" };
                (path.to_path_buf(), format!("{stem}.{suffix}"))
            }
            // `.mha` and anything unrecognized store inline.
            Some(_) => (path.to_path_buf(), LOCAL_DATA.to_string()),
        };
        final_tags.push(("ElementDataFile".to_string(), TagValue::from(dest.clone())));

        // Last strict check before bytes hit storage.
        image.update(final_tags, false)?;

        let header_text = image.tags().to_text();
        if dest == LOCAL_DATA {
            let mut file = File::create(&header_path)?;
            file.write_all(header_text.as_bytes())?;
            file.write_all(&payload)?;
        } else {
            std::fs::write(&header_path, header_text.as_bytes())?;
            let dir = header_path.parent().unwrap_or_else(|| Path::new(""));
            std::fs::write(dir.join(&dest), &payload)?;
        }
        Ok(())
    }
}

// =============================================================================
// Convenience API
// =============================================================================

/// Load a file and return its array and tags.
pub fn read(path: impl AsRef<Path>) -> Result<(ImageData, MetaTags), MetaImageError> {
    Ok(MetaImage::load(path, false)?.into_parts())
}

/// Write an array (with optional tag overrides) to a file.
pub fn write(
    path: impl AsRef<Path>,
    data: ImageData,
    overrides: RawTags,
) -> Result<(), MetaImageError> {
    MetaImage::from_array(data, false, overrides, false)?.save(path, RawTags::new())
}

// =============================================================================
// Compression
// =============================================================================

fn compress(bytes: &[u8]) -> Result<Vec<u8>, MetaImageError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Inflate a compressed payload: zlib first, then the legacy gzip
/// wrapping some writers produced.
fn decompress(bytes: &[u8]) -> Result<Vec<u8>, MetaImageError> {
    let mut out = Vec::new();
    if ZlibDecoder::new(bytes).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    out.clear();
    if GzDecoder::new(bytes).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }
    Err(MetaImageError::UnknownCompression)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;

    #[test]
    fn test_compress_round_trip() {
        let bytes: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let packed = compress(&bytes).unwrap();
        assert!(packed.len() < bytes.len());
        assert_eq!(decompress(&packed).unwrap(), bytes);
    }

    #[test]
    fn test_decompress_gzip_fallback() {
        let bytes = b"legacy payload".repeat(64);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        let packed = encoder.finish().unwrap();

        assert_eq!(decompress(&packed).unwrap(), bytes);
    }

    #[test]
    fn test_decompress_garbage() {
        let err = decompress(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap_err();
        assert!(matches!(err, MetaImageError::UnknownCompression));
    }
}
