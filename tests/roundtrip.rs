//! On-disk round-trip tests.
//!
//! Tests verify:
//! - Inline (`.mha`) and external (`.mhd` + `.raw`/`.zraw`) storage
//! - Bit-faithful payload round-trips in both byte orders
//! - Header content and idempotent serialization
//! - Compression, including the legacy gzip fallback
//! - Tolerance for vendor tags and advisory `HeaderSize`

use std::io::Write as _;

use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{arr2, Array2, Array3};
use tempfile::tempdir;

use metaimage::{read, write, ImageData, MetaImage, MetaImageError, RawTags, TagValue};

/// Header portion of a written file, up to and including the
/// `ElementDataFile` line.
fn header_text(bytes: &[u8]) -> String {
    let needle = b"ElementDataFile";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("header has an ElementDataFile line");
    let end = at + bytes[at..].iter().position(|&b| b == b'\n').unwrap() + 1;
    String::from_utf8(bytes[..end].to_vec()).unwrap()
}

fn raw(pairs: &[(&str, TagValue)]) -> RawTags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// =============================================================================
// Inline storage
// =============================================================================

#[test]
fn test_mha_scenario_u16_volume() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.mha");

    let volume = Array3::from_shape_fn((10, 20, 30), |(i, j, k)| (i * 600 + j * 30 + k) as u16);
    write(&path, ImageData::from(volume.clone()), RawTags::new()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let header = header_text(&bytes);
    let lines: Vec<&str> = header.lines().collect();
    assert!(lines.contains(&"NDims = 3"));
    assert!(lines.contains(&"DimSize = 30 20 10"));
    assert!(lines.contains(&"ElementType = MET_USHORT"));
    assert!(lines.contains(&"ElementDataFile = LOCAL"));
    assert!(!header.contains("ElementNumberOfChannels"));
    // Header text plus one payload byte per element times two
    assert_eq!(bytes.len(), header.len() + 10 * 20 * 30 * 2);

    let (data, tags) = read(&path).unwrap();
    assert_eq!(data, ImageData::from(volume));
    assert_eq!(tags.get_int("NDims"), Some(3));
    assert_eq!(tags.get_int_list("DimSize"), Some(&[30i64, 20, 10][..]));
}

#[test]
fn test_header_serialization_idempotent() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("a.mha");
    let second = dir.path().join("b.mha");

    let volume = Array2::from_shape_fn((7, 9), |(i, j)| (i + j) as f32);
    write(
        &first,
        ImageData::from(volume),
        raw(&[
            ("Offset", vec![1.5, -2.0].into()),
            ("ElementSpacing", vec![0.5, 0.5].into()),
        ]),
    )
    .unwrap();

    let image = MetaImage::load(&first, false).unwrap();
    image.save(&second, RawTags::new()).unwrap();

    let header_a = header_text(&std::fs::read(&first).unwrap());
    let header_b = header_text(&std::fs::read(&second).unwrap());
    assert_eq!(header_a, header_b);
}

#[test]
fn test_missing_extension_becomes_mha() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bare");

    write(
        &path,
        ImageData::from(Array2::<u8>::zeros((2, 2))),
        RawTags::new(),
    )
    .unwrap();

    assert!(dir.path().join("bare.mha").exists());
    let (data, _) = read(dir.path().join("bare.mha")).unwrap();
    assert_eq!(data.shape(), &[2, 2]);
}

#[test]
fn test_big_endian_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("be.mha");

    let volume = Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as i16 - 6);
    write(
        &path,
        ImageData::from(volume.clone()),
        raw(&[("BinaryDataByteOrderMSB", true.into())]),
    )
    .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(header_text(&bytes).contains("BinaryDataByteOrderMSB = True"));

    let (data, tags) = read(&path).unwrap();
    assert_eq!(tags.get_bool("BinaryDataByteOrderMSB"), Some(true));
    assert_eq!(data, ImageData::from(volume));
}

// =============================================================================
// Multi-channel images
// =============================================================================

#[test]
fn test_two_channel_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vec.mha");

    // Spatial shape (5, 5), channel axis trailing in memory.
    let volume = Array3::from_shape_fn((5, 5, 2), |(i, j, c)| (i * 10 + j * 2 + c) as u8);
    let image = MetaImage::from_array(
        ImageData::from(volume.clone()),
        true,
        RawTags::new(),
        false,
    )
    .unwrap();
    image.save(&path, RawTags::new()).unwrap();

    let header = header_text(&std::fs::read(&path).unwrap());
    assert!(header.contains("NDims = 2"));
    assert!(header.contains("DimSize = 5 5"));
    assert!(header.contains("ElementNumberOfChannels = 2"));

    let (data, tags) = read(&path).unwrap();
    assert_eq!(tags.get_int("ElementNumberOfChannels"), Some(2));
    assert_eq!(data, ImageData::from(volume));
}

#[test]
fn test_channel_axis_outermost_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("planes.mha");

    // Two 2x2 channels; on disk the channel axis is outermost, so the
    // payload is channel 0's plane followed by channel 1's.
    let volume = Array3::from_shape_fn((2, 2, 2), |(i, j, c)| (c * 100 + j * 10 + i) as u8);
    let image = MetaImage::from_array(
        ImageData::from(volume),
        true,
        RawTags::new(),
        false,
    )
    .unwrap();
    image.save(&path, RawTags::new()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let payload = &bytes[header_text(&bytes).len()..];
    assert_eq!(payload, &[0, 1, 10, 11, 100, 101, 110, 111]);
}

// =============================================================================
// External storage
// =============================================================================

#[test]
fn test_mhd_external_raw() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scan.mhd");

    let volume = Array3::from_shape_fn((4, 5, 6), |(i, j, k)| (i * 30 + j * 6 + k) as i32);
    write(&path, ImageData::from(volume.clone()), RawTags::new()).unwrap();

    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.contains("ElementDataFile = scan.raw"));
    let payload = std::fs::read(dir.path().join("scan.raw")).unwrap();
    assert_eq!(payload.len(), 4 * 5 * 6 * 4);

    let (data, _) = read(&path).unwrap();
    assert_eq!(data, ImageData::from(volume));
}

#[test]
fn test_mhd_compressed_zraw() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scan.mhd");

    let volume = Array2::<u16>::from_elem((64, 64), 7);
    write(
        &path,
        ImageData::from(volume.clone()),
        raw(&[("CompressedData", true.into())]),
    )
    .unwrap();

    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.contains("CompressedData = True"));
    assert!(header.contains("ElementDataFile = scan.zraw"));

    let packed = std::fs::read(dir.path().join("scan.zraw")).unwrap();
    assert!(packed.len() < 64 * 64 * 2);
    // The recorded size matches the payload file
    let size_line = header
        .lines()
        .find(|l| l.starts_with("CompressedDataSize"))
        .unwrap();
    assert_eq!(size_line, format!("CompressedDataSize = {}", packed.len()));

    let (data, _) = read(&path).unwrap();
    assert_eq!(data, ImageData::from(volume));
}

#[test]
fn test_missing_payload_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orphan.mhd");

    write(
        &path,
        ImageData::from(Array2::<u8>::zeros((2, 3))),
        RawTags::new(),
    )
    .unwrap();
    std::fs::remove_file(dir.path().join("orphan.raw")).unwrap();

    let err = read(&path).unwrap_err();
    assert!(matches!(err, MetaImageError::PayloadNotFound(_)));
}

#[test]
fn test_header_size_skip_is_advisory() {
    let dir = tempdir().unwrap();
    let header_path = dir.path().join("skip.mhd");

    // Payload file with four junk bytes ahead of the data.
    let mut payload = vec![0xFF, 0xFF, 0xFF, 0xFF];
    payload.extend_from_slice(&[1u8, 2, 3, 4, 5, 6]);
    std::fs::write(dir.path().join("skip.raw"), &payload).unwrap();

    std::fs::write(
        &header_path,
        "ObjectType = Image\n\
         NDims = 2\n\
         Offset = 0 0\n\
         TransformMatrix = 1 0 0 1\n\
         ElementSpacing = 1 1\n\
         HeaderSize = 4\n\
         DimSize = 3 2\n\
         ElementType = MET_UCHAR\n\
         ElementDataFile = skip.raw\n",
    )
    .unwrap();

    let (data, _) = read(&header_path).unwrap();
    // DimSize = 3 2 means in-memory shape (2, 3), first axis fastest on disk.
    assert_eq!(data, ImageData::from(arr2(&[[1u8, 3, 5], [2, 4, 6]])));
}

// =============================================================================
// Compression fallback
// =============================================================================

#[test]
fn test_gzip_payload_still_decodes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.mha");

    // A legacy writer gzip-wrapped the payload instead of zlib.
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[1u8, 2, 3, 4]).unwrap();
    let packed = encoder.finish().unwrap();

    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(
        b"ObjectType = Image\n\
          NDims = 2\n\
          CompressedData = True\n\
          Offset = 0 0\n\
          TransformMatrix = 1 0 0 1\n\
          ElementSpacing = 1 1\n\
          DimSize = 2 2\n\
          ElementType = MET_UCHAR\n\
          ElementDataFile = LOCAL\n",
    )
    .unwrap();
    file.write_all(&packed).unwrap();
    drop(file);

    let (data, tags) = read(&path).unwrap();
    assert_eq!(tags.get_bool("CompressedData"), Some(true));
    assert_eq!(data, ImageData::from(arr2(&[[1u8, 3], [2, 4]])));
}

// =============================================================================
// Tag handling across the file boundary
// =============================================================================

#[test]
fn test_vendor_tags_tolerated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vendor.mha");

    std::fs::write(
        &path,
        b"ObjectType = Image\n\
          NDims = 1\n\
          Offset = 0\n\
          TransformMatrix = 1\n\
          ElementSpacing = 1\n\
          AcmeScannerSerial = 12345\n\
          DimSize = 3\n\
          ElementType = MET_UCHAR\n\
          ElementDataFile = LOCAL\n\
          \x07\x08\x09"
            .to_vec(),
    )
    .unwrap();

    let (data, tags) = read(&path).unwrap();
    assert_eq!(data.shape(), &[3]);
    assert!(!tags.contains("AcmeScannerSerial"));
}

#[test]
fn test_position_alias_round_trips_as_offset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("alias.mha");

    write(
        &path,
        ImageData::from(Array2::<u8>::zeros((2, 2))),
        raw(&[("Position", vec![3.0, 4.0].into())]),
    )
    .unwrap();

    let header = header_text(&std::fs::read(&path).unwrap());
    assert!(header.contains("Offset = 3 4"));
    assert!(!header.contains("Position"));
}

#[test]
fn test_save_rejects_inconsistent_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.mha");

    let image = MetaImage::new(ImageData::from(Array2::<u8>::zeros((4, 6)))).unwrap();
    let err = image
        .save(&path, raw(&[("DimSize", vec![5i64, 5].into())]))
        .unwrap_err();
    assert!(matches!(err, MetaImageError::ShapeMismatch { .. }));
    assert!(!path.exists());
}

#[test]
fn test_relaxed_load_without_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sparse.mha");

    std::fs::write(
        &path,
        b"NDims = 1\n\
          DimSize = 2\n\
          ElementType = MET_UCHAR\n\
          ElementDataFile = LOCAL\n\
          \x05\x06"
            .to_vec(),
    )
    .unwrap();

    // Strict loading insists on the geometric tags.
    let err = MetaImage::load(&path, false).unwrap_err();
    assert!(matches!(
        err,
        MetaImageError::Tag(metaimage::TagError::MissingRequiredTag(_))
    ));

    let image = MetaImage::load(&path, true).unwrap();
    assert_eq!(image.data().shape(), &[2]);
    // Identity geometry is derived for the missing tags.
    assert_eq!(image.tags().get_float_list("Offset"), Some(&[0.0][..]));
}
