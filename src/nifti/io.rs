//! NIfTI label-volume decoding.
//!
//! Masks arrive either as raw upload bytes or as files on disk. Byte input is
//! staged through a uniquely named temporary file so that decoding goes down the
//! same path-based route as on-disk masks; the temporary is removed when it goes
//! out of scope, whether or not decoding succeeded.
//!
//! Gzip payloads are detected by their magic bytes and inflated with libdeflate,
//! falling back to a streaming decoder for multi-member streams or payloads whose
//! gzip trailer under-reports the size.

use super::header::{DataType, NiftiHeader};
use super::volume::LabelVolume;
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::bufread::MultiGzDecoder;
use libdeflater::{CompressionLvl, Compressor, DecompressionError, Decompressor};
use memmap2::Mmap;
use ndarray::{Array3, ShapeBuilder};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

thread_local! {
    static DECOMPRESSOR: std::cell::RefCell<Decompressor> = std::cell::RefCell::new(Decompressor::new());
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_BUFFER_SIZE: usize = 256 * 1024;
// Upper bound on deflate expansion, caps trust in the ISIZE trailer.
const MAX_DEFLATE_RATIO: usize = 1032;

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Decode raw mask bytes (`.nii` or `.nii.gz`) into a label volume.
///
/// # Example
/// ```ignore
/// let volume = medxai::nifti::decode(&upload_bytes)?;
/// let (d, h, w) = volume.shape();
/// ```
pub fn decode(bytes: &[u8]) -> Result<LabelVolume> {
    decode_in(bytes, std::env::temp_dir())
}

/// Like [`decode`], staging the temporary file inside `dir`.
pub fn decode_in<P: AsRef<Path>>(bytes: &[u8], dir: P) -> Result<LabelVolume> {
    let suffix = if is_gzip(bytes) { ".nii.gz" } else { ".nii" };
    let mut staged = tempfile::Builder::new()
        .prefix("medxai-mask-")
        .suffix(suffix)
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;

    let volume = load(staged.path())?;

    if let Err(e) = staged.close() {
        tracing::warn!(error = %e, "failed to remove staged mask file");
    }
    Ok(volume)
}

/// Load a label volume from a `.nii` or `.nii.gz` file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<LabelVolume> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(format!("mask file {}", path.display())));
    }

    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and dropped before this function returns.
    let mmap = unsafe { Mmap::map(&file)? };

    if is_gzip(&mmap) {
        let inflated = inflate(&mmap)?;
        volume_from_bytes(&inflated)
    } else {
        volume_from_bytes(&mmap)
    }
}

/// Inflate a gzip payload, checking the result against the NIfTI header it holds.
fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let (output, used_streaming) = decompress_gzip_with_fallback(compressed)?;
    if used_streaming || matches_declared_size(&output) {
        return Ok(output);
    }
    // libdeflate stops after the first gzip member.
    decompress_gzip_streaming(compressed)
}

fn matches_declared_size(bytes: &[u8]) -> bool {
    NiftiHeader::from_bytes(bytes)
        .and_then(|h| h.data_end())
        .map_or(true, |end| bytes.len() >= end)
}

fn estimate_gzip_uncompressed_size(compressed: &[u8]) -> usize {
    // ISIZE per RFC 1952: original size modulo 2^32, trustworthy for single members.
    let bound = compressed.len().saturating_mul(MAX_DEFLATE_RATIO);
    if compressed.len() >= 4 {
        let trailer = &compressed[compressed.len() - 4..];
        let declared = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize;
        declared.min(bound)
    } else {
        compressed.len() * 4
    }
}

fn decompress_gzip_streaming(compressed: &[u8]) -> Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(compressed);
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, cursor));

    let mut output = Vec::with_capacity(estimate_gzip_uncompressed_size(compressed));
    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

fn decompress_gzip_with_fallback(compressed: &[u8]) -> Result<(Vec<u8>, bool)> {
    let buffer_size = estimate_gzip_uncompressed_size(compressed).max(NiftiHeader::SIZE);
    let mut output = vec![0u8; buffer_size];

    let result = DECOMPRESSOR.with(|d| d.borrow_mut().gzip_decompress(compressed, &mut output));

    match result {
        Ok(written) => {
            output.truncate(written);
            Ok((output, false))
        }
        Err(DecompressionError::InsufficientSpace) => {
            drop(output);
            Ok((decompress_gzip_streaming(compressed)?, true))
        }
        Err(e) => Err(Error::Decompression(format!("{}", e))),
    }
}

/// Build a label volume from an uncompressed NIfTI byte image.
fn volume_from_bytes(bytes: &[u8]) -> Result<LabelVolume> {
    if bytes.len() < NiftiHeader::SIZE {
        return Err(Error::Decode(format!(
            "input too small for a NIfTI header: {} bytes (need at least {})",
            bytes.len(),
            NiftiHeader::SIZE
        )));
    }
    let header = NiftiHeader::from_bytes(bytes)?;
    let shape = spatial_shape(&header)?;

    let end = header.data_end()?;
    let offset = end - header.data_size();
    if bytes.len() < end {
        return Err(Error::Decode(format!(
            "voxel data truncated: have {} bytes, need {} (offset {} + data {})",
            bytes.len(),
            end,
            offset,
            end - offset
        )));
    }
    let raw = &bytes[offset..end];

    let labels = if header.is_little_endian() {
        decode_voxels::<LittleEndian>(raw, &header)
    } else {
        decode_voxels::<BigEndian>(raw, &header)
    };

    // NIfTI stores the first axis fastest.
    let array = Array3::from_shape_vec(shape.f(), labels)
        .map_err(|e| Error::InvalidDimensions(format!("voxel layout: {e}")))?;

    let spacing = header.spacing();
    let spacing_at = |axis: usize| spacing.get(axis).copied().unwrap_or(1.0);
    LabelVolume::new(array, [spacing_at(0), spacing_at(1), spacing_at(2)])
}

/// Reduce the header shape to exactly three axes.
fn spatial_shape(header: &NiftiHeader) -> Result<(usize, usize, usize)> {
    let shape = header.shape();
    if let Some((axis, &extent)) = shape.iter().enumerate().skip(3).find(|(_, &d)| d != 1) {
        return Err(Error::Decode(format!(
            "expected a 3D label volume, axis {} has extent {}",
            axis, extent
        )));
    }
    let at = |axis: usize| shape.get(axis).copied().unwrap_or(1);
    Ok((at(0), at(1), at(2)))
}

fn decode_voxels<E: ByteOrder>(raw: &[u8], header: &NiftiHeader) -> Vec<i32> {
    let datatype = header.datatype;
    let scaling = header.has_scaling().then(|| {
        let slope = if header.scl_slope == 0.0 {
            1.0
        } else {
            header.scl_slope
        };
        (slope, header.scl_inter)
    });

    raw.chunks_exact(datatype.byte_size())
        .map(|chunk| {
            let value = read_value::<E>(chunk, datatype);
            match scaling {
                Some((slope, inter)) => value * slope + inter,
                None => value,
            }
        })
        // Saturating cast; fractional label values are truncated toward zero.
        .map(|v| v as i32)
        .collect()
}

fn read_value<E: ByteOrder>(chunk: &[u8], datatype: DataType) -> f64 {
    match datatype {
        DataType::UInt8 => chunk[0] as f64,
        DataType::Int8 => chunk[0] as i8 as f64,
        DataType::Int16 => E::read_i16(chunk) as f64,
        DataType::UInt16 => E::read_u16(chunk) as f64,
        DataType::Int32 => E::read_i32(chunk) as f64,
        DataType::UInt32 => E::read_u32(chunk) as f64,
        DataType::Int64 => E::read_i64(chunk) as f64,
        DataType::UInt64 => E::read_u64(chunk) as f64,
        DataType::Float16 => half::f16::from_bits(E::read_u16(chunk)).to_f64(),
        DataType::BFloat16 => half::bf16::from_bits(E::read_u16(chunk)).to_f64(),
        DataType::Float32 => E::read_f32(chunk) as f64,
        DataType::Float64 => E::read_f64(chunk),
    }
}

/// Encode a label volume as NIfTI-1 bytes, gzip-compressed when `compress` is set.
///
/// Labels are stored as int16 when they fit, int32 otherwise.
pub fn encode(volume: &LabelVolume, compress: bool) -> Result<Vec<u8>> {
    let (d, h, w) = volume.shape();
    let spacing = volume.spacing();
    let fits_i16 = volume
        .labels()
        .iter()
        .all(|&v| (i16::MIN as i32..=i16::MAX as i32).contains(&v));

    let mut header = NiftiHeader::default();
    header.dim = [d as i64, h as i64, w as i64, 1, 1, 1, 1];
    header.pixdim = [1.0, spacing[0], spacing[1], spacing[2], 0.0, 0.0, 0.0, 0.0];
    header.datatype = if fits_i16 {
        DataType::Int16
    } else {
        DataType::Int32
    };
    header.validate()?;

    let end = header.data_end()?;
    let padding = end - header.data_size() - NiftiHeader::SIZE;
    let mut bytes = Vec::with_capacity(end);
    bytes.extend_from_slice(&header.to_bytes());
    bytes.resize(bytes.len() + padding, 0u8);

    // Reversed-axis view iterates with the first axis fastest.
    for &v in volume.labels().t().iter() {
        if fits_i16 {
            bytes.extend_from_slice(&(v as i16).to_le_bytes());
        } else {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }

    if !compress {
        return Ok(bytes);
    }

    let mut compressor = Compressor::new(CompressionLvl::fastest());
    let mut compressed = vec![0u8; compressor.gzip_compress_bound(bytes.len())];
    let written = compressor
        .gzip_compress(&bytes, &mut compressed)
        .map_err(|e| Error::Io(std::io::Error::other(format!("compression failed: {e:?}"))))?;
    compressed.truncate(written);
    Ok(compressed)
}

/// Write a label volume to disk; `.gz` paths are compressed.
pub fn save<P: AsRef<Path>>(volume: &LabelVolume, path: P) -> Result<()> {
    let path = path.as_ref();
    let compress = path.extension().is_some_and(|e| e == "gz");
    let bytes = encode(volume, compress)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn sample_volume() -> LabelVolume {
        let labels = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (i * 6 + j * 2 + k) as i32);
        LabelVolume::new(labels, [1.5, 1.5, 2.0]).unwrap()
    }

    #[test]
    fn test_decode_uncompressed() {
        let vol = sample_volume();
        let bytes = encode(&vol, false).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.shape(), (4, 3, 2));
        assert_eq!(decoded.labels(), vol.labels());
        assert_eq!(decoded.spacing(), [1.5, 1.5, 2.0]);
    }

    #[test]
    fn test_decode_gzipped() {
        let vol = sample_volume();
        let bytes = encode(&vol, true).unwrap();
        assert!(is_gzip(&bytes));
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.labels(), vol.labels());
    }

    #[test]
    fn test_decode_large_labels_use_int32() {
        let mut labels = Array3::<i32>::zeros((2, 2, 2));
        labels[[1, 0, 1]] = 70_000;
        let vol = LabelVolume::new(labels, [1.0, 1.0, 1.0]).unwrap();
        let decoded = decode(&encode(&vol, true).unwrap()).unwrap();
        assert_eq!(decoded.labels()[[1, 0, 1]], 70_000);
    }

    #[test]
    fn test_multimember_gzip_fallback() {
        let raw = encode(&sample_volume(), false).unwrap();
        let split = raw.len() / 2;

        let mut multi_member = Vec::new();
        for part in [&raw[..split], &raw[split..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(part).unwrap();
            multi_member.extend(encoder.finish().unwrap());
        }

        let decoded = decode(&multi_member).unwrap();
        assert_eq!(decoded.labels(), sample_volume().labels());
    }

    #[test]
    fn test_float_labels_with_scaling() {
        let mut header = NiftiHeader::default();
        header.dim = [2, 1, 1, 1, 1, 1, 1];
        header.datatype = DataType::Float32;
        header.scl_slope = 2.0;
        header.scl_inter = 1.0;
        let mut bytes = header.to_bytes();
        bytes.resize(352, 0);
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&2.9f32.to_le_bytes());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.labels()[[0, 0, 0]], 3);
        // 2.9 * 2 + 1 = 6.8, truncated
        assert_eq!(decoded.labels()[[1, 0, 0]], 6);
    }

    #[test]
    fn test_singleton_fourth_axis_is_squeezed() {
        let mut header = NiftiHeader::default();
        header.ndim = 4;
        header.dim = [2, 2, 1, 1, 1, 1, 1];
        let mut bytes = header.to_bytes();
        bytes.resize(352, 0);
        for v in [1i16, 2, 3, 4] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.shape(), (2, 2, 1));
        assert_eq!(decoded.labels()[[1, 1, 0]], 4);
    }

    #[test]
    fn test_four_dimensional_volume_rejected() {
        let mut header = NiftiHeader::default();
        header.ndim = 4;
        header.dim = [1, 1, 1, 2, 1, 1, 1];
        let mut bytes = header.to_bytes();
        bytes.resize(352 + 4, 0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_truncated_data_is_decode_error() {
        let mut bytes = encode(&sample_volume(), false).unwrap();
        bytes.truncate(bytes.len() - 3);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_size_trailer_estimate_is_bounded() {
        let mut bytes = encode(&sample_volume(), true).unwrap();
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(estimate_gzip_uncompressed_size(&bytes), n * MAX_DEFLATE_RATIO);

        let err = decode(&bytes).unwrap_err();
        assert!(err.is_decode_error(), "{err}");
    }

    #[test]
    fn test_staged_file_removed_on_every_path() {
        let dir = tempdir().unwrap();
        let is_empty = || std::fs::read_dir(dir.path()).unwrap().next().is_none();

        assert!(decode_in(b"definitely not a nifti file", dir.path()).is_err());
        assert!(is_empty());
        assert!(decode_in(&[0x1f, 0x8b, 0x00, 0x01, 0x02], dir.path()).is_err());
        assert!(is_empty());

        let bytes = encode(&sample_volume(), true).unwrap();
        assert!(decode_in(&bytes, dir.path()).is_ok());
        assert!(is_empty());
    }

    #[test]
    fn test_save_and_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mask.nii.gz");
        save(&sample_volume(), &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.labels(), sample_volume().labels());

        let missing = load(dir.path().join("absent.nii.gz")).unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));
    }
}
