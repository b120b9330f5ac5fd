//! `NIfTI` header parsing.
//!
//! Only the fields needed to lay out a label volume are kept: dimensions,
//! datatype, voxel spacing, data offset and intensity scaling. Both NIfTI-1
//! (348-byte) and NIfTI-2 (540-byte) headers are detected, in either byte order.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Header layout of an incoming mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiVersion {
    #[default]
    Nifti1,
    /// 64-bit dims and offsets.
    Nifti2,
}

impl NiftiVersion {
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }
}

mod offsets_v1 {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const SFORM_CODE: usize = 254;
    pub const SROW_X: usize = 280;
    pub const SROW_Y: usize = 296;
    pub const SROW_Z: usize = 312;
    pub const MAGIC: usize = 344;
}

mod offsets_v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
}

/// Voxel storage types a mask may arrive in. All of them are read as `i32` labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    UInt8 = 2,
    Int16 = 4,
    Int32 = 8,
    Float32 = 16,
    Float64 = 64,
    Int8 = 256,
    UInt16 = 512,
    UInt32 = 768,
    Int64 = 1024,
    UInt64 = 1280,
    Float16 = 16384,
    BFloat16 = 16385,
}

impl DataType {
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            16384 => Ok(Self::Float16),
            16385 => Ok(Self::BFloat16),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }
}

/// The subset of a mask header needed to place and convert its voxels.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    pub version: NiftiVersion,
    pub ndim: u8,
    pub dim: [i64; 7],
    pub datatype: DataType,
    /// qfac at index 0, voxel sizes at 1..=ndim.
    pub pixdim: [f64; 8],
    pub vox_offset: i64,
    /// 0 means unset.
    pub scl_slope: f64,
    pub scl_inter: f64,
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            version: NiftiVersion::Nifti1,
            ndim: 3,
            dim: [1, 1, 1, 1, 1, 1, 1],
            datatype: DataType::Int16,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            little_endian: true,
        }
    }
}

impl NiftiHeader {
    /// Smallest header we accept.
    pub const SIZE: usize = 348;

    /// Parse a mask header, detecting layout and byte order from `sizeof_hdr`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Decode(
                "header too short to detect version".to_string(),
            ));
        }

        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);

        let (version, little_endian) = if sizeof_hdr_le == 348 {
            (NiftiVersion::Nifti1, true)
        } else if sizeof_hdr_be == 348 {
            (NiftiVersion::Nifti1, false)
        } else if sizeof_hdr_le == 540 {
            (NiftiVersion::Nifti2, true)
        } else if sizeof_hdr_be == 540 {
            (NiftiVersion::Nifti2, false)
        } else {
            return Err(Error::InvalidMagic([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]));
        };

        if bytes.len() < version.header_size() {
            return Err(Error::Decode(format!(
                "header too short: got {} bytes, need {} for {:?}",
                bytes.len(),
                version.header_size(),
                version
            )));
        }

        match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti1, false) => Self::parse_v1::<BigEndian>(bytes, false),
            (NiftiVersion::Nifti2, true) => Self::parse_v2::<LittleEndian>(bytes, true),
            (NiftiVersion::Nifti2, false) => Self::parse_v2::<BigEndian>(bytes, false),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v1::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let ndim = read_ndim(E::read_i16(&bytes[DIM..DIM + 2]) as i64)?;

        let mut dim = [1i64; 7];
        for (i, dim_val) in dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            *dim_val = E::read_i16(&bytes[offset..offset + 2]) as i64;
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        check_bitpix(E::read_i16(&bytes[BITPIX..BITPIX + 2]), datatype)?;

        let mut pixdim = [0.0f64; 8];
        for (i, pix_val) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 4;
            *pix_val = E::read_f32(&bytes[offset..offset + 4]) as f64;
        }

        let vox_offset_raw = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
        if !vox_offset_raw.is_finite() || vox_offset_raw.fract() != 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a finite integer, got {}",
                vox_offset_raw
            )));
        }

        let header = Self {
            version: NiftiVersion::Nifti1,
            ndim,
            dim,
            datatype,
            pixdim,
            // Files written by some tools leave vox_offset at 0 for .nii
            vox_offset: (vox_offset_raw as i64).max(352),
            scl_slope: E::read_f32(&bytes[SCL_SLOPE..SCL_SLOPE + 4]) as f64,
            scl_inter: E::read_f32(&bytes[SCL_INTER..SCL_INTER + 4]) as f64,
            little_endian,
        };

        header.validate()?;
        Ok(header)
    }

    #[allow(clippy::wildcard_imports)]
    fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets_v2::*;

        let magic = &bytes[MAGIC..MAGIC + 8];
        if magic != b"n+2\0\r\n\x1a\n" && magic != b"ni2\0\r\n\x1a\n" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let ndim = read_ndim(E::read_i64(&bytes[DIM..DIM + 8]))?;

        let mut dim = [1i64; 7];
        for (i, dim_val) in dim.iter_mut().enumerate() {
            let offset = DIM + 8 + i * 8;
            *dim_val = E::read_i64(&bytes[offset..offset + 8]);
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        check_bitpix(E::read_i16(&bytes[BITPIX..BITPIX + 2]), datatype)?;

        let mut pixdim = [0.0f64; 8];
        for (i, pix_val) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 8;
            *pix_val = E::read_f64(&bytes[offset..offset + 8]);
        }

        let header = Self {
            version: NiftiVersion::Nifti2,
            ndim,
            dim,
            datatype,
            pixdim,
            vox_offset: E::read_i64(&bytes[VOX_OFFSET..VOX_OFFSET + 8]),
            scl_slope: E::read_f64(&bytes[SCL_SLOPE..SCL_SLOPE + 8]),
            scl_inter: E::read_f64(&bytes[SCL_INTER..SCL_INTER + 8]),
            little_endian,
        };

        header.validate()?;
        Ok(header)
    }

    /// Little-endian NIfTI-1 header for fixture masks, with a diagonal sform.
    #[allow(clippy::wildcard_imports)]
    pub fn to_bytes(&self) -> Vec<u8> {
        use offsets_v1::*;

        let mut buf = vec![0u8; Self::SIZE];
        LittleEndian::write_i32(&mut buf[SIZEOF_HDR..SIZEOF_HDR + 4], 348);

        LittleEndian::write_i16(&mut buf[DIM..DIM + 2], self.ndim as i16);
        for i in 0..7 {
            let offset = DIM + 2 + i * 2;
            let dim_val = self.dim[i].min(i16::MAX as i64) as i16;
            LittleEndian::write_i16(&mut buf[offset..offset + 2], dim_val);
        }

        LittleEndian::write_i16(&mut buf[DATATYPE..DATATYPE + 2], self.datatype as i16);
        LittleEndian::write_i16(
            &mut buf[BITPIX..BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );

        for (i, &value) in self.pixdim.iter().enumerate() {
            let offset = PIXDIM + i * 4;
            LittleEndian::write_f32(&mut buf[offset..offset + 4], value as f32);
        }

        LittleEndian::write_f32(&mut buf[VOX_OFFSET..VOX_OFFSET + 4], self.vox_offset as f32);
        LittleEndian::write_f32(&mut buf[SCL_SLOPE..SCL_SLOPE + 4], self.scl_slope as f32);
        LittleEndian::write_f32(&mut buf[SCL_INTER..SCL_INTER + 4], self.scl_inter as f32);

        // millimetres
        buf[XYZT_UNITS] = 2;

        LittleEndian::write_i16(&mut buf[SFORM_CODE..SFORM_CODE + 2], 1);
        for (row, base) in [SROW_X, SROW_Y, SROW_Z].into_iter().enumerate() {
            let offset = base + row * 4;
            LittleEndian::write_f32(&mut buf[offset..offset + 4], self.pixdim[row + 1] as f32);
        }

        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
        buf
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Voxel sizes in mm, one per declared axis.
    pub fn spacing(&self) -> Vec<f64> {
        let end = (self.ndim as usize + 1).min(self.pixdim.len());
        self.pixdim[1..end].to_vec()
    }

    /// Saturates instead of wrapping; validated headers never saturate.
    pub fn num_voxels(&self) -> usize {
        self.dim[..self.ndim as usize]
            .iter()
            .fold(1usize, |acc, &d| acc.saturating_mul(d as usize))
    }

    pub fn data_size(&self) -> usize {
        self.num_voxels().saturating_mul(self.datatype.byte_size())
    }

    /// Byte offset one past the last voxel.
    pub fn data_end(&self) -> Result<usize> {
        let offset = usize::try_from(self.vox_offset).map_err(|_| {
            Error::InvalidDimensions(format!("vox_offset {} out of range", self.vox_offset))
        })?;
        let mut voxels: usize = 1;
        for &d in &self.dim[..self.ndim as usize] {
            let extent = usize::try_from(d)
                .map_err(|_| Error::InvalidDimensions(format!("dimension {d} out of range")))?;
            voxels = voxels
                .checked_mul(extent)
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .and_then(|size| size.checked_add(offset))
            .ok_or_else(|| {
                Error::InvalidDimensions(format!(
                    "voxel data at offset {offset} overflows the address space"
                ))
            })
    }

    pub fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    /// Whether `scl_slope`/`scl_inter` change stored values.
    pub fn has_scaling(&self) -> bool {
        (self.scl_slope != 0.0 && self.scl_slope != 1.0) || self.scl_inter != 0.0
    }

    /// Reject headers whose layout cannot describe a readable label volume.
    pub fn validate(&self) -> Result<()> {
        if self.ndim == 0 || self.ndim > 7 {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                self.ndim
            )));
        }

        for i in 0..self.ndim as usize {
            if self.dim[i] <= 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} must be positive, got {}",
                    i, self.dim[i]
                )));
            }
            // Only spatial axes carry a physical spacing we rely on.
            if i < 3 {
                let spacing = self.pixdim[i + 1];
                if !spacing.is_finite() || spacing <= 0.0 {
                    return Err(Error::InvalidDimensions(format!(
                        "pixdim[{}] must be finite and > 0, got {}",
                        i + 1,
                        spacing
                    )));
                }
            }
        }

        let min_offset = self.version.header_size() as i64;
        if self.vox_offset < min_offset {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset, min_offset
            )));
        }

        self.data_end()?;
        Ok(())
    }
}

fn read_ndim(raw: i64) -> Result<u8> {
    if !(1..=7).contains(&raw) {
        return Err(Error::InvalidDimensions(format!(
            "ndim must be 1..=7, got {}",
            raw
        )));
    }
    Ok(raw as u8)
}

fn check_bitpix(bitpix: i16, datatype: DataType) -> Result<()> {
    let expected = (datatype.byte_size() * 8) as i16;
    if bitpix != expected {
        return Err(Error::InvalidDimensions(format!(
            "bitpix {} does not match datatype {:?} (expected {})",
            bitpix, datatype, expected
        )));
    }
    Ok(())
}
