//! `NIfTI` label-volume decoding.
//!
//! Segmentation masks are read as integer label grids together with their
//! physical voxel spacing. Both `.nii` and `.nii.gz` payloads are accepted.

pub(crate) mod header;
pub mod io;
pub(crate) mod volume;

pub use header::{DataType, NiftiHeader, NiftiVersion};
pub use io::{decode, decode_in, encode, load, save};
pub use volume::{voxel_volume, LabelVolume};
