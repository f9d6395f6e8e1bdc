//! Philips PAR/REC support for xnatkit.
//!
//! Parses the PAR text header (versions 4, 4.1 and 4.2), reads the REC
//! pixel data into an `ndarray`, and converts a pair to NIfTI-1 with the
//! usual `.bval` / `.bvec` / `.dwell_time` side files.

pub mod affine;
pub mod convert;
pub mod header;
pub mod pair;
pub mod rec;

pub use convert::{ConvertOptions, ConvertedFiles, Origin, convert, dwell_time};
pub use header::{ImageDef, ParHeader, ParVersion, VolumeLayout};
pub use pair::{ParRecPair, locate_parrec_pair};
pub use rec::read_rec;

#[cfg(test)]
pub(crate) mod fixtures;
