//! Slice mosaics of MR volumes.
//!
//! Loads a NIfTI or PAR/REC volume, tiles its slices into one grayscale
//! canvas and writes it as PNG, optionally with a thumbnail. Used for the
//! `SNAPSHOTS` previews shown on XNAT session pages.

pub mod tile;
pub mod volume;
pub mod writer;

pub use tile::{Grid, build_mosaic, grid_shape};
pub use volume::load_volume;
pub use writer::{MosaicFiles, MosaicOptions, write_mosaic};
