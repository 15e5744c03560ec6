//! # colordist core
//!
//! Core types and I/O for the colordist reference-color library.
//!
//! This crate provides:
//! - `Raster<T>`: single-band raster grid (used for distance/likelihood maps)
//! - `MultibandRaster<T>`: band-major image stack indexed `[band, row, col]`
//! - `GeoTransform`: affine transformation carried from input to output
//! - The shared error taxonomy
//! - Native GeoTIFF reading and writing

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, ErrorCategory, Result};
pub use raster::{GeoTransform, MultibandRaster, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::raster::{GeoTransform, MultibandRaster, Raster, RasterElement};
}
