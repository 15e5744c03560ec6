//! Multi-band image stack

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array3, ArrayView2, Axis};

/// A georeferenced stack of bands sharing one spatial extent.
///
/// Data is stored band-major, indexed `[band, row, col]`, so a single band
/// is a contiguous 2D view.
/// Reference images, annotation images and scored images all use this
/// layout regardless of how many bands they carry (grayscale, RGB, RGBA or
/// multispectral).
#[derive(Debug, Clone)]
pub struct MultibandRaster<T: RasterElement> {
    data: Array3<T>,
    transform: GeoTransform,
}

impl<T: RasterElement> MultibandRaster<T> {
    /// Create a new stack filled with zeros
    pub fn new(bands: usize, rows: usize, cols: usize) -> Self {
        Self::from_array(Array3::zeros((bands, rows, cols)))
    }

    /// Create a stack from a `[band, row, col]` array
    pub fn from_array(data: Array3<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
        }
    }

    /// Build a stack from pixel-interleaved samples (`r g b r g b ...`), the
    /// layout chunky TIFF decoders hand back.
    pub fn from_interleaved(data: Vec<T>, bands: usize, rows: usize, cols: usize) -> Result<Self> {
        if bands == 0 || data.len() != bands * rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        // (row, col, band) -> (band, row, col)
        let interleaved = Array3::from_shape_vec((rows, cols, bands), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        let planar = interleaved.permuted_axes([2, 0, 1]).as_standard_layout().into_owned();
        Ok(Self::from_array(planar))
    }

    // Dimensions

    pub fn n_bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn rows(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn cols(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Spatial dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    // Data access

    /// View of one band
    pub fn band(&self, index: usize) -> Result<ArrayView2<'_, T>> {
        if index >= self.n_bands() {
            return Err(Error::BandOutOfRange {
                index,
                n_bands: self.n_bands(),
            });
        }
        Ok(self.data.index_axis(Axis(0), index))
    }

    pub fn get(&self, band: usize, row: usize, col: usize) -> Result<T> {
        self.band(band)?
            .get((row, col))
            .copied()
            .ok_or_else(|| self.out_of_bounds(row, col))
    }

    pub fn set(&mut self, band: usize, row: usize, col: usize, value: T) -> Result<()> {
        if band >= self.n_bands() {
            return Err(Error::BandOutOfRange {
                index: band,
                n_bands: self.n_bands(),
            });
        }
        if row >= self.rows() || col >= self.cols() {
            return Err(self.out_of_bounds(row, col));
        }
        self.data[(band, row, col)] = value;
        Ok(())
    }

    /// Get a reference to the underlying `[band, row, col]` array
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Bounding box (min_x, min_y, max_x, max_y) in map coordinates
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    fn out_of_bounds(&self, row: usize, col: usize) -> Error {
        Error::IndexOutOfBounds {
            row,
            col,
            rows: self.rows(),
            cols: self.cols(),
        }
    }
}
