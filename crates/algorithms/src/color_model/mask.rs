//! Annotation masks
//!
//! An annotation image marks reference pixels either by painting them
//! bright on a grayscale layer or by painting them a fixed color (pure red
//! by default) on an RGB/RGBA copy of the reference image.

use ndarray::{Array2, Zip};
use colordist_core::{Error, MultibandRaster, Result};

/// Rule that decides which annotation pixels count as annotated.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskRule {
    /// 1-band annotations: a pixel is annotated when its value is strictly
    /// greater than this threshold (default: 127, so 128 is the first
    /// annotated value).
    pub threshold: f64,
    /// 3/4-band annotations: inclusive lower bound for the first three bands
    /// (default: 245, 0, 0)
    pub lower: [f64; 3],
    /// 3/4-band annotations: exclusive upper bound for the first three bands
    /// (default: 256, 10, 10)
    pub upper: [f64; 3],
}

impl Default for MaskRule {
    fn default() -> Self {
        Self {
            threshold: 127.0,
            lower: [245.0, 0.0, 0.0],
            upper: [256.0, 10.0, 10.0],
        }
    }
}

/// Boolean grid, true where a pixel is annotated.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationMask {
    cells: Array2<bool>,
}

impl AnnotationMask {
    /// Wrap an existing boolean grid
    pub fn from_array(cells: Array2<bool>) -> Self {
        Self { cells }
    }

    /// Derive the mask from an annotation image.
    ///
    /// 1-band images are thresholded, 3- and 4-band images are matched against
    /// the rule's color box (alpha is ignored). Any other band count is a
    /// configuration error.
    pub fn from_annotation(annotation: &MultibandRaster<f64>, rule: &MaskRule) -> Result<Self> {
        let cells = match annotation.n_bands() {
            1 => annotation.band(0)?.mapv(|v| v > rule.threshold),
            3 | 4 => {
                let (rows, cols) = annotation.shape();
                let mut cells = Array2::from_elem((rows, cols), false);
                Zip::from(&mut cells)
                    .and(annotation.band(0)?)
                    .and(annotation.band(1)?)
                    .and(annotation.band(2)?)
                    .for_each(|out, &r, &g, &b| {
                        *out = [r, g, b]
                            .iter()
                            .zip(rule.lower.iter().zip(rule.upper.iter()))
                            .all(|(&v, (&lo, &hi))| v >= lo && v < hi);
                    });
                cells
            }
            n => return Err(Error::InvalidMaskBands(n)),
        };
        Ok(Self { cells })
    }

    /// Spatial dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.cells.dim()
    }

    /// Number of annotated cells
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        self.cells.get((row, col)).copied().unwrap_or(false)
    }

    pub fn cells(&self) -> &Array2<bool> {
        &self.cells
    }
}
