//! Reference pixel sampling
//!
//! Collects the values of annotated pixels from a reference image into a
//! `(bands, observations)` matrix that the color models are fitted on.

use ndarray::Array2;
use colordist_core::{Error, MultibandRaster, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::mask::AnnotationMask;

/// Ordered band indices (0-based) used for fitting and scoring.
///
/// Order is significant: it fixes the meaning of each row of the sample
/// and each component of the model's mean vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandSelection(Vec<usize>);

impl BandSelection {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// All bands except the last one, the usual layout when the last band
    /// is an alpha channel.
    pub fn all_but_last(n_bands: usize) -> Self {
        Self((0..n_bands.saturating_sub(1)).collect())
    }

    /// Use `explicit` if given, otherwise [`BandSelection::all_but_last`];
    /// then check it against an image with `n_bands` bands.
    pub fn resolve(explicit: Option<Vec<usize>>, n_bands: usize) -> Result<Self> {
        let selection = match explicit {
            Some(indices) => Self(indices),
            None => Self::all_but_last(n_bands),
        };
        selection.validate(n_bands)?;
        Ok(selection)
    }

    /// Every index must exist in an image with `n_bands` bands, and at least
    /// one band must be selected.
    pub fn validate(&self, n_bands: usize) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: "[]".into(),
                reason: format!("no bands selected from an image with {} bands", n_bands),
            });
        }
        if let Some(&index) = self.0.iter().find(|&&i| i >= n_bands) {
            return Err(Error::BandOutOfRange { index, n_bands });
        }
        Ok(())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BandSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Parameters for reference pixel sampling
#[derive(Debug, Clone)]
pub struct SamplerParams {
    /// The sample must contain strictly more annotated pixels than this
    /// (default: 100). Smaller samples give unreliable covariance and
    /// mixture estimates.
    pub min_pixels: usize,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self { min_pixels: 100 }
    }
}

/// Values of the annotated pixels: shape `(bands, observations)`.
///
/// Columns follow the mask's raster scan order (row by row, left to right).
#[derive(Debug, Clone)]
pub struct PixelSample {
    values: Array2<f64>,
    bands: BandSelection,
}

impl PixelSample {
    /// Wrap an existing `(bands, observations)` matrix.
    ///
    /// Only the shape is checked here. The minimum sample size is enforced by
    /// [`sample_reference_pixels`] and by [`PixelSample::validate`], which the
    /// scoring pipeline calls before fitting.
    pub fn from_values(values: Array2<f64>, bands: BandSelection) -> Result<Self> {
        if values.nrows() != bands.len() {
            return Err(Error::InvalidParameter {
                name: "values",
                value: format!("{} rows", values.nrows()),
                reason: format!("band selection has {} bands", bands.len()),
            });
        }
        Ok(Self { values, bands })
    }

    /// Check that the sample holds strictly more than `params.min_pixels` observations.
    pub fn validate(&self, params: &SamplerParams) -> Result<()> {
        let n = self.n_observations();
        if n <= params.min_pixels {
            return Err(Error::InsufficientSample {
                min: params.min_pixels,
                got: n,
            });
        }
        Ok(())
    }

    /// Number of bands (B)
    pub fn n_bands(&self) -> usize {
        self.values.nrows()
    }

    /// Number of observations (N)
    pub fn n_observations(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// The band selection the sample was taken with; models score with the same one.
    pub fn bands(&self) -> &BandSelection {
        &self.bands
    }

    /// Write the sample as a tab-delimited table: one row per observation,
    /// one column per band, no header.
    pub fn write_delimited<W: Write>(&self, mut writer: W) -> Result<()> {
        for column in self.values.columns() {
            let line: Vec<String> = column.iter().map(|v| v.to_string()).collect();
            writeln!(writer, "{}", line.join("\t"))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the sample to `path`, creating missing parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                fs::create_dir_all(dir)?;
            }
        }
        info!("Writing pixel values to {}", path.display());
        self.write_delimited(BufWriter::new(File::create(path)?))
    }
}

/// Sample the annotated pixels of `reference`.
///
/// `reference` and `mask` must share the same spatial extent and every
/// selected band must exist in `reference`. Fails with
/// [`Error::InsufficientSample`] when the mask marks `min_pixels` pixels or
/// fewer.
pub fn sample_reference_pixels(
    reference: &MultibandRaster<f64>,
    mask: &AnnotationMask,
    bands: &BandSelection,
    params: &SamplerParams,
) -> Result<PixelSample> {
    let (rows, cols) = reference.shape();
    let (mask_rows, mask_cols) = mask.shape();
    if (mask_rows, mask_cols) != (rows, cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: mask_rows,
            ac: mask_cols,
        });
    }
    bands.validate(reference.n_bands())?;

    let band_views = bands
        .indices()
        .iter()
        .map(|&b| reference.band(b))
        .collect::<Result<Vec<_>>>()?;

    let n = mask.count();
    let mut values = Array2::<f64>::zeros((bands.len(), n));
    let mut obs = 0;
    for ((row, col), _) in mask.cells().indexed_iter().filter(|&(_, &set)| set) {
        for (b, view) in band_views.iter().enumerate() {
            values[(b, obs)] = view[(row, col)];
        }
        obs += 1;
    }

    info!("Number of annotated pixels: {} (bands {})", n, bands);

    let sample = PixelSample {
        values,
        bands: bands.clone(),
    };
    sample.validate(params)?;
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(bands: usize, rows: usize, cols: usize) -> MultibandRaster<f64> {
        let mut img = MultibandRaster::new(bands, rows, cols);
        for b in 0..bands {
            for r in 0..rows {
                for c in 0..cols {
                    img.set(b, r, c, (100 * b + 10 * r + c) as f64).unwrap();
                }
            }
        }
        img
    }

    fn first_n_mask(rows: usize, cols: usize, n: usize) -> AnnotationMask {
        let cells = Array2::from_shape_fn((rows, cols), |(r, c)| r * cols + c < n);
        AnnotationMask::from_array(cells)
    }

    #[test]
    fn test_default_bands_drop_last() {
        let selection = BandSelection::resolve(None, 4).unwrap();
        assert_eq!(selection.indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_band_out_of_range() {
        assert!(matches!(
            BandSelection::resolve(Some(vec![0, 3]), 3),
            Err(Error::BandOutOfRange { index: 3, n_bands: 3 })
        ));
        assert!(BandSelection::resolve(None, 1).is_err(), "single band default is empty");
    }

    #[test]
    fn test_sample_order_and_bands() {
        let img = gradient_image(4, 12, 10);
        let mask = first_n_mask(12, 10, 110);
        let bands = BandSelection::new(vec![2, 0]);

        let sample =
            sample_reference_pixels(&img, &mask, &bands, &SamplerParams::default()).unwrap();
        assert_eq!(sample.n_bands(), 2);
        assert_eq!(sample.n_observations(), 110);
        // first column is pixel (0, 0), band 2 then band 0
        assert_eq!(sample.values()[(0, 0)], 200.0);
        assert_eq!(sample.values()[(1, 0)], 0.0);
        // column 13 is pixel (1, 3)
        assert_eq!(sample.values()[(1, 13)], 13.0);
    }

    #[test]
    fn test_minimum_sample_boundary() {
        let img = gradient_image(3, 12, 10);
        let bands = BandSelection::all_but_last(3);
        let params = SamplerParams::default();

        let exactly_100 = first_n_mask(12, 10, 100);
        assert!(matches!(
            sample_reference_pixels(&img, &exactly_100, &bands, &params),
            Err(Error::InsufficientSample { min: 100, got: 100 })
        ));

        let with_101 = first_n_mask(12, 10, 101);
        let sample = sample_reference_pixels(&img, &with_101, &bands, &params).unwrap();
        assert_eq!(sample.n_observations(), 101);
    }

    #[test]
    fn test_mask_extent_mismatch() {
        let img = gradient_image(3, 12, 10);
        let mask = first_n_mask(10, 10, 100);
        let result = sample_reference_pixels(
            &img,
            &mask,
            &BandSelection::all_but_last(3),
            &SamplerParams::default(),
        );
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_validate_wrapped_values() {
        let small = PixelSample::from_values(Array2::zeros((3, 100)), BandSelection::all_but_last(4)).unwrap();
        assert!(matches!(
            small.validate(&SamplerParams::default()),
            Err(Error::InsufficientSample { min: 100, got: 100 })
        ));
        assert!(small.validate(&SamplerParams { min_pixels: 99 }).is_ok());
    }

    #[test]
    fn test_write_delimited() {
        let values = ndarray::array![[1.0, 2.5], [3.0, 4.0]];
        let sample = PixelSample::from_values(values, BandSelection::new(vec![0, 1])).unwrap();
        let mut out = Vec::new();
        sample.write_delimited(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\t3\n2.5\t4\n");
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("pixels.csv");
        let values = ndarray::array![[1.0], [2.0]];
        let sample = PixelSample::from_values(values, BandSelection::new(vec![0, 1])).unwrap();

        sample.save_to_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\t2\n");
    }
}
