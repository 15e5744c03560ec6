//! Reference color models
//!
//! Fit a statistical model of a color from a set of annotated reference
//! pixels, then score every pixel of an image by how well it matches:
//! - **Mahalanobis**: single multivariate normal, scored by distance to the mean
//! - **Gaussian mixture**: K full-covariance normals fitted with EM, scored
//!   by log-likelihood
//!
//! Both work on any number of bands, not just RGB.
//!
//! The flow is one way:
//! annotation image → [`AnnotationMask`] → [`PixelSample`] → fitted model → distance map.

mod gmm;
mod linalg;
mod mahalanobis;
mod mask;
mod pipeline;
mod reference;

pub use gmm::{likelihood_to_density, GaussianMixtureModel, GmmParams, MixtureParameters};
pub use mahalanobis::{MahalanobisModel, MahalanobisParams, UnimodalGaussianParameters};
pub use mask::{AnnotationMask, MaskRule};
pub use pipeline::{ModelKind, ScoringPipeline};
pub use reference::{sample_reference_pixels, BandSelection, PixelSample, SamplerParams};

use crate::maybe_rayon::*;
use colordist_core::{MultibandRaster, Raster, Result};
use ndarray::ArrayView2;
use std::fmt;

/// Lifecycle of a color model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Constructed, `fit` not yet called
    Uninitialized,
    /// Parameters estimated; `score` may be called any number of times
    Fitted,
}

/// Common contract of the color model variants.
///
/// `fit` may succeed at most once per instance; a second call fails with
/// [`colordist_core::Error::AlreadyFitted`]. `score` before a successful
/// `fit` fails with [`colordist_core::Error::NotFitted`]. Scoring does not
/// mutate the model, so a fitted model can be shared across threads.
pub trait ColorModel: fmt::Debug + Send + Sync {
    /// Short model name for reports
    fn name(&self) -> &'static str;

    fn state(&self) -> ModelState;

    fn is_fitted(&self) -> bool {
        self.state() == ModelState::Fitted
    }

    /// Estimate the model parameters from a reference sample.
    fn fit(&mut self, sample: &PixelSample) -> Result<()>;

    /// Score every pixel of `image`, selecting the same bands the sample was
    /// taken with. The output has the image's extent and geotransform.
    fn score(&self, image: &MultibandRaster<f64>) -> Result<Raster<f64>>;

    /// Human-readable description of the fitted parameters
    fn summary(&self) -> Option<String>;
}

/// Apply `f` to every pixel of `image` restricted to `bands`.
///
/// `f` receives the pixel's selected band values plus a scratch buffer of
/// the same length. Rows are processed in parallel when the `parallel`
/// feature is on. NaN inputs flow through `f` unchanged, so nodata pixels
/// come out as NaN.
pub(crate) fn map_pixels<F>(
    image: &MultibandRaster<f64>,
    bands: &BandSelection,
    f: F,
) -> Result<Raster<f64>>
where
    F: Fn(&[f64], &mut [f64]) -> f64 + Sync + Send,
{
    bands.validate(image.n_bands())?;

    let (rows, cols) = image.shape();
    let n_bands = bands.len();
    let views: Vec<ArrayView2<'_, f64>> = bands
        .indices()
        .iter()
        .map(|&b| image.band(b))
        .collect::<Result<_>>()?;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut pixel = vec![0.0; n_bands];
            let mut scratch = vec![0.0; n_bands];
            for (col, out) in row_data.iter_mut().enumerate() {
                for (value, view) in pixel.iter_mut().zip(views.iter()) {
                    *value = view[(row, col)];
                }
                *out = f(&pixel, &mut scratch);
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_transform(*image.transform());
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colordist_core::{Error, GeoTransform};

    #[test]
    fn test_map_pixels_selects_bands_in_order() {
        let mut img: MultibandRaster<f64> = MultibandRaster::new(3, 2, 2);
        for r in 0..2 {
            for c in 0..2 {
                img.set(0, r, c, 1.0).unwrap();
                img.set(2, r, c, (r * 2 + c) as f64).unwrap();
            }
        }
        img.set_transform(GeoTransform::new(5.0, 5.0, 1.0, -1.0));

        let bands = BandSelection::new(vec![2, 0]);
        let out = map_pixels(&img, &bands, |px, _| px[0] * 10.0 + px[1]).unwrap();

        assert_eq!(out.shape(), (2, 2));
        assert_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_eq!(out.get(1, 1).unwrap(), 31.0);
        assert_eq!(*out.transform(), GeoTransform::new(5.0, 5.0, 1.0, -1.0));
    }

    #[test]
    fn test_map_pixels_rejects_missing_band() {
        let img: MultibandRaster<f64> = MultibandRaster::new(2, 2, 2);
        let bands = BandSelection::new(vec![0, 2]);
        assert!(matches!(
            map_pixels(&img, &bands, |_, _| 0.0),
            Err(Error::BandOutOfRange { index: 2, n_bands: 2 })
        ));
    }
}
