//! Unimodal Gaussian color model
//!
//! Models the reference color as one multivariate normal distribution and
//! scores pixels by their Mahalanobis distance to its mean:
//!
//! ```text
//! d(x) = sqrt((x - μ)ᵀ Σ⁻¹ (x - μ))
//! ```

use ndarray::{Array1, Array2};
use colordist_core::{Error, MultibandRaster, Raster, Result};
use std::fmt;
use tracing::debug;

use super::linalg::{add_ridge, covariance, invert_spd, mean, quadratic_form};
use super::{map_pixels, BandSelection, ColorModel, ModelState, PixelSample};

/// Parameters for the Mahalanobis model
#[derive(Debug, Clone)]
pub struct MahalanobisParams {
    /// Ridge term added to the covariance diagonal before inversion
    /// (default: 0.0).
    ///
    /// With the default, a singular covariance (constant reference color,
    /// perfectly correlated bands) makes scoring fail with
    /// [`Error::SingularCovariance`]. A small positive value such as `1e-6`
    /// makes such samples usable, at the cost of distances that scale with
    /// `1 / sqrt(regularization)` along the degenerate directions.
    pub regularization: f64,
}

impl Default for MahalanobisParams {
    fn default() -> Self {
        Self { regularization: 0.0 }
    }
}

/// Fitted mean and covariance of the reference sample.
#[derive(Debug, Clone)]
pub struct UnimodalGaussianParameters {
    /// Bands the sample was taken from
    pub bands: BandSelection,
    /// Per-band mean (length B)
    pub mean: Array1<f64>,
    /// Unbiased sample covariance (B × B), without regularization
    pub covariance: Array2<f64>,
    /// Ridge added before inversion
    pub regularization: f64,
}

impl UnimodalGaussianParameters {
    /// Estimate mean and covariance from a sample.
    pub fn estimate(sample: &PixelSample, regularization: f64) -> Self {
        let values = sample.values().view();
        let mean = mean(values);
        let covariance = covariance(values, &mean);
        Self {
            bands: sample.bands().clone(),
            mean,
            covariance,
            regularization,
        }
    }

    /// Inverse of the regularized covariance
    pub fn precision(&self) -> Result<Array2<f64>> {
        let mut cov = self.covariance.clone();
        add_ridge(&mut cov, self.regularization);
        Ok(invert_spd(&cov)?.inverse)
    }

    /// Mahalanobis distance of one band vector.
    ///
    /// Inverts the covariance on every call; use [`MahalanobisModel::score`]
    /// for whole images.
    pub fn distance(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.mean.len() {
            return Err(Error::InvalidParameter {
                name: "x",
                value: format!("{} values", x.len()),
                reason: format!("model has {} bands", self.mean.len()),
            });
        }
        let precision = self.precision()?;
        let mean = self.mean.to_vec();
        let mut centered = vec![0.0; x.len()];
        Ok(centered_distance(&precision, &mean, x, &mut centered))
    }
}

/// Distance of `x` from `mean`; `centered` is scratch space of the same length.
#[inline]
fn centered_distance(precision: &Array2<f64>, mean: &[f64], x: &[f64], centered: &mut [f64]) -> f64 {
    for ((c, &v), &m) in centered.iter_mut().zip(x).zip(mean) {
        *c = v - m;
    }
    let q = quadratic_form(precision, centered);
    // rounding can push q slightly below zero near the mean; NaN passes through
    if q < 0.0 {
        0.0
    } else {
        q.sqrt()
    }
}

impl fmt::Display for UnimodalGaussianParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bands: {}", self.bands)?;
        writeln!(f, "Average color value of annotated pixels")?;
        writeln!(f, "{:.4}", self.mean)?;
        writeln!(f, "Covariance matrix of the annotated pixels")?;
        write!(f, "{:.4}", self.covariance)
    }
}

/// Single multivariate normal color model scored by Mahalanobis distance.
///
/// Output values are non-negative, 0 exactly at the reference mean.
///
/// # Example
/// ```ignore
/// let mut model = MahalanobisModel::new(MahalanobisParams::default());
/// model.fit(&sample)?;
/// let distance = model.score(&image)?;
/// ```
#[derive(Debug, Clone)]
pub struct MahalanobisModel {
    params: MahalanobisParams,
    fitted: Option<UnimodalGaussianParameters>,
}

impl MahalanobisModel {
    pub fn new(params: MahalanobisParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Fitted parameters, if any
    pub fn parameters(&self) -> Option<&UnimodalGaussianParameters> {
        self.fitted.as_ref()
    }
}

impl Default for MahalanobisModel {
    fn default() -> Self {
        Self::new(MahalanobisParams::default())
    }
}

impl ColorModel for MahalanobisModel {
    fn name(&self) -> &'static str {
        "Mahalanobis"
    }

    fn state(&self) -> ModelState {
        if self.fitted.is_some() {
            ModelState::Fitted
        } else {
            ModelState::Uninitialized
        }
    }

    fn fit(&mut self, sample: &PixelSample) -> Result<()> {
        if self.fitted.is_some() {
            return Err(Error::AlreadyFitted);
        }
        let ridge = self.params.regularization;
        if !ridge.is_finite() || ridge < 0.0 {
            return Err(Error::InvalidParameter {
                name: "regularization",
                value: ridge.to_string(),
                reason: "must be a finite, non-negative number".into(),
            });
        }

        let fitted = UnimodalGaussianParameters::estimate(sample, ridge);
        debug!("Fitted Mahalanobis model\n{}", fitted);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn score(&self, image: &MultibandRaster<f64>) -> Result<Raster<f64>> {
        let fitted = self.fitted.as_ref().ok_or(Error::NotFitted)?;

        // one inversion per call, shared by every pixel
        let precision = fitted.precision()?;
        let mean = fitted.mean.to_vec();

        map_pixels(image, &fitted.bands, |pixel, centered| {
            centered_distance(&precision, &mean, pixel, centered)
        })
    }

    fn summary(&self) -> Option<String> {
        self.fitted.as_ref().map(|p| p.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    /// 5x5x5 lattice around (12, 22, 32): uncorrelated bands, equal variance.
    fn lattice_sample() -> PixelSample {
        let values = Array2::from_shape_fn((3, 125), |(b, i)| {
            let offset = match b {
                0 => i % 5,
                1 => (i / 5) % 5,
                _ => i / 25,
            };
            10.0 * (b + 1) as f64 + offset as f64
        });
        PixelSample::from_values(values, BandSelection::new(vec![0, 1, 2])).unwrap()
    }

    fn image_from_pixels(pixels: &[[f64; 3]]) -> MultibandRaster<f64> {
        let mut data = Array3::zeros((3, 1, pixels.len()));
        for (col, px) in pixels.iter().enumerate() {
            for band in 0..3 {
                data[(band, 0, col)] = px[band];
            }
        }
        MultibandRaster::from_array(data)
    }

    #[test]
    fn test_fit_mean_and_covariance() {
        let mut model = MahalanobisModel::default();
        model.fit(&lattice_sample()).unwrap();
        let p = model.parameters().unwrap();

        assert_relative_eq!(p.mean[0], 12.0, epsilon = 1e-12);
        assert_relative_eq!(p.mean[1], 22.0, epsilon = 1e-12);
        assert_relative_eq!(p.mean[2], 32.0, epsilon = 1e-12);

        // each offset takes 0..4 equally often: sum of squares 25 * 10 over 124
        let variance = 250.0 / 124.0;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { variance } else { 0.0 };
                assert_relative_eq!(p.covariance[(i, j)], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_distance_zero_at_mean_and_known_values() {
        let mut model = MahalanobisModel::default();
        model.fit(&lattice_sample()).unwrap();
        let sigma = (250.0_f64 / 124.0).sqrt();

        let img = image_from_pixels(&[[12.0, 22.0, 32.0], [12.0 + sigma, 22.0, 32.0], [12.0, 22.0 - 3.0 * sigma, 32.0]]);
        let out = model.score(&img).unwrap();

        assert_relative_eq!(out.get(0, 0).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(0, 1).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.get(0, 2).unwrap(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_is_non_negative_and_order_invariant() {
        let sample = lattice_sample();
        let reversed = {
            let mut v = sample.values().clone();
            v.invert_axis(ndarray::Axis(1));
            PixelSample::from_values(v, sample.bands().clone()).unwrap()
        };

        let mut a = MahalanobisModel::default();
        let mut b = MahalanobisModel::default();
        a.fit(&sample).unwrap();
        b.fit(&reversed).unwrap();

        let img = image_from_pixels(&[[0.0, 0.0, 0.0], [255.0, 3.0, 77.0], [12.5, 21.0, 33.0], [-40.0, 1e4, 5.0]]);
        let da = a.score(&img).unwrap();
        let db = b.score(&img).unwrap();
        for col in 0..4 {
            let va = da.get(0, col).unwrap();
            assert!(va >= 0.0);
            assert_relative_eq!(va, db.get(0, col).unwrap(), max_relative = 1e-10);
        }
    }

    #[test]
    fn test_correlated_bands() {
        // band 1 = 2 * band 0 + small structured noise
        let values = Array2::from_shape_fn((2, 200), |(b, i)| {
            let x = (i % 20) as f64;
            if b == 0 { x } else { 2.0 * x + ((i / 20) as f64 - 4.5) * 0.1 }
        });
        let sample = PixelSample::from_values(values, BandSelection::new(vec![0, 1])).unwrap();
        let mut model = MahalanobisModel::default();
        model.fit(&sample).unwrap();
        let p = model.parameters().unwrap();

        // moving along the correlation is much closer than moving across it
        let along = p.distance(&[p.mean[0] + 2.0, p.mean[1] + 4.0]).unwrap();
        let across = p.distance(&[p.mean[0] + 2.0, p.mean[1] - 4.0]).unwrap();
        assert!(along < across / 10.0, "along={along}, across={across}");
    }

    #[test]
    fn test_singular_covariance_fails_at_score() {
        let values = Array2::from_elem((3, 150), 10.0);
        let sample = PixelSample::from_values(values, BandSelection::new(vec![0, 1, 2])).unwrap();
        let mut model = MahalanobisModel::default();
        model.fit(&sample).unwrap();

        let img = image_from_pixels(&[[10.0, 10.0, 10.0]]);
        assert!(matches!(model.score(&img), Err(Error::SingularCovariance(_))));
    }

    #[test]
    fn test_single_band() {
        let values = Array2::from_shape_fn((1, 101), |(_, i)| i as f64);
        let sample = PixelSample::from_values(values, BandSelection::new(vec![1])).unwrap();
        let mut model = MahalanobisModel::default();
        model.fit(&sample).unwrap();
        let p = model.parameters().unwrap();
        assert_relative_eq!(p.mean[0], 50.0);

        let sd = p.covariance[(0, 0)].sqrt();
        let mut img: MultibandRaster<f64> = MultibandRaster::new(2, 1, 1);
        img.set(1, 0, 0, 50.0 + 2.0 * sd).unwrap();
        let out = model.score(&img).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nan_pixels_stay_nan() {
        let mut model = MahalanobisModel::default();
        model.fit(&lattice_sample()).unwrap();
        let img = image_from_pixels(&[[f64::NAN, 22.0, 32.0]]);
        assert!(model.score(&img).unwrap().get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_lifecycle() {
        let mut model = MahalanobisModel::default();
        assert_eq!(model.state(), ModelState::Uninitialized);
        assert!(model.summary().is_none());
        let img = image_from_pixels(&[[0.0, 0.0, 0.0]]);
        assert!(matches!(model.score(&img), Err(Error::NotFitted)));

        model.fit(&lattice_sample()).unwrap();
        assert!(model.is_fitted());
        assert!(model.summary().unwrap().contains("Covariance matrix"));
        assert!(matches!(model.fit(&lattice_sample()), Err(Error::AlreadyFitted)));
    }

    #[test]
    fn test_negative_regularization_rejected() {
        let mut model = MahalanobisModel::new(MahalanobisParams { regularization: -1.0 });
        assert!(matches!(
            model.fit(&lattice_sample()),
            Err(Error::InvalidParameter { name: "regularization", .. })
        ));
        assert!(!model.is_fitted());
    }
}
