//! End-to-end scoring pipeline
//!
//! Wires mask derivation, reference sampling and a color model together:
//! reference + annotation images in, fitted model out, then score any
//! number of images with it.

use colordist_core::{MultibandRaster, Raster, Result};
use std::fmt;
use tracing::info;

use super::{
    sample_reference_pixels, AnnotationMask, BandSelection, ColorModel, GaussianMixtureModel,
    GmmParams, MahalanobisModel, MahalanobisParams, MaskRule, PixelSample, SamplerParams,
};

/// Which color model to fit, with its parameters.
#[derive(Debug, Clone)]
pub enum ModelKind {
    /// Single Gaussian scored by Mahalanobis distance
    Mahalanobis(MahalanobisParams),
    /// Gaussian mixture scored by log-likelihood
    GaussianMixture(GmmParams),
}

impl ModelKind {
    /// Construct an unfitted model of this kind.
    pub fn build(&self) -> Result<Box<dyn ColorModel>> {
        Ok(match self {
            ModelKind::Mahalanobis(params) => Box::new(MahalanobisModel::new(params.clone())),
            ModelKind::GaussianMixture(params) => Box::new(GaussianMixtureModel::new(params.clone())?),
        })
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Mahalanobis(p) => write!(f, "Mahalanobis (regularization {})", p.regularization),
            ModelKind::GaussianMixture(p) => write!(f, "Gaussian mixture ({} components)", p.components),
        }
    }
}

/// Reference sampling plus one color model.
#[derive(Debug)]
pub struct ScoringPipeline {
    model: Box<dyn ColorModel>,
    mask_rule: MaskRule,
    sampler: SamplerParams,
}

impl ScoringPipeline {
    /// Pipeline with an unfitted model of `kind` and default mask/sampling rules
    pub fn new(kind: &ModelKind) -> Result<Self> {
        Ok(Self::with_model(kind.build()?))
    }

    /// Pipeline around an existing (unfitted) model
    pub fn with_model(model: Box<dyn ColorModel>) -> Self {
        Self {
            model,
            mask_rule: MaskRule::default(),
            sampler: SamplerParams::default(),
        }
    }

    pub fn with_mask_rule(mut self, rule: MaskRule) -> Self {
        self.mask_rule = rule;
        self
    }

    pub fn with_sampler_params(mut self, params: SamplerParams) -> Self {
        self.sampler = params;
        self
    }

    /// Derive the mask from `annotation` and sample `reference` under it.
    ///
    /// `bands` defaults to every band of `reference` except the last.
    pub fn sample(
        &self,
        reference: &MultibandRaster<f64>,
        annotation: &MultibandRaster<f64>,
        bands: Option<Vec<usize>>,
    ) -> Result<PixelSample> {
        let bands = BandSelection::resolve(bands, reference.n_bands())?;
        let mask = AnnotationMask::from_annotation(annotation, &self.mask_rule)?;
        sample_reference_pixels(reference, &mask, &bands, &self.sampler)
    }

    /// Sample the reference and fit the model. Returns the sample so the
    /// caller can inspect or save it.
    pub fn fit(
        &mut self,
        reference: &MultibandRaster<f64>,
        annotation: &MultibandRaster<f64>,
        bands: Option<Vec<usize>>,
    ) -> Result<PixelSample> {
        let sample = self.sample(reference, annotation, bands)?;
        self.fit_sample(&sample)?;
        Ok(sample)
    }

    /// Fit the model on an already collected sample. The sample must pass
    /// the pipeline's minimum size check.
    pub fn fit_sample(&mut self, sample: &PixelSample) -> Result<()> {
        sample.validate(&self.sampler)?;
        info!(
            "Fitting {} model on {} pixels, bands {}",
            self.model.name(),
            sample.n_observations(),
            sample.bands()
        );
        self.model.fit(sample)?;
        if let Some(summary) = self.model.summary() {
            info!("{}", summary);
        }
        Ok(())
    }

    /// Score every pixel of `image` with the fitted model.
    pub fn score(&self, image: &MultibandRaster<f64>) -> Result<Raster<f64>> {
        self.model.score(image)
    }

    pub fn model(&self) -> &dyn ColorModel {
        self.model.as_ref()
    }
}
