//! # colordist algorithms
//!
//! Reference color models for multiband imagery.
//!
//! Fit a model on the pixels of a reference image marked by an annotation
//! image, then turn any image into a per-pixel distance map:
//!
//! - **Mahalanobis**: distance to a single Gaussian (0 at the reference mean)
//! - **Gaussian mixture**: log-likelihood under a K-component mixture
//!
//! ```no_run
//! use colordist_algorithms::prelude::*;
//! use colordist_core::io::read_multiband_geotiff;
//!
//! # fn main() -> colordist_core::Result<()> {
//! let reference = read_multiband_geotiff::<f64, _>("reference.tif")?;
//! let annotation = read_multiband_geotiff::<f64, _>("annotated.tif")?;
//!
//! let mut pipeline = ScoringPipeline::new(&ModelKind::Mahalanobis(MahalanobisParams::default()))?;
//! pipeline.fit(&reference, &annotation, None)?;
//! let distance = pipeline.score(&reference)?;
//! # Ok(())
//! # }
//! ```

pub mod color_model;
pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::color_model::{
        likelihood_to_density, sample_reference_pixels, AnnotationMask, BandSelection,
        ColorModel, GaussianMixtureModel, GmmParams, MahalanobisModel, MahalanobisParams,
        MaskRule, MixtureParameters, ModelKind, ModelState, PixelSample, SamplerParams,
        ScoringPipeline, UnimodalGaussianParameters,
    };
    pub use colordist_core::prelude::*;
}
