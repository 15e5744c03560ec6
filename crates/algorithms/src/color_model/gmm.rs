//! Gaussian mixture color model
//!
//! Models the reference color as a weighted sum of K multivariate normals
//! with full covariance, which captures reference colors made of several
//! distinct materials:
//!
//! ```text
//! p(x) = Σ_k w_k N(x | μ_k, Σ_k)
//! ```
//!
//! Parameters are fitted with expectation-maximization, started from a
//! deterministic k-means partition. Pixels are scored by `ln p(x)`, a
//! log-likelihood: higher means closer to the reference, and values are
//! usually negative.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use colordist_core::{Error, MultibandRaster, Raster, Result};
use std::f64::consts::PI;
use std::fmt;
use tracing::debug;

use super::linalg::{add_ridge, invert_spd, quadratic_form};
use super::{map_pixels, BandSelection, ColorModel, ModelState, PixelSample};

/// Parameters for the Gaussian mixture model
#[derive(Debug, Clone)]
pub struct GmmParams {
    /// Number of mixture components (K). Must be at least 1 and no more
    /// than the number of observations.
    pub components: usize,
    /// EM iteration budget (default: 100). Running out of iterations is an
    /// error, never a silently returned partial fit.
    pub max_iterations: usize,
    /// Convergence threshold on the change of the mean per-observation
    /// log-likelihood between iterations (default: 1e-3)
    pub tolerance: f64,
    /// Added to every component covariance diagonal (default: 1e-6) so that
    /// components collapsing onto a single color stay invertible
    pub regularization: f64,
    /// Iteration budget for the k-means initialization (default: 100)
    pub kmeans_iterations: usize,
}

impl GmmParams {
    /// Parameters for a `components`-component mixture with default fitting policy
    pub fn new(components: usize) -> Self {
        Self {
            components,
            max_iterations: 100,
            tolerance: 1e-3,
            regularization: 1e-6,
            kmeans_iterations: 100,
        }
    }
}

/// Fitted mixture parameters.
#[derive(Debug, Clone)]
pub struct MixtureParameters {
    /// Bands the sample was taken from
    pub bands: BandSelection,
    /// Component weights (length K, sum to 1)
    pub weights: Array1<f64>,
    /// Component means, one row per component (K × B)
    pub means: Array2<f64>,
    /// Component covariances (K matrices of B × B), regularization included
    pub covariances: Vec<Array2<f64>>,
    /// EM iterations used
    pub iterations: usize,
    /// Mean log-likelihood of the sample at convergence
    pub lower_bound: f64,
}

/// One component, prepared for evaluation: `ln w + ln N(x)` is
/// `log_norm - 0.5 * (x - μ)ᵀ P (x - μ)`.
#[derive(Debug, Clone)]
struct ComponentDensity {
    log_norm: f64,
    mean: Vec<f64>,
    precision: Array2<f64>,
}

impl ComponentDensity {
    #[inline]
    fn log_density(&self, x: &[f64], centered: &mut [f64]) -> f64 {
        for ((c, &v), &m) in centered.iter_mut().zip(x).zip(&self.mean) {
            *c = v - m;
        }
        self.log_norm - 0.5 * quadratic_form(&self.precision, centered)
    }
}

/// Invert every component covariance once.
fn prepare_components(
    weights: ArrayView1<'_, f64>,
    means: ArrayView2<'_, f64>,
    covariances: &[Array2<f64>],
) -> Result<Vec<ComponentDensity>> {
    let n_bands = means.ncols() as f64;
    let log_two_pi = (2.0 * PI).ln();

    weights
        .iter()
        .zip(means.rows())
        .zip(covariances)
        .map(|((&w, mean), cov)| {
            let inv = invert_spd(cov)?;
            Ok(ComponentDensity {
                log_norm: w.ln() - 0.5 * (n_bands * log_two_pi + inv.log_det),
                mean: mean.to_vec(),
                precision: inv.inverse,
            })
        })
        .collect()
}

/// `ln Σ exp(v)` without overflow
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Mixture log-likelihood of one pixel. `log_probs` has one slot per component.
#[inline]
fn mixture_log_likelihood(
    components: &[ComponentDensity],
    x: &[f64],
    centered: &mut [f64],
    log_probs: &mut [f64],
) -> f64 {
    if x.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    for (lp, comp) in log_probs.iter_mut().zip(components) {
        *lp = comp.log_density(x, centered);
    }
    log_sum_exp(log_probs)
}

impl MixtureParameters {
    /// Number of components (K)
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Mixture log-likelihood of one band vector.
    ///
    /// Inverts every covariance on each call; use
    /// [`GaussianMixtureModel::score`] for whole images.
    pub fn log_likelihood(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.means.ncols() {
            return Err(Error::InvalidParameter {
                name: "x",
                value: format!("{} values", x.len()),
                reason: format!("model has {} bands", self.means.ncols()),
            });
        }
        let components = prepare_components(self.weights.view(), self.means.view(), &self.covariances)?;
        let mut centered = vec![0.0; x.len()];
        let mut log_probs = vec![0.0; components.len()];
        Ok(mixture_log_likelihood(&components, x, &mut centered, &mut log_probs))
    }
}

impl fmt::Display for MixtureParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "GMM: {} components, full covariance, bands {}, {} EM iterations, mean log-likelihood {:.4}",
            self.n_components(),
            self.bands,
            self.iterations,
            self.lower_bound
        )?;
        for (k, cov) in self.covariances.iter().enumerate() {
            writeln!(f, "Component {} (weight {:.4})", k, self.weights[k])?;
            writeln!(f, "mean {:.4}", self.means.row(k))?;
            writeln!(f, "covariance")?;
            writeln!(f, "{:.4}", cov)?;
        }
        Ok(())
    }
}

/// Convert a log-likelihood map to a density map (`exp` of every cell).
///
/// Kept separate from scoring: the model itself always returns raw
/// log-likelihoods.
pub fn likelihood_to_density(log_likelihood: &Raster<f64>) -> Raster<f64> {
    let mut density = log_likelihood.clone();
    density.data_mut().mapv_inplace(f64::exp);
    density
}

/// Gaussian mixture color model scored by log-likelihood.
#[derive(Debug, Clone)]
pub struct GaussianMixtureModel {
    params: GmmParams,
    fitted: Option<MixtureParameters>,
}

impl GaussianMixtureModel {
    /// Create an unfitted mixture model. Zero components is a configuration error.
    pub fn new(params: GmmParams) -> Result<Self> {
        if params.components == 0 {
            return Err(Error::InvalidComponentCount {
                components: 0,
                observations: 0,
            });
        }
        if !params.regularization.is_finite() || params.regularization < 0.0 {
            return Err(Error::InvalidParameter {
                name: "regularization",
                value: params.regularization.to_string(),
                reason: "must be a finite, non-negative number".into(),
            });
        }
        if params.tolerance.is_nan() || params.tolerance <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "tolerance",
                value: params.tolerance.to_string(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            params,
            fitted: None,
        })
    }

    /// Fitted parameters, if any
    pub fn parameters(&self) -> Option<&MixtureParameters> {
        self.fitted.as_ref()
    }
}

impl ColorModel for GaussianMixtureModel {
    fn name(&self) -> &'static str {
        "Gaussian mixture"
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
        let fitted = fit_em(sample, &self.params)?;
        debug!("Fitted Gaussian mixture\n{}", fitted);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn score(&self, image: &MultibandRaster<f64>) -> Result<Raster<f64>> {
        let fitted = self.fitted.as_ref().ok_or(Error::NotFitted)?;

        // one inversion per component per call
        let components =
            prepare_components(fitted.weights.view(), fitted.means.view(), &fitted.covariances)?;

        map_pixels(image, &fitted.bands, |pixel, centered| {
            let mut log_probs = [0.0_f64; 8];
            if components.len() <= log_probs.len() {
                mixture_log_likelihood(&components, pixel, centered, &mut log_probs[..components.len()])
            } else {
                let mut log_probs = vec![0.0; components.len()];
                mixture_log_likelihood(&components, pixel, centered, &mut log_probs)
            }
        })
    }

    fn summary(&self) -> Option<String> {
        self.fitted.as_ref().map(|p| p.to_string())
    }
}

// ─── EM ─────────────────────────────────────────────────────────────────

/// Current mixture estimate during EM
struct Estimate {
    weights: Array1<f64>,
    means: Array2<f64>,
    covariances: Vec<Array2<f64>>,
}

fn fit_em(sample: &PixelSample, params: &GmmParams) -> Result<MixtureParameters> {
    let k = params.components;
    let n = sample.n_observations();
    if k == 0 || k > n {
        return Err(Error::InvalidComponentCount {
            components: k,
            observations: n,
        });
    }

    // observations as rows (N × B)
    let x = sample.values().t();

    let labels = kmeans_labels(x, k, params.kmeans_iterations);
    let mut resp = Array2::<f64>::zeros((n, k));
    for (i, &label) in labels.iter().enumerate() {
        resp[(i, label)] = 1.0;
    }

    let mut estimate = m_step(x, &resp, params.regularization);
    let mut lower_bound = f64::NEG_INFINITY;
    let mut change = f64::INFINITY;

    for iteration in 1..=params.max_iterations {
        let previous = lower_bound;
        lower_bound = e_step(x, &estimate, &mut resp)?;
        estimate = m_step(x, &resp, params.regularization);

        change = lower_bound - previous;
        debug!("EM iteration {}: mean log-likelihood {:.6} (change {:e})", iteration, lower_bound, change);

        if change.abs() < params.tolerance {
            return Ok(MixtureParameters {
                bands: sample.bands().clone(),
                weights: estimate.weights,
                means: estimate.means,
                covariances: estimate.covariances,
                iterations: iteration,
                lower_bound,
            });
        }
    }

    Err(Error::NonConvergence {
        iterations: params.max_iterations,
        change,
    })
}

/// Expectation: fill `resp` with component responsibilities and return the
/// mean log-likelihood of the observations.
fn e_step(x: ArrayView2<'_, f64>, estimate: &Estimate, resp: &mut Array2<f64>) -> Result<f64> {
    let components = prepare_components(estimate.weights.view(), estimate.means.view(), &estimate.covariances)?;
    let n = x.nrows();
    let mut centered = vec![0.0; x.ncols()];
    let mut log_probs = vec![0.0; components.len()];
    let mut total = 0.0;

    for (i, obs) in x.rows().into_iter().enumerate() {
        let obs = obs.to_vec();
        for (lp, comp) in log_probs.iter_mut().zip(&components) {
            *lp = comp.log_density(&obs, &mut centered);
        }
        let norm = log_sum_exp(&log_probs);
        total += norm;
        for (j, lp) in log_probs.iter().enumerate() {
            resp[(i, j)] = (lp - norm).exp();
        }
    }

    let mean = total / n as f64;
    if !mean.is_finite() {
        return Err(Error::SingularCovariance(
            "mixture log-likelihood is not finite".into(),
        ));
    }
    Ok(mean)
}

/// Maximization: weights, means and covariances from responsibilities.
fn m_step(x: ArrayView2<'_, f64>, resp: &Array2<f64>, regularization: f64) -> Estimate {
    let (n, n_bands) = x.dim();
    let k = resp.ncols();

    // the epsilon keeps empty components from dividing by zero
    let nk: Array1<f64> = resp.sum_axis(ndarray::Axis(0)) + 10.0 * f64::EPSILON;
    let means = resp.t().dot(&x) / &nk.view().insert_axis(ndarray::Axis(1));

    let mut covariances = Vec::with_capacity(k);
    let mut centered = vec![0.0; n_bands];
    for j in 0..k {
        let mut cov = Array2::<f64>::zeros((n_bands, n_bands));
        for (i, obs) in x.rows().into_iter().enumerate() {
            let r = resp[(i, j)];
            if r == 0.0 {
                continue;
            }
            for b in 0..n_bands {
                centered[b] = obs[b] - means[(j, b)];
            }
            for a in 0..n_bands {
                let ra = r * centered[a];
                for b in a..n_bands {
                    cov[(a, b)] += ra * centered[b];
                }
            }
        }
        for a in 0..n_bands {
            for b in a..n_bands {
                cov[(a, b)] /= nk[j];
                cov[(b, a)] = cov[(a, b)];
            }
        }
        add_ridge(&mut cov, regularization);
        covariances.push(cov);
    }

    Estimate {
        weights: &nk / n as f64,
        means,
        covariances,
    }
}

/// Hard k-means partition used to seed EM.
///
/// Initial centroids are observations at evenly spaced quantiles of the
/// per-observation band sum, so the result is deterministic.
fn kmeans_labels(x: ArrayView2<'_, f64>, k: usize, max_iterations: usize) -> Vec<usize> {
    const CONVERGENCE: f64 = 1e-3;

    let (n, n_bands) = x.dim();
    let mut order: Vec<usize> = (0..n).collect();
    let sums: Vec<f64> = x.rows().into_iter().map(|r| r.sum()).collect();
    order.sort_by(|&a, &b| sums[a].partial_cmp(&sums[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut centroids = Array2::<f64>::zeros((k, n_bands));
    for c in 0..k {
        let idx = ((c * n / k) + n / (2 * k)).min(n - 1);
        centroids.row_mut(c).assign(&x.row(order[idx]));
    }

    let mut labels = vec![0usize; n];
    for _ in 0..max_iterations {
        // assignment
        for (label, obs) in labels.iter_mut().zip(x.rows()) {
            let mut best = f64::INFINITY;
            for (c, centroid) in centroids.rows().into_iter().enumerate() {
                let dist: f64 = obs
                    .iter()
                    .zip(centroid.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                if dist < best {
                    best = dist;
                    *label = c;
                }
            }
        }

        // update
        let mut totals = Array2::<f64>::zeros((k, n_bands));
        let mut counts = vec![0usize; k];
        for (&label, obs) in labels.iter().zip(x.rows()) {
            let mut row = totals.row_mut(label);
            row += &obs;
            counts[label] += 1;
        }

        let mut max_shift = 0.0_f64;
        for c in 0..k {
            if counts[c] == 0 {
                continue; // keep empty cluster centroid
            }
            let mut row = totals.row_mut(c);
            row /= counts[c] as f64;
            let shift = row
                .iter()
                .zip(centroids.row(c).iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            max_shift = max_shift.max(shift);
            centroids.row_mut(c).assign(&row);
        }

        if max_shift < CONVERGENCE {
            break;
        }
    }
    labels
}
