//! Bayesian linear regression by Gibbs sampling.
//!
//! ```text
//! y = Xβ + ε,   ε ~ N(0, σ²)
//! β_k ~ N(m_k, s_k²)           independent
//! σ²  ~ InvGamma(a, b)
//! ```
//!
//! Both full conditionals are closed form, so each sweep draws
//!
//! ```text
//! β | σ², y ~ N(Q⁻¹(S₀⁻¹m + Xᵀy/σ²), Q⁻¹)     Q = S₀⁻¹ + XᵀX/σ²
//! σ² | β, y ~ InvGamma(a + n/2, b + ‖y − Xβ‖²/2)
//! ```
//!
//! Chains share one base seed; chain `c` uses the generator advanced by `c`
//! xoshiro jumps, so runs are reproducible and chains never overlap.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::observation::{ObservationTable, Predictors};
use super::ols::design_matrix;
use super::quantile::{mad_sd, mean, quantiles, std_dev};
use super::summarize::{DrawMatrix, QuantileBounds};
use super::{cholesky, FitError};

// ---------------------------------------------------------------------------
// Priors
// ---------------------------------------------------------------------------

/// Shape of the default InvGamma prior on σ².
const SIGMA2_PRIOR_WEIGHT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalPrior {
    pub mean: f64,
    pub sd: f64,
}

/// Independent normal priors on the coefficients (intercept first) and an
/// inverse-gamma prior on the residual variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    pub coefficients: Vec<NormalPrior>,
    pub sigma2_shape: f64,
    pub sigma2_scale: f64,
}

impl Prior {
    pub fn new(
        coefficients: Vec<NormalPrior>,
        sigma2_shape: f64,
        sigma2_scale: f64,
    ) -> Result<Self, FitError> {
        if let Some(bad) = coefficients
            .iter()
            .find(|c| !(c.sd > 0.0 && c.sd.is_finite() && c.mean.is_finite()))
        {
            return Err(FitError::InvalidPrior(format!(
                "coefficient prior N({}, {}) needs a finite mean and positive sd",
                bad.mean, bad.sd
            )));
        }
        if !(sigma2_shape > 0.0 && sigma2_scale > 0.0) {
            return Err(FitError::InvalidPrior(format!(
                "InvGamma({sigma2_shape}, {sigma2_scale}) needs positive shape and scale"
            )));
        }
        Ok(Self {
            coefficients,
            sigma2_shape,
            sigma2_scale,
        })
    }

    /// Weakly informative priors scaled to the data:
    /// intercept `N(ȳ, (10·sd y)²)`, slope k `N(0, (2.5·sd y / sd x_k)²)`,
    /// `σ² ~ InvGamma(ε, ε·var y)` with `ε = 0.01`, worth about one
    /// fiftieth of an observation so residuals dominate the σ posterior.
    pub fn weakly_informative(design_rows: &[Vec<f64>], y: &[f64]) -> Result<Self, FitError> {
        let (Some(y_mean), Some(y_sd)) = (mean(y), std_dev(y)) else {
            return Err(FitError::TooFewObservations {
                n: y.len(),
                p: design_rows.first().map_or(1, Vec::len),
            });
        };
        if y_sd <= 0.0 {
            return Err(FitError::InvalidPrior(
                "response has zero variance".to_string(),
            ));
        }

        let p = design_rows.first().map_or(1, Vec::len);
        let mut coefficients = vec![NormalPrior {
            mean: y_mean,
            sd: 10.0 * y_sd,
        }];
        for k in 1..p {
            let column: Vec<f64> = design_rows.iter().map(|r| r[k]).collect();
            let x_sd = std_dev(&column).unwrap_or(0.0);
            if x_sd <= 0.0 {
                return Err(FitError::Singular);
            }
            coefficients.push(NormalPrior {
                mean: 0.0,
                sd: 2.5 * y_sd / x_sd,
            });
        }
        Self::new(coefficients, SIGMA2_PRIOR_WEIGHT, SIGMA2_PRIOR_WEIGHT * y_sd * y_sd)
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Upper limits on sampler work accepted by [`SamplerSettings::validate`].
pub const MAX_TOTAL_DRAWS: usize = 10_000_000;
pub const MAX_TOTAL_SWEEPS: usize = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerSettings {
    pub chains: usize,
    pub warmup: usize,
    pub draws_per_chain: usize,
    pub seed: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            chains: 4,
            warmup: 1000,
            draws_per_chain: 1000,
            seed: 2024,
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.chains == 0 || self.draws_per_chain == 0 {
            return Err(FitError::InvalidSampler(format!(
                "need at least one chain and one draw per chain, got {} x {}",
                self.chains, self.draws_per_chain
            )));
        }
        let retained = self
            .chains
            .checked_mul(self.draws_per_chain)
            .filter(|&n| n <= MAX_TOTAL_DRAWS);
        let sweeps = self
            .warmup
            .checked_add(self.draws_per_chain)
            .and_then(|n| n.checked_mul(self.chains))
            .filter(|&n| n <= MAX_TOTAL_SWEEPS);
        if retained.is_none() || sweeps.is_none() {
            return Err(FitError::InvalidSampler(format!(
                "{} chains x ({} warmup + {} draws) exceeds the limit of \
                 {MAX_TOTAL_DRAWS} retained draws / {MAX_TOTAL_SWEEPS} sweeps",
                self.chains, self.warmup, self.draws_per_chain
            )));
        }
        Ok(())
    }

    /// Retained draws over all chains (saturating; see [`Self::validate`]).
    pub fn total_draws(&self) -> usize {
        self.chains.saturating_mul(self.draws_per_chain)
    }
}

pub struct GibbsSampler {
    pub settings: SamplerSettings,
    /// `None` picks [`Prior::weakly_informative`] from the data.
    pub prior: Option<Prior>,
}

impl GibbsSampler {
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            settings,
            prior: None,
        }
    }

    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Run all chains on `table` against `response`.
    pub fn fit<C: Predictors>(
        &self,
        table: &ObservationTable<C>,
        response: &[f64],
        terms: &[&str],
    ) -> Result<PosteriorDraws, FitError> {
        self.settings.validate()?;

        let rows = table.design_rows();
        let x = design_matrix(&rows)?;
        let (n, p) = x.shape();
        if response.len() != n {
            return Err(FitError::ShapeMismatch {
                expected: n,
                actual: response.len(),
            });
        }
        if n <= p {
            return Err(FitError::TooFewObservations { n, p });
        }

        let prior = match &self.prior {
            Some(prior) => prior.clone(),
            None => Prior::weakly_informative(&rows, response)?,
        };
        if prior.coefficients.len() != p {
            return Err(FitError::InvalidPrior(format!(
                "{} coefficient priors for {p} coefficients",
                prior.coefficients.len()
            )));
        }

        let model = Conditionals::new(&x, response, &prior);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.settings.seed);
        let mut draws = Vec::with_capacity(self.settings.total_draws());

        for chain in 0..self.settings.chains {
            let before = draws.len();
            model.run_chain(&mut rng.clone(), &self.settings, &mut draws)?;
            log::debug!(
                "chain {chain}: kept {} draws after {} warmup sweeps",
                draws.len() - before,
                self.settings.warmup
            );
            rng.jump();
        }

        Ok(PosteriorDraws {
            terms: coefficient_terms(p, terms),
            chains: self.settings.chains,
            draws,
        })
    }
}

/// Sufficient statistics and prior terms for the two full conditionals.
struct Conditionals<'a> {
    x: &'a DMatrix<f64>,
    y: DVector<f64>,
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    prior_precision: DVector<f64>,
    prior_shift: DVector<f64>,
    shape: f64,
    scale: f64,
}

impl<'a> Conditionals<'a> {
    fn new(x: &'a DMatrix<f64>, response: &[f64], prior: &Prior) -> Self {
        let y = DVector::from_column_slice(response);
        let prior_precision = DVector::from_iterator(
            prior.coefficients.len(),
            prior.coefficients.iter().map(|c| 1.0 / (c.sd * c.sd)),
        );
        let prior_shift = DVector::from_iterator(
            prior.coefficients.len(),
            prior.coefficients.iter().map(|c| c.mean / (c.sd * c.sd)),
        );
        Self {
            xtx: x.transpose() * x,
            xty: x.transpose() * &y,
            x,
            y,
            prior_precision,
            prior_shift,
            shape: prior.sigma2_shape + response.len() as f64 / 2.0,
            scale: prior.sigma2_scale,
        }
    }

    fn run_chain<R: Rng>(
        &self,
        rng: &mut R,
        settings: &SamplerSettings,
        out: &mut Vec<ParameterDraw>,
    ) -> Result<(), FitError> {
        let mut sigma2 = self.scale / self.shape.max(1.0);
        for sweep in 0..settings.warmup + settings.draws_per_chain {
            let beta = self.draw_beta(sigma2, rng)?;
            sigma2 = self.draw_sigma2(&beta, rng)?;
            if sweep >= settings.warmup {
                out.push(ParameterDraw {
                    coefficients: beta.iter().copied().collect(),
                    sigma: sigma2.sqrt(),
                });
            }
        }
        Ok(())
    }

    fn draw_beta<R: Rng>(&self, sigma2: f64, rng: &mut R) -> Result<DVector<f64>, FitError> {
        let mut q = &self.xtx / sigma2;
        for (k, prec) in self.prior_precision.iter().enumerate() {
            q[(k, k)] += prec;
        }
        let b = &self.prior_shift + &self.xty / sigma2;

        let chol = cholesky(q)?;
        let centre = chol.solve(&b);
        let z = DVector::from_fn(centre.len(), |_, _| rng.sample::<f64, _>(StandardNormal));
        let noise = chol
            .l()
            .transpose()
            .solve_upper_triangular(&z)
            .ok_or(FitError::Singular)?;
        Ok(centre + noise)
    }

    fn draw_sigma2<R: Rng>(&self, beta: &DVector<f64>, rng: &mut R) -> Result<f64, FitError> {
        let rss = (&self.y - self.x * beta).norm_squared();
        let rate = self.scale + rss / 2.0;
        let precision = Gamma::new(self.shape, 1.0 / rate)
            .map_err(|e| FitError::InvalidPrior(e.to_string()))?
            .sample(rng);
        Ok(1.0 / precision)
    }
}

fn coefficient_terms(p: usize, terms: &[&str]) -> Vec<String> {
    (0..p)
        .map(|k| match k {
            0 => "(Intercept)".to_string(),
            _ => terms
                .get(k - 1)
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("x{k}")),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Posterior draws
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDraw {
    /// Intercept first.
    pub coefficients: Vec<f64>,
    pub sigma: f64,
}

impl ParameterDraw {
    /// Linear predictor `xᵀβ` for one design row.
    pub fn linear_predictor(&self, design_row: &[f64]) -> f64 {
        design_row
            .iter()
            .zip(&self.coefficients)
            .map(|(x, b)| x * b)
            .sum()
    }
}

/// Median / MAD-SD / interval of one parameter's marginal posterior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub term: String,
    pub median: f64,
    pub mad_sd: f64,
    pub lower: f64,
    pub upper: f64,
    /// Potential scale reduction; `None` with a single chain.
    pub rhat: Option<f64>,
}

/// Retained draws of all chains, chain after chain.
#[derive(Debug, Clone)]
pub struct PosteriorDraws {
    pub terms: Vec<String>,
    pub chains: usize,
    pub draws: Vec<ParameterDraw>,
}

impl PosteriorDraws {
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    /// Draws of coefficient `k` (0 = intercept).
    pub fn coefficient(&self, k: usize) -> Vec<f64> {
        self.draws.iter().map(|d| d.coefficients[k]).collect()
    }

    pub fn sigma(&self) -> Vec<f64> {
        self.draws.iter().map(|d| d.sigma).collect()
    }

    /// Linear-predictor draws (no residual noise) for every row of `table`.
    pub fn linpred<C: Predictors>(
        &self,
        table: &ObservationTable<C>,
    ) -> Result<DrawMatrix, FitError> {
        let rows = self.checked_design(table)?;
        Ok(DrawMatrix::from_fn(self.len(), rows.len(), |s, j| {
            self.draws[s].linear_predictor(&rows[j])
        }))
    }

    /// Posterior-predictive draws: linear predictor plus `N(0, σ)` noise,
    /// one independent noise draw per cell.
    pub fn predict<C: Predictors, R: Rng>(
        &self,
        table: &ObservationTable<C>,
        rng: &mut R,
    ) -> Result<DrawMatrix, FitError> {
        let rows = self.checked_design(table)?;
        Ok(DrawMatrix::from_fn(self.len(), rows.len(), |s, j| {
            let draw = &self.draws[s];
            let eps: f64 = rng.sample(StandardNormal);
            draw.linear_predictor(&rows[j]) + draw.sigma * eps
        }))
    }

    /// Up to `n` draws evenly spaced through the posterior.
    pub fn thinned(&self, n: usize) -> impl Iterator<Item = &ParameterDraw> {
        let step = if n == 0 { usize::MAX } else { (self.len() / n).max(1) };
        self.draws.iter().step_by(step).take(n)
    }

    /// Summary of each coefficient followed by sigma.
    pub fn parameter_summaries(&self, bounds: QuantileBounds) -> Vec<ParameterSummary> {
        let mut columns: Vec<(String, Vec<f64>)> = self
            .terms
            .iter()
            .enumerate()
            .map(|(k, term)| (term.clone(), self.coefficient(k)))
            .collect();
        columns.push(("sigma".to_string(), self.sigma()));

        columns
            .into_iter()
            .filter_map(|(term, values)| {
                let q = quantiles(&values, &[0.5, bounds.lower(), bounds.upper()])?;
                Some(ParameterSummary {
                    term,
                    median: q[0],
                    mad_sd: mad_sd(&values)?,
                    lower: q[1],
                    upper: q[2],
                    rhat: rhat(&values, self.chains),
                })
            })
            .collect()
    }

    fn checked_design<C: Predictors>(
        &self,
        table: &ObservationTable<C>,
    ) -> Result<Vec<Vec<f64>>, FitError> {
        let rows = table.design_rows();
        let p = self.terms.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != p) {
            return Err(FitError::ShapeMismatch {
                expected: p,
                actual: bad.len(),
            });
        }
        Ok(rows)
    }
}

/// Gelman–Rubin potential scale reduction over equal-length chains.
fn rhat(values: &[f64], chains: usize) -> Option<f64> {
    if chains < 2 || values.len() % chains != 0 {
        return None;
    }
    let n = values.len() / chains;
    if n < 2 {
        return None;
    }
    let per_chain: Vec<&[f64]> = values.chunks(n).collect();
    let chain_means: Vec<f64> = per_chain.iter().filter_map(|c| mean(c)).collect();
    let within = per_chain
        .iter()
        .filter_map(|c| std_dev(c).map(|s| s * s))
        .sum::<f64>()
        / chains as f64;
    if within <= 0.0 {
        return None;
    }
    let between = n as f64 * std_dev(&chain_means)?.powi(2);
    let pooled = (n - 1) as f64 / n as f64 * within + between / n as f64;
    Some((pooled / within).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct X(f64);

    impl Predictors for X {
        fn predictors(&self) -> Vec<f64> {
            vec![self.0]
        }
    }

    fn simulated(n: usize, seed: u64) -> (ObservationTable<X>, Vec<f64>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let xs: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * 4.0 - 2.0).collect();
        let ys = xs
            .iter()
            .map(|x| {
                let e: f64 = rng.sample(StandardNormal);
                2.0 + 3.0 * x + 0.5 * e
            })
            .collect();
        (ObservationTable::numbered(xs.into_iter().map(X)), ys)
    }

    fn quick() -> SamplerSettings {
        SamplerSettings {
            chains: 2,
            warmup: 200,
            draws_per_chain: 500,
            seed: 11,
        }
    }

    #[test]
    fn recovers_simulated_coefficients() {
        let (table, ys) = simulated(200, 3);
        let post = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        assert_eq!(post.len(), 1000);
        assert_eq!(post.terms, vec!["(Intercept)", "x"]);

        let summary = post.parameter_summaries(QuantileBounds::default());
        assert_eq!(summary.len(), 3);
        assert!((summary[0].median - 2.0).abs() < 0.2, "{:?}", summary[0]);
        assert!((summary[1].median - 3.0).abs() < 0.2, "{:?}", summary[1]);
        assert!((summary[2].median - 0.5).abs() < 0.1, "{:?}", summary[2]);
        assert!(summary[1].lower < summary[1].median && summary[1].median < summary[1].upper);
        for s in &summary {
            let rhat = s.rhat.unwrap();
            assert!(rhat < 1.05, "{}: rhat {rhat}", s.term);
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let (table, ys) = simulated(40, 5);
        let a = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        let b = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        assert_eq!(a.draws, b.draws);

        let other = SamplerSettings { seed: 12, ..quick() };
        let c = GibbsSampler::new(other).fit(&table, &ys, &["x"]).unwrap();
        assert_ne!(a.draws, c.draws);
    }

    #[test]
    fn chains_differ_from_each_other() {
        let (table, ys) = simulated(40, 5);
        let post = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        assert_ne!(post.draws[0], post.draws[500]);
    }

    #[test]
    fn predictive_draws_are_wider_than_linpred() {
        let (table, ys) = simulated(60, 9);
        let post = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        let grid = ObservationTable::numbered([X(-1.0), X(0.0), X(1.0)]);

        let linpred = post.linpred(&grid).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let predict = post.predict(&grid, &mut rng).unwrap();
        assert_eq!(linpred.n_draws(), post.len());
        assert_eq!(linpred.n_observations(), 3);

        let spread = |m: &DrawMatrix, j| std_dev(m.column(j)).unwrap();
        for j in 0..3 {
            assert!(spread(&predict, j) > spread(&linpred, j));
        }
        // At x = 0 the linear predictor is the intercept.
        assert_eq!(linpred.column(1), post.coefficient(0).as_slice());
    }

    #[test]
    fn explicit_prior_is_respected() {
        let (table, ys) = simulated(30, 2);
        // Very tight prior pins the slope near zero.
        let prior = Prior::new(
            vec![
                NormalPrior { mean: 0.0, sd: 100.0 },
                NormalPrior { mean: 0.0, sd: 1e-4 },
            ],
            1.0,
            1.0,
        )
        .unwrap();
        let post = GibbsSampler::new(quick())
            .with_prior(prior)
            .fit(&table, &ys, &["x"])
            .unwrap();
        let slope = mean(&post.coefficient(1)).unwrap();
        assert!(slope.abs() < 0.01, "slope {slope}");
    }

    #[test]
    fn invalid_settings_and_priors() {
        let (table, ys) = simulated(10, 1);
        let none = SamplerSettings { chains: 0, ..quick() };
        assert!(matches!(
            GibbsSampler::new(none).fit(&table, &ys, &["x"]),
            Err(FitError::InvalidSampler(_))
        ));
        assert!(Prior::new(vec![NormalPrior { mean: 0.0, sd: 0.0 }], 1.0, 1.0).is_err());
        assert!(Prior::new(vec![NormalPrior { mean: 0.0, sd: 1.0 }], 0.0, 1.0).is_err());

        let wrong_len = Prior::new(vec![NormalPrior { mean: 0.0, sd: 1.0 }], 1.0, 1.0).unwrap();
        assert!(matches!(
            GibbsSampler::new(quick()).with_prior(wrong_len).fit(&table, &ys, &["x"]),
            Err(FitError::InvalidPrior(_))
        ));
    }

    #[test]
    fn oversized_settings_are_rejected_before_sampling() {
        let (table, ys) = simulated(10, 1);
        let huge = SamplerSettings {
            chains: usize::MAX / 2,
            draws_per_chain: 4,
            ..quick()
        };
        assert!(matches!(huge.validate(), Err(FitError::InvalidSampler(_))));
        assert!(matches!(
            GibbsSampler::new(huge).fit(&table, &ys, &["x"]),
            Err(FitError::InvalidSampler(_))
        ));

        let long_warmup = SamplerSettings {
            warmup: usize::MAX,
            ..quick()
        };
        assert!(long_warmup.validate().is_err());

        let at_limit = SamplerSettings {
            chains: 10,
            warmup: 0,
            draws_per_chain: MAX_TOTAL_DRAWS / 10,
            seed: 1,
        };
        assert!(at_limit.validate().is_ok());
        assert!(SamplerSettings::default().validate().is_ok());
    }

    #[test]
    fn default_sigma_prior_is_weak() {
        let (table, ys) = simulated(50, 6);
        let prior = Prior::weakly_informative(&table.design_rows(), &ys).unwrap();
        let var_y = std_dev(&ys).unwrap().powi(2);
        assert!(prior.sigma2_shape < 0.1);
        assert!(prior.sigma2_scale < 0.1 * var_y);
    }

    #[test]
    fn thinned_spreads_over_draws() {
        let (table, ys) = simulated(20, 4);
        let post = GibbsSampler::new(quick()).fit(&table, &ys, &["x"]).unwrap();
        assert_eq!(post.thinned(10).count(), 10);
        assert_eq!(post.thinned(0).count(), 0);
        assert_eq!(post.thinned(5000).count(), post.len());
    }

    #[test]
    fn rhat_flags_disagreeing_chains() {
        let mut values: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        values.extend((0..100).map(|i| 50.0 + (i % 7) as f64));
        assert!(rhat(&values, 2).unwrap() > 2.0);
        assert_eq!(rhat(&values, 1), None);
    }
}
