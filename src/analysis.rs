//! End-to-end analysis: sleep hours against log brain weight.
//!
//! Keeps mammals with a known brain weight and total sleep, numbers them in
//! order, fits the classical and the Bayesian regression, and summarizes
//! linear-predictor and posterior-predictive draws both for the observed
//! mammals and along an evenly spaced covariate grid (for ribbons).

use std::path::Path;

use anyhow::Context;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::export::SummaryRecord;
use crate::data::model::Mammal;
use crate::stats::bayes::{GibbsSampler, ParameterSummary, PosteriorDraws, SamplerSettings};
use crate::stats::ols::OlsFit;
use crate::stats::{
    summarize, FitError, ObservationTable, PredictionSummary, Predictors, QuantileBounds,
    SummaryError,
};

/// Name of the single predictor in coefficient tables.
pub const PREDICTOR: &str = "log_brainwt";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Analysis settings; every field is optional in the JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub p_lower: f64,
    pub p_upper: f64,
    pub chains: usize,
    pub warmup: usize,
    pub draws_per_chain: usize,
    pub seed: u64,
    /// Points along the log-brain-weight axis for ribbons.
    pub grid_points: usize,
    /// Posterior regression lines drawn in the plot.
    pub posterior_lines: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let sampler = SamplerSettings::default();
        let bounds = QuantileBounds::default();
        Self {
            p_lower: bounds.lower(),
            p_upper: bounds.upper(),
            chains: sampler.chains,
            warmup: sampler.warmup,
            draws_per_chain: sampler.draws_per_chain,
            seed: sampler.seed,
            grid_points: 100,
            posterior_lines: 100,
        }
    }
}

impl AnalysisConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn bounds(&self) -> Result<QuantileBounds, SummaryError> {
        QuantileBounds::new(self.p_lower, self.p_upper)
    }

    pub fn sampler(&self) -> SamplerSettings {
        SamplerSettings {
            chains: self.chains,
            warmup: self.warmup,
            draws_per_chain: self.draws_per_chain,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.bounds()?;
        self.sampler().validate()?;
        if self.grid_points < 2 {
            return Err(AnalysisError::Config(format!(
                "grid_points must be at least 2, got {}",
                self.grid_points
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Covariate records
// ---------------------------------------------------------------------------

/// Covariates of an observed mammal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedMammal {
    pub name: String,
    pub vore: Option<String>,
    pub log_brainwt: f64,
    pub sleep_total: f64,
}

impl Predictors for ObservedMammal {
    fn predictors(&self) -> Vec<f64> {
        vec![self.log_brainwt]
    }
}

/// A point on the log-brain-weight axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BrainWeight {
    pub log_brainwt: f64,
}

impl Predictors for BrainWeight {
    fn predictors(&self) -> Vec<f64> {
        vec![self.log_brainwt]
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("only {0} mammals have both brain weight and total sleep; at least 3 are needed")]
    TooFewRows(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Summary(#[from] SummaryError),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything the viewer and the exporter need from one run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub config: AnalysisConfig,
    pub observed: ObservationTable<ObservedMammal>,
    pub grid: ObservationTable<BrainWeight>,
    pub ols: OlsFit,
    pub ols_confidence: Vec<PredictionSummary<BrainWeight>>,
    pub ols_prediction: Vec<PredictionSummary<BrainWeight>>,
    pub posterior: PosteriorDraws,
    pub parameters: Vec<ParameterSummary>,
    pub linpred: Vec<PredictionSummary<ObservedMammal>>,
    pub predictive: Vec<PredictionSummary<ObservedMammal>>,
    pub grid_linpred: Vec<PredictionSummary<BrainWeight>>,
    pub grid_predictive: Vec<PredictionSummary<BrainWeight>>,
}

/// Observation table of the mammals usable in the regression, numbered
/// 1..=n in input order. Rows without brain weight or sleep are skipped.
pub fn observation_table<'a>(
    mammals: impl IntoIterator<Item = &'a Mammal>,
) -> ObservationTable<ObservedMammal> {
    let mut skipped = 0;
    let rows: Vec<ObservedMammal> = mammals
        .into_iter()
        .filter_map(|m| {
            let row = m.log_brainwt().zip(m.sleep_total).map(|(log_brainwt, sleep_total)| {
                ObservedMammal {
                    name: m.name.trim().to_string(),
                    vore: m.vore.clone(),
                    log_brainwt,
                    sleep_total,
                }
            });
            if row.is_none() {
                skipped += 1;
            }
            row
        })
        .collect();
    if skipped > 0 {
        log::warn!("skipped {skipped} mammals without brain weight or total sleep");
    }
    ObservationTable::numbered(rows)
}

/// `points` evenly spaced log brain weights spanning the observed range.
pub fn covariate_grid(
    observed: &ObservationTable<ObservedMammal>,
    points: usize,
) -> ObservationTable<BrainWeight> {
    let (lo, hi) = observed.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.covariates.log_brainwt), hi.max(r.covariates.log_brainwt))
    });
    if !lo.is_finite() || points == 0 {
        return ObservationTable::numbered(Vec::new());
    }
    let step = if points > 1 {
        (hi - lo) / (points - 1) as f64
    } else {
        0.0
    };
    ObservationTable::numbered((0..points).map(|i| BrainWeight {
        log_brainwt: lo + step * i as f64,
    }))
}

/// Run the full analysis on `mammals` (already filtered by the caller).
pub fn run<'a>(
    mammals: impl IntoIterator<Item = &'a Mammal>,
    config: &AnalysisConfig,
) -> Result<Analysis, AnalysisError> {
    config.validate()?;
    let bounds = config.bounds()?;

    let observed = observation_table(mammals);
    if observed.len() < 3 {
        return Err(AnalysisError::TooFewRows(observed.len()));
    }
    let response: Vec<f64> = observed.iter().map(|r| r.covariates.sleep_total).collect();
    let grid = covariate_grid(&observed, config.grid_points);

    let ols = OlsFit::fit(&observed, &response, &[PREDICTOR])?;
    log::info!(
        "OLS on {} mammals: intercept {:.3}, slope {:.3}, sigma {:.3}, R² {:.3}",
        observed.len(),
        ols.coefficients[0].estimate,
        ols.coefficients[1].estimate,
        ols.sigma,
        ols.r_squared
    );
    let ols_confidence = ols.confidence(&grid, bounds)?;
    let ols_prediction = ols.prediction(&grid, bounds)?;

    let posterior = GibbsSampler::new(config.sampler()).fit(&observed, &response, &[PREDICTOR])?;
    let parameters = posterior.parameter_summaries(bounds);
    for p in &parameters {
        log::info!(
            "posterior {}: median {:.3}, MAD_SD {:.3}, Rhat {}",
            p.term,
            p.median,
            p.mad_sd,
            p.rhat.map_or("n/a".to_string(), |r| format!("{r:.3}"))
        );
    }

    // Predictive noise gets its own stream, far from the chains' jumps.
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
    rng.long_jump();

    let linpred = summarize(&posterior.linpred(&observed)?, &observed, bounds)?;
    let predictive = summarize(&posterior.predict(&observed, &mut rng)?, &observed, bounds)?;
    let grid_linpred = summarize(&posterior.linpred(&grid)?, &grid, bounds)?;
    let grid_predictive = summarize(&posterior.predict(&grid, &mut rng)?, &grid, bounds)?;

    Ok(Analysis {
        config: config.clone(),
        observed,
        grid,
        ols,
        ols_confidence,
        ols_prediction,
        posterior,
        parameters,
        linpred,
        predictive,
        grid_linpred,
        grid_predictive,
    })
}

impl Analysis {
    /// Per-mammal linear-predictor and predictive summaries as flat rows.
    pub fn summary_records(&self) -> Vec<SummaryRecord> {
        let rows = |kind: &str, summaries: &[PredictionSummary<ObservedMammal>]| {
            summaries
                .iter()
                .map(|s| SummaryRecord {
                    kind: kind.to_string(),
                    observation: s.observation,
                    name: s.covariates.name.clone(),
                    log_brainwt: s.covariates.log_brainwt,
                    sleep_total: Some(s.covariates.sleep_total),
                    median: s.median,
                    lower: s.lower,
                    upper: s.upper,
                })
                .collect::<Vec<_>>()
        };
        let mut records = rows("linpred", &self.linpred);
        records.extend(rows("predict", &self.predictive));
        records
    }

    /// Range of the covariate axis covered by the grid.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let rows = self.grid.rows();
        Some((rows.first()?.covariates.log_brainwt, rows.last()?.covariates.log_brainwt))
    }
}
