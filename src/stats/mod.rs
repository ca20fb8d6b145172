/// Statistics layer: observation tables, model fits, draw summaries.
///
/// ```text
///   ObservationTable<C> ──┬──► OlsFit ──────────► confidence / prediction
///                         │                            │
///                         └──► GibbsSampler            │
///                                 │                    │
///                                 ▼                    │
///                           PosteriorDraws             │
///                                 │ linpred / predict  │
///                                 ▼                    ▼
///                            DrawMatrix ──summarize──► PredictionSummary<C>
/// ```

pub mod bayes;
pub mod observation;
pub mod ols;
pub mod quantile;
pub mod special;
pub mod summarize;

use nalgebra::{Cholesky, DMatrix, Dyn};
use thiserror::Error;

pub use observation::{Observation, ObservationTable, Predictors};
pub use summarize::{summarize, DrawMatrix, PredictionSummary, QuantileBounds, SummaryError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("{n} observations are not enough to estimate {p} coefficients")]
    TooFewObservations { n: usize, p: usize },

    #[error("design matrix is singular (predictors are collinear or constant)")]
    Singular,

    #[error("invalid prior: {0}")]
    InvalidPrior(String),

    #[error("invalid sampler settings: {0}")]
    InvalidSampler(String),
}

/// Cholesky factor of a symmetric positive-definite matrix, rejecting
/// matrices that are numerically rank deficient.
pub(crate) fn cholesky(m: DMatrix<f64>) -> Result<Cholesky<f64, Dyn>, FitError> {
    let scale = m.diagonal().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let chol = Cholesky::new(m).ok_or(FitError::Singular)?;
    let min_pivot = chol
        .l_dirty()
        .diagonal()
        .iter()
        .fold(f64::INFINITY, |acc, v| acc.min(v * v));
    if scale == 0.0 || min_pivot <= 1e-12 * scale {
        return Err(FitError::Singular);
    }
    Ok(chol)
}
