use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use super::observation::{ObservationTable, Predictors};
use super::special::{t_quantile, t_two_sided_p};
use super::summarize::{PredictionSummary, QuantileBounds};
use super::{cholesky, FitError};

// ---------------------------------------------------------------------------
// Classical linear regression (ordinary least squares)
// ---------------------------------------------------------------------------

/// One row of a regression coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Least-squares fit of `y = Xβ + ε` with an intercept column.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<Coefficient>,
    /// Residual standard error.
    pub sigma: f64,
    pub df_residual: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// (XᵀX)⁻¹, kept for standard errors of new predictions.
    xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    /// Fit on `table` (predictors) against `response`.
    ///
    /// `terms` names the non-intercept predictors for the coefficient table.
    pub fn fit<C: Predictors>(
        table: &ObservationTable<C>,
        response: &[f64],
        terms: &[&str],
    ) -> Result<Self, FitError> {
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

        let y = DVector::from_column_slice(response);
        let xtx = x.transpose() * &x;
        let chol = cholesky(xtx)?;
        let beta = chol.solve(&(x.transpose() * &y));
        let xtx_inv = chol.inverse();

        let residuals = &y - &x * &beta;
        let rss = residuals.norm_squared();
        let df_residual = n - p;
        let sigma2 = rss / df_residual as f64;

        let y_mean = y.mean();
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_residual as f64;

        let coefficients = (0..p)
            .map(|k| {
                let estimate = beta[k];
                let std_error = (xtx_inv[(k, k)] * sigma2).sqrt();
                let t_value = estimate / std_error;
                Coefficient {
                    term: term_name(k, terms),
                    estimate,
                    std_error,
                    t_value,
                    p_value: t_two_sided_p(t_value, df_residual as f64),
                }
            })
            .collect();

        log::debug!("OLS fit: n={n}, p={p}, rss={rss:.4}, r²={r_squared:.4}");

        Ok(Self {
            coefficients,
            sigma: sigma2.sqrt(),
            df_residual,
            r_squared,
            adj_r_squared,
            xtx_inv,
        })
    }

    pub fn estimates(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.estimate).collect()
    }

    /// Fitted value for one design row `[1, predictors...]`.
    pub fn fitted(&self, design_row: &[f64]) -> f64 {
        design_row
            .iter()
            .zip(&self.coefficients)
            .map(|(x, c)| x * c.estimate)
            .sum()
    }

    /// Confidence interval of the mean response for each row of `table`.
    pub fn confidence<C: Predictors + Clone>(
        &self,
        table: &ObservationTable<C>,
        bounds: QuantileBounds,
    ) -> Result<Vec<PredictionSummary<C>>, FitError> {
        self.intervals(table, bounds, false)
    }

    /// Prediction interval of a new response for each row of `table`.
    pub fn prediction<C: Predictors + Clone>(
        &self,
        table: &ObservationTable<C>,
        bounds: QuantileBounds,
    ) -> Result<Vec<PredictionSummary<C>>, FitError> {
        self.intervals(table, bounds, true)
    }

    fn intervals<C: Predictors + Clone>(
        &self,
        table: &ObservationTable<C>,
        bounds: QuantileBounds,
        include_noise: bool,
    ) -> Result<Vec<PredictionSummary<C>>, FitError> {
        let df = self.df_residual as f64;
        let t_lower = t_quantile(bounds.lower(), df);
        let t_upper = t_quantile(bounds.upper(), df);
        let sigma2 = self.sigma * self.sigma;
        let p = self.coefficients.len();

        table
            .iter()
            .zip(table.design_rows())
            .map(|(row, x)| {
                if x.len() != p {
                    return Err(FitError::ShapeMismatch {
                        expected: p,
                        actual: x.len(),
                    });
                }
                let x0 = DVector::from_vec(x);
                let fit = self.fitted(x0.as_slice());
                let mut var = (x0.transpose() * &self.xtx_inv * &x0)[(0, 0)] * sigma2;
                if include_noise {
                    var += sigma2;
                }
                let se = var.sqrt();
                Ok(PredictionSummary {
                    observation: row.observation,
                    median: fit,
                    lower: fit + t_lower * se,
                    upper: fit + t_upper * se,
                    covariates: row.covariates.clone(),
                })
            })
            .collect()
    }
}

fn term_name(k: usize, terms: &[&str]) -> String {
    if k == 0 {
        "(Intercept)".to_string()
    } else {
        terms
            .get(k - 1)
            .map(|t| t.to_string())
            .unwrap_or_else(|| format!("x{k}"))
    }
}

/// Stack design rows into an n × p matrix.
pub(crate) fn design_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, FitError> {
    let p = rows.first().map_or(1, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != p) {
        return Err(FitError::ShapeMismatch {
            expected: p,
            actual: bad.len(),
        });
    }
    Ok(DMatrix::from_fn(rows.len(), p, |i, j| rows[i][j]))
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

    fn table(xs: &[f64]) -> ObservationTable<X> {
        ObservationTable::numbered(xs.iter().map(|&x| X(x)))
    }

    #[test]
    fn recovers_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 - 0.5 * x).collect();
        let fit = OlsFit::fit(&table(&xs), &ys, &["x"]).unwrap();

        let est = fit.estimates();
        assert!((est[0] - 3.0).abs() < 1e-10);
        assert!((est[1] + 0.5).abs() < 1e-10);
        assert!(fit.sigma < 1e-8);
        assert!((fit.r_squared - 1.0).abs() < 1e-10);
        assert_eq!(fit.coefficients[0].term, "(Intercept)");
        assert_eq!(fit.coefficients[1].term, "x");
        assert_eq!(fit.df_residual, 3);
    }

    #[test]
    fn matches_textbook_example() {
        // lm(y ~ x) with x = 1..5, y = c(2, 4, 5, 4, 5):
        // intercept 2.2 (se 0.9381), slope 0.6 (se 0.2828), R² 0.6
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = OlsFit::fit(&table(&xs), &ys, &["x"]).unwrap();

        assert!((fit.coefficients[0].estimate - 2.2).abs() < 1e-10);
        assert!((fit.coefficients[1].estimate - 0.6).abs() < 1e-10);
        assert!((fit.coefficients[1].std_error - 0.282842712).abs() < 1e-6);
        assert!((fit.coefficients[0].std_error - 0.938083152).abs() < 1e-6);
        assert!((fit.r_squared - 0.6).abs() < 1e-10);
        assert!((fit.adj_r_squared - 0.466666667).abs() < 1e-6);
        // p-value of slope: 2 * pt(-2.1213, 3) = 0.1240
        assert!((fit.coefficients[1].p_value - 0.1240).abs() < 1e-3);
    }

    #[test]
    fn prediction_interval_contains_confidence_interval() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [1.1, 1.9, 3.2, 3.8, 5.1, 6.2];
        let fit = OlsFit::fit(&table(&xs), &ys, &["x"]).unwrap();
        let grid = table(&[0.0, 3.5, 8.0]);
        let bounds = QuantileBounds::default();

        let conf = fit.confidence(&grid, bounds).unwrap();
        let pred = fit.prediction(&grid, bounds).unwrap();
        for (c, p) in conf.iter().zip(&pred) {
            assert_eq!(c.median, p.median);
            assert!(p.lower < c.lower && c.upper < p.upper);
            assert!(c.lower < c.median && c.median < c.upper);
        }
        // Confidence band is narrowest near the mean of x.
        assert!(conf[1].width() < conf[0].width());
        assert!(conf[1].width() < conf[2].width());
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(matches!(
            OlsFit::fit(&table(&[1.0, 2.0]), &[1.0, 2.0], &["x"]),
            Err(FitError::TooFewObservations { n: 2, p: 2 })
        ));
        assert!(matches!(
            OlsFit::fit(&table(&[1.0, 1.0, 1.0]), &[1.0, 2.0, 3.0], &["x"]),
            Err(FitError::Singular)
        ));
        assert!(matches!(
            OlsFit::fit(&table(&[1.0, 2.0, 3.0]), &[1.0, 2.0], &["x"]),
            Err(FitError::ShapeMismatch { expected: 3, actual: 2 })
        ));
    }
}
