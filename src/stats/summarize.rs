use serde::Serialize;
use thiserror::Error;

use super::observation::ObservationTable;
use super::quantile::quantile_sorted;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SummaryError {
    #[error("draw matrix has {columns} columns but the observation table has {rows} rows")]
    ShapeMismatch { columns: usize, rows: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// ---------------------------------------------------------------------------
// QuantileBounds – validated (p_lower, p_upper)
// ---------------------------------------------------------------------------

/// Probability thresholds of a two-sided interval, `0 < lower < upper < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileBounds {
    lower: f64,
    upper: f64,
}

impl QuantileBounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self, SummaryError> {
        let in_unit = |p: f64| p > 0.0 && p < 1.0;
        if !in_unit(lower) || !in_unit(upper) {
            return Err(SummaryError::InvalidArgument(format!(
                "quantile thresholds must lie in (0, 1), got {lower} and {upper}"
            )));
        }
        if lower >= upper {
            return Err(SummaryError::InvalidArgument(format!(
                "p_lower ({lower}) must be less than p_upper ({upper})"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Central interval with the given coverage, e.g. `0.95` → (0.025, 0.975).
    pub fn central(coverage: f64) -> Result<Self, SummaryError> {
        let tail = (1.0 - coverage) / 2.0;
        Self::new(tail, 1.0 - tail)
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Probability mass between the two thresholds.
    pub fn coverage(&self) -> f64 {
        self.upper - self.lower
    }
}

impl Default for QuantileBounds {
    fn default() -> Self {
        Self {
            lower: 0.025,
            upper: 0.975,
        }
    }
}

// ---------------------------------------------------------------------------
// DrawMatrix – S draws × N observations
// ---------------------------------------------------------------------------

/// Posterior draws, one row per draw and one column per observation.
///
/// Stored column-major so each observation's draws are contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawMatrix {
    n_draws: usize,
    n_observations: usize,
    data: Vec<f64>,
}

impl DrawMatrix {
    /// Build from draw rows, each holding `n_observations` values. An empty
    /// `rows` gives a matrix with no draws over `n_observations` columns.
    pub fn from_rows(n_observations: usize, rows: &[Vec<f64>]) -> Result<Self, SummaryError> {
        let n_draws = rows.len();
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != n_observations)
        {
            return Err(SummaryError::InvalidArgument(format!(
                "draw row {i} has {} values, expected {n_observations}",
                row.len()
            )));
        }

        let mut data = vec![0.0; n_draws * n_observations];
        for (s, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                data[j * n_draws + s] = v;
            }
        }
        Ok(Self {
            n_draws,
            n_observations,
            data,
        })
    }

    /// Build from per-observation columns of draws.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self, SummaryError> {
        let n_observations = columns.len();
        let n_draws = columns.first().map_or(0, Vec::len);
        if let Some((j, col)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != n_draws)
        {
            return Err(SummaryError::InvalidArgument(format!(
                "column {j} has {} draws, expected {n_draws}",
                col.len()
            )));
        }
        let data = columns.into_iter().flatten().collect();
        Ok(Self {
            n_draws,
            n_observations,
            data,
        })
    }

    /// Build an `n_draws × n_observations` matrix from `f(draw, observation)`.
    pub fn from_fn(
        n_draws: usize,
        n_observations: usize,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Self {
        let mut data = Vec::with_capacity(n_draws * n_observations);
        for j in 0..n_observations {
            for s in 0..n_draws {
                data.push(f(s, j));
            }
        }
        Self {
            n_draws,
            n_observations,
            data,
        }
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// All draws for observation `j`.
    pub fn column(&self, j: usize) -> &[f64] {
        &self.data[j * self.n_draws..(j + 1) * self.n_draws]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_observations).map(move |j| self.column(j))
    }

    /// Apply `f` to every draw.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            n_draws: self.n_draws,
            n_observations: self.n_observations,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// PredictionSummary
// ---------------------------------------------------------------------------

/// Median and interval of one observation's draws, joined to its covariates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary<C> {
    pub observation: usize,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
    pub covariates: C,
}

impl<C> PredictionSummary<C> {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// Summarize each column of `draws` into median and `bounds` quantiles,
/// paired in order with the rows of `table`.
///
/// Fails with [`SummaryError::ShapeMismatch`] when the column count differs
/// from the table length, and with [`SummaryError::InvalidArgument`] when a
/// column has no draws or holds a non-finite value. No partial result is
/// produced.
pub fn summarize<C: Clone>(
    draws: &DrawMatrix,
    table: &ObservationTable<C>,
    bounds: QuantileBounds,
) -> Result<Vec<PredictionSummary<C>>, SummaryError> {
    if draws.n_observations() != table.len() {
        return Err(SummaryError::ShapeMismatch {
            columns: draws.n_observations(),
            rows: table.len(),
        });
    }
    if draws.n_draws() == 0 && !table.is_empty() {
        return Err(SummaryError::InvalidArgument(
            "draw matrix has no draws".to_string(),
        ));
    }

    let mut sorted = Vec::with_capacity(draws.n_draws());
    table
        .iter()
        .zip(draws.columns())
        .map(|(row, column)| {
            if let Some(bad) = column.iter().find(|v| !v.is_finite()) {
                return Err(SummaryError::InvalidArgument(format!(
                    "observation {} has a non-finite draw ({bad})",
                    row.observation
                )));
            }
            sorted.clear();
            sorted.extend_from_slice(column);
            sorted.sort_unstable_by(f64::total_cmp);

            let q = |p| quantile_sorted(&sorted, p).unwrap_or(f64::NAN);
            Ok(PredictionSummary {
                observation: row.observation,
                median: q(0.5),
                lower: q(bounds.lower()),
                upper: q(bounds.upper()),
                covariates: row.covariates.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::observation::Observation;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn table(n: usize) -> ObservationTable<f64> {
        ObservationTable::numbered((0..n).map(|i| i as f64 / 10.0))
    }

    #[test]
    fn bounds_validation() {
        assert!(QuantileBounds::new(0.025, 0.975).is_ok());
        assert!(matches!(
            QuantileBounds::new(0.5, 0.5),
            Err(SummaryError::InvalidArgument(_))
        ));
        assert!(QuantileBounds::new(0.9, 0.1).is_err());
        assert!(QuantileBounds::new(0.0, 0.5).is_err());
        assert!(QuantileBounds::new(0.5, 1.0).is_err());
        assert!(QuantileBounds::new(f64::NAN, 0.5).is_err());
        let c = QuantileBounds::central(0.9).unwrap();
        assert!((c.lower() - 0.05).abs() < 1e-12);
        assert!((c.upper() - 0.95).abs() < 1e-12);
        assert_eq!(QuantileBounds::default(), QuantileBounds::new(0.025, 0.975).unwrap());
    }

    #[test]
    fn draw_matrix_rows_and_columns_agree() {
        let m = DrawMatrix::from_rows(2, &[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]])
            .unwrap();
        assert_eq!(m.n_draws(), 3);
        assert_eq!(m.n_observations(), 2);
        assert_eq!(m.column(1), &[10.0, 20.0, 30.0]);

        let c = DrawMatrix::from_columns(vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]])
            .unwrap();
        assert_eq!(m, c);

        assert!(DrawMatrix::from_rows(2, &[vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(DrawMatrix::from_rows(3, &[vec![1.0, 2.0]]).is_err());
        assert!(DrawMatrix::from_columns(vec![vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn shape_mismatch_produces_no_output() {
        let draws = DrawMatrix::from_columns(vec![vec![0.0; 10]; 80]).unwrap();
        let err = summarize(&draws, &table(79), QuantileBounds::default()).unwrap_err();
        assert_eq!(err, SummaryError::ShapeMismatch { columns: 80, rows: 79 });
    }

    #[test]
    fn empty_draws_are_rejected() {
        let draws = DrawMatrix::from_columns(vec![Vec::new(), Vec::new()]).unwrap();
        assert!(matches!(
            summarize(&draws, &table(2), QuantileBounds::default()),
            Err(SummaryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn no_draw_rows_over_observations_is_invalid() {
        let draws = DrawMatrix::from_rows(2, &[]).unwrap();
        assert_eq!((draws.n_draws(), draws.n_observations()), (0, 2));
        assert!(matches!(
            summarize(&draws, &table(2), QuantileBounds::default()),
            Err(SummaryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_table_and_matrix_give_empty_summary() {
        let draws = DrawMatrix::from_columns(Vec::new()).unwrap();
        let out = summarize(&draws, &table(0), QuantileBounds::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn non_finite_draw_is_rejected() {
        let draws = DrawMatrix::from_columns(vec![vec![1.0, f64::NAN, 2.0]]).unwrap();
        assert!(matches!(
            summarize(&draws, &table(1), QuantileBounds::default()),
            Err(SummaryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zeros_uniform_tens_example() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let s = 1000;
        let zeros = vec![0.0; s];
        let uniform: Vec<f64> = (0..s).map(|_| rng.gen::<f64>()).collect();
        let tens = vec![10.0; s];
        let draws = DrawMatrix::from_columns(vec![zeros, uniform, tens]).unwrap();

        let out = summarize(&draws, &table(3), QuantileBounds::new(0.025, 0.975).unwrap())
            .unwrap();
        assert_eq!(out.len(), 3);

        assert_eq!((out[0].median, out[0].lower, out[0].upper), (0.0, 0.0, 0.0));
        assert_eq!((out[2].median, out[2].lower, out[2].upper), (10.0, 10.0, 10.0));

        assert!((out[1].median - 0.5).abs() < 0.05, "median {}", out[1].median);
        assert!((out[1].lower - 0.025).abs() < 0.02, "lower {}", out[1].lower);
        assert!((out[1].upper - 0.975).abs() < 0.02, "upper {}", out[1].upper);
    }

    #[test]
    fn covariates_are_joined_by_position() {
        let table = ObservationTable::numbered(["a", "b"]);
        let draws = DrawMatrix::from_columns(vec![vec![1.0, 3.0], vec![5.0, 7.0]]).unwrap();
        let out = summarize(&draws, &table, QuantileBounds::default()).unwrap();
        assert_eq!(out[0].observation, 1);
        assert_eq!(out[0].covariates, "a");
        assert_eq!(out[0].median, 2.0);
        assert_eq!(out[1].covariates, "b");
        assert_eq!(out[1].median, 6.0);
    }

    #[test]
    fn explicit_ids_keep_table_order() {
        let table = ObservationTable::new(vec![
            Observation { observation: 42, covariates: "a" },
            Observation { observation: 7, covariates: "b" },
        ])
        .unwrap();
        let draws = DrawMatrix::from_columns(vec![vec![1.0, 3.0], vec![5.0, 7.0]]).unwrap();
        let out = summarize(&draws, &table, QuantileBounds::default()).unwrap();
        let rows: Vec<(usize, &str, f64)> = out
            .iter()
            .map(|r| (r.observation, r.covariates, r.median))
            .collect();
        assert_eq!(rows, vec![(42, "a", 2.0), (7, "b", 6.0)]);
    }

    fn draw_columns() -> impl Strategy<Value = Vec<Vec<f64>>> {
        (1_usize..8, 1_usize..60).prop_flat_map(|(n_obs, n_draws)| {
            proptest::collection::vec(
                proptest::collection::vec(-1e6_f64..1e6, n_draws),
                n_obs,
            )
        })
    }

    fn bounds() -> impl Strategy<Value = QuantileBounds> {
        (0.001_f64..0.499, 0.501_f64..0.999)
            .prop_map(|(lo, hi)| QuantileBounds::new(lo, hi).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn one_ordered_row_per_observation(columns in draw_columns(), b in bounds()) {
            let n = columns.len();
            let draws = DrawMatrix::from_columns(columns).unwrap();
            let out = summarize(&draws, &table(n), b).unwrap();
            prop_assert_eq!(out.len(), n);
            for (j, row) in out.iter().enumerate() {
                prop_assert_eq!(row.observation, j + 1);
                prop_assert!(row.lower <= row.median);
                prop_assert!(row.median <= row.upper);
            }
        }

        #[test]
        fn constant_column_collapses(
            c in -1e6_f64..1e6,
            n_draws in 1_usize..200,
            b in bounds(),
        ) {
            let draws = DrawMatrix::from_columns(vec![vec![c; n_draws]]).unwrap();
            let out = summarize(&draws, &table(1), b).unwrap();
            prop_assert_eq!(out[0].median, c);
            prop_assert_eq!(out[0].lower, c);
            prop_assert_eq!(out[0].upper, c);
        }

        #[test]
        fn affine_transform_commutes(
            columns in draw_columns(),
            a in 0.01_f64..100.0,
            shift in -1e3_f64..1e3,
            b in bounds(),
        ) {
            let n = columns.len();
            let draws = DrawMatrix::from_columns(columns).unwrap();
            let base = summarize(&draws, &table(n), b).unwrap();
            let moved = summarize(&draws.map(|x| a * x + shift), &table(n), b).unwrap();

            for (orig, t) in base.iter().zip(&moved) {
                let back = |v: f64| (v - shift) / a;
                let tol = 1e-6 * (1.0 + orig.median.abs().max(orig.upper.abs()).max(orig.lower.abs()));
                prop_assert!((back(t.median) - orig.median).abs() <= tol);
                prop_assert!((back(t.lower) - orig.lower).abs() <= tol);
                prop_assert!((back(t.upper) - orig.upper).abs() <= tol);
            }
        }
    }
}
