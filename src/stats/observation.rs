use std::collections::BTreeSet;

use serde::Serialize;

use super::summarize::SummaryError;

// ---------------------------------------------------------------------------
// Predictors – covariates → regression inputs
// ---------------------------------------------------------------------------

/// Covariate records that can feed a regression design matrix.
///
/// `predictors` returns the non-intercept columns; models prepend the
/// intercept themselves.
pub trait Predictors {
    fn predictors(&self) -> Vec<f64>;
}

// ---------------------------------------------------------------------------
// Observation / ObservationTable
// ---------------------------------------------------------------------------

/// One row of an observation table: a unique id plus typed covariates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation<C> {
    pub observation: usize,
    pub covariates: C,
}

/// Ordered, immutable table of observations with unique ids.
///
/// Column `j` of a draw matrix belongs to row `j` of this table.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable<C> {
    rows: Vec<Observation<C>>,
}

impl<C> ObservationTable<C> {
    /// Build a table from explicit rows. Fails on duplicate ids.
    pub fn new(rows: Vec<Observation<C>>) -> Result<Self, SummaryError> {
        let mut seen = BTreeSet::new();
        for row in &rows {
            if !seen.insert(row.observation) {
                return Err(SummaryError::InvalidArgument(format!(
                    "duplicate observation id {}",
                    row.observation
                )));
            }
        }
        Ok(Self { rows })
    }

    /// Number rows 1..=n in the given order.
    pub fn numbered(covariates: impl IntoIterator<Item = C>) -> Self {
        let rows = covariates
            .into_iter()
            .enumerate()
            .map(|(i, covariates)| Observation {
                observation: i + 1,
                covariates,
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Observation<C>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation<C>> {
        self.rows.iter()
    }
}

impl<C: Predictors> ObservationTable<C> {
    /// Design rows `[1, predictors...]`, one per observation.
    pub fn design_rows(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| {
                let mut x = Vec::with_capacity(4);
                x.push(1.0);
                x.extend(row.covariates.predictors());
                x
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct X(f64);

    impl Predictors for X {
        fn predictors(&self) -> Vec<f64> {
            vec![self.0]
        }
    }

    #[test]
    fn numbered_assigns_one_based_ids_in_order() {
        let table = ObservationTable::numbered([X(0.5), X(1.5), X(2.5)]);
        let ids: Vec<usize> = table.iter().map(|r| r.observation).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(table.rows()[1].covariates, X(1.5));
    }

    #[test]
    fn new_rejects_duplicate_ids() {
        let rows = vec![
            Observation { observation: 4, covariates: X(0.0) },
            Observation { observation: 4, covariates: X(1.0) },
        ];
        assert!(matches!(
            ObservationTable::new(rows),
            Err(SummaryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn design_rows_prepend_intercept() {
        let table = ObservationTable::numbered([X(2.0), X(-1.0)]);
        assert_eq!(table.design_rows(), vec![vec![1.0, 2.0], vec![1.0, -1.0]]);
    }
}
