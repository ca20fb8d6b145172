use std::collections::BTreeSet;
use std::path::Path;

use rusty_sleep::analysis::{self, Analysis, AnalysisConfig};
use rusty_sleep::data::export::write_summary;
use rusty_sleep::data::filter::{filtered_indices, init_filter_state, FilterState};
use rusty_sleep::data::model::{Factor, Level, MammalDataset};

use crate::color::ColorMap;

// ---------------------------------------------------------------------------
// Layer toggles
// ---------------------------------------------------------------------------

/// Which plot layers are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    pub points: bool,
    pub ols: bool,
    pub posterior_lines: bool,
    pub linpred: bool,
    pub predictive: bool,
}

impl Default for Layers {
    fn default() -> Self {
        Self {
            points: true,
            ols: true,
            posterior_lines: true,
            linpred: true,
            predictive: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
#[derive(Default)]
pub struct AppState {
    /// Loaded dataset (None until one is loaded).
    pub dataset: Option<MammalDataset>,

    /// Per-factor filter selections.
    pub filters: FilterState,

    /// Indices of mammals passing the current filters (cached).
    pub visible_indices: Vec<usize>,

    /// Points are coloured by diet.
    pub color_map: Option<ColorMap>,

    pub config: AnalysisConfig,

    /// Result of the last successful fit over the visible mammals.
    pub analysis: Option<Analysis>,

    /// Settings changed since the last fit.
    pub stale: bool,

    pub layers: Layers,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn with_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Ingest a newly loaded dataset, reset filters and colours, and fit.
    pub fn set_dataset(&mut self, dataset: MammalDataset) {
        self.filters = init_filter_state(&dataset);
        self.visible_indices = (0..dataset.len()).collect();
        self.color_map = dataset
            .levels
            .get(&Factor::Vore)
            .map(|levels| ColorMap::new(Factor::Vore, levels));

        self.dataset = Some(dataset);
        self.status_message = None;
        self.refit();
    }

    /// Recompute `visible_indices`; refit when the selection changed.
    pub fn refilter(&mut self) {
        let Some(ds) = &self.dataset else {
            return;
        };
        let visible = filtered_indices(ds, &self.filters);
        if visible != self.visible_indices {
            self.visible_indices = visible;
            self.refit();
        }
    }

    /// Fit both models to the visible mammals with the current settings.
    pub fn refit(&mut self) {
        self.stale = false;
        let Some(ds) = &self.dataset else {
            return;
        };
        let mammals = self.visible_indices.iter().map(|&i| &ds.mammals[i]);
        match analysis::run(mammals, &self.config) {
            Ok(result) => {
                self.analysis = Some(result);
                self.status_message = None;
            }
            Err(e) => {
                log::warn!("Refit failed: {e}");
                self.analysis = None;
                self.status_message = Some(format!("Error: {e}"));
            }
        }
    }

    /// Toggle a single level in a factor's filter.
    pub fn toggle_filter_value(&mut self, factor: Factor, level: &Level) {
        let selected = self.filters.entry(factor).or_default();
        if !selected.remove(level) {
            selected.insert(level.clone());
        }
        self.refilter();
    }

    /// Select every level of a factor.
    pub fn select_all(&mut self, factor: Factor) {
        if let Some(all) = self.dataset.as_ref().and_then(|ds| ds.levels.get(&factor)) {
            self.filters.insert(factor, all.clone());
            self.refilter();
        }
    }

    /// Deselect every level of a factor.
    pub fn select_none(&mut self, factor: Factor) {
        self.filters.insert(factor, BTreeSet::new());
        self.refilter();
    }

    /// Write the per-mammal summaries of the current fit.
    pub fn export_summary(&mut self, path: &Path) {
        let Some(result) = &self.analysis else {
            self.status_message = Some("Nothing to export: no fitted model".to_string());
            return;
        };
        match write_summary(path, &result.summary_records()) {
            Ok(()) => {
                self.status_message = Some(format!("Exported {}", path.display()));
            }
            Err(e) => {
                log::error!("Export failed: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_sleep::data::loader::load_builtin;

    fn quick_state() -> AppState {
        let mut state = AppState::with_config(AnalysisConfig {
            chains: 2,
            warmup: 200,
            draws_per_chain: 200,
            grid_points: 10,
            ..AnalysisConfig::default()
        });
        state.set_dataset(load_builtin().unwrap());
        state
    }

    #[test]
    fn loading_fits_every_usable_mammal() {
        let state = quick_state();
        let ds = state.dataset.as_ref().unwrap();
        assert_eq!(state.visible_indices.len(), ds.len());
        let fit = state.analysis.as_ref().unwrap();
        assert_eq!(fit.observed.len(), ds.usable_count());
        assert!(state.color_map.is_some());
    }

    #[test]
    fn filtering_refits_on_the_subset() {
        let mut state = quick_state();
        let before = state.analysis.as_ref().unwrap().observed.len();
        state.toggle_filter_value(Factor::Vore, &Some("herbi".to_string()));
        let after = state.analysis.as_ref().unwrap().observed.len();
        assert!(after < before);
    }

    #[test]
    fn empty_selection_reports_error() {
        let mut state = quick_state();
        state.select_none(Factor::Vore);
        assert!(state.visible_indices.is_empty());
        assert!(state.analysis.is_none());
        assert!(state.status_message.is_some());

        state.select_all(Factor::Vore);
        assert!(state.analysis.is_some());
    }

    #[test]
    fn export_writes_file() {
        let mut state = quick_state();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        state.export_summary(&path);
        assert!(path.exists());
    }
}
