use std::collections::BTreeMap;

use eframe::egui::{Color32, Stroke, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints, PlotUi, Points, Polygon};

use rusty_sleep::analysis::{Analysis, BrainWeight};
use rusty_sleep::data::model::level_label;
use rusty_sleep::stats::PredictionSummary;

use crate::color::SeriesColors;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Regression plot (central panel)
// ---------------------------------------------------------------------------

/// Render sleep against log brain weight with the fitted layers.
pub fn regression_plot(ui: &mut Ui, state: &AppState) {
    if state.dataset.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open a file to fit  (File → Open…)");
        });
        return;
    }
    let Some(analysis) = &state.analysis else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No fit for the current selection");
        });
        return;
    };

    let layers = state.layers;

    Plot::new("regression_plot")
        .legend(Legend::default())
        .x_axis_label("log(brain weight, kg)")
        .y_axis_label("Total sleep (h)")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            if layers.predictive {
                ribbon(
                    plot_ui,
                    &analysis.grid_predictive,
                    SeriesColors::PREDICTIVE_RIBBON,
                    "posterior predictive",
                );
            }
            if layers.linpred {
                ribbon(
                    plot_ui,
                    &analysis.grid_linpred,
                    SeriesColors::LINPRED_RIBBON,
                    "linear predictor",
                );
                plot_ui.line(
                    Line::new(median_points(&analysis.grid_linpred))
                        .name("posterior median")
                        .color(SeriesColors::MEDIAN)
                        .width(2.0),
                );
            }
            if layers.posterior_lines {
                posterior_lines(plot_ui, analysis, state.config.posterior_lines);
            }
            if layers.ols {
                ribbon(
                    plot_ui,
                    &analysis.ols_confidence,
                    SeriesColors::OLS_BAND,
                    "OLS confidence",
                );
                plot_ui.line(
                    Line::new(median_points(&analysis.ols_confidence))
                        .name("OLS fit")
                        .color(SeriesColors::OLS)
                        .width(2.0),
                );
            }
            if layers.points {
                observed_points(plot_ui, state, analysis);
            }
        });
}

fn median_points(summaries: &[PredictionSummary<BrainWeight>]) -> PlotPoints<'static> {
    summaries
        .iter()
        .map(|s| [s.covariates.log_brainwt, s.median])
        .collect()
}

/// Interval band along the grid. egui fills only convex polygons, so the
/// band is drawn as one quad per grid step under a shared legend name.
fn ribbon(
    plot_ui: &mut PlotUi,
    summaries: &[PredictionSummary<BrainWeight>],
    color: Color32,
    name: &str,
) {
    for pair in summaries.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (xa, xb) = (a.covariates.log_brainwt, b.covariates.log_brainwt);
        let quad = vec![[xa, a.lower], [xb, b.lower], [xb, b.upper], [xa, a.upper]];
        plot_ui.polygon(
            Polygon::new(PlotPoints::from(quad))
                .name(name)
                .fill_color(color)
                .stroke(Stroke::NONE),
        );
    }
}

fn posterior_lines(plot_ui: &mut PlotUi, analysis: &Analysis, n: usize) {
    let Some((lo, hi)) = analysis.x_range() else {
        return;
    };
    for draw in analysis.posterior.thinned(n) {
        let points = vec![
            [lo, draw.linear_predictor(&[1.0, lo])],
            [hi, draw.linear_predictor(&[1.0, hi])],
        ];
        plot_ui.line(
            Line::new(PlotPoints::from(points))
                .name("posterior draws")
                .color(SeriesColors::POSTERIOR_LINE)
                .width(1.0),
        );
    }
}

/// Observed mammals, one series per diet so the legend doubles as a key.
fn observed_points(plot_ui: &mut PlotUi, state: &AppState, analysis: &Analysis) {
    let mut by_vore: BTreeMap<Option<String>, Vec<[f64; 2]>> = BTreeMap::new();
    for row in analysis.observed.iter() {
        let c = &row.covariates;
        by_vore
            .entry(c.vore.clone())
            .or_default()
            .push([c.log_brainwt, c.sleep_total]);
    }

    for (vore, points) in by_vore {
        let color = state
            .color_map
            .as_ref()
            .map(|cm| cm.color_for(&vore))
            .unwrap_or(Color32::LIGHT_BLUE);
        plot_ui.points(
            Points::new(PlotPoints::from(points))
                .name(level_label(&vore))
                .color(color)
                .radius(3.5),
        );
    }
}
