use eframe::egui::{self, Color32, RichText, ScrollArea, Slider, Ui};
use egui_extras::{Column, TableBuilder};

use rusty_sleep::data::loader::{load_builtin, load_file};
use rusty_sleep::data::model::{level_label, Factor, MammalDataset};
use rusty_sleep::stats::bayes::ParameterSummary;
use rusty_sleep::stats::ols::Coefficient;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – model settings, filters, coefficient tables
// ---------------------------------------------------------------------------

/// Render the left panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    if state.dataset.is_none() {
        ui.heading("Model");
        ui.separator();
        ui.label("No dataset loaded.");
        return;
    }

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            model_settings(ui, state);
            ui.separator();
            layer_toggles(ui, state);
            ui.separator();
            filters(ui, state);
            ui.separator();
            coefficient_tables(ui, state);
        });
}

fn model_settings(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Model");

    let config = &mut state.config;
    let mut changed = false;
    changed |= ui
        .add(Slider::new(&mut config.p_lower, 0.001..=0.499).text("lower quantile"))
        .changed();
    changed |= ui
        .add(Slider::new(&mut config.p_upper, 0.501..=0.999).text("upper quantile"))
        .changed();
    changed |= ui
        .add(Slider::new(&mut config.chains, 1..=8).text("chains"))
        .changed();
    changed |= ui
        .add(Slider::new(&mut config.draws_per_chain, 100..=5000).text("draws / chain"))
        .changed();
    // Only affects drawing.
    ui.add(Slider::new(&mut config.posterior_lines, 0..=400).text("posterior lines"));
    if changed {
        state.stale = true;
    }

    ui.horizontal(|ui: &mut Ui| {
        let label = if state.stale { "Refit *" } else { "Refit" };
        if ui.button(label).clicked() {
            state.refit();
        }
        ui.label(format!(
            "{:.0}% intervals",
            (state.config.p_upper - state.config.p_lower) * 100.0
        ));
    });
}

fn layer_toggles(ui: &mut Ui, state: &mut AppState) {
    ui.strong("Layers");
    let layers = &mut state.layers;
    ui.checkbox(&mut layers.points, "Observed mammals");
    ui.checkbox(&mut layers.ols, "OLS fit + confidence band");
    ui.checkbox(&mut layers.posterior_lines, "Posterior draws");
    ui.checkbox(&mut layers.linpred, "Linear-predictor interval");
    ui.checkbox(&mut layers.predictive, "Predictive interval");
}

fn filters(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Filters");

    let Some(levels) = state.dataset.as_ref().map(|ds| ds.levels.clone()) else {
        return;
    };

    for factor in Factor::ALL {
        let Some(all_levels) = levels.get(&factor) else {
            continue;
        };

        let n_selected = state.filters.get(&factor).map_or(0, |s| s.len());
        let header_text = format!("{factor}  ({n_selected}/{})", all_levels.len());

        egui::CollapsingHeader::new(RichText::new(header_text).strong())
            .id_salt(factor.column_name())
            .default_open(factor == Factor::Vore)
            .show(ui, |ui: &mut Ui| {
                ui.horizontal(|ui: &mut Ui| {
                    if ui.small_button("All").clicked() {
                        state.select_all(factor);
                    }
                    if ui.small_button("None").clicked() {
                        state.select_none(factor);
                    }
                });

                for level in all_levels {
                    let mut checked = state
                        .filters
                        .get(&factor)
                        .is_some_and(|s| s.contains(level));

                    let mut text = RichText::new(level_label(level));
                    if let Some(cm) = state.color_map.as_ref().filter(|cm| cm.factor == factor) {
                        text = text.color(cm.color_for(level));
                    }

                    if ui.checkbox(&mut checked, text).changed() {
                        state.toggle_filter_value(factor, level);
                    }
                }
            });
    }
}

fn coefficient_tables(ui: &mut Ui, state: &AppState) {
    let Some(analysis) = &state.analysis else {
        return;
    };

    ui.strong(format!(
        "OLS  (n = {}, R² = {:.3})",
        analysis.observed.len(),
        analysis.ols.r_squared
    ));
    ui.push_id("ols_table", |ui: &mut Ui| {
        ols_table(ui, &analysis.ols.coefficients);
    });
    ui.label(format!("sigma = {:.3}", analysis.ols.sigma));

    ui.add_space(8.0);
    ui.strong(format!("Posterior  ({} draws)", analysis.posterior.len()));
    ui.push_id("posterior_table", |ui: &mut Ui| {
        posterior_table(ui, &analysis.parameters);
    });
}

fn ols_table(ui: &mut Ui, coefficients: &[Coefficient]) {
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::auto())
        .columns(Column::auto(), 3)
        .header(18.0, |mut header| {
            for title in ["term", "estimate", "std. err", "p"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for c in coefficients {
                body.row(18.0, |mut row| {
                    row.col(|ui| {
                        ui.label(c.term.as_str());
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.3}", c.estimate));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.3}", c.std_error));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2e}", c.p_value));
                    });
                });
            }
        });
}

fn posterior_table(ui: &mut Ui, parameters: &[ParameterSummary]) {
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::auto())
        .columns(Column::auto(), 4)
        .header(18.0, |mut header| {
            for title in ["term", "median", "MAD_SD", "interval", "R-hat"] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for p in parameters {
                body.row(18.0, |mut row| {
                    row.col(|ui| {
                        ui.label(p.term.as_str());
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.3}", p.median));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.3}", p.mad_sd));
                    });
                    row.col(|ui| {
                        ui.label(format!("[{:.2}, {:.2}]", p.lower, p.upper));
                    });
                    row.col(|ui| {
                        let text = p.rhat.map_or("–".to_string(), |r| format!("{r:.3}"));
                        ui.label(text);
                    });
                });
            }
        });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Built-in dataset").clicked() {
                load_into(state, load_builtin());
                ui.close_menu();
            }
            ui.separator();
            let can_export = state.analysis.is_some();
            if ui
                .add_enabled(can_export, egui::Button::new("Export summary…"))
                .clicked()
            {
                export_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(ds) = &state.dataset {
            ui.label(format!(
                "{} mammals loaded, {} selected",
                ds.len(),
                state.visible_indices.len()
            ));
        }
        if let Some(analysis) = &state.analysis {
            ui.separator();
            ui.label(format!("{} in the regression", analysis.observed.len()));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                ui.visuals().text_color()
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open mammal sleep data")
        .add_filter("Supported files", &["parquet", "pq", "json", "csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .add_filter("JSON", &["json"])
        .add_filter("CSV", &["csv"])
        .pick_file();

    if let Some(path) = file {
        load_into(state, load_file(&path));
    }
}

fn load_into(state: &mut AppState, result: anyhow::Result<MammalDataset>) {
    match result {
        Ok(dataset) => {
            log::info!(
                "Loaded {} mammals, {} usable for the regression",
                dataset.len(),
                dataset.usable_count()
            );
            state.set_dataset(dataset);
        }
        Err(e) => {
            log::error!("Failed to load file: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}

pub fn export_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export posterior summary")
        .set_file_name("sleep_summary.csv")
        .add_filter("CSV", &["csv"])
        .add_filter("JSON", &["json"])
        .add_filter("Parquet", &["parquet", "pq"])
        .save_file();

    if let Some(path) = file {
        state.export_summary(&path);
    }
}
