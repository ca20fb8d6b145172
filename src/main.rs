mod app;
mod color;
mod state;
mod ui;

use std::path::PathBuf;

use anyhow::Context;
use app::RustySleepApp;
use eframe::egui;
use rusty_sleep::analysis::AnalysisConfig;
use rusty_sleep::data::loader::load_builtin;
use state::AppState;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Optional first argument: JSON analysis config.
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => AnalysisConfig::load(&path)?,
        None => AnalysisConfig::default(),
    };

    let mut state = AppState::with_config(config);
    match load_builtin() {
        Ok(dataset) => state.set_dataset(dataset),
        Err(e) => {
            log::error!("Built-in dataset unavailable: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty Sleep – Regression Explorer",
        options,
        Box::new(|_cc| Ok(Box::new(RustySleepApp::new(state)))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
    .context("running the viewer")
}
