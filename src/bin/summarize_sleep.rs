//! Headless run: fit the built-in mammal sleep data and write the
//! per-mammal summaries.
//!
//! ```text
//! summarize_sleep <output.{csv,json,parquet}> [config.json]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rusty_sleep::analysis::{self, AnalysisConfig};
use rusty_sleep::data::export::write_summary;
use rusty_sleep::data::loader::load_builtin;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let Some(output) = args.next() else {
        bail!("usage: summarize_sleep <output.{{csv,json,parquet}}> [config.json]");
    };
    let config = match args.next() {
        Some(path) => AnalysisConfig::load(&path)?,
        None => AnalysisConfig::default(),
    };

    let dataset = load_builtin()?;
    let result = analysis::run(&dataset.mammals, &config).context("fitting the models")?;

    for p in &result.parameters {
        println!(
            "{:<12} median {:>8.3}  MAD_SD {:>6.3}  [{:.3}, {:.3}]",
            p.term, p.median, p.mad_sd, p.lower, p.upper
        );
    }

    write_summary(&output, &result.summary_records())
}
