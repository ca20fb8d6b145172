use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{Mammal, MammalDataset};

/// The 83-mammal sleep table shipped with the binary.
const MSLEEP_CSV: &str = include_str!("msleep.csv");

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// The built-in mammal sleep dataset.
pub fn load_builtin() -> Result<MammalDataset> {
    read_csv(MSLEEP_CSV.as_bytes()).context("parsing built-in msleep table")
}

/// Load a mammal sleep table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with the `msleep` column names, `NA` for missing
/// * `.json`    – `[{ "name": ..., "brainwt": ..., ... }, ...]`
/// * `.parquet` – one column per field (Utf8 / Float64 / Int)
pub fn load_file(path: &Path) -> Result<MammalDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => {
            let file = std::fs::File::open(path).context("opening CSV")?;
            read_csv(file)
        }
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row naming the columns; at least `name` is required,
/// other columns are optional and `NA` or empty marks a missing value.
fn read_csv<R: Read>(reader: R) -> Result<MammalDataset> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    if !headers.iter().any(|h| h == "name") {
        bail!("CSV missing 'name' column");
    }

    let mut mammals = Vec::new();
    for (row_no, result) in reader.deserialize::<Mammal>().enumerate() {
        let mammal = result.with_context(|| format!("CSV row {row_no}"))?;
        mammals.push(mammal);
    }

    Ok(MammalDataset::from_mammals(mammals))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented JSON (`df.to_json(orient='records')` / `jsonlite::toJSON`):
///
/// ```json
/// [
///   { "name": "Cheetah", "vore": "carni", "sleep_total": 12.1, "brainwt": null },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<MammalDataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let mammals: Vec<Mammal> = serde_json::from_str(&text).context("parsing JSON")?;
    Ok(MammalDataset::from_mammals(mammals))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one column per field. Works with files written
/// by Pandas (`df.to_parquet()`), Polars and `arrow::write_parquet()`.
fn load_parquet(path: &Path) -> Result<MammalDataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut mammals = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let name_idx = schema
            .index_of("name")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'name' column"))?;
        let column = |field: &str| column_index(&schema, field).map(|i| batch.column(i));

        for row in 0..batch.num_rows() {
            let name = string_at(batch.column(name_idx), row)
                .with_context(|| format!("Row {row}: missing name"))?;
            let text = |field: &str| column(field).and_then(|c| string_at(c, row));
            let number = |field: &str| column(field).and_then(|c| float_at(c, row));

            mammals.push(Mammal {
                name,
                genus: text("genus"),
                vore: text("vore"),
                order: text("order"),
                conservation: text("conservation"),
                sleep_total: number("sleep_total"),
                sleep_rem: number("sleep_rem"),
                sleep_cycle: number("sleep_cycle"),
                awake: number("awake"),
                brainwt: number("brainwt"),
                bodywt: number("bodywt"),
            });
        }
    }

    Ok(MammalDataset::from_mammals(mammals))
}

// -- Parquet / Arrow helpers --

fn column_index(schema: &Arc<Schema>, field: &str) -> Option<usize> {
    schema.index_of(field).ok()
}

/// A string cell; `NA` and nulls are `None`.
fn string_at(col: &Arc<dyn Array>, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    let value = match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|s| s.value(row).to_string()),
        DataType::LargeUtf8 => Some(col.as_string::<i64>().value(row).to_string()),
        _ => None,
    }?;
    (value != "NA" && !value.is_empty()).then_some(value)
}

/// A numeric cell widened to `f64`; nulls and NaN are `None`.
fn float_at(col: &Arc<dyn Array>, row: usize) -> Option<f64> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        _ => None,
    }?;
    (!value.is_nan()).then_some(value)
}
