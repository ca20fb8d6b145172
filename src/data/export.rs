use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SummaryRecord – one exported row
// ---------------------------------------------------------------------------

/// Flat, file-friendly form of a per-observation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Which draws were summarized: `linpred` or `predict`.
    pub kind: String,
    pub observation: usize,
    pub name: String,
    pub log_brainwt: f64,
    pub sleep_total: Option<f64>,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Write summary rows to `path`, format chosen by extension
/// (`.csv`, `.json`, `.parquet` / `.pq`).
pub fn write_summary(path: &Path, records: &[SummaryRecord]) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => write_csv(path, records),
        "json" => {
            let text = serde_json::to_string_pretty(records).context("serialising JSON")?;
            std::fs::write(path, text).context("writing JSON file")
        }
        "parquet" | "pq" => write_parquet(path, records),
        other => bail!("Unsupported export extension: .{other}"),
    }?;

    log::info!("Wrote {} summary rows to {}", records.len(), path.display());
    Ok(())
}

fn write_csv(path: &Path, records: &[SummaryRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV file")?;
    for record in records {
        writer.serialize(record).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV file")
}

fn write_parquet(path: &Path, records: &[SummaryRecord]) -> Result<()> {
    let float_column = |f: fn(&SummaryRecord) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from(records.iter().map(f).collect::<Vec<_>>()))
    };

    let schema = Arc::new(Schema::new(vec![
        Field::new("kind", DataType::Utf8, false),
        Field::new("observation", DataType::UInt64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("log_brainwt", DataType::Float64, false),
        Field::new("sleep_total", DataType::Float64, true),
        Field::new("median", DataType::Float64, false),
        Field::new("lower", DataType::Float64, false),
        Field::new("upper", DataType::Float64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.kind.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(
            records.iter().map(|r| r.observation as u64),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.name.as_str()),
        )),
        float_column(|r| r.log_brainwt),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.sleep_total).collect::<Vec<_>>(),
        )),
        float_column(|r| r.median),
        float_column(|r| r.lower),
        float_column(|r| r.upper),
    ];

    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("building summary record batch")?;
    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn records() -> Vec<SummaryRecord> {
        vec![
            SummaryRecord {
                kind: "linpred".to_string(),
                observation: 1,
                name: "Owl monkey".to_string(),
                log_brainwt: 0.0155_f64.ln(),
                sleep_total: Some(17.0),
                median: 11.2,
                lower: 10.1,
                upper: 12.3,
            },
            SummaryRecord {
                kind: "predict".to_string(),
                observation: 1,
                name: "Owl monkey".to_string(),
                log_brainwt: 0.0155_f64.ln(),
                sleep_total: None,
                median: 11.1,
                lower: 4.0,
                upper: 18.5,
            },
        ]
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        write_summary(&path, &records()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let back: Vec<SummaryRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(back, records());
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_summary(&path, &records()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: Vec<SummaryRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records());
    }

    #[test]
    fn parquet_has_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.parquet");
        write_summary(&path, &records()).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_summary(&dir.path().join("out.txt"), &records()).is_err());
    }
}
