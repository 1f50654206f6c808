//! Panel loading from CSV files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::DataConfig;
use crate::domain::{parse_timestamp, Panel, Record};
use crate::error::PipelineError;

/// Error type for data loading operations.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Panel(#[from] PipelineError),
}

/// Load a panel from a CSV file with a header row.
pub fn load_panel_csv(path: &Path, cfg: &DataConfig) -> Result<Panel, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let panel = read_panel_csv(BufReader::new(file), cfg)?;
    info!(
        path = %path.display(),
        series = panel.n_series(),
        rows = panel.len(),
        exogenous = ?panel.exogenous_columns(),
        "loaded panel"
    );
    Ok(panel)
}

/// Read a panel from any CSV source.
pub fn read_panel_csv<R: Read>(reader: R, cfg: &DataConfig) -> Result<Panel, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    };
    let id_idx = position(&cfg.id_column)?;
    let time_idx = position(&cfg.time_column)?;
    let target_idx = position(&cfg.target_column)?;

    let exogenous_columns: Vec<String> = match &cfg.exogenous_columns {
        Some(cols) => cols.clone(),
        None => headers
            .iter()
            .enumerate()
            .filter(|(i, _)| ![id_idx, time_idx, target_idx].contains(i))
            .map(|(_, h)| h.to_string())
            .collect(),
    };
    let exogenous_idx = exogenous_columns
        .iter()
        .map(|c| position(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let rec = result?;
        let field = |idx: usize| rec.get(idx).unwrap_or("");
        let number = |idx: usize, column: &str| {
            field(idx).parse::<f64>().map_err(|_| LoadError::InvalidValue {
                row: row + 1,
                column: column.to_string(),
                value: field(idx).to_string(),
            })
        };

        let timestamp = parse_timestamp(field(time_idx)).ok_or_else(|| LoadError::InvalidValue {
            row: row + 1,
            column: cfg.time_column.clone(),
            value: field(time_idx).to_string(),
        })?;
        let exogenous = exogenous_idx
            .iter()
            .zip(&exogenous_columns)
            .map(|(&idx, name)| number(idx, name))
            .collect::<Result<Vec<_>, _>>()?;

        records.push(Record {
            series_id: field(id_idx).to_string(),
            timestamp,
            value: number(target_idx, &cfg.target_column)?,
            exogenous,
        });
    }

    Ok(Panel::from_records(exogenous_columns, records)?)
}
