// THEORY:
// Export turns a result sequence into a flat table on disk and reads it back. The
// column order is fixed by `ResultRecord`: cell_id, x, y, width, height, brightness,
// then image_name for batch results. Records are written in sequence order, so a
// save followed by a load reproduces the same tuples in the same order.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core_modules::record::ResultRecord;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        extension.parse()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = AnalysisError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(AnalysisError::invalid_argument(
                "export format",
                format!("unknown format `{other}` (expected csv or json)"),
            )),
        }
    }
}

/// Writes the records to `path`. Fails with `InvalidState` when there is nothing to write.
pub fn save_results(records: &[ResultRecord], path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
    let path = path.as_ref();
    if records.is_empty() {
        return Err(AnalysisError::invalid_state(
            "no results to save; run an analysis pass first",
        ));
    }

    match format {
        ExportFormat::Csv => write_csv(records, path)?,
        ExportFormat::Json => write_json(records, path)?,
    }
    info!("saved {} results to {}", records.len(), path.display());
    Ok(())
}

/// Reads records previously written by [`save_results`].
pub fn load_results(path: impl AsRef<Path>, format: ExportFormat) -> Result<Vec<ResultRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnalysisError::not_found(path));
    }

    match format {
        ExportFormat::Csv => read_csv(path),
        ExportFormat::Json => read_json(path),
    }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Json {
        path: path.to_path_buf(),
        source,
    }
}

fn write_csv(records: &[ResultRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    for record in records {
        writer.serialize(record).map_err(csv_error(path))?;
    }
    writer.flush().map_err(io_error(path))
}

fn read_csv(path: &Path) -> Result<Vec<ResultRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    reader
        .deserialize()
        .map(|row| row.map_err(csv_error(path)))
        .collect()
}

fn write_json(records: &[ResultRecord], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records).map_err(json_error(path))?;
    writer.flush().map_err(io_error(path))
}

fn read_json(path: &Path) -> Result<Vec<ResultRecord>> {
    let file = File::open(path).map_err(io_error(path))?;
    serde_json::from_reader(BufReader::new(file)).map_err(json_error(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::region::Region;

    fn sample_records() -> Vec<ResultRecord> {
        vec![
            ResultRecord::new(&Region::new("cell_r1_c1", 0, 0, 10, 12).unwrap(), 101.25),
            ResultRecord::new(&Region::new("cell_r1_c2", 13, 0, 10, 12).unwrap(), 7.0 / 3.0),
            ResultRecord::new(&Region::new("cell_r2_c1", 0, 15, 10, 12).unwrap(), 0.0),
        ]
    }

    fn assert_same_tuples(left: &[ResultRecord], right: &[ResultRecord]) {
        assert_eq!(left.len(), right.len());
        for (a, b) in left.iter().zip(right) {
            assert_eq!((&a.cell_id, a.x, a.y, a.width, a.height), (&b.cell_id, b.x, b.y, b.width, b.height));
            assert!((a.brightness - b.brightness).abs() < 1e-9);
            assert_eq!(a.image_name, b.image_name);
        }
    }

    #[test]
    fn csv_round_trip_keeps_order_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let records = sample_records();
        save_results(&records, &path, ExportFormat::Csv).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("cell_id,x,y,width,height,brightness\n"));

        let loaded = load_results(&path, ExportFormat::Csv).unwrap();
        assert_same_tuples(&records, &loaded);
    }

    #[test]
    fn batch_records_carry_image_name_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.csv");
        let records: Vec<_> = sample_records()
            .into_iter()
            .map(|r| r.with_image_name("plate_01.tif"))
            .collect();
        save_results(&records, &path, ExportFormat::Csv).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("cell_id,x,y,width,height,brightness,image_name\n"));
        assert_same_tuples(&records, &load_results(&path, ExportFormat::Csv).unwrap());
    }

    #[test]
    fn json_round_trip_keeps_order_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let records = sample_records();
        save_results(&records, &path, ExportFormat::Json).unwrap();
        assert_same_tuples(&records, &load_results(&path, ExportFormat::Json).unwrap());
    }

    #[test]
    fn empty_results_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.csv");
        assert!(matches!(
            save_results(&[], &path, ExportFormat::Csv),
            Err(AnalysisError::InvalidState(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn format_tokens_and_extensions() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "excel".parse::<ExportFormat>(),
            Err(AnalysisError::InvalidArgument { .. })
        ));
        assert_eq!(ExportFormat::from_path(Path::new("out/RESULTS.CSV")).unwrap(), ExportFormat::Csv);
        assert!(ExportFormat::from_path(Path::new("out/results")).is_err());
    }
}
