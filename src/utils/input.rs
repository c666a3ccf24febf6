//! Record lists read from JSON or CSV files.

use crate::core::batch::RecordSource;
use crate::core::error::{AppError, Result};
use crate::core::models::Record;

use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A record file, re-read from disk every time it is opened.
///
/// JSON files hold an array of objects; CSV files need a header row and
/// every cell becomes a string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Json(PathBuf),
    Csv(PathBuf),
}

impl FileSource {
    /// Picks the format from the extension; anything but `.csv` is JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            FileSource::Csv(path)
        } else {
            FileSource::Json(path)
        }
    }
}

fn read_json(path: &Path) -> Result<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    let values: Vec<Value> = serde_json::from_reader(reader)?;
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(record) => Ok(record),
            other => Err(AppError::Config(format!(
                "Record {} in '{}' is not an object: {}",
                index,
                path.display(),
                other
            ))),
        })
        .collect()
}

impl RecordSource for FileSource {
    fn open(&self) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send + '_>> {
        match self {
            FileSource::Json(path) => {
                tracing::debug!("Parsing JSON records from {}", path.display());
                Ok(Box::new(read_json(path)?.into_iter().map(Ok)))
            }
            FileSource::Csv(path) => {
                tracing::debug!("Reading CSV records from {}", path.display());
                let mut reader = csv::Reader::from_path(path)?;
                let headers = reader.headers()?.clone();
                Ok(Box::new(reader.into_records().map(move |row| {
                    let row = row?;
                    Ok(headers
                        .iter()
                        .zip(row.iter())
                        .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
                        .collect::<Record>())
                })))
            }
        }
    }
}
