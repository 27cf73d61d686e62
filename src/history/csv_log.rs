//! Append-only CSV history log.

use super::{HistoryStore, RecordId, StoreError};
use crate::extract::{Observation, ObservationRecord};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// History kept as rows of a local CSV file, one row per observation.
///
/// Record ids are 1-based row numbers. The existing rows are counted on the
/// first append only; later appends increment the cached count.
pub struct CsvLog {
    path: PathBuf,
    rows: Arc<Mutex<Option<usize>>>,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), rows: Arc::new(Mutex::new(None)) }
    }
}

/// Appends under the row-count lock so ids stay sequential.
fn append_numbered(
    path: &Path,
    record: &ObservationRecord,
    rows: &Mutex<Option<usize>>,
) -> Result<RecordId, StoreError> {
    let mut rows = rows.lock().unwrap_or_else(PoisonError::into_inner);
    let existing = match *rows {
        Some(n) => n,
        None => count_rows(path)?,
    };

    append_record(path, record)?;

    let id = existing + 1;
    *rows = Some(id);
    Ok(id.to_string())
}

/// Writes one record, adding the header row when the file is new or empty.
fn append_record(path: &Path, record: &ObservationRecord) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new().has_headers(needs_header).from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

fn count_rows(path: &Path) -> Result<usize, StoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(reader.records().count())
}

/// Reads every well-formed row, oldest first. A missing file is empty history.
fn read_records(path: &Path) -> Result<Vec<ObservationRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records = Vec::new();

    for (line, row) in reader.deserialize::<ObservationRecord>().enumerate() {
        match row {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed history row {} in {}: {}", line + 2, path.display(), e),
        }
    }

    Ok(records)
}

#[async_trait]
impl HistoryStore for CsvLog {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn append(&self, observation: &Observation) -> Result<RecordId, StoreError> {
        let path = self.path.clone();
        let record = observation.to_record();
        let rows = Arc::clone(&self.rows);

        tokio::task::spawn_blocking(move || append_numbered(&path, &record, &rows))
            .await
            .map_err(|e| StoreError::Unreachable(format!("CSV writer task failed: {}", e)))?
    }

    async fn most_recent(&self, n: usize) -> Vec<Observation> {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || read_records(&path)).await;

        let records = match result {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                return Vec::new();
            }
            Err(e) => {
                warn!("CSV reader task failed: {}", e);
                return Vec::new();
            }
        };

        debug!("Read {} rows from {}", records.len(), self.path.display());

        records.into_iter().rev().take(n).map(ObservationRecord::into_observation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Field, NotAvailable, ParsedPrice, Reading};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn observation(minute: i64, price: Option<f64>) -> Observation {
        let ts = Utc.with_ymd_and_hms(2025, 3, 24, 12, 0, 0).unwrap() + Duration::minutes(minute);
        let parsed = match price {
            Some(p) => Ok(ParsedPrice { display: format!("$ {}", p), numeric: Some(p) }),
            None => Err(NotAvailable),
        };
        Observation::new(
            ts,
            Reading::Value("Widget, Large".to_string()),
            parsed,
            Reading::Value("-10%".to_string()),
            Reading::Value("4.3 out of 5".to_string()),
            Reading::Unavailable,
        )
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");
        let log = CsvLog::new(&path);

        assert_eq!(log.append(&observation(0, Some(10.0))).await.unwrap(), "1");
        assert_eq!(log.append(&observation(1, Some(11.0))).await.unwrap(), "2");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ObservationRecord::COLUMNS.join(","));
        assert!(lines[1].starts_with("2025-03-24 12:00:00,\"Widget, Large\",$ 10,10.0,-10%"));
    }

    #[tokio::test]
    async fn test_ids_continue_existing_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");

        let first = CsvLog::new(&path);
        first.append(&observation(0, Some(10.0))).await.unwrap();
        first.append(&observation(1, Some(11.0))).await.unwrap();

        let reopened = CsvLog::new(&path);
        assert_eq!(reopened.append(&observation(2, Some(12.0))).await.unwrap(), "3");
        assert_eq!(reopened.append(&observation(3, Some(13.0))).await.unwrap(), "4");
        assert_eq!(reopened.append(&observation(4, Some(14.0))).await.unwrap(), "5");

        assert_eq!(reopened.most_recent(10).await.len(), 5);
    }

    #[tokio::test]
    async fn test_round_trip_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(dir.path().join("history.csv"));

        for (minute, price) in [(0, 10.0), (1, 11.0), (2, 12.0)] {
            log.append(&observation(minute, Some(price))).await.unwrap();
        }

        let recent = log.most_recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], observation(2, Some(12.0)));
        assert_eq!(recent[1], observation(1, Some(11.0)));
    }

    #[tokio::test]
    async fn test_sentinels_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(dir.path().join("history.csv"));
        log.append(&observation(0, None)).await.unwrap();

        let recent = log.most_recent(1).await;
        assert_eq!(recent[0].price_raw(), &Reading::Unavailable);
        assert!(recent[0].price_numeric().is_none());
        assert_eq!(recent[0].rating_count().display(Field::RatingCount), "Not available");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(dir.path().join("absent.csv"));
        assert!(log.most_recent(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("logs").join("history.csv");
        let log = CsvLog::new(&path);

        log.append(&observation(0, Some(10.0))).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reads_legacy_columns_and_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "timestamp,product_name,price,price_numeric,discount,rating,num_ratings,bought_30_days\n\
             2025-03-24 12:00:00,Widget,$ 10,10.0,No discount,Not available,Not available,100+\n\
             garbage,Widget,$ 11,11.0,No discount,Not available,Not available,\n\
             2025-03-24 12:05:00,Widget,$ 12,12.0,-5%,4.1 out of 5,88,50+\n",
        )
        .unwrap();

        let recent = CsvLog::new(&path).most_recent(5).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].price_numeric(), Some(12.0));
        assert_eq!(recent[0].rating_count(), &Reading::Value("88".to_string()));
        assert_eq!(recent[1].discount(), &Reading::Unavailable);
    }
}
