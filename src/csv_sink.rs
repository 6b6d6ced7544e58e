use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::batch::ReviewSink;
use crate::db::Review;

const HEADERS: [&str; 6] = ["Username", "Hours", "Date", "Review", "Helpful", "Funny"];

/// Append-only CSV sink, one file per app. Before appending it re-reads the
/// file's `Review` column into a file-local seen-set, so re-running against a
/// partially written file never duplicates rows. That guard is deliberately
/// separate from the run's in-memory dedup set: it protects the file's prior
/// contents, not this run's memory.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: &Path, app_id: i32) -> Self {
        Self {
            path: output_dir.join(format!("steam_reviews_app_{app_id}.csv")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, reviews: &[Review]) -> Result<usize> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let already_seen = self.existing_bodies()?;
        let needs_header = self
            .path
            .metadata()
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(HEADERS)?;
        }

        let mut written = 0;
        for review in reviews {
            if already_seen.contains(&review.body) {
                continue;
            }
            writer.serialize(review)?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    fn existing_bodies(&self) -> Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let body_column = reader
            .headers()?
            .iter()
            .position(|h| h == "Review");

        let mut seen = HashSet::new();
        if let Some(idx) = body_column {
            for record in reader.records() {
                if let Some(body) = record?.get(idx) {
                    seen.insert(body.to_string());
                }
            }
        }
        Ok(seen)
    }
}

#[async_trait]
impl ReviewSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn write_batch(&mut self, reviews: &[Review]) {
        match self.append(reviews) {
            Ok(written) => info!(
                written,
                batch = reviews.len(),
                path = %self.path.display(),
                "Appended batch to CSV"
            ),
            Err(e) => error!(
                error = %e,
                path = %self.path.display(),
                "CSV append failed, batch not persisted to file"
            ),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::review;

    #[tokio::test]
    async fn writes_header_once_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), 220);

        sink.write_batch(&[review("first"), review("second")]).await;
        sink.write_batch(&[review("third")]).await;

        let contents = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Username,Hours,Date,Review,Helpful,Funny");
        assert!(lines[1].contains("first"));
        assert!(lines[3].contains("third"));
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), 220);

        sink.write_batch(&[review("Great game")]).await;
        // A later run, same file: the body is already on disk.
        let mut sink = CsvSink::new(dir.path(), 220);
        sink.write_batch(&[review("Great game"), review("Another take")]).await;

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.matches("Great game").count(), 1);
        assert_eq!(contents.matches("Another take").count(), 1);
    }

    #[tokio::test]
    async fn row_columns_follow_the_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path(), 220);

        let mut r = review("Solid.");
        r.username = "vet".to_string();
        r.hours_played = "9.9 hrs on record".to_string();
        r.posted_date = "3 March".to_string();
        r.helpful_count = 12;
        r.funny_count = 3;
        sink.write_batch(&[r]).await;

        let contents = fs::read_to_string(sink.path()).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert_eq!(row, "vet,9.9 hrs on record,3 March,Solid.,12,3");
    }

    #[tokio::test]
    async fn file_is_named_after_the_app() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), 570);
        assert!(sink
            .path()
            .ends_with("steam_reviews_app_570.csv"));
    }
}
