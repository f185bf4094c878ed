//! Append-only JSONL journal of emitted signals, one file per UTC day.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use signals::Snapshot;
use tracing::warn;

const JOURNAL_DIR: &str = "SIGNALS";

fn resolve_repo_root() -> Option<PathBuf> {
    let mut cursor = std::env::current_dir().ok()?;
    loop {
        if cursor.join(".git").is_dir() {
            return Some(cursor);
        }
        if !cursor.pop() {
            return None;
        }
    }
}

/// `SIGNALS_DIR` if set, otherwise `SIGNALS/` at the repository root (or
/// the working directory outside a checkout).
pub fn resolve_journal_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("SIGNALS_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    resolve_repo_root()
        .map(|root| root.join(JOURNAL_DIR))
        .unwrap_or_else(|| PathBuf::from(JOURNAL_DIR))
}

pub struct SignalJournal {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl SignalJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = day_key(Utc::now());
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("signals-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> std::io::Result<()> {
        let today = day_key(now);
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    fn write_lines(&mut self, now: DateTime<Utc>, events: &[serde_json::Value]) -> std::io::Result<()> {
        self.rotate_if_needed(now)?;
        for event in events {
            writeln!(self.file, "{}", event)?;
        }
        self.file.flush()
    }

    /// Append one line per signal in the snapshot. Failures are logged.
    pub fn record(&mut self, snapshot: &Snapshot) {
        let Some(eval) = &snapshot.evaluation else {
            return;
        };
        let ts = snapshot.taken_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let events: Vec<serde_json::Value> = eval
            .signals
            .iter()
            .map(|signal| {
                json!({
                    "ts": ts,
                    "kind": "signal",
                    "tick": snapshot.tick,
                    "margin_points": eval.margin_points,
                    "stale": snapshot.stale,
                    "signal": signal,
                })
            })
            .collect();

        if let Err(e) = self.write_lines(snapshot.taken_at, &events) {
            warn!("Signal journal write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
