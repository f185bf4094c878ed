//! Poll reading sources.
//!
//! The scraper that produces readings runs elsewhere; this side only reads
//! the scalar margin and its as-of time.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, PollConfig, PollReading};
use serde::Deserialize;
use tracing::{debug, warn};

/// Vote shares used when the scraper has nothing: Dem 47 / Rep 43.
pub const FALLBACK_DEM_SHARE: f64 = 47.0;
pub const FALLBACK_REP_SHARE: f64 = 43.0;

#[async_trait]
pub trait PollSource: Send + Sync {
    async fn fetch(&self) -> Result<PollReading, Error>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// On-disk reading: either the margin itself or both vote shares.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadingFile {
    Margin {
        margin_points: f64,
        as_of: DateTime<Utc>,
    },
    Shares {
        dem: f64,
        rep: f64,
        as_of: DateTime<Utc>,
    },
}

/// Reads the JSON file the scraper rewrites.
#[derive(Debug, Clone)]
pub struct FilePollSource {
    path: PathBuf,
}

impl FilePollSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PollSource for FilePollSource {
    async fn fetch(&self) -> Result<PollReading, Error> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let reading = match serde_json::from_str::<ReadingFile>(&raw)? {
            ReadingFile::Margin {
                margin_points,
                as_of,
            } => PollReading::new(margin_points, as_of)?,
            ReadingFile::Shares { dem, rep, as_of } => PollReading::from_shares(dem, rep, as_of)?,
        };
        debug!(
            "Poll reading from {}: {:+.1} as of {}",
            self.path.display(),
            reading.margin_points,
            reading.as_of
        );
        Ok(reading)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Constant margin, stamped with the fetch time.
#[derive(Debug, Clone, Copy)]
pub struct FixedPollSource {
    margin_points: f64,
}

impl FixedPollSource {
    pub fn new(margin_points: f64) -> Result<Self, Error> {
        common::validate_margin(margin_points)?;
        Ok(Self { margin_points })
    }

    /// D+4, from the fallback vote shares.
    pub fn historical_fallback() -> Self {
        Self {
            margin_points: FALLBACK_DEM_SHARE - FALLBACK_REP_SHARE,
        }
    }
}

#[async_trait]
impl PollSource for FixedPollSource {
    async fn fetch(&self) -> Result<PollReading, Error> {
        PollReading::new(self.margin_points, Utc::now())
    }

    fn describe(&self) -> String {
        format!("fixed:{:+.1}", self.margin_points)
    }
}

/// Pick the configured source: the reading file when set, otherwise the
/// configured fixed margin, otherwise the historical fallback.
pub fn poll_source_from_config(cfg: &PollConfig) -> Result<Box<dyn PollSource>, Error> {
    if let Some(path) = &cfg.reading_path {
        return Ok(Box::new(FilePollSource::new(path)));
    }
    match cfg.fallback_margin_points {
        Some(margin) => Ok(Box::new(FixedPollSource::new(margin)?)),
        None => {
            warn!(
                "No poll source configured; using fallback Dem {:.0} / Rep {:.0}",
                FALLBACK_DEM_SHARE, FALLBACK_REP_SHARE
            );
            Ok(Box::new(FixedPollSource::historical_fallback()))
        }
    }
}
