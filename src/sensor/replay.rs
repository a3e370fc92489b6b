//! # Replay Source
//!
//! Plays back a recorded sample stream with its original timing.
//!
//! ## File Format
//!
//! JSON Lines, one sample per line. `t_ms` is the offset from the start of
//! the recording and must not decrease. Blank lines and lines starting with
//! `#` are skipped.
//!
//! ```text
//! {"kind":"gyro","t_ms":0,"x":0.0,"y":0.0,"z":0.12}
//! {"kind":"accel","t_ms":5,"x":0.01,"y":-0.02,"z":0.98}
//! {"kind":"gyro","t_ms":10,"x":0.0,"y":0.0,"z":0.12}
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use super::{Feeds, SampleSink, SensorKind, SensorSource};
use crate::error::{ImuBridgeError, Result};
use crate::orientation::Vector3;

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    kind: SensorKind,
    t_ms: u64,
    x: f64,
    y: f64,
    z: f64,
}

/// One recorded sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayEntry {
    pub kind: SensorKind,
    /// Offset from the start of the recording
    pub offset: Duration,
    pub value: Vector3,
}

/// Parse a JSONL recording
///
/// # Errors
///
/// Returns `Replay` error naming the 1-based line number if a line is not a
/// valid record or its `t_ms` is lower than the previous record's
pub fn parse_recording(contents: &str) -> Result<Vec<ReplayEntry>> {
    let mut entries = Vec::new();
    let mut last_offset = Duration::ZERO;

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: ReplayRecord = serde_json::from_str(line)
            .map_err(|e| ImuBridgeError::Replay(format!("line {}: {}", index + 1, e)))?;

        let offset = Duration::from_millis(record.t_ms);
        if offset < last_offset {
            return Err(ImuBridgeError::Replay(format!(
                "line {}: t_ms {} goes backwards",
                index + 1,
                record.t_ms
            )));
        }
        last_offset = offset;

        entries.push(ReplayEntry {
            kind: record.kind,
            offset,
            value: Vector3::new(record.x, record.y, record.z),
        });
    }

    Ok(entries)
}

/// Sensor source backed by a recording
#[derive(Debug)]
pub struct ReplaySource {
    entries: Arc<[ReplayEntry]>,
    looping: bool,
    feeds: Feeds,
}

impl ReplaySource {
    #[must_use]
    pub fn new(entries: Vec<ReplayEntry>, looping: bool) -> Self {
        Self {
            entries: entries.into(),
            looping,
            feeds: Feeds::default(),
        }
    }

    /// Load a recording from disk
    ///
    /// # Errors
    ///
    /// Returns `Replay` error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P, looping: bool) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ImuBridgeError::Replay(format!("failed to read {}: {}", path.display(), e)))?;
        let entries = parse_recording(&contents)?;
        info!("Loaded {} replay samples from {}", entries.len(), path.display());
        Ok(Self::new(entries, looping))
    }

    /// Number of recorded samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of one pass through the recording
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.entries.last().map_or(Duration::ZERO, |entry| entry.offset)
    }
}

impl SensorSource for ReplaySource {
    fn subscribe(&mut self, kind: SensorKind, sink: SampleSink) -> Result<()> {
        if !self.entries.iter().any(|entry| entry.kind == kind) {
            warn!("Replay recording has no {} samples", kind);
        }

        let task = tokio::spawn(replay_feed(self.entries.clone(), kind, sink, self.looping));
        self.feeds.insert(kind, task);
        debug!("Subscribed to replayed {} samples", kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SensorKind) {
        if self.feeds.remove(kind) {
            debug!("Unsubscribed from replayed {} samples", kind);
        }
    }

    fn is_subscribed(&self, kind: SensorKind) -> bool {
        self.feeds.is_active(kind)
    }
}

async fn replay_feed(entries: Arc<[ReplayEntry]>, kind: SensorKind, sink: SampleSink, looping: bool) {
    let cycle = entries.last().map_or(Duration::ZERO, |entry| entry.offset);
    let mut base = Instant::now();

    loop {
        for entry in entries.iter().filter(|entry| entry.kind == kind) {
            let at = base + entry.offset;
            tokio::select! {
                _ = sink.closed() => return,
                _ = sleep_until(at) => {}
            }
            sink.deliver(kind, entry.value, at);
        }

        if !looping {
            break;
        }
        if cycle.is_zero() {
            warn!("Replay recording has zero length, not looping {} samples", kind);
            break;
        }
        base += cycle;
    }

    debug!("Replay of {} samples finished", kind);
}
