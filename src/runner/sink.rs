//! Result sinks
//!
//! Every committed cache update is reported to a sink as a [`ResultEvent`].
//! Recording never blocks the task pass and its failures never reach it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

/// Keys probed, in order, for a plottable number inside an object result
const NUMERIC_KEYS: &[&str] = &["last", "price", "close", "value"];

/// Where a result came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Market symbol the task was asked about, when one can be told
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// A committed task result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    pub task: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

impl ResultEvent {
    /// Extract a single number suitable for charts and thresholds
    ///
    /// Numbers are taken as-is, objects are probed for `last`, `price`,
    /// `close` then `value`, and numeric strings are parsed.
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            Value::Number(n) => n.as_f64(),
            Value::Object(map) => NUMERIC_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_f64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Raw textual form of the value
    pub fn raw_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Receiver of committed results
pub trait ResultSink: Send + Sync {
    /// Record a result; must not block
    fn record(&self, event: ResultEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn record(&self, _event: ResultEvent) {}
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ResultEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ResultEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResultEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ResultSink for ChannelSink {
    fn record(&self, event: ResultEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Result receiver dropped, discarding result for {}", e.0.task);
        }
    }
}

/// One line of a [`JsonLinesSink`] file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub task: String,
    pub timestamp: DateTime<Utc>,
    pub value_num: Option<f64>,
    pub value_raw: String,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl From<&ResultEvent> for StoredRecord {
    fn from(event: &ResultEvent) -> Self {
        StoredRecord {
            task: event.task.clone(),
            timestamp: event.timestamp,
            value_num: event.numeric_value(),
            value_raw: event.raw_value(),
            provenance: event.provenance.clone(),
        }
    }
}

/// Message handled by the [`JsonLinesSink`] writer task
#[derive(Debug)]
enum WriterMessage {
    Record(StoredRecord),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON record per result to a file
///
/// Records are handed to a background writer task, so `record` only
/// enqueues and the file is written with async I/O off the task pass.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode and start the writer task
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_records(file, path.clone(), rx));
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every record enqueued so far has been written out
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(ack)).is_err() {
            warn!("Result writer for {} has stopped", self.path.display());
            return;
        }
        let _ = done.await;
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&self, event: ResultEvent) {
        let record = StoredRecord::from(&event);
        if self.tx.send(WriterMessage::Record(record)).is_err() {
            error!(
                "Result writer for {} has stopped, discarding result for {}",
                self.path.display(),
                event.task
            );
        }
    }
}

async fn write_records(
    mut file: File,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Record(record) => {
                if let Err(e) = append(&mut file, &record).await {
                    error!(
                        "Failed to store result for {} in {}: {}",
                        record.task,
                        path.display(),
                        e
                    );
                }
            }
            WriterMessage::Flush(ack) => {
                if let Err(e) = file.flush().await {
                    error!("Failed to flush {}: {}", path.display(), e);
                }
                let _ = ack.send(());
            }
        }
    }

    let _ = file.flush().await;
}

async fn append(file: &mut File, record: &StoredRecord) -> io::Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    file.write_all(line.as_bytes()).await
}
