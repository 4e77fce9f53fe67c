use std::sync::Mutex;

use anyhow::Error;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::pipeline::report::IngestionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Receives live updates for one run. Called after every row, once more with
/// `processed == total`, then on_complete. Failures are logged by the pipeline and
/// never stop the run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, progress: Progress) -> Result<(), Error>;

    async fn on_complete(&self, result: &IngestionResult) -> Result<(), Error>;
}

pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn on_progress(&self, _progress: Progress) -> Result<(), Error> {
        Ok(())
    }

    async fn on_complete(&self, _result: &IngestionResult) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes progress to the log, at info level every `every` rows.
pub struct LogProgressSink {
    pub upload_id: String,
    pub every: usize,
}

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn on_progress(&self, progress: Progress) -> Result<(), Error> {
        if self.every > 0 && progress.processed % self.every == 0 {
            info!(
                upload_id = %self.upload_id,
                "Processed {} of {} rows", progress.processed, progress.total
            );
        } else {
            debug!(
                upload_id = %self.upload_id,
                "Processed {} of {} rows", progress.processed, progress.total
            );
        }
        Ok(())
    }

    async fn on_complete(&self, result: &IngestionResult) -> Result<(), Error> {
        info!(upload_id = %self.upload_id, "{}", result.summary_message());
        Ok(())
    }
}

/// The message shape pushed to live observers (e.g. a websocket fan-out).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        upload_id: String,
        #[serde(flatten)]
        progress: Progress,
    },
    Complete {
        upload_id: String,
        result: IngestionResult,
        message: String,
    },
}

/// Forwards updates over a channel to whatever transport owns the receiver.
pub struct ChannelProgressSink {
    upload_id: String,
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(upload_id: impl Into<String>, sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            upload_id: upload_id.into(),
            sender,
        }
    }
}

#[async_trait]
impl ProgressSink for ChannelProgressSink {
    async fn on_progress(&self, progress: Progress) -> Result<(), Error> {
        self.sender
            .send(ProgressEvent::Progress {
                upload_id: self.upload_id.clone(),
                progress,
            })
            .await?;
        Ok(())
    }

    async fn on_complete(&self, result: &IngestionResult) -> Result<(), Error> {
        self.sender
            .send(ProgressEvent::Complete {
                upload_id: self.upload_id.clone(),
                result: result.clone(),
                message: result.summary_message(),
            })
            .await?;
        Ok(())
    }
}

/// Keeps every update in memory, handy for asserting ordering in tests.
#[derive(Default)]
pub struct RecordingProgressSink {
    pub updates: Mutex<Vec<Progress>>,
    pub completed: Mutex<Vec<IngestionResult>>,
}

impl RecordingProgressSink {
    pub fn updates(&self) -> Vec<Progress> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn completed(&self) -> Vec<IngestionResult> {
        self.completed.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgressSink {
    async fn on_progress(&self, progress: Progress) -> Result<(), Error> {
        self.updates
            .lock()
            .map_err(|_| Error::msg("poisoned progress lock"))?
            .push(progress);
        Ok(())
    }

    async fn on_complete(&self, result: &IngestionResult) -> Result<(), Error> {
        self.completed
            .lock()
            .map_err(|_| Error::msg("poisoned progress lock"))?
            .push(result.clone());
        Ok(())
    }
}
