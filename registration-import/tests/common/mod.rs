//! Shared helpers for pipeline integration tests.
#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Error;
use async_trait::async_trait;
use registration_import::{
    flow::ImportFlow,
    pipeline::{report::IngestionResult, ImportRequest},
    progress::{Progress, ProgressSink},
    record::RawRow,
    schema::FieldSchema,
    store::{ExistingRecord, MemoryRegistrationStore, NewRegistration, RegistrationStore},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const EVENT_ID: &str = "event-2026";

pub fn row(cells: &[(&str, &str)]) -> RawRow {
    cells.iter().copied().collect()
}

pub fn classic_row(name: &str, email: &str) -> RawRow {
    row(&[("FullName", name), ("Email", email)])
}

pub fn classic_row_with_phone(name: &str, email: &str, phone: &str) -> RawRow {
    row(&[("FullName", name), ("Email", email), ("Phone", phone)])
}

pub fn request(schema: FieldSchema, rows: Vec<RawRow>) -> ImportRequest {
    request_for(ImportFlow::Registration, schema, rows)
}

pub fn request_for(flow: ImportFlow, schema: FieldSchema, rows: Vec<RawRow>) -> ImportRequest {
    ImportRequest {
        upload_id: Uuid::now_v7().to_string(),
        event_id: EVENT_ID.to_string(),
        flow,
        schema,
        rows,
    }
}

pub fn existing_email(email: &str) -> ExistingRecord {
    ExistingRecord {
        email: Some(email.to_string()),
        ..Default::default()
    }
}

pub fn existing_phone(phone: &str, iso_code: Option<&str>) -> ExistingRecord {
    ExistingRecord {
        phone: Some(phone.to_string()),
        iso_code: iso_code.map(str::to_string),
        ..Default::default()
    }
}

/// Wraps the memory store and misbehaves on request.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryRegistrationStore,
    pub fail_emails: HashSet<String>,
    pub panic_emails: HashSet<String>,
    pub fail_find_existing: bool,
    pub fail_count: bool,
    pub find_existing_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn failing_on(emails: &[&str]) -> Self {
        Self {
            fail_emails: emails.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn panicking_on(emails: &[&str]) -> Self {
        Self {
            panic_emails: emails.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn find_existing_calls(&self) -> usize {
        self.find_existing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationStore for FaultyStore {
    async fn find_existing(
        &self,
        event_id: &str,
        flow: ImportFlow,
    ) -> Result<Vec<ExistingRecord>, Error> {
        self.find_existing_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find_existing {
            anyhow::bail!("connection refused");
        }
        self.inner.find_existing(event_id, flow).await
    }

    async fn insert(&self, record: NewRegistration) -> Result<Uuid, Error> {
        let email = record.email.clone().unwrap_or_default();
        if self.panic_emails.contains(&email) {
            panic!("store blew up on {email}");
        }
        if self.fail_emails.contains(&email) {
            anyhow::bail!("write timed out for {email}");
        }
        self.inner.insert(record).await
    }

    async fn count_by_event(&self, event_id: &str, flow: ImportFlow) -> Result<u64, Error> {
        if self.fail_count {
            anyhow::bail!("connection reset");
        }
        self.inner.count_by_event(event_id, flow).await
    }
}

/// Cancels its token once `after` rows have been reported.
pub struct CancellingSink {
    pub token: CancellationToken,
    pub after: usize,
    pub updates: std::sync::Mutex<Vec<Progress>>,
}

impl CancellingSink {
    pub fn new(token: CancellationToken, after: usize) -> Arc<Self> {
        Arc::new(Self {
            token,
            after,
            updates: Default::default(),
        })
    }
}

#[async_trait]
impl ProgressSink for CancellingSink {
    async fn on_progress(&self, progress: Progress) -> Result<(), Error> {
        if progress.processed >= self.after {
            self.token.cancel();
        }
        self.updates
            .lock()
            .map_err(|_| Error::msg("poisoned"))?
            .push(progress);
        Ok(())
    }

    async fn on_complete(&self, _result: &IngestionResult) -> Result<(), Error> {
        Ok(())
    }
}

/// Fails every call, the run must carry on regardless.
pub struct BrokenSink;

#[async_trait]
impl ProgressSink for BrokenSink {
    async fn on_progress(&self, _progress: Progress) -> Result<(), Error> {
        anyhow::bail!("websocket closed")
    }

    async fn on_complete(&self, _result: &IngestionResult) -> Result<(), Error> {
        anyhow::bail!("websocket closed")
    }
}

pub fn assert_counts_add_up(result: &IngestionResult) {
    assert_eq!(result.imported + result.skipped, result.total);
    if !result.cancelled {
        assert_eq!(
            result.skipped,
            result.invalid + result.duplicates + result.storage_failures
        );
    }
}
