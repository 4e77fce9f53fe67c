use std::sync::Mutex;

use anyhow::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ExistingRecord, NewRegistration, RegistrationStore};
use crate::flow::ImportFlow;

#[derive(Debug, Clone)]
pub struct StoredRegistration {
    pub id: Uuid,
    pub record: NewRegistration,
    pub created_at: DateTime<Utc>,
}

/// In-process store, used by tests and local runs. Applies the same uniqueness rules
/// a database unique index would.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    records: Mutex<Vec<StoredRegistration>>,
    seeded: Mutex<Vec<(String, ImportFlow, ExistingRecord)>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds records that were "already there" before a run. They are returned by
    /// find_existing and counted, but not uniqueness checked against.
    pub fn seed(&self, event_id: &str, flow: ImportFlow, records: Vec<ExistingRecord>) {
        if let Ok(mut seeded) = self.seeded.lock() {
            seeded.extend(
                records
                    .into_iter()
                    .map(|r| (event_id.to_string(), flow, r)),
            );
        }
    }

    pub fn records(&self) -> Vec<StoredRegistration> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

fn conflicts(existing: &NewRegistration, new: &NewRegistration) -> bool {
    if existing.event_id != new.event_id || existing.flow != new.flow {
        return false;
    }
    let email_clash = match (&existing.email, &new.email) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    let phone_clash = match (&existing.phone, &new.phone) {
        (Some(a), Some(b)) => a
            .variants()
            .iter()
            .any(|v| b.variants().contains(v)),
        _ => false,
    };
    email_clash || phone_clash
}

fn to_existing(record: &NewRegistration) -> ExistingRecord {
    ExistingRecord {
        email: record.email.clone(),
        phone: record
            .phone
            .as_ref()
            .map(|p| p.with_country_code.clone().unwrap_or_else(|| p.local.clone())),
        iso_code: record.phone.as_ref().and_then(|p| p.iso_code.clone()),
        custom_fields: record.fields.to_field_map(),
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn find_existing(
        &self,
        event_id: &str,
        flow: ImportFlow,
    ) -> Result<Vec<ExistingRecord>, Error> {
        let seeded = self
            .seeded
            .lock()
            .map_err(|_| Error::msg("poisoned memory store lock"))?;
        let records = self
            .records
            .lock()
            .map_err(|_| Error::msg("poisoned memory store lock"))?;

        let mut existing: Vec<ExistingRecord> = seeded
            .iter()
            .filter(|(e, f, _)| e == event_id && *f == flow)
            .map(|(_, _, r)| r.clone())
            .collect();
        existing.extend(
            records
                .iter()
                .filter(|s| s.record.event_id == event_id && s.record.flow == flow)
                .map(|s| to_existing(&s.record)),
        );
        Ok(existing)
    }

    async fn insert(&self, record: NewRegistration) -> Result<Uuid, Error> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::msg("poisoned memory store lock"))?;

        if records.iter().any(|s| conflicts(&s.record, &record)) {
            anyhow::bail!(
                "registration already exists for event {} ({})",
                record.event_id,
                record.flow
            );
        }

        let id = Uuid::now_v7();
        records.push(StoredRegistration {
            id,
            record,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn count_by_event(&self, event_id: &str, flow: ImportFlow) -> Result<u64, Error> {
        Ok(self.find_existing(event_id, flow).await?.len() as u64)
    }
}
