use anyhow::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    canonical::CanonicalPhone,
    flow::ImportFlow,
    record::{FieldMap, RegistrationFields},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRegistrationStore;
pub use postgres::PgRegistrationStore;

/// What the duplicate index needs to know about an already persisted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExistingRecord {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub iso_code: Option<String>,
    #[serde(default)]
    pub custom_fields: FieldMap,
}

/// A record accepted by the pipeline, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRegistration {
    pub event_id: String,
    pub flow: ImportFlow,
    pub email: Option<String>,
    pub phone: Option<CanonicalPhone>,
    pub fields: RegistrationFields,
}

/// Persistence for registrations. Implementations must enforce uniqueness of
/// (event, flow, email) and (event, flow, phone) themselves, the pipeline's in-memory
/// index does not protect against concurrent runs for the same event.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn find_existing(
        &self,
        event_id: &str,
        flow: ImportFlow,
    ) -> Result<Vec<ExistingRecord>, Error>;

    async fn insert(&self, record: NewRegistration) -> Result<Uuid, Error>;

    async fn count_by_event(&self, event_id: &str, flow: ImportFlow) -> Result<u64, Error>;
}
