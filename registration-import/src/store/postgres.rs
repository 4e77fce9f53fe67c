use anyhow::{Context, Error};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ExistingRecord, NewRegistration, RegistrationStore};
use crate::{flow::ImportFlow, record::FieldMap};

/// Registrations in Postgres. Uniqueness is enforced by the partial unique indexes
/// in migrations/, so a concurrent upload that slips past the in-memory index fails
/// its insert here.
#[derive(Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Running registration migrations")?;
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn find_existing(
        &self,
        event_id: &str,
        flow: ImportFlow,
    ) -> Result<Vec<ExistingRecord>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT email, phone_with_country_code, phone, iso_code, fields
            FROM event_registrations
            WHERE event_id = $1 AND flow = $2
            "#,
        )
        .bind(event_id)
        .bind(flow.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Fetching existing registrations")?;

        rows.into_iter()
            .map(|row| -> Result<ExistingRecord, Error> {
                let with_country_code: Option<String> = row.try_get("phone_with_country_code")?;
                let local: Option<String> = row.try_get("phone")?;
                let fields: serde_json::Value = row.try_get("fields")?;
                Ok(ExistingRecord {
                    email: row.try_get("email")?,
                    phone: with_country_code.or(local),
                    iso_code: row.try_get("iso_code")?,
                    custom_fields: serde_json::from_value::<FieldMap>(fields)
                        .context("Parsing registration fields")?,
                })
            })
            .collect()
    }

    async fn insert(&self, record: NewRegistration) -> Result<Uuid, Error> {
        let id = Uuid::now_v7();
        let fields = serde_json::to_value(record.fields.to_field_map())?;
        let phone = record.phone.as_ref();

        sqlx::query(
            r#"
            INSERT INTO event_registrations
                (id, event_id, flow, email, phone, phone_with_country_code, iso_code, fields,
                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(&record.event_id)
        .bind(record.flow.as_str())
        .bind(record.email.as_deref().map(str::to_lowercase))
        .bind(phone.map(|p| p.local.clone()).filter(|p| !p.is_empty()))
        .bind(phone.and_then(|p| p.with_country_code.clone()))
        .bind(phone.and_then(|p| p.iso_code.clone()))
        .bind(fields)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Inserting registration for event {}", record.event_id))?;

        Ok(id)
    }

    async fn count_by_event(&self, event_id: &str, flow: ImportFlow) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = $1 AND flow = $2",
        )
        .bind(event_id)
        .bind(flow.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Counting registrations")?;

        Ok(count.max(0) as u64)
    }
}
