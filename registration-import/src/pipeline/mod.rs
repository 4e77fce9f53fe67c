use std::{collections::BTreeSet, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use anyhow::Error;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    canonical::{canonicalize_email, canonicalize_phone, resolve_iso_hint},
    dedup::{DuplicateIndex, DuplicateMatch, Identifiers},
    error::{ImportError, StructuralError},
    flow::ImportFlow,
    metrics_consts::{
        DUPLICATE_ROWS_COUNTER, IMPORT_ROWS_HISTOGRAM, IMPORT_RUNS_COUNTER,
        IMPORT_RUN_DURATION_HISTOGRAM, INVALID_ROWS_COUNTER, PHONE_WARNINGS_COUNTER,
        PROGRESS_SINK_ERRORS_COUNTER, ROWS_PROCESSED_COUNTER,
    },
    progress::{Progress, ProgressSink},
    record::RawRow,
    schema::{row_country_hint, FieldSchema},
    store::{NewRegistration, RegistrationStore},
    validate::{validate_row, RowRejection, ValidatedRow},
};

pub mod report;

use report::IngestionResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    // Spreadsheet rows above the first data row, used to report row numbers the way
    // the uploader sees them
    pub header_rows: usize,
    pub default_iso_code: String,
    // Bulk imports accept rows whose phone fails its country's format unless this is set
    pub strict_phone: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            header_rows: 1,
            default_iso_code: "pk".to_string(),
            strict_phone: false,
        }
    }
}

/// One uploaded file, targeted at an event and flow.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub upload_id: String,
    pub event_id: String,
    pub flow: ImportFlow,
    pub schema: FieldSchema,
    pub rows: Vec<RawRow>,
}

impl ImportRequest {
    /// Every column seen in the upload. Parsers tend to omit blank cells, so a
    /// column may be absent from some rows and present in others.
    pub fn headers(&self) -> BTreeSet<&str> {
        self.rows.iter().flat_map(|r| r.columns()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    ValidatingSchema,
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug)]
enum RowOutcome {
    Imported(Uuid),
    Invalid(RowRejection),
    Duplicate(DuplicateMatch),
    StorageFailed(Error),
}

impl RowOutcome {
    fn label(&self) -> &'static str {
        match self {
            RowOutcome::Imported(_) => "imported",
            RowOutcome::Invalid(_) => "invalid",
            RowOutcome::Duplicate(_) => "duplicate",
            RowOutcome::StorageFailed(_) => "storage_failure",
        }
    }
}

/// Rejects uploads that can't be processed at all: no rows, or required columns
/// missing from every row.
pub fn check_structure(request: &ImportRequest) -> Result<(), StructuralError> {
    if request.rows.is_empty() {
        return Err(StructuralError::EmptyFile);
    }
    let missing = request.schema.missing_required_columns(request.headers());
    if !missing.is_empty() {
        return Err(StructuralError::MissingRequiredColumns(missing));
    }
    Ok(())
}

/// Drives one upload through validation, deduplication and storage.
///
/// Rows are handled strictly in order: the duplicate index must see each accepted
/// row before the next one is checked. Control is handed back to the runtime after
/// every chunk, and the cancellation token is checked before every row.
pub struct IngestionPipeline {
    store: Arc<dyn RegistrationStore>,
    sink: Arc<dyn ProgressSink>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        sink: Arc<dyn ProgressSink>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            sink,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, request: ImportRequest) -> Result<IngestionResult, ImportError> {
        let started = Instant::now();
        let flow = request.flow.as_str();
        let mut state = PipelineState::ValidatingSchema;
        debug!(upload_id = %request.upload_id, ?state, "Starting import");

        if let Err(e) = check_structure(&request) {
            warn!(
                upload_id = %request.upload_id,
                event_id = %request.event_id,
                "Rejecting upload: {}", e
            );
            metrics::counter!(IMPORT_RUNS_COUNTER, "flow" => flow, "status" => "rejected")
                .increment(1);
            return Err(e.into());
        }

        let existing = match self
            .store
            .find_existing(&request.event_id, request.flow)
            .await
        {
            Ok(existing) => existing,
            Err(source) => {
                metrics::counter!(IMPORT_RUNS_COUNTER, "flow" => flow, "status" => "failed")
                    .increment(1);
                return Err(ImportError::ExistingRecords {
                    event_id: request.event_id.clone(),
                    source,
                });
            }
        };
        let mut index = DuplicateIndex::build(
            &existing,
            &request.schema,
            &self.options.default_iso_code,
        );
        drop(existing);

        let total = request.rows.len();
        let mut result = IngestionResult::new(total);
        metrics::histogram!(IMPORT_ROWS_HISTOGRAM, "flow" => flow).record(total as f64);

        state = PipelineState::Running;
        info!(
            upload_id = %request.upload_id,
            event_id = %request.event_id,
            flow,
            total,
            known_emails = index.email_count(),
            known_phones = index.phone_count(),
            ?state,
            "Built duplicate index, importing rows"
        );

        let chunk_size = self.options.chunk_size.max(1);
        'chunks: for (chunk_number, chunk) in request.rows.chunks(chunk_size).enumerate() {
            for (offset, row) in chunk.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    state = PipelineState::Cancelled;
                    break 'chunks;
                }

                let row_number = chunk_number * chunk_size + offset + 1 + self.options.header_rows;
                let outcome = self.process_row(&request, row, row_number, &mut index).await;
                self.record_outcome(&mut result, outcome, row_number, request.flow);

                self.report_progress(Progress {
                    processed: result.processed(),
                    total,
                })
                .await;
            }
            tokio::task::yield_now().await;
        }

        if state == PipelineState::Cancelled {
            warn!(
                upload_id = %request.upload_id,
                processed = result.processed(),
                total,
                "Import cancelled, remaining rows skipped"
            );
            result.record_cancelled();
        } else {
            state = PipelineState::Completed;
        }

        self.report_progress(Progress {
            processed: total,
            total,
        })
        .await;

        match self
            .store
            .count_by_event(&request.event_id, request.flow)
            .await
        {
            Ok(count) => result.event_total = Some(count),
            Err(e) => warn!(
                event_id = %request.event_id,
                "Failed to recount registrations after import: {:?}", e
            ),
        }

        if let Err(e) = self.sink.on_complete(&result).await {
            warn!(upload_id = %request.upload_id, "Failed to report completion: {:?}", e);
            metrics::counter!(PROGRESS_SINK_ERRORS_COUNTER).increment(1);
        }

        let status = if result.cancelled { "cancelled" } else { "completed" };
        metrics::counter!(IMPORT_RUNS_COUNTER, "flow" => flow, "status" => status).increment(1);
        metrics::histogram!(IMPORT_RUN_DURATION_HISTOGRAM, "flow" => flow)
            .record(started.elapsed().as_secs_f64());

        info!(
            upload_id = %request.upload_id,
            event_id = %request.event_id,
            imported = result.imported,
            skipped = result.skipped,
            duplicates = result.duplicates,
            ?state,
            "{}", result.summary_message()
        );

        Ok(result)
    }

    async fn process_row(
        &self,
        request: &ImportRequest,
        row: &RawRow,
        row_number: usize,
        index: &mut DuplicateIndex,
    ) -> RowOutcome {
        let validated = match validate_row(row, &request.schema) {
            Ok(v) => v,
            Err(reason) => return RowOutcome::Invalid(reason),
        };

        let identifiers = self.identifiers(row, &validated);

        if let Some(phone) = &identifiers.phone {
            if let Err(e) = phone.validate() {
                if self.options.strict_phone {
                    return RowOutcome::Invalid(RowRejection::InvalidPhone(e));
                }
                debug!(row_number, "Importing row despite phone warning: {}", e);
                metrics::counter!(PHONE_WARNINGS_COUNTER, "flow" => request.flow.as_str())
                    .increment(1);
            }
        }

        if let Some(matched) = index.find(&identifiers) {
            return RowOutcome::Duplicate(matched);
        }

        let record = NewRegistration {
            event_id: request.event_id.clone(),
            flow: request.flow,
            email: identifiers.email.clone(),
            phone: identifiers.phone.clone(),
            fields: validated.fields,
        };

        // A panicking store must not take the whole run down with it
        let inserted = AssertUnwindSafe(self.store.insert(record))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::msg("registration store panicked during insert")));

        match inserted {
            Ok(id) => {
                index.insert(&identifiers);
                RowOutcome::Imported(id)
            }
            Err(e) => RowOutcome::StorageFailed(e),
        }
    }

    fn identifiers(&self, row: &RawRow, validated: &ValidatedRow) -> Identifiers {
        let country = row_country_hint(row);
        let iso_hint = country.as_deref().and_then(resolve_iso_hint);
        Identifiers {
            email: validated
                .identity
                .email
                .as_deref()
                .and_then(canonicalize_email),
            phone: validated
                .identity
                .phone
                .as_deref()
                .map(|raw| canonicalize_phone(raw, iso_hint, &self.options.default_iso_code))
                .filter(|p| !p.is_empty()),
        }
    }

    fn record_outcome(
        &self,
        result: &mut IngestionResult,
        outcome: RowOutcome,
        row_number: usize,
        flow: ImportFlow,
    ) {
        metrics::counter!(
            ROWS_PROCESSED_COUNTER,
            "flow" => flow.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);

        match outcome {
            RowOutcome::Imported(id) => {
                debug!(row_number, %id, "Imported row");
                result.record_imported();
            }
            RowOutcome::Invalid(reason) => {
                debug!(row_number, reason = reason.reason(), "Skipping invalid row: {}", reason);
                metrics::counter!(INVALID_ROWS_COUNTER, "reason" => reason.reason()).increment(1);
                result.record_invalid();
            }
            RowOutcome::Duplicate(matched) => {
                debug!(row_number, matched = matched.as_str(), "Skipping duplicate row");
                metrics::counter!(DUPLICATE_ROWS_COUNTER, "matched" => matched.as_str())
                    .increment(1);
                result.record_duplicate(row_number);
            }
            RowOutcome::StorageFailed(e) => {
                warn!(row_number, "Failed to store row, skipping: {:?}", e);
                result.record_storage_failure();
            }
        }
    }

    async fn report_progress(&self, progress: Progress) {
        if let Err(e) = self.sink.on_progress(progress).await {
            debug!("Failed to report progress: {:?}", e);
            metrics::counter!(PROGRESS_SINK_ERRORS_COUNTER).increment(1);
        }
    }
}
