/// Counter for rows handled by the pipeline, labelled by flow and outcome
/// (imported, invalid, duplicate, storage_failure)
pub const ROWS_PROCESSED_COUNTER: &str = "registration_import_rows_processed_total";

/// Counter for rows skipped as duplicates, labelled by the identifier that matched
pub const DUPLICATE_ROWS_COUNTER: &str = "registration_import_duplicate_rows_total";

/// Counter for rows failing validation, labelled by rejection reason
pub const INVALID_ROWS_COUNTER: &str = "registration_import_invalid_rows_total";

/// Counter for rows imported with a phone number that fails its country's format
pub const PHONE_WARNINGS_COUNTER: &str = "registration_import_phone_warnings_total";

/// Counter for runs, labelled by final status (completed, cancelled, rejected, failed)
pub const IMPORT_RUNS_COUNTER: &str = "registration_import_runs_total";

/// Histogram for the wall time of a whole run
pub const IMPORT_RUN_DURATION_HISTOGRAM: &str = "registration_import_run_duration_seconds";

/// Histogram for the number of rows in an upload
pub const IMPORT_ROWS_HISTOGRAM: &str = "registration_import_rows_per_upload";

/// Counter for progress updates the sink failed to deliver
pub const PROGRESS_SINK_ERRORS_COUNTER: &str = "registration_import_progress_sink_errors_total";
