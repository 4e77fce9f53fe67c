mod common;

use std::sync::Arc;

use common::*;
use registration_import::{
    error::{ImportError, StructuralError},
    flow::ImportFlow,
    pipeline::{IngestionPipeline, PipelineOptions},
    progress::{NoOpProgressSink, Progress, RecordingProgressSink},
    record::RegistrationFields,
    schema::{FieldSchema, FieldSpec, InputType},
    store::MemoryRegistrationStore,
};
use tokio_util::sync::CancellationToken;

fn pipeline(store: Arc<MemoryRegistrationStore>) -> IngestionPipeline {
    IngestionPipeline::new(store, Arc::new(NoOpProgressSink), PipelineOptions::default())
}

fn sized_schema() -> FieldSchema {
    FieldSchema::from(vec![
        FieldSpec::new("Name", InputType::Text).required(),
        FieldSpec::new("Email", InputType::Email).required(),
        FieldSpec::new("Size", InputType::Radio).with_allowed_values(["S", "M", "L"]),
    ])
}

#[tokio::test]
async fn test_duplicate_email_within_upload_is_skipped() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let result = pipeline(store.clone())
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Ada Lovelace", "ada@example.com"),
                classic_row("Ada L.", " ADA@Example.com "),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.imported, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.duplicate_row_numbers, vec![3]);
    assert_eq!(
        result.duplicate_message().as_deref(),
        Some("Row(s) 3 already existing and were skipped.")
    );
    assert_eq!(result.event_total, Some(1));
    assert_counts_add_up(&result);

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record.email.as_deref(), Some("ada@example.com"));
    match &records[0].record.fields {
        RegistrationFields::Classic(fields) => assert_eq!(fields.full_name, "Ada Lovelace"),
        other => panic!("expected classic fields, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rerunning_an_upload_imports_nothing() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let rows = vec![
        classic_row("Ada", "ada@example.com"),
        classic_row("Grace", "grace@example.com"),
        classic_row("Linus", "linus@example.com"),
    ];

    let first = pipeline(store.clone())
        .run(request(FieldSchema::Classic, rows.clone()))
        .await
        .unwrap();
    assert_eq!(first.imported, 3);

    let second = pipeline(store.clone())
        .run(request(FieldSchema::Classic, rows))
        .await
        .unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.duplicate_row_numbers, vec![2, 3, 4]);
    assert_eq!(
        second.summary_message(),
        "Imported 0 of 3 rows, 3 skipped. Row(s) 2, 3, and 4 already existing and were skipped."
    );
    assert_eq!(second.event_total, Some(3));
    assert_eq!(store.records().len(), 3);
}

#[tokio::test]
async fn test_rows_matching_existing_records_are_skipped() {
    let store = Arc::new(MemoryRegistrationStore::new());
    store.seed(
        EVENT_ID,
        ImportFlow::Registration,
        vec![
            existing_email("Grace@Example.com"),
            existing_phone("+923001234567", Some("pk")),
        ],
    );

    let result = pipeline(store.clone())
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Ada", "ada@example.com"),
                classic_row("Grace", "grace@example.com"),
                classic_row_with_phone("Linus", "linus@example.com", "0300 123 4567"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 1);
    assert_eq!(result.duplicate_row_numbers, vec![3, 4]);
    assert_eq!(result.event_total, Some(3));
    assert_counts_add_up(&result);
}

#[tokio::test]
async fn test_phone_duplicates_match_across_formats() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let result = pipeline(store.clone())
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row_with_phone("A", "a@example.com", "03001234567"),
                classic_row_with_phone("B", "b@example.com", "+92 300 1234567"),
                classic_row_with_phone("C", "c@example.com", "(300) 123-4567"),
                classic_row_with_phone("D", "d@example.com", "+923011234567"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 2);
    assert_eq!(result.duplicate_row_numbers, vec![3, 4]);
}

#[tokio::test]
async fn test_enum_violation_is_skipped_but_not_a_duplicate() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let result = pipeline(store.clone())
        .run(request(
            sized_schema(),
            vec![
                row(&[("Name", "Ada"), ("Email", "ada@example.com"), ("Size", "M")]),
                row(&[("Name", "Grace"), ("Email", "grace@example.com"), ("Size", "XL")]),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.invalid, 1);
    assert!(result.duplicate_row_numbers.is_empty());
    assert_eq!(result.duplicate_message(), None);
    assert_counts_add_up(&result);
}

#[tokio::test]
async fn test_undeclared_phone_column_still_deduplicates() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let schema = FieldSchema::from(vec![
        FieldSpec::new("Name", InputType::Text).required(),
        FieldSpec::new("Email", InputType::Email),
    ]);
    let result = pipeline(store.clone())
        .run(request(
            schema,
            vec![
                row(&[("Name", "Ada"), ("WhatsApp", "+44 7700 900123")]),
                row(&[("Name", "Ada again"), ("WhatsApp", "07700900123"), ("ISO Code", "GB")]),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 1);
    assert_eq!(result.duplicate_row_numbers, vec![3]);
}

#[tokio::test]
async fn test_country_column_decides_the_calling_code() {
    let store = Arc::new(MemoryRegistrationStore::new());
    pipeline(store.clone())
        .run(request(
            FieldSchema::Classic,
            vec![row(&[
                ("FullName", "Ada"),
                ("Email", "ada@example.com"),
                ("Phone", "202 555 0123"),
                ("Country Code", "US"),
            ])],
        ))
        .await
        .unwrap();

    let records = store.records();
    let phone = records[0].record.phone.as_ref().unwrap();
    assert_eq!(phone.with_country_code.as_deref(), Some("+12025550123"));
    assert_eq!(phone.iso_code.as_deref(), Some("us"));
}

#[tokio::test]
async fn test_empty_upload_is_rejected_before_reading_the_store() {
    let store = Arc::new(FaultyStore::default());
    let sink = Arc::new(RecordingProgressSink::default());
    let pipeline =
        IngestionPipeline::new(store.clone(), sink.clone(), PipelineOptions::default());

    let err = pipeline
        .run(request(FieldSchema::Classic, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ImportError::Structural(StructuralError::EmptyFile)
    ));
    assert_eq!(store.find_existing_calls(), 0);
    assert!(sink.updates().is_empty());
    assert!(sink.completed().is_empty());
}

#[tokio::test]
async fn test_missing_required_columns_are_reported_together() {
    let store = Arc::new(FaultyStore::default());
    let pipeline = IngestionPipeline::new(
        store.clone(),
        Arc::new(NoOpProgressSink),
        PipelineOptions::default(),
    );

    let err = pipeline
        .run(request(
            sized_schema(),
            vec![row(&[("Size", "S")]), row(&[("Size", "M")])],
        ))
        .await
        .unwrap_err();

    match err {
        ImportError::Structural(StructuralError::MissingRequiredColumns(columns)) => {
            assert_eq!(columns, vec!["Name".to_string(), "Email".to_string()])
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(store.find_existing_calls(), 0);
}

#[tokio::test]
async fn test_unreadable_existing_records_abort_the_run() {
    let store = Arc::new(FaultyStore {
        fail_find_existing: true,
        ..Default::default()
    });
    let pipeline =
        IngestionPipeline::new(store.clone(), Arc::new(NoOpProgressSink), PipelineOptions::default());

    let err = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![classic_row("Ada", "ada@example.com")],
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::ExistingRecords { .. }));
    assert_eq!(
        err.user_message(),
        "We couldn't start the import, please try again"
    );
    assert!(store.inner.records().is_empty());
}

#[tokio::test]
async fn test_storage_failure_skips_only_that_row() {
    let store = Arc::new(FaultyStore::failing_on(&["grace@example.com"]));
    let pipeline =
        IngestionPipeline::new(store.clone(), Arc::new(NoOpProgressSink), PipelineOptions::default());

    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Ada", "ada@example.com"),
                classic_row("Grace", "grace@example.com"),
                classic_row("Linus", "linus@example.com"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 2);
    assert_eq!(result.storage_failures, 1);
    assert!(result.duplicate_row_numbers.is_empty());
    assert_counts_add_up(&result);
    assert_eq!(store.inner.records().len(), 2);
}

#[tokio::test]
async fn test_failed_row_is_not_treated_as_seen() {
    let store = Arc::new(FaultyStore::failing_on(&["grace@example.com"]));
    let pipeline =
        IngestionPipeline::new(store.clone(), Arc::new(NoOpProgressSink), PipelineOptions::default());

    // The second Grace row hits the same failure rather than being called a duplicate
    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Grace", "grace@example.com"),
                classic_row("Grace", "grace@example.com"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.storage_failures, 2);
    assert_eq!(result.duplicates, 0);
}

#[tokio::test]
async fn test_panicking_store_skips_only_that_row() {
    let store = Arc::new(FaultyStore::panicking_on(&["grace@example.com"]));
    let pipeline =
        IngestionPipeline::new(store.clone(), Arc::new(NoOpProgressSink), PipelineOptions::default());

    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Ada", "ada@example.com"),
                classic_row("Grace", "grace@example.com"),
                classic_row("Linus", "linus@example.com"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.imported, 2);
    assert_eq!(result.storage_failures, 1);
    assert_counts_add_up(&result);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_finishes_at_total() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let sink = Arc::new(RecordingProgressSink::default());
    let options = PipelineOptions {
        chunk_size: 2,
        ..Default::default()
    };
    let pipeline = IngestionPipeline::new(store, sink.clone(), options);

    let rows = (0..5)
        .map(|i| classic_row("Someone", &format!("user{i}@example.com")))
        .collect();
    let result = pipeline
        .run(request(FieldSchema::Classic, rows))
        .await
        .unwrap();

    let updates = sink.updates();
    assert_eq!(updates.len(), 6);
    assert!(updates.windows(2).all(|w| w[0].processed <= w[1].processed));
    assert!(updates.iter().all(|p| p.total == 5));
    assert_eq!(
        updates.last(),
        Some(&Progress {
            processed: 5,
            total: 5
        })
    );
    assert_eq!(sink.completed(), vec![result]);
}

#[tokio::test]
async fn test_failing_progress_sink_does_not_stop_the_run() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let pipeline = IngestionPipeline::new(
        store.clone(),
        Arc::new(BrokenSink),
        PipelineOptions::default(),
    );

    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![
                classic_row("Ada", "ada@example.com"),
                classic_row("Grace", "grace@example.com"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(result.imported, 2);
    assert_eq!(store.records().len(), 2);
}

#[tokio::test]
async fn test_failed_recount_leaves_event_total_unset() {
    let store = Arc::new(FaultyStore {
        fail_count: true,
        ..Default::default()
    });
    let pipeline =
        IngestionPipeline::new(store, Arc::new(NoOpProgressSink), PipelineOptions::default());

    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![classic_row("Ada", "ada@example.com")],
        ))
        .await
        .unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.event_total, None);
}

#[tokio::test]
async fn test_cancellation_stops_between_rows() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let token = CancellationToken::new();
    let sink = CancellingSink::new(token.clone(), 2);
    let options = PipelineOptions {
        chunk_size: 3,
        ..Default::default()
    };
    let pipeline = IngestionPipeline::new(store.clone(), sink.clone(), options)
        .with_cancellation(token);

    let rows = (0..10)
        .map(|i| classic_row("Someone", &format!("user{i}@example.com")))
        .collect();
    let result = pipeline
        .run(request(FieldSchema::Classic, rows))
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped, 8);
    assert_counts_add_up(&result);
    assert_eq!(store.records().len(), 2);
    assert!(result
        .summary_message()
        .contains("The import was cancelled before it finished."));

    let updates = sink.updates.lock().unwrap().clone();
    assert_eq!(
        updates.last(),
        Some(&Progress {
            processed: 10,
            total: 10
        })
    );
}

#[tokio::test]
async fn test_cancelled_before_start_imports_nothing() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let token = CancellationToken::new();
    token.cancel();
    let pipeline = pipeline(store.clone()).with_cancellation(token);

    let result = pipeline
        .run(request(
            FieldSchema::Classic,
            vec![classic_row("Ada", "ada@example.com")],
        ))
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.imported, 0);
    assert_eq!(result.skipped, 1);
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn test_strict_phone_mode_rejects_bad_numbers() {
    let rows = vec![
        classic_row_with_phone("Ada", "ada@example.com", "300123"),
        classic_row_with_phone("Grace", "grace@example.com", "03001234567"),
    ];

    let lenient = pipeline(Arc::new(MemoryRegistrationStore::new()))
        .run(request(FieldSchema::Classic, rows.clone()))
        .await
        .unwrap();
    assert_eq!(lenient.imported, 2);

    let strict = IngestionPipeline::new(
        Arc::new(MemoryRegistrationStore::new()),
        Arc::new(NoOpProgressSink),
        PipelineOptions {
            strict_phone: true,
            ..Default::default()
        },
    )
    .run(request(FieldSchema::Classic, rows))
    .await
    .unwrap();
    assert_eq!(strict.imported, 1);
    assert_eq!(strict.invalid, 1);
    assert!(strict.duplicate_row_numbers.is_empty());
}

#[tokio::test]
async fn test_flows_are_deduplicated_separately() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let rows = vec![classic_row("Ada", "ada@example.com")];

    let registered = pipeline(store.clone())
        .run(request_for(
            ImportFlow::Registration,
            FieldSchema::Classic,
            rows.clone(),
        ))
        .await
        .unwrap();
    let checked_in = pipeline(store.clone())
        .run(request_for(ImportFlow::CheckIn, FieldSchema::Classic, rows))
        .await
        .unwrap();

    assert_eq!(registered.imported, 1);
    assert_eq!(checked_in.imported, 1);
    assert_eq!(checked_in.event_total, Some(1));
    assert_eq!(store.records().len(), 2);
}

#[tokio::test]
async fn test_concurrent_uploads_never_store_a_contact_twice() {
    let store = Arc::new(MemoryRegistrationStore::new());
    let rows: Vec<_> = (0..50)
        .map(|i| classic_row("Someone", &format!("user{i}@example.com")))
        .collect();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pipeline = IngestionPipeline::new(
                store.clone(),
                Arc::new(NoOpProgressSink),
                PipelineOptions {
                    chunk_size: 5,
                    ..Default::default()
                },
            );
            let request = request(FieldSchema::Classic, rows.clone());
            tokio::spawn(async move { pipeline.run(request).await })
        })
        .collect();

    let mut imported = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_counts_add_up(&result);
        imported += result.imported;
    }

    assert_eq!(imported, 50);
    assert_eq!(store.records().len(), 50);
}
