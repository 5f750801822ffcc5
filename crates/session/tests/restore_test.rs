//! Restore behaviour: tiers, dataset matching, cancellation and failure
//! isolation.

mod common;

use cellucid_bundle::{
    write_bundle, BundleError, ChunkCodec, ChunkKind, ChunkMeta, ChunkPriority,
    DatasetFingerprint, GzipCompressor, Compressor, Manifest, SESSION_MAGIC,
};
use cellucid_session::{
    CaptureOptions, ChunkRecord, LazyOutcome, Notification, RestoreOptions, RestoreOutcome,
    SessionConfig, SessionError, SessionState,
};
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn tiered_records() -> Vec<ChunkRecord> {
    vec![
        ChunkRecord::json("lazyA", "core", json!({"a": 1})).lazy(),
        ChunkRecord::json("eagerB", "core", json!({"b": 2})),
        ChunkRecord::binary("lazyC", "core", vec![3; 64]).lazy().gzip(),
        ChunkRecord::json("eagerD", "core", json!({"d": 4})).gzip(),
    ]
}

#[tokio::test]
async fn test_tier_ordering_persisted_and_restored() {
    let bytes = capture_bundle(tiered_records(), None).await;
    let h = harness(vec![("core", ScriptedContributor::default())], None);

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();

    let order: Vec<&str> = report.manifest.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(order, vec!["eagerB", "eagerD", "lazyA", "lazyC"]);
    assert!(report.manifest.is_tier_ordered());

    // Ready resolves after the eager tier only
    assert_eq!(report.eager.applied, 2);

    let lazy = report.lazy.expect("bundle has lazy chunks");
    match lazy.wait().await {
        LazyOutcome::Completed(lazy_report) => assert_eq!(lazy_report.lazy.applied, 2),
        other => panic!("unexpected lazy outcome {:?}", other),
    }

    assert_eq!(h.state.restored(), vec!["eagerB", "eagerD", "lazyA", "lazyC"]);
    assert_eq!(h.view.redraws(), 2);
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_payloads_decoded_by_kind() {
    let bytes = capture_bundle(tiered_records(), None).await;
    let h = harness(vec![("core", ScriptedContributor::default())], None);

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    report.lazy.unwrap().wait().await;

    let payloads = h.state.payloads();
    assert_eq!(payloads[0].as_json(), Some(&json!({"b": 2})));
    assert_eq!(payloads[1].as_json(), Some(&json!({"d": 4})));
    assert_eq!(payloads[3].as_bytes(), Some(&[3u8; 64][..]));
}

#[tokio::test]
async fn test_eager_only_bundle_has_no_lazy_phase() {
    let records = vec![ChunkRecord::json("only", "core", json!(null))];
    let bytes = capture_bundle(records, None).await;
    let h = harness(vec![("core", ScriptedContributor::default())], None);

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new().with_label("Demo"))
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert!(report.lazy.is_none());
    assert_eq!(h.view.redraws(), 1);

    let events = h.sink.events();
    assert!(matches!(
        events.first(),
        Some(Notification::DownloadStarted { label, .. }) if label == "Demo"
    ));
    assert!(matches!(
        events.last(),
        Some(Notification::DownloadCompleted { .. })
    ));
}

#[tokio::test]
async fn test_dataset_mismatch_skips_dependent_chunks() {
    let records = vec![
        ChunkRecord::binary("highlights", "core", vec![1, 2]).dataset_dependent(true),
        ChunkRecord::json("camera", "core", json!({"zoom": 2})),
        ChunkRecord::json("colors", "core", json!([1])).lazy().dataset_dependent(true),
    ];
    let bytes = capture_bundle(records, Some(demo_fingerprint())).await;

    let other = DatasetFingerprint::new("remote", "lung-atlas");
    let h = harness(vec![("core", ScriptedContributor::default())], Some(other));

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();

    assert!(report.dataset_mismatch);
    assert_eq!(report.eager.skipped_dataset, 1);
    assert_eq!(report.eager.applied, 1);

    match report.lazy.unwrap().wait().await {
        LazyOutcome::Completed(lazy) => assert_eq!(lazy.lazy.skipped_dataset, 1),
        other => panic!("unexpected lazy outcome {:?}", other),
    }

    assert_eq!(h.state.restored(), vec!["camera"]);
    assert_eq!(h.sink.warnings().len(), 1);
}

#[tokio::test]
async fn test_matching_dataset_applies_everything() {
    let records = vec![ChunkRecord::binary("highlights", "core", vec![1]).dataset_dependent(true)];
    let bytes = capture_bundle(records, Some(demo_fingerprint())).await;

    // Counts absent on the host side still match
    let host = DatasetFingerprint::new("local-demo", "pbmc3k");
    let h = harness(vec![("core", ScriptedContributor::default())], Some(host));

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert!(!report.dataset_mismatch);
    assert_eq!(h.state.restored(), vec!["highlights"]);
}

#[tokio::test]
async fn test_missing_fingerprint_is_mismatch() {
    let records = vec![
        ChunkRecord::binary("highlights", "core", vec![1]).dataset_dependent(true),
        ChunkRecord::json("camera", "core", json!({})),
    ];
    let bytes = capture_bundle(records, Some(demo_fingerprint())).await;
    let h = harness(vec![("core", ScriptedContributor::default())], None);

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert!(report.dataset_mismatch);
    assert_eq!(h.state.restored(), vec!["camera"]);
}

#[tokio::test]
async fn test_mismatch_without_dependent_chunks_still_warns() {
    let records = vec![ChunkRecord::json("camera", "core", json!({"zoom": 1}))];
    let bytes = capture_bundle(records, Some(demo_fingerprint())).await;
    let other = DatasetFingerprint::new("remote", "lung-atlas");
    let h = harness(vec![("core", ScriptedContributor::default())], Some(other));

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();

    assert!(report.dataset_mismatch);
    assert_eq!(h.state.restored(), vec!["camera"]);
    let warnings = h.sink.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("different dataset"));
    assert!(!warnings[0].contains("skipped"));
}

#[tokio::test]
async fn test_unknown_contributor_skipped() {
    let capture = harness(
        vec![
            ("core", ScriptedContributor::new(vec![ChunkRecord::json("cam", "core", json!(1))])),
            (
                "plugin",
                ScriptedContributor::new(vec![ChunkRecord::json("plug", "plugin", json!(2))]),
            ),
        ],
        None,
    );
    let bytes = capture
        .orchestrator
        .create_bundle(CaptureOptions::new())
        .await
        .unwrap()
        .bytes;

    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();

    assert_eq!(report.eager.applied, 1);
    assert_eq!(report.eager.skipped_unknown, 1);
    assert_eq!(h.state.restored(), vec!["cam"]);
}

#[tokio::test]
async fn test_decompression_bomb_refused() {
    let bomb = GzipCompressor::default().compress(&vec![0u8; 1_000_000]).unwrap();
    let meta = ChunkMeta {
        id: "bomb".to_string(),
        contributor_id: "core".to_string(),
        priority: ChunkPriority::Eager,
        kind: ChunkKind::Binary,
        codec: ChunkCodec::Gzip,
        label: "Totally small".to_string(),
        dataset_dependent: false,
        stored_bytes: bomb.len() as u64,
        uncompressed_bytes: 100,
        depends_on: Vec::new(),
    };
    let bytes = write_bundle(&Manifest::new(None, vec![meta]), &[bomb]).unwrap();

    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();

    assert_eq!(report.eager.failed, 1);
    assert!(h.state.restored().is_empty());
    assert!(h.sink.warnings().iter().any(|w| w.contains("Totally small")));
}

#[tokio::test]
async fn test_contributor_restore_error_isolated() {
    let records = vec![
        ChunkRecord::json("broken", "core", json!(1)),
        ChunkRecord::json("fine", "core", json!(2)),
    ];
    let bytes = capture_bundle(records, None).await;
    let h = harness(
        vec![("core", ScriptedContributor::default().fail_restore_of("broken"))],
        None,
    );

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(report.eager.failed, 1);
    assert_eq!(report.eager.applied, 1);
    assert_eq!(h.state.restored(), vec!["fine"]);
}

#[tokio::test]
async fn test_fail_on_eager_error() {
    let records = vec![
        ChunkRecord::json("broken", "core", json!(1)),
        ChunkRecord::json("fine", "core", json!(2)),
    ];
    let bytes = capture_bundle(records, None).await;
    let h = harness_with_config(
        vec![("core", ScriptedContributor::default().fail_restore_of("broken"))],
        None,
        SessionConfig::for_testing().with_fail_on_eager_error(true),
    );

    let err = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Contributor { ref contributor_id, .. } if contributor_id == "core"));
    assert!(h.state.restored().is_empty());
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_not_a_bundle() {
    let h = harness(vec![], None);
    let err = h
        .orchestrator
        .restore_from_source(source(b"PK\x03\x04 zip file".to_vec()), RestoreOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Bundle(BundleError::NotASessionBundle)));
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, Notification::DownloadFailed { .. })));
}

#[tokio::test]
async fn test_truncated_eager_chunk_fails_restore() {
    let records = vec![ChunkRecord::binary("big", "core", vec![9; 4096])];
    let mut bytes = capture_bundle(records, None).await;
    bytes.truncate(bytes.len() - 100);

    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let err = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Bundle(BundleError::CorruptBundle(_))));
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_truncated_lazy_chunk_reported_to_sink() {
    let records = vec![
        ChunkRecord::json("eager", "core", json!(1)),
        ChunkRecord::binary("lazy", "core", vec![9; 4096]).lazy(),
    ];
    let mut bytes = capture_bundle(records, None).await;
    bytes.truncate(bytes.len() - 100);

    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(report.eager.applied, 1);

    let outcome = report.lazy.unwrap().wait().await;
    assert!(matches!(outcome, LazyOutcome::Failed(_)));
    assert_eq!(h.sink.errors().len(), 1);
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, Notification::DownloadFailed { .. })));
    assert_eq!(h.state.restored(), vec!["eager"]);
}

// ============================================================================
// Cancellation
// ============================================================================

fn blocking_records() -> Vec<ChunkRecord> {
    vec![
        ChunkRecord::json("first", "core", json!(1)),
        ChunkRecord::json("block", "core", json!(2)),
        ChunkRecord::json("after", "core", json!(3)),
        ChunkRecord::json("lazy", "core", json!(4)).lazy(),
    ]
}

#[tokio::test]
async fn test_cancel_mid_eager_then_restore_again() {
    let bytes = capture_bundle(blocking_records(), None).await;
    let entered = Arc::new(Notify::new());
    let h = harness(
        vec![(
            "core",
            ScriptedContributor::default().block_restore_of("block", entered.clone()),
        )],
        None,
    );

    let token = CancellationToken::new();
    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn({
        let bytes = bytes.clone();
        let options = RestoreOptions::new().with_cancel(token.clone());
        async move { orchestrator.restore_from_source(source(bytes), options).await }
    });

    entered.notified().await;
    assert_eq!(h.orchestrator.state(), SessionState::RestoringEager);
    token.cancel();

    let outcome = first.await.unwrap().unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(h.state.restored(), vec!["first"]);
    assert!(h.sink.infos().iter().any(|m| m.contains("cancelled")));
    assert!(h.sink.errors().is_empty());
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    // A fresh restore starts immediately
    let plain = capture_bundle(vec![ChunkRecord::json("next", "core", json!(5))], None).await;
    let outcome = h
        .orchestrator
        .restore_from_source(source(plain), RestoreOptions::new())
        .await
        .unwrap();
    assert!(!outcome.is_cancelled());
    assert_eq!(h.state.restored(), vec!["first", "next"]);
}

#[tokio::test]
async fn test_second_restore_retires_first() {
    let bytes = capture_bundle(blocking_records(), None).await;
    let entered = Arc::new(Notify::new());
    let h = harness(
        vec![(
            "core",
            ScriptedContributor::default().block_restore_of("block", entered.clone()),
        )],
        None,
    );

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move {
        orchestrator
            .restore_from_source(source(bytes), RestoreOptions::new())
            .await
    });
    entered.notified().await;

    let plain = capture_bundle(vec![ChunkRecord::json("second", "core", json!(1))], None).await;
    let second = h
        .orchestrator
        .restore_from_source(source(plain), RestoreOptions::new())
        .await
        .unwrap();

    assert!(first.await.unwrap().unwrap().is_cancelled());
    assert!(!second.is_cancelled());
    assert_eq!(h.state.restored(), vec!["first", "second"]);
}

/// Source that delivers the magic and a manifest length, then stalls
async fn stalled_source() -> (tokio::io::DuplexStream, tokio::io::DuplexStream) {
    let (mut tx, rx) = tokio::io::duplex(1024);
    tx.write_all(SESSION_MAGIC).await.unwrap();
    tx.write_all(&100u32.to_le_bytes()).await.unwrap();
    (tx, rx)
}

#[tokio::test]
async fn test_cancel_while_manifest_stalls() {
    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let (_tx, rx) = stalled_source().await;
    let token = CancellationToken::new();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn({
        let token = token.clone();
        async move {
            orchestrator
                .restore_from_source(rx, RestoreOptions::new().with_cancel(token))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), first)
        .await
        .expect("restore ignored cancellation during the manifest read")
        .unwrap()
        .unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    let plain = capture_bundle(vec![ChunkRecord::json("after", "core", json!(1))], None).await;
    let second = tokio::time::timeout(
        Duration::from_secs(2),
        h.orchestrator
            .restore_from_source(source(plain), RestoreOptions::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!second.is_cancelled());
    assert_eq!(h.state.restored(), vec!["after"]);
}

#[tokio::test]
async fn test_new_restore_retires_one_stalled_in_manifest() {
    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let (_tx, rx) = stalled_source().await;

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move {
        orchestrator
            .restore_from_source(rx, RestoreOptions::new())
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.orchestrator.state(), SessionState::RestoringEager);

    let plain = capture_bundle(vec![ChunkRecord::json("next", "core", json!(1))], None).await;
    let second = tokio::time::timeout(
        Duration::from_secs(2),
        h.orchestrator
            .restore_from_source(source(plain), RestoreOptions::new()),
    )
    .await
    .expect("stalled restore was never retired")
    .unwrap();

    assert!(!second.is_cancelled());
    assert!(first.await.unwrap().unwrap().is_cancelled());
    assert_eq!(h.state.restored(), vec!["next"]);
}

#[tokio::test]
async fn test_same_token_reentry_does_not_self_cancel() {
    let bytes = capture_bundle(blocking_records(), None).await;
    let entered = Arc::new(Notify::new());
    let h = harness(
        vec![(
            "core",
            ScriptedContributor::default().block_restore_of("block", entered.clone()),
        )],
        None,
    );
    let token = CancellationToken::new();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn({
        let options = RestoreOptions::new().with_cancel(token.clone());
        async move { orchestrator.restore_from_source(source(bytes), options).await }
    });
    entered.notified().await;

    let plain = capture_bundle(vec![ChunkRecord::json("again", "core", json!(1))], None).await;
    let second = h
        .orchestrator
        .restore_from_source(source(plain), RestoreOptions::new().with_cancel(token.clone()))
        .await
        .unwrap();

    assert!(first.await.unwrap().unwrap().is_cancelled());
    assert!(!second.is_cancelled());
    assert!(!token.is_cancelled());
    assert_eq!(h.state.restored(), vec!["first", "again"]);
}

#[tokio::test]
async fn test_cancel_lazy_phase() {
    let records = vec![
        ChunkRecord::json("eager", "core", json!(1)),
        ChunkRecord::json("slow", "core", json!(2)).lazy(),
        ChunkRecord::json("never", "core", json!(3)).lazy(),
    ];
    let bytes = capture_bundle(records, None).await;
    let entered = Arc::new(Notify::new());
    let h = harness(
        vec![(
            "core",
            ScriptedContributor::default().block_restore_of("slow", entered.clone()),
        )],
        None,
    );

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    let lazy = report.lazy.unwrap();

    entered.notified().await;
    assert_eq!(h.orchestrator.state(), SessionState::RestoringLazy);
    lazy.cancel();

    assert_eq!(lazy.wait().await, LazyOutcome::Cancelled);
    assert_eq!(h.state.restored(), vec!["eager"]);
    assert_eq!(h.orchestrator.state(), SessionState::Idle);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test]
async fn test_cancel_restore_handle() {
    let records = vec![
        ChunkRecord::json("eager", "core", json!(1)),
        ChunkRecord::json("slow", "core", json!(2)).lazy(),
    ];
    let bytes = capture_bundle(records, None).await;
    let entered = Arc::new(Notify::new());
    let h = harness(
        vec![(
            "core",
            ScriptedContributor::default().block_restore_of("slow", entered.clone()),
        )],
        None,
    );

    let report = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    entered.notified().await;

    assert!(h.orchestrator.cancel_restore());
    assert_eq!(report.lazy.unwrap().wait().await, LazyOutcome::Cancelled);
    assert!(!h.orchestrator.cancel_restore());
}

#[tokio::test]
async fn test_pre_cancelled_token() {
    let bytes = capture_bundle(tiered_records(), None).await;
    let h = harness(vec![("core", ScriptedContributor::default())], None);
    let token = CancellationToken::new();
    token.cancel();

    let outcome = h
        .orchestrator
        .restore_from_source(source(bytes), RestoreOptions::new().with_cancel(token))
        .await
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::Cancelled));
    assert!(h.state.restored().is_empty());
}

// ============================================================================
// Files
// ============================================================================

#[tokio::test]
async fn test_save_and_restore_from_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("demo.cellucid-session");

    let capture = harness(
        vec![("core", ScriptedContributor::new(tiered_records()))],
        Some(demo_fingerprint()),
    );
    let (info, capture_report) = capture
        .orchestrator
        .save_to_path(&path, CaptureOptions::new())
        .await
        .unwrap();
    assert_eq!(capture_report.chunk_count, 4);
    assert_eq!(info.total_bytes, std::fs::metadata(&path).unwrap().len());

    let h = harness(
        vec![("core", ScriptedContributor::default())],
        Some(demo_fingerprint()),
    );
    let report = h
        .orchestrator
        .restore_from_path(&path, RestoreOptions::new())
        .await
        .unwrap()
        .into_report()
        .unwrap();
    assert!(!report.dataset_mismatch);
    report.lazy.unwrap().wait().await;

    assert_eq!(h.state.restored().len(), 4);
    assert!(h.sink.events().iter().any(|e| matches!(
        e,
        Notification::DownloadStarted { total_bytes: Some(total), .. } if *total == info.total_bytes
    )));
}
