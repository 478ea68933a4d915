//! Concurrent mutation tests.
//!
//! Orchestrators sharing a lock registry must serialize writes to one
//! offering; without the shared registry the revision precondition is what
//! catches the race.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use catalog_versions::model::VersionRecord;
use catalog_versions::{DesiredFields, KeyedMutex, ManagedField, UpdateVersionRequest};
use common::{at, orchestrator, orchestrator_sharing, seeded_catalog, CATALOG, OFFERING};
use serde_json::json;
use tokio::sync::Barrier;

fn retag(i: usize) -> UpdateVersionRequest {
    UpdateVersionRequest {
        id: "c1/v1".to_string(),
        offering_id: OFFERING.to_string(),
        changed: DesiredFields::new().with(ManagedField::Tags, json!([format!("t{i}")])),
        deprecate: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_registry_serializes_same_offering() {
    let mock = seeded_catalog().await;
    let locks = Arc::new(KeyedMutex::new());
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let orch = orchestrator_sharing(&mock, &locks);
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                orch.update_version(&retag(i)).await
            })
        })
        .collect();

    for handle in handles {
        let updated = handle.await.unwrap().unwrap();
        assert!(updated.is_some());
    }

    assert_eq!(mock.patch_calls(), writers);
    // Revision started at 1 and every write bumped it once.
    let rev = mock.current_revision(CATALOG, OFFERING).await.unwrap();
    assert_eq!(rev.as_str(), format!("{}-mock", writers + 1));
    assert!(locks.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_registries_race_into_conflicts() {
    let mock = seeded_catalog().await;
    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));

    // Each writer has its own registry, like separate processes.
    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let orch = orchestrator(&mock);
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                orch.update_version(&retag(i)).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error: {e}"),
        }
    }

    assert!(succeeded >= 1);
    let rev = mock.current_revision(CATALOG, OFFERING).await.unwrap();
    assert_eq!(rev.as_str(), format!("{}-mock", succeeded + 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_offerings_do_not_contend() {
    let mock = seeded_catalog().await;
    mock.insert_offering(
        CATALOG,
        "o2",
        vec![VersionRecord::new(CATALOG, "o2", "w1").with_created(at(0))],
    )
    .await;
    let locks = Arc::new(KeyedMutex::new());

    // Hold o1 for the whole test; o2 must still make progress.
    let _held = locks
        .lock(&catalog_versions::LockKey::new(CATALOG, OFFERING))
        .await;
    let orch = orchestrator_sharing(&mock, &locks);
    let request = UpdateVersionRequest {
        id: "c1/w1".to_string(),
        offering_id: "o2".to_string(),
        changed: DesiredFields::new().with(ManagedField::Tags, json!(["other"])),
        deprecate: None,
    };

    let updated = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        orch.update_version(&request),
    )
    .await
    .expect("o2 update must not wait on o1")
    .unwrap()
    .unwrap();

    assert_eq!(updated.fields["tags"], json!(["other"]));
}
