//! End-to-end mutation and validation flows against the in-memory catalog.

#[path = "../common/mod.rs"]
mod common;

use catalog_versions::model::{PatchOperation, ValidationState, VersionLocator, VersionRecord};
use catalog_versions::resolver::latest_version_in;
use catalog_versions::{
    CatalogError, DesiredFields, ManagedField, RevisionGuard, UpdateVersionRequest,
    ValidateVersionRequest,
};
use common::{at, orchestrator, seeded_catalog, CATALOG, OFFERING};
use serde_json::json;

fn update_tags(tags: serde_json::Value) -> UpdateVersionRequest {
    UpdateVersionRequest {
        id: "c1/v1".to_string(),
        offering_id: OFFERING.to_string(),
        changed: DesiredFields::new().with(ManagedField::Tags, tags),
        deprecate: None,
    }
}

/// Sequential updates each pick up the revision the previous one left.
#[tokio::test]
async fn test_sequential_updates_see_previous_revision() {
    let mock = seeded_catalog().await;
    let orch = orchestrator(&mock);
    let initial = mock.current_revision(CATALOG, OFFERING).await.unwrap();

    let first = orch.update_version(&update_tags(json!(["a"]))).await.unwrap().unwrap();
    let after_first = mock.current_revision(CATALOG, OFFERING).await.unwrap();
    let second = orch.update_version(&update_tags(json!(["b"]))).await.unwrap().unwrap();
    let after_second = mock.current_revision(CATALOG, OFFERING).await.unwrap();

    assert_ne!(initial, after_first);
    assert_ne!(after_first, after_second);
    assert_eq!(first.rev.as_ref(), Some(&after_first));
    assert_eq!(second.rev.as_ref(), Some(&after_second));
    assert_eq!(second.fields["tags"], json!(["b"]));
    assert_eq!(mock.patch_calls(), 2);
}

/// A write carrying a revision that missed a concurrent update is rejected.
#[tokio::test]
async fn test_stale_revision_is_rejected() {
    let mock = seeded_catalog().await;
    let guard = RevisionGuard::new(mock.clone());
    let locator = VersionLocator::new(CATALOG, "v1");
    let stale = mock.current_revision(CATALOG, OFFERING).await.unwrap();

    // Another process writes in between.
    mock.bump_revision(CATALOG, OFFERING).await;

    let ops = vec![PatchOperation::replace("/kinds/0/versions/0/tags", json!(["lost"]))];
    let err = guard.apply_if_current(&locator, &stale, &ops).await.unwrap_err();

    assert!(matches!(err, CatalogError::Conflict { .. }));
    assert!(err.is_retryable());
    let stored = mock.version(&locator).await.unwrap();
    assert_eq!(stored.fields["tags"], json!(["initial"]));
}

/// An already valid version is not validated again, but is still marked
/// consumable when asked.
#[tokio::test]
async fn test_already_valid_skips_validation_calls() {
    let mock = seeded_catalog().await;
    let locator = VersionLocator::new(CATALOG, "v1");
    mock.set_validation_state(&locator, ValidationState::Valid).await;
    let orch = orchestrator(&mock);

    let report = orch
        .validate_version(&ValidateVersionRequest {
            id: "c1/v1".to_string(),
            offering_id: OFFERING.to_string(),
            revalidate: false,
            mark_consumable: Some(true),
        })
        .await
        .unwrap()
        .unwrap();

    assert!(report.skipped);
    assert!(report.marked_consumable);
    assert_eq!(report.state, ValidationState::Valid);
    assert_eq!(mock.validate_install_calls(), 0);
    assert_eq!(mock.validation_status_calls(), 0);
    assert_eq!(mock.consumable_calls(), 1);
}

/// The newer of two timestamped versions is the latest.
#[test]
fn test_latest_version_is_newest() {
    let versions = vec![
        VersionRecord::new(CATALOG, OFFERING, "v1").with_created(at(0)),
        VersionRecord::new(CATALOG, OFFERING, "v2").with_created(at(60)),
    ];
    assert_eq!(latest_version_in(&versions).unwrap().id, "v2");
}

#[tokio::test]
async fn test_full_validation_cycle() {
    let mock = seeded_catalog().await;
    let locator = VersionLocator::new(CATALOG, "v1");
    mock.script_validation(
        &locator,
        vec![
            ValidationState::InProgress,
            ValidationState::InProgress,
            ValidationState::Valid,
        ],
    )
    .await;
    let orch = orchestrator(&mock);

    let report = orch
        .validate_version(&ValidateVersionRequest {
            id: "c1/v1".to_string(),
            offering_id: OFFERING.to_string(),
            revalidate: false,
            mark_consumable: Some(true),
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.state, ValidationState::Valid);
    assert_eq!(report.polls, 3);
    assert_eq!(report.transitions.len(), 2);
    assert_eq!(mock.validation_status_calls(), 3);
    let stored = mock.version(&locator).await.unwrap();
    assert!(stored.is_consumable);
    assert_eq!(stored.validation_state(), ValidationState::Valid);
}

#[tokio::test]
async fn test_deleted_version_reads_as_gone() {
    let mock = seeded_catalog().await;
    let orch = orchestrator(&mock);

    orch.delete_version(OFFERING, "c1/v1").await.unwrap();

    assert!(orch.read_version("c1/v1").await.unwrap().is_none());
    assert!(orch
        .update_version(&update_tags(json!(["late"])))
        .await
        .unwrap()
        .is_none());
}
