//! Optimistic-concurrency write wrapper.
//!
//! [`RevisionGuard`] sends a patch together with the revision tag the caller
//! captured when it read the version. It never re-reads before writing: if
//! the catalog has moved past that tag the write fails with
//! `CatalogError::Conflict`, and the caller has to restart its whole
//! read-modify-write cycle. Within one process the offering lock prevents
//! that race; across processes this precondition is the only fence.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::CatalogService;
use crate::error::{CatalogError, Result};
use crate::model::{PatchOperation, RevisionTag, VersionLocator, VersionRecord};

pub struct RevisionGuard {
    service: Arc<dyn CatalogService>,
}

impl RevisionGuard {
    pub fn new(service: Arc<dyn CatalogService>) -> Self {
        Self { service }
    }

    /// Apply `operations` to `locator` provided the offering revision is
    /// still `expected`. Returns the version as stored after the write,
    /// picked out of the offering the catalog responds with.
    pub async fn apply_if_current(
        &self,
        locator: &VersionLocator,
        expected: &RevisionTag,
        operations: &[PatchOperation],
    ) -> Result<VersionRecord> {
        if operations.is_empty() {
            return Err(CatalogError::EmptyPatch(locator.to_string()));
        }

        debug!(
            locator = %locator,
            revision = %expected,
            ops = operations.len(),
            "Submitting guarded patch"
        );

        let offering = match self
            .service
            .patch_update_version(locator, expected, operations)
            .await
        {
            Ok(offering) => offering,
            Err(e) if e.is_conflict() => {
                warn!(
                    locator = %locator,
                    revision = %expected,
                    "Revision moved since read, write rejected"
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Some(updated) = offering.into_version(locator) {
            return Ok(updated);
        }

        // The write went through; the response just did not carry the version.
        debug!(locator = %locator, "Patch response lacks the version, re-reading");
        self.service
            .get_version(locator)
            .await?
            .into_version(locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCatalogService;
    use serde_json::json;

    async fn seeded() -> (Arc<MockCatalogService>, VersionLocator) {
        let mock = Arc::new(MockCatalogService::new());
        let version = VersionRecord::new("c1", "o1", "v1").with_field("tags", json!(["old"]));
        mock.insert_offering("c1", "o1", vec![version]).await;
        (mock, VersionLocator::new("c1", "v1"))
    }

    fn retag() -> Vec<PatchOperation> {
        vec![PatchOperation::replace("/kinds/0/versions/0/tags", json!(["new"]))]
    }

    #[tokio::test]
    async fn test_current_revision_is_applied() {
        let (mock, locator) = seeded().await;
        let guard = RevisionGuard::new(mock.clone());
        let rev = mock.current_revision("c1", "o1").await.unwrap();

        let updated = guard.apply_if_current(&locator, &rev, &retag()).await.unwrap();

        assert_eq!(updated.fields["tags"], json!(["new"]));
        assert_ne!(updated.rev.as_ref(), Some(&rev));
        assert_eq!(mock.patch_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_revision_is_conflict() {
        let (mock, locator) = seeded().await;
        let guard = RevisionGuard::new(mock.clone());
        let stale = mock.current_revision("c1", "o1").await.unwrap();
        mock.bump_revision("c1", "o1").await;

        let err = guard
            .apply_if_current(&locator, &stale, &retag())
            .await
            .unwrap_err();

        match err {
            CatalogError::Conflict { expected, .. } => assert_eq!(expected, stale),
            other => panic!("expected conflict, got {other:?}"),
        }
        let stored = mock.version(&locator).await.unwrap();
        assert_eq!(stored.fields["tags"], json!(["old"]));
    }

    #[tokio::test]
    async fn test_patched_version_is_picked_by_locator() {
        let mock = Arc::new(MockCatalogService::new());
        let v1 = VersionRecord::new("c1", "o1", "v1").with_field("tags", json!(["a"]));
        let v2 = VersionRecord::new("c1", "o1", "v2").with_field("tags", json!(["b"]));
        mock.insert_offering("c1", "o1", vec![v1, v2]).await;
        let guard = RevisionGuard::new(mock.clone());
        let rev = mock.current_revision("c1", "o1").await.unwrap();
        let locator = VersionLocator::new("c1", "v2");

        let updated = guard.apply_if_current(&locator, &rev, &retag()).await.unwrap();

        assert_eq!(updated.id, "v2");
        assert_eq!(updated.fields["tags"], json!(["new"]));
        assert_eq!(updated.rev, mock.current_revision("c1", "o1").await);
    }

    #[tokio::test]
    async fn test_offering_revision_is_reported_over_version_revision() {
        let mock = Arc::new(MockCatalogService::new());
        let mut v1 = VersionRecord::new("c1", "o1", "v1").with_field("tags", json!(["old"]));
        v1.rev = Some(RevisionTag::new("version-own-rev"));
        mock.insert_offering("c1", "o1", vec![v1]).await;
        let guard = RevisionGuard::new(mock.clone());
        let rev = mock.current_revision("c1", "o1").await.unwrap();
        let locator = VersionLocator::new("c1", "v1");

        let updated = guard.apply_if_current(&locator, &rev, &retag()).await.unwrap();

        assert_eq!(updated.rev, mock.current_revision("c1", "o1").await);
    }

    #[tokio::test]
    async fn test_response_without_version_falls_back_to_read() {
        let (mock, locator) = seeded().await;
        mock.set_bare_patch_response(true).await;
        let guard = RevisionGuard::new(mock.clone());
        let rev = mock.current_revision("c1", "o1").await.unwrap();

        let updated = guard.apply_if_current(&locator, &rev, &retag()).await.unwrap();

        assert_eq!(updated.fields["tags"], json!(["new"]));
        assert_eq!(mock.patch_calls(), 1);
        assert_eq!(mock.get_version_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_patch_is_rejected_locally() {
        let (mock, locator) = seeded().await;
        let guard = RevisionGuard::new(mock.clone());
        let rev = mock.current_revision("c1", "o1").await.unwrap();

        let err = guard.apply_if_current(&locator, &rev, &[]).await.unwrap_err();

        assert!(matches!(err, CatalogError::EmptyPatch(_)));
        assert_eq!(mock.patch_calls(), 0);
    }
}
