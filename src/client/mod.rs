//! Remote catalog service interface.
//!
//! The orchestrator consumes the catalog only through [`CatalogService`].
//! Implementations:
//! - `HttpCatalogClient`: REST client for the catalog management API
//! - `MockCatalogService`: In-memory service for tests

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ImportVersionRequest, Offering, PatchOperation, RevisionTag, ValidationJob, VersionLocator,
};

mod http;
pub mod mock;

pub use http::HttpCatalogClient;
pub use mock::MockCatalogService;

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetch an offering together with every version of every kind.
    async fn get_offering(&self, catalog_id: &str, offering_id: &str) -> Result<Offering>;

    /// Fetch one version, wrapped in its offering at `kinds[0].versions[0]`.
    async fn get_version(&self, locator: &VersionLocator) -> Result<Offering>;

    /// Import a new version into an offering. Returns the updated offering.
    async fn import_version(
        &self,
        catalog_id: &str,
        offering_id: &str,
        request: &ImportVersionRequest,
    ) -> Result<Offering>;

    /// Apply a JSON patch to a version, guarded by `if_match`.
    ///
    /// Fails with `Conflict` when the stored revision moved past `if_match`.
    /// Returns the whole enclosing offering, not just the patched version.
    async fn patch_update_version(
        &self,
        locator: &VersionLocator,
        if_match: &RevisionTag,
        operations: &[PatchOperation],
    ) -> Result<Offering>;

    async fn delete_version(&self, locator: &VersionLocator) -> Result<()>;

    async fn set_deprecate_version(&self, locator: &VersionLocator, deprecate: bool)
        -> Result<()>;

    /// Request install validation. Returns without waiting for the job.
    async fn validate_install(&self, locator: &VersionLocator, refresh_token: &str)
        -> Result<()>;

    async fn get_validation_status(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
    ) -> Result<ValidationJob>;

    /// Mark a validated version consumable. Idempotent.
    async fn consumable_version(&self, locator: &VersionLocator) -> Result<()>;
}
