//! Version mutation use cases.
//!
//! Every mutation of a version runs under the offering's [`KeyedMutex`]
//! entry and writes through a [`RevisionGuard`]:
//!
//! ```text
//! lock(catalog, offering) -> read -> [resolve newest] -> diff -> guarded patch
//!     -> unlock -> re-read
//! ```
//!
//! Validation follows the same locking but replaces the write with a
//! validation request and a [`ValidationPoller`] run.
//!
//! A stale-revision `Conflict` is returned to the caller unless the
//! configured [`ConflictConfig`] allows restarts, in which case the
//! read-diff-write cycle is re-run with backoff while the lock is held.

use std::sync::Arc;

use backon::Retryable;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::TokenSource;
use crate::client::CatalogService;
use crate::config::{ConflictConfig, ValidationConfig};
use crate::error::{CatalogError, Result};
use crate::lock::{KeyedMutex, LockKey};
use crate::model::{ImportVersionRequest, ValidationState, VersionLocator, VersionRecord};
use crate::patch::{DesiredFields, PatchDiffBuilder};
use crate::resolver;
use crate::revision::RevisionGuard;
use crate::utils::retry::{conflict_backoff, is_restartable};
use crate::validation::{PollClock, StatusTransition, TokioClock, ValidationPoller};

/// Import a new version into an offering and set its fields.
#[derive(Debug, Clone)]
pub struct CreateVersionRequest {
    pub catalog_id: String,
    pub offering_id: String,
    pub import: ImportVersionRequest,
    pub fields: DesiredFields,
}

/// Change fields of an existing version.
#[derive(Debug, Clone)]
pub struct UpdateVersionRequest {
    /// Caller-stable version id, `catalog/version`.
    pub id: String,
    pub offering_id: String,
    /// Only the fields whose value changed since the last apply.
    pub changed: DesiredFields,
    /// Deprecation setting to apply after the patch, if any.
    pub deprecate: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ValidateVersionRequest {
    /// Caller-stable version id, `catalog/version`.
    pub id: String,
    pub offering_id: String,
    /// Validate again even if the last job already succeeded.
    pub revalidate: bool,
    /// Mark consumable after success. Falls back to the configured default.
    pub mark_consumable: Option<bool>,
}

/// Result of a validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub state: ValidationState,
    pub transitions: Vec<StatusTransition>,
    pub polls: usize,
    pub marked_consumable: bool,
    /// True when the version was already valid and no job was submitted.
    pub skipped: bool,
}

pub struct VersionMutationOrchestrator {
    service: Arc<dyn CatalogService>,
    tokens: Arc<dyn TokenSource>,
    locks: Arc<KeyedMutex>,
    clock: Arc<dyn PollClock>,
    guard: RevisionGuard,
    builder: PatchDiffBuilder,
    validation: ValidationConfig,
    conflict: ConflictConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl VersionMutationOrchestrator {
    pub fn new(service: Arc<dyn CatalogService>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            guard: RevisionGuard::new(service.clone()),
            service,
            tokens,
            locks: Arc::new(KeyedMutex::new()),
            clock: Arc::new(TokioClock),
            builder: PatchDiffBuilder::new(),
            validation: ValidationConfig::default(),
            conflict: ConflictConfig::default(),
            cancel: None,
        }
    }

    /// Share a lock registry with other orchestrators in this process.
    pub fn with_locks(mut self, locks: Arc<KeyedMutex>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validation = config;
        self
    }

    pub fn with_conflict(mut self, config: ConflictConfig) -> Self {
        self.conflict = config;
        self
    }

    /// Abort validation polling once `cancel` holds `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn locks(&self) -> &Arc<KeyedMutex> {
        &self.locks
    }

    /// Import a version, then patch the caller's fields onto it.
    ///
    /// The import response does not identify the new version, so it is
    /// taken to be the newest one in the offering listing.
    #[tracing::instrument(
        name = "version.create",
        skip_all,
        fields(catalog_id = %request.catalog_id, offering_id = %request.offering_id)
    )]
    pub async fn create_version(&self, request: &CreateVersionRequest) -> Result<VersionRecord> {
        let key = LockKey::new(&request.catalog_id, &request.offering_id);
        let guard = self.locks.lock(&key).await;

        self.service
            .import_version(&request.catalog_id, &request.offering_id, &request.import)
            .await?;

        let offering = self
            .service
            .get_offering(&request.catalog_id, &request.offering_id)
            .await?;
        let locator = resolver::latest_version(&offering)?.version_locator.clone();
        let imported = offering
            .into_version(&locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        info!(locator = %locator, "Imported version");

        self.patch_fields(&locator, imported, &request.fields).await?;
        drop(guard);

        self.fetch_version(&locator)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("version {}", locator.to_slash())))
    }

    /// Patch the changed fields of an existing version.
    ///
    /// Returns `None` when the version no longer exists.
    #[tracing::instrument(
        name = "version.update",
        skip_all,
        fields(id = %request.id, offering_id = %request.offering_id)
    )]
    pub async fn update_version(
        &self,
        request: &UpdateVersionRequest,
    ) -> Result<Option<VersionRecord>> {
        let locator = VersionLocator::parse(&request.id)?;
        let key = LockKey::new(locator.catalog_id(), &request.offering_id);
        let guard = self.locks.lock(&key).await;

        let Some(observed) = self.fetch_version(&locator).await? else {
            warn!(locator = %locator, "Version is gone, nothing to update");
            return Ok(None);
        };

        self.patch_fields(&locator, observed, &request.changed).await?;

        if let Some(deprecate) = request.deprecate {
            self.service.set_deprecate_version(&locator, deprecate).await?;
            debug!(locator = %locator, deprecate, "Applied deprecation setting");
        }
        drop(guard);

        self.fetch_version(&locator).await
    }

    /// Run install validation for a version and wait for the verdict.
    ///
    /// Returns `None` when the version no longer exists. A job ending in
    /// `invalid` or `expired` is reported as `ValidationFailed`.
    #[tracing::instrument(
        name = "version.validate",
        skip_all,
        fields(id = %request.id, offering_id = %request.offering_id)
    )]
    pub async fn validate_version(
        &self,
        request: &ValidateVersionRequest,
    ) -> Result<Option<ValidationReport>> {
        let locator = VersionLocator::parse(&request.id)?;
        let key = LockKey::new(locator.catalog_id(), &request.offering_id);
        let _guard = self.locks.lock(&key).await;

        let Some(observed) = self.fetch_version(&locator).await? else {
            warn!(locator = %locator, "Version is gone, nothing to validate");
            return Ok(None);
        };
        let mark_consumable = request
            .mark_consumable
            .unwrap_or(self.validation.mark_consumable);
        let current = observed.validation_state();

        if current == ValidationState::Valid && !request.revalidate {
            debug!(locator = %locator, "Version already valid, skipping validation");
            let marked_consumable = self.mark_consumable(&locator, mark_consumable).await?;
            return Ok(Some(ValidationReport {
                state: current,
                transitions: Vec::new(),
                polls: 0,
                marked_consumable,
                skipped: true,
            }));
        }

        let token = self.tokens.refresh_token().await?;
        self.service.validate_install(&locator, &token).await?;
        info!(locator = %locator, "Requested install validation");

        let outcome = self
            .poller()
            .poll_until_terminal(&locator, &token, current)
            .await?;

        if !outcome.is_valid() {
            warn!(locator = %locator, state = %outcome.final_state, "Validation failed");
            return Err(CatalogError::ValidationFailed {
                state: outcome.final_state,
                message: outcome.message.unwrap_or_default(),
            });
        }

        let marked_consumable = self.mark_consumable(&locator, mark_consumable).await?;
        info!(locator = %locator, polls = outcome.polls, "Version validated");
        Ok(Some(ValidationReport {
            state: outcome.final_state,
            transitions: outcome.transitions,
            polls: outcome.polls,
            marked_consumable,
            skipped: false,
        }))
    }

    /// Read a version by its caller-stable id. `None` when it is gone.
    pub async fn read_version(&self, id: &str) -> Result<Option<VersionRecord>> {
        let locator = VersionLocator::parse(id)?;
        self.fetch_version(&locator).await
    }

    /// Delete a version. A version that is already gone counts as deleted.
    #[tracing::instrument(name = "version.delete", skip_all, fields(%id, %offering_id))]
    pub async fn delete_version(&self, offering_id: &str, id: &str) -> Result<()> {
        let locator = VersionLocator::parse(id)?;
        let key = LockKey::new(locator.catalog_id(), offering_id);
        let _guard = self.locks.lock(&key).await;

        match self.service.delete_version(&locator).await {
            Ok(()) => {
                info!(locator = %locator, "Deleted version");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(locator = %locator, "Version already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Guarded patch of `desired` onto `locator`, starting from `observed`.
    ///
    /// Restarts after a conflict re-read the version first.
    async fn patch_fields(
        &self,
        locator: &VersionLocator,
        observed: VersionRecord,
        desired: &DesiredFields,
    ) -> Result<Option<VersionRecord>> {
        if desired.is_empty() {
            debug!(locator = %locator, "No changed fields, skipping write");
            return Ok(None);
        }

        let mut snapshot = Some(observed);
        let mut cycle = move || {
            let seeded = snapshot.take();
            async move {
                let observed = match seeded {
                    Some(record) => record,
                    None => self
                        .fetch_version(locator)
                        .await?
                        .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?,
                };
                let rev = observed
                    .rev
                    .clone()
                    .ok_or_else(|| CatalogError::MissingRevision(format!("version {locator}")))?;
                let ops = self.builder.build(&observed, desired);
                let updated = self.guard.apply_if_current(locator, &rev, &ops).await?;
                info!(locator = %locator, ops = ops.len(), "Patched version");
                Ok(Some(updated))
            }
        };

        if self.conflict.max_restarts == 0 {
            return cycle().await;
        }

        cycle
            .retry(conflict_backoff(&self.conflict))
            .when(is_restartable)
            .notify(|e: &CatalogError, delay| {
                warn!(locator = %locator, error = %e, ?delay, "Restarting after conflict");
            })
            .await
    }

    async fn fetch_version(&self, locator: &VersionLocator) -> Result<Option<VersionRecord>> {
        match self.service.get_version(locator).await {
            Ok(offering) => Ok(offering.into_version(locator)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn mark_consumable(&self, locator: &VersionLocator, requested: bool) -> Result<bool> {
        if !requested {
            return Ok(false);
        }
        self.service.consumable_version(locator).await?;
        debug!(locator = %locator, "Marked version consumable");
        Ok(true)
    }

    fn poller(&self) -> ValidationPoller {
        let poller = ValidationPoller::new(self.service.clone(), self.clock.clone())
            .with_interval(self.validation.poll_interval())
            .with_deadline(self.validation.deadline());
        match &self.cancel {
            Some(cancel) => poller.with_cancel(cancel.clone()),
            None => poller,
        }
    }
}
