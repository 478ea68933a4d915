//! In-memory catalog service for testing.
//!
//! Behaves like the remote catalog where the mutation machinery cares:
//! every successful write bumps the offering revision, writes carrying a
//! stale revision are rejected with `Conflict`, patches answer with the
//! whole enclosing offering, and validation status follows a per-version
//! script.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::CatalogService;
use crate::error::{CatalogError, Result};
use crate::model::{
    ImportVersionRequest, Kind, Offering, PatchOp, PatchOperation, RevisionTag, ValidationJob,
    ValidationState, VersionLocator, VersionRecord,
};

/// Prefix every patch path is rooted at.
const VERSION_ROOT: &str = "/kinds/0/versions/0/";

#[derive(Default)]
struct CallCounts {
    get_offering: AtomicUsize,
    get_version: AtomicUsize,
    import_version: AtomicUsize,
    patch: AtomicUsize,
    delete: AtomicUsize,
    deprecate: AtomicUsize,
    validate_install: AtomicUsize,
    validation_status: AtomicUsize,
    consumable: AtomicUsize,
}

#[derive(Default)]
pub struct MockCatalogService {
    offerings: RwLock<HashMap<(String, String), Offering>>,
    revisions: RwLock<HashMap<(String, String), u64>>,
    validation_scripts: RwLock<HashMap<VersionLocator, VecDeque<ValidationState>>>,
    deprecated: RwLock<HashMap<VersionLocator, bool>>,
    fail_on_patch: RwLock<bool>,
    bare_patch_response: RwLock<bool>,
    calls: CallCounts,
}

impl MockCatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an offering. Versions are stored as given; the revision starts at 1.
    pub async fn insert_offering(
        &self,
        catalog_id: &str,
        offering_id: &str,
        versions: Vec<VersionRecord>,
    ) {
        let key = (catalog_id.to_string(), offering_id.to_string());
        let offering = Offering {
            id: offering_id.to_string(),
            catalog_id: catalog_id.to_string(),
            rev: Some(revision_tag(1)),
            kinds: vec![Kind {
                id: format!("{offering_id}-kind"),
                format_kind: Some("terraform".to_string()),
                install_kind: Some("instance".to_string()),
                versions,
            }],
        };
        self.offerings.write().await.insert(key.clone(), offering);
        self.revisions.write().await.insert(key, 1);
    }

    /// Simulate a write from another process by moving the revision forward.
    pub async fn bump_revision(
        &self,
        catalog_id: &str,
        offering_id: &str,
    ) -> Option<RevisionTag> {
        let key = (catalog_id.to_string(), offering_id.to_string());
        let mut offerings = self.offerings.write().await;
        let offering = offerings.get_mut(&key)?;
        Some(self.next_revision(&key, offering).await)
    }

    /// Script the states returned by successive status polls for `locator`.
    /// The last state repeats once the script runs out.
    pub async fn script_validation(&self, locator: &VersionLocator, states: Vec<ValidationState>) {
        self.validation_scripts
            .write()
            .await
            .insert(locator.clone(), states.into());
    }

    pub async fn set_validation_state(&self, locator: &VersionLocator, state: ValidationState) {
        let mut offerings = self.offerings.write().await;
        if let Some(version) = find_version_mut(&mut offerings, locator) {
            version.validation = Some(ValidationJob::with_state(state));
        }
    }

    pub async fn set_fail_on_patch(&self, fail: bool) {
        *self.fail_on_patch.write().await = fail;
    }

    /// Answer successful patches with the offering stripped of its kinds.
    pub async fn set_bare_patch_response(&self, bare: bool) {
        *self.bare_patch_response.write().await = bare;
    }

    pub async fn current_revision(
        &self,
        catalog_id: &str,
        offering_id: &str,
    ) -> Option<RevisionTag> {
        let key = (catalog_id.to_string(), offering_id.to_string());
        self.offerings.read().await.get(&key).and_then(|o| o.rev.clone())
    }

    pub async fn version(&self, locator: &VersionLocator) -> Option<VersionRecord> {
        let offerings = self.offerings.read().await;
        let found = offerings
            .values()
            .flat_map(|o| o.versions())
            .find(|v| &v.version_locator == locator)
            .cloned();
        found
    }

    pub async fn is_deprecated(&self, locator: &VersionLocator) -> bool {
        self.deprecated.read().await.get(locator).copied().unwrap_or(false)
    }

    pub fn get_offering_calls(&self) -> usize {
        self.calls.get_offering.load(Ordering::SeqCst)
    }

    pub fn get_version_calls(&self) -> usize {
        self.calls.get_version.load(Ordering::SeqCst)
    }

    pub fn import_calls(&self) -> usize {
        self.calls.import_version.load(Ordering::SeqCst)
    }

    pub fn patch_calls(&self) -> usize {
        self.calls.patch.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    pub fn deprecate_calls(&self) -> usize {
        self.calls.deprecate.load(Ordering::SeqCst)
    }

    pub fn validate_install_calls(&self) -> usize {
        self.calls.validate_install.load(Ordering::SeqCst)
    }

    pub fn validation_status_calls(&self) -> usize {
        self.calls.validation_status.load(Ordering::SeqCst)
    }

    pub fn consumable_calls(&self) -> usize {
        self.calls.consumable.load(Ordering::SeqCst)
    }

    async fn next_revision(&self, key: &(String, String), offering: &mut Offering) -> RevisionTag {
        let mut revisions = self.revisions.write().await;
        let counter = revisions.entry(key.clone()).or_insert(1);
        *counter += 1;
        let rev = revision_tag(*counter);
        offering.rev = Some(rev.clone());
        rev
    }
}

fn revision_tag(n: u64) -> RevisionTag {
    RevisionTag::new(format!("{n}-mock"))
}

fn find_version_mut<'a>(
    offerings: &'a mut HashMap<(String, String), Offering>,
    locator: &VersionLocator,
) -> Option<&'a mut VersionRecord> {
    offerings
        .values_mut()
        .flat_map(|o| o.kinds.iter_mut())
        .flat_map(|k| k.versions.iter_mut())
        .find(|v| &v.version_locator == locator)
}

fn key_of(
    offerings: &HashMap<(String, String), Offering>,
    locator: &VersionLocator,
) -> Option<(String, String)> {
    offerings
        .iter()
        .find(|(_, o)| o.versions().any(|v| &v.version_locator == locator))
        .map(|(key, _)| key.clone())
}

/// The enclosing offering trimmed to the single requested version.
fn single_version_view(offering: &Offering, locator: &VersionLocator) -> Option<Offering> {
    offering.kinds.iter().find_map(|kind| {
        let version = kind.versions.iter().find(|v| &v.version_locator == locator)?;
        Some(Offering {
            kinds: vec![Kind {
                versions: vec![version.clone()],
                ..kind.clone()
            }],
            ..offering.clone()
        })
    })
}

/// Write `value` at a `/`-separated path below the version's fields.
fn apply_operation(fields: &mut Map<String, Value>, op: &PatchOperation) -> Result<()> {
    let relative = op.path.strip_prefix(VERSION_ROOT).ok_or_else(|| CatalogError::Api {
        status: 400,
        body: format!("patch path outside version: {}", op.path),
    })?;
    let mut segments: Vec<&str> = relative.split('/').collect();
    let leaf = segments.pop().unwrap_or_default();

    let mut target = fields;
    for segment in segments {
        let next = target
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !next.is_object() {
            *next = Value::Object(Map::new());
        }
        target = next.as_object_mut().ok_or_else(|| CatalogError::Api {
            status: 400,
            body: format!("patch path crosses a non-object: {}", op.path),
        })?;
    }

    let present = target.get(leaf).is_some_and(|v| !v.is_null());
    if op.op == PatchOp::Replace && !present {
        return Err(CatalogError::Api {
            status: 400,
            body: format!("cannot replace missing path {}", op.path),
        });
    }
    target.insert(leaf.to_string(), op.value.clone());
    Ok(())
}

#[async_trait]
impl CatalogService for MockCatalogService {
    async fn get_offering(&self, catalog_id: &str, offering_id: &str) -> Result<Offering> {
        self.calls.get_offering.fetch_add(1, Ordering::SeqCst);
        let key = (catalog_id.to_string(), offering_id.to_string());
        self.offerings
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| CatalogError::not_found(format!("offering {catalog_id}/{offering_id}")))
    }

    async fn get_version(&self, locator: &VersionLocator) -> Result<Offering> {
        self.calls.get_version.fetch_add(1, Ordering::SeqCst);
        let offerings = self.offerings.read().await;
        let view = offerings
            .values()
            .find_map(|o| single_version_view(o, locator));
        view.ok_or_else(|| CatalogError::not_found(format!("version {locator}")))
    }

    async fn import_version(
        &self,
        catalog_id: &str,
        offering_id: &str,
        request: &ImportVersionRequest,
    ) -> Result<Offering> {
        let n = self.calls.import_version.fetch_add(1, Ordering::SeqCst) + 1;
        let key = (catalog_id.to_string(), offering_id.to_string());
        let mut offerings = self.offerings.write().await;
        let offering = offerings
            .get_mut(&key)
            .ok_or_else(|| {
                CatalogError::not_found(format!("offering {catalog_id}/{offering_id}"))
            })?;

        let newest = offering.versions().filter_map(|v| v.created).max();
        let now = Utc::now();
        let created = match newest {
            Some(newest) if newest >= now => newest + ChronoDuration::milliseconds(1),
            _ => now,
        };

        let mut version = VersionRecord::new(catalog_id, offering_id, format!("imported-{n}"))
            .with_created(created);
        version.version = request.target_version.clone();
        if !request.tags.is_empty() {
            version
                .fields
                .insert("tags".to_string(), serde_json::to_value(&request.tags)?);
        }

        match offering.kinds.first_mut() {
            Some(kind) => kind.versions.push(version),
            None => offering.kinds.push(Kind {
                id: format!("{offering_id}-kind"),
                versions: vec![version],
                ..Default::default()
            }),
        }
        self.next_revision(&key, offering).await;
        Ok(offering.clone())
    }

    async fn patch_update_version(
        &self,
        locator: &VersionLocator,
        if_match: &RevisionTag,
        operations: &[PatchOperation],
    ) -> Result<Offering> {
        self.calls.patch.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_patch.read().await {
            return Err(CatalogError::Api {
                status: 500,
                body: "injected patch failure".to_string(),
            });
        }

        let mut offerings = self.offerings.write().await;
        let key = key_of(&offerings, locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        let offering = offerings
            .get_mut(&key)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;

        if offering.rev.as_ref() != Some(if_match) {
            return Err(CatalogError::Conflict {
                locator: locator.to_string(),
                expected: if_match.clone(),
            });
        }

        // Apply to a copy so a rejected operation leaves the version untouched.
        let version = offering
            .kinds
            .iter_mut()
            .flat_map(|k| k.versions.iter_mut())
            .find(|v| &v.version_locator == locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        let mut fields = version.fields.clone();
        for op in operations {
            apply_operation(&mut fields, op)?;
        }
        version.fields = fields;

        self.next_revision(&key, offering).await;
        if *self.bare_patch_response.read().await {
            return Ok(Offering {
                kinds: Vec::new(),
                ..offering.clone()
            });
        }
        Ok(offering.clone())
    }

    async fn delete_version(&self, locator: &VersionLocator) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let mut offerings = self.offerings.write().await;
        let key = key_of(&offerings, locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        if let Some(offering) = offerings.get_mut(&key) {
            for kind in &mut offering.kinds {
                kind.versions.retain(|v| &v.version_locator != locator);
            }
            self.next_revision(&key, offering).await;
        }
        Ok(())
    }

    async fn set_deprecate_version(
        &self,
        locator: &VersionLocator,
        deprecate: bool,
    ) -> Result<()> {
        self.calls.deprecate.fetch_add(1, Ordering::SeqCst);
        if self.version(locator).await.is_none() {
            return Err(CatalogError::not_found(format!("version {locator}")));
        }
        self.deprecated.write().await.insert(locator.clone(), deprecate);
        Ok(())
    }

    async fn validate_install(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
    ) -> Result<()> {
        self.calls.validate_install.fetch_add(1, Ordering::SeqCst);
        if refresh_token.is_empty() {
            return Err(CatalogError::Auth("missing refresh token".to_string()));
        }
        let mut offerings = self.offerings.write().await;
        let version = find_version_mut(&mut offerings, locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        version.validation = Some(ValidationJob {
            state: ValidationState::InProgress,
            requested: Some(Utc::now()),
            last_operation: Some("install".to_string()),
            ..Default::default()
        });
        Ok(())
    }

    async fn get_validation_status(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
    ) -> Result<ValidationJob> {
        self.calls.validation_status.fetch_add(1, Ordering::SeqCst);
        if refresh_token.is_empty() {
            return Err(CatalogError::Auth("missing refresh token".to_string()));
        }

        let scripted = {
            let mut scripts = self.validation_scripts.write().await;
            scripts.get_mut(locator).and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().copied()
                }
            })
        };

        let mut offerings = self.offerings.write().await;
        let version = find_version_mut(&mut offerings, locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        let job = version.validation.get_or_insert_with(ValidationJob::default);
        if let Some(state) = scripted {
            job.state = state;
            if state == ValidationState::Valid {
                job.validated = Some(Utc::now());
            }
        }
        Ok(job.clone())
    }

    async fn consumable_version(&self, locator: &VersionLocator) -> Result<()> {
        self.calls.consumable.fetch_add(1, Ordering::SeqCst);
        let mut offerings = self.offerings.write().await;
        let version = find_version_mut(&mut offerings, locator)
            .ok_or_else(|| CatalogError::not_found(format!("version {locator}")))?;
        version.is_consumable = true;
        Ok(())
    }
}
