//! Offering and version documents.
//!
//! Only the fields the mutation machinery reasons about are typed. Every
//! other attribute of a version is kept verbatim in `fields` so patches
//! can test for presence without a schema for each one.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ValidationJob, VersionLocator};

/// Opaque optimistic-concurrency stamp issued by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionTag(String);

impl RevisionTag {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted entity-tag form for the `If-Match` header.
    pub fn if_match(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for RevisionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One version of an offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    pub catalog_id: String,
    pub offering_id: String,
    pub version_locator: VersionLocator,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<RevisionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationJob>,
    #[serde(default)]
    pub is_consumable: bool,
    /// Remaining version attributes, keyed by their wire name.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl VersionRecord {
    pub fn new(
        catalog_id: impl Into<String>,
        offering_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let catalog_id = catalog_id.into();
        let id = id.into();
        Self {
            version_locator: VersionLocator::new(catalog_id.clone(), id.clone()),
            id,
            catalog_id,
            offering_id: offering_id.into(),
            rev: None,
            created: None,
            version: None,
            kind_id: None,
            validation: None,
            is_consumable: false,
            fields: Map::new(),
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// State of the validation job, `Empty` when none was ever requested.
    pub fn validation_state(&self) -> super::ValidationState {
        self.validation
            .as_ref()
            .map(|job| job.state)
            .unwrap_or_default()
    }

    /// Caller-stable identifier (`catalog/version`).
    pub fn stable_id(&self) -> String {
        self.version_locator.to_slash()
    }
}

/// A grouping of versions sharing an install format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_kind: Option<String>,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

/// An offering document as returned by offering and version lookups.
///
/// A version lookup returns the enclosing offering trimmed to the requested
/// version. A version patch returns the whole enclosing offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub id: String,
    pub catalog_id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<RevisionTag>,
    #[serde(default)]
    pub kinds: Vec<Kind>,
}

impl Offering {
    /// Iterate every version across all kinds, in listing order.
    pub fn versions(&self) -> impl Iterator<Item = &VersionRecord> {
        self.kinds.iter().flat_map(|kind| kind.versions.iter())
    }

    /// The version at `locator`, searched across all kinds, stamped with
    /// the offering revision.
    ///
    /// Writes are guarded by the offering revision, so a revision carried
    /// by the version document itself is never used as the write tag.
    pub fn into_version(self, locator: &VersionLocator) -> Option<VersionRecord> {
        let rev = self.rev;
        let mut version = self
            .kinds
            .into_iter()
            .flat_map(|kind| kind.versions)
            .find(|v| &v.version_locator == locator)?;
        version.rev = rev.or(version.rev);
        Some(version)
    }
}
