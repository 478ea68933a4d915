//! Newest-version resolution over an offering listing.
//!
//! After an import the catalog does not say which version it created, and
//! the listing spans every kind of the offering. The newest entry by
//! creation time is taken to be the import.

use crate::error::{CatalogError, Result};
use crate::model::{Offering, VersionRecord};

/// Newest version across all kinds of `offering`.
pub fn latest_version(offering: &Offering) -> Result<&VersionRecord> {
    latest_of(offering.versions())
        .ok_or_else(|| CatalogError::not_found(format!("versions of offering {}", offering.id)))
}

/// Newest version in a flat slice.
pub fn latest_version_in(versions: &[VersionRecord]) -> Result<&VersionRecord> {
    latest_of(versions.iter()).ok_or_else(|| CatalogError::not_found("versions"))
}

/// Entries without a creation time are skipped. On an exact tie the first
/// entry encountered is kept, which makes the result depend on listing
/// order.
fn latest_of<'a>(versions: impl Iterator<Item = &'a VersionRecord>) -> Option<&'a VersionRecord> {
    versions
        .filter_map(|v| v.created.map(|created| (created, v)))
        .fold(None, |latest, (created, v)| match latest {
            Some((newest, _)) if created <= newest => latest,
            _ => Some((created, v)),
        })
        .map(|(_, v)| v)
}
