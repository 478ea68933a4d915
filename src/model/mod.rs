//! Catalog data model.

mod import;
mod locator;
mod patch;
mod validation;
mod version;

pub use import::ImportVersionRequest;
pub use locator::VersionLocator;
pub use patch::{PatchOp, PatchOperation};
pub use validation::{ValidationJob, ValidationState};
pub use version::{Kind, Offering, RevisionTag, VersionRecord};
