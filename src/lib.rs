//! Catalog Versions - concurrency-safe mutation of catalog offering versions
//!
//! Serializes in-process writers per offering, guards every write with the
//! catalog's revision tag, builds presence-driven JSON patches, resolves
//! freshly imported versions, and drives install validation jobs to a
//! terminal state.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod orchestrator;
pub mod patch;
pub mod resolver;
pub mod revision;
pub mod utils;
pub mod validation;

pub use error::{CatalogError, Result};
pub use lock::{KeyedGuard, KeyedMutex, LockKey};
pub use orchestrator::{
    CreateVersionRequest, UpdateVersionRequest, ValidateVersionRequest, ValidationReport,
    VersionMutationOrchestrator,
};
pub use patch::{DesiredFields, ManagedField, PatchDiffBuilder};
pub use revision::RevisionGuard;
pub use validation::ValidationPoller;
