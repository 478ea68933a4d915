//! Shared fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use catalog_versions::auth::StaticTokenSource;
use catalog_versions::client::MockCatalogService;
use catalog_versions::model::VersionRecord;
use catalog_versions::validation::ManualClock;
use catalog_versions::{KeyedMutex, VersionMutationOrchestrator};
use chrono::{DateTime, Utc};
use serde_json::json;

pub const CATALOG: &str = "c1";
pub const OFFERING: &str = "o1";

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("timestamp in range")
}

/// Mock holding `c1`/`o1` with a single version `v1`.
pub async fn seeded_catalog() -> Arc<MockCatalogService> {
    let mock = Arc::new(MockCatalogService::new());
    let v1 = VersionRecord::new(CATALOG, OFFERING, "v1")
        .with_created(at(0))
        .with_field("tags", json!(["initial"]))
        .with_field("long_description", json!("First release"));
    mock.insert_offering(CATALOG, OFFERING, vec![v1]).await;
    mock
}

pub fn orchestrator(mock: &Arc<MockCatalogService>) -> VersionMutationOrchestrator {
    VersionMutationOrchestrator::new(mock.clone(), Arc::new(StaticTokenSource::new("refresh")))
        .with_clock(Arc::new(ManualClock::new()))
}

pub fn orchestrator_sharing(
    mock: &Arc<MockCatalogService>,
    locks: &Arc<KeyedMutex>,
) -> VersionMutationOrchestrator {
    orchestrator(mock).with_locks(locks.clone())
}
