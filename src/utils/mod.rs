//! Shared helpers for tracing setup and retry backoff.

pub mod bootstrap;
pub mod retry;
