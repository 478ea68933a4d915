//! Remote validation job state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VersionLocator;

/// Validation job state as reported by the catalog.
///
/// The wire encoding is a plain string; an empty string means validation
/// has never been requested for the version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationState {
    #[default]
    #[serde(rename = "")]
    Empty,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "valid")]
    Valid,
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "expired")]
    Expired,
}

impl ValidationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::InProgress => "in_progress",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Valid | Self::Invalid | Self::Expired)
    }

    /// Whether the job may move from `self` to `next` without a new
    /// validation request. Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: ValidationState) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Empty => next == Self::InProgress || next.is_terminal(),
            Self::InProgress => next.is_terminal(),
            Self::Valid | Self::Invalid | Self::Expired => false,
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("<empty>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The validation sub-document of a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationJob {
    /// Populated locally; the catalog does not echo it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_locator: Option<VersionLocator>,
    #[serde(default)]
    pub state: ValidationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationJob {
    pub fn with_state(state: ValidationState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }
}
