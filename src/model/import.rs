//! Import options for adding a new version to an offering.

use serde::Serialize;
use serde_json::Value;

/// Body of the import-version call. Unset options are omitted from the
/// request so the catalog applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportVersionRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_kinds: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zipurl: Option<String>,
    /// Sent as both `target_version` and `version`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_config: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_vsi: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repotype: Option<String>,
    /// Repository token, forwarded as the `X-Auth-Token` header.
    #[serde(skip)]
    pub x_auth_token: Option<String>,
}

impl ImportVersionRequest {
    pub fn from_zipurl(zipurl: impl Into<String>) -> Self {
        Self {
            zipurl: Some(zipurl.into()),
            ..Default::default()
        }
    }

    pub fn with_target_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.target_version = Some(version.clone());
        self.version = Some(version);
        self
    }
}
