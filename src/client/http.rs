//! REST client for the catalog management API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, IF_MATCH};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::CatalogService;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::model::{
    ImportVersionRequest, Offering, PatchOperation, RevisionTag, ValidationJob, VersionLocator,
};

const JSON_PATCH: &str = "application/json-patch+json";
const REFRESH_TOKEN_HEADER: &str = "X-Auth-Refresh-Token";
const REPO_TOKEN_HEADER: &str = "X-Auth-Token";

/// HTTP implementation of [`CatalogService`].
///
/// Every request carries the bearer token supplied at construction.
/// Response status is classified by [`classify_status`].
pub struct HttpCatalogClient {
    client: Client,
    endpoint: String,
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig, bearer_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|e| CatalogError::Auth(format!("invalid bearer token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            error!(call = what, error = %e, "Catalog request failed");
            CatalogError::Transport(e)
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(call = what, status = %status, "Catalog request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_status(what, status, body);
        if !err.is_not_found() && !err.is_conflict() {
            error!(call = what, status = %status, "Catalog request rejected");
        }
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        what: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.send(what, request).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Map a non-success status to the error taxonomy.
pub(crate) fn classify_status(what: &str, status: StatusCode, body: String) -> CatalogError {
    match status {
        StatusCode::NOT_FOUND => CatalogError::not_found(what.to_string()),
        // Callers that sent a precondition substitute the revision they sent.
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => CatalogError::Conflict {
            locator: what.to_string(),
            expected: RevisionTag::new(String::new()),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatalogError::Auth(format!("{what}: HTTP {status}"))
        }
        _ => CatalogError::Api {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        },
    }
}

fn version_path(locator: &VersionLocator) -> String {
    format!("/versions/{}", locator.to_dotted())
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    async fn get_offering(&self, catalog_id: &str, offering_id: &str) -> Result<Offering> {
        let url = self.url(&format!("/catalogs/{catalog_id}/offerings/{offering_id}"));
        self.send_json(&format!("offering {catalog_id}/{offering_id}"), self.client.get(url))
            .await
    }

    async fn get_version(&self, locator: &VersionLocator) -> Result<Offering> {
        let url = self.url(&version_path(locator));
        self.send_json(&format!("version {locator}"), self.client.get(url))
            .await
    }

    async fn import_version(
        &self,
        catalog_id: &str,
        offering_id: &str,
        request: &ImportVersionRequest,
    ) -> Result<Offering> {
        let url = self.url(&format!(
            "/catalogs/{catalog_id}/offerings/{offering_id}/version"
        ));
        let mut builder = self.client.post(url).json(request);
        if let Some(token) = &request.x_auth_token {
            builder = builder.header(REPO_TOKEN_HEADER, token);
        }
        self.send_json(&format!("import into {catalog_id}/{offering_id}"), builder)
            .await
    }

    async fn patch_update_version(
        &self,
        locator: &VersionLocator,
        if_match: &RevisionTag,
        operations: &[PatchOperation],
    ) -> Result<Offering> {
        let url = self.url(&version_path(locator));
        let body = serde_json::to_vec(operations)?;
        let builder = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, JSON_PATCH)
            .header(IF_MATCH, if_match.if_match())
            .body(body);

        self.send_json(&format!("patch version {locator}"), builder)
            .await
            .map_err(|e| match e {
                CatalogError::Conflict { locator, .. } => CatalogError::Conflict {
                    locator,
                    expected: if_match.clone(),
                },
                other => other,
            })
    }

    async fn delete_version(&self, locator: &VersionLocator) -> Result<()> {
        let url = self.url(&version_path(locator));
        self.send(&format!("delete version {locator}"), self.client.delete(url))
            .await?;
        Ok(())
    }

    async fn set_deprecate_version(
        &self,
        locator: &VersionLocator,
        deprecate: bool,
    ) -> Result<()> {
        let url = self.url(&format!("{}/deprecate/{deprecate}", version_path(locator)));
        self.send(&format!("deprecate version {locator}"), self.client.post(url))
            .await?;
        Ok(())
    }

    async fn validate_install(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
    ) -> Result<()> {
        let url = self.url(&format!("{}/validation/install", version_path(locator)));
        let builder = self
            .client
            .post(url)
            .header(REFRESH_TOKEN_HEADER, refresh_token)
            .json(&serde_json::json!({}));
        self.send(&format!("validate version {locator}"), builder)
            .await?;
        Ok(())
    }

    async fn get_validation_status(
        &self,
        locator: &VersionLocator,
        refresh_token: &str,
    ) -> Result<ValidationJob> {
        let url = self.url(&format!("{}/validation/install", version_path(locator)));
        let builder = self.client.get(url).header(REFRESH_TOKEN_HEADER, refresh_token);
        let mut job: ValidationJob = self
            .send_json(&format!("validation status {locator}"), builder)
            .await?;
        job.version_locator = Some(locator.clone());
        Ok(job)
    }

    async fn consumable_version(&self, locator: &VersionLocator) -> Result<()> {
        let url = self.url(&format!("{}/consume-publish", version_path(locator)));
        self.send(&format!("consumable version {locator}"), self.client.post(url))
            .await?;
        Ok(())
    }
}
