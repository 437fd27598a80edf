//! HTTP client for the external relationship-based authorization engine.
//!
//! Stateless per call; connection reuse comes from `reqwest::Client`'s own
//! pooling. Never holds a database transaction open while a request to this
//! client is in flight (see the worker's transaction rule).

use async_trait::async_trait;
use karto_errors::{AppError, AppResult};
use karto_ports::{AuthorizationEnginePort, RelationshipOp, RelationshipRef};
use serde::Deserialize;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

pub struct AuthzEngineClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl AuthzEngineClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build authorization-engine client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        req
    }
}

#[async_trait]
impl AuthorizationEnginePort for AuthzEngineClient {
    async fn apply(&self, ops: &[RelationshipOp]) -> AppResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let response = self
            .request(reqwest::Method::POST, "/v1/relationships/batch")
            .json(&serde_json::json!({ "operations": ops }))
            .send()
            .await
            .map_err(|e| AppError::authorization_engine(format!("request failed: {e}")))?;

        if response.status().is_success() {
            return Ok(());
        }

        if response.status().is_server_error() || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::authorization_engine(format!(
                "authorization engine returned {}",
                response.status()
            )));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::authorization_engine(format!(
            "authorization engine rejected operation: {status} {body}"
        )))
    }

    async fn check_permission(&self, check: &RelationshipRef) -> AppResult<bool> {
        let response = self
            .request(reqwest::Method::POST, "/v1/permissions/check")
            .json(check)
            .send()
            .await
            .map_err(|e| AppError::authorization_engine(format!("permission check failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::authorization_engine(format!(
                "authorization engine returned {} on permission check",
                response.status()
            )));
        }

        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| AppError::authorization_engine(format!("malformed permission check response: {e}")))?;
        Ok(body.allowed)
    }
}

#[derive(Deserialize)]
struct CheckResponse {
    allowed: bool,
}
