//! REST client for the hosted backend.
//!
//! Speaks the PostgREST dialect for tables (`/rest/v1/{table}`) and the
//! GoTrue dialect for auth (`/auth/v1/...`). Every request carries the
//! project's `apikey` header and a bearer token: the user's access token
//! once signed in, the anon key before that.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Backend, BackendError, Query};
use crate::core::model::User;

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    user: User,
}

pub struct RestBackend {
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl RestBackend {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `base_url` - Project URL, without the `/rest/v1` suffix
    /// * `anon_key` - Public API key of the project
    /// * `access_token` - Existing session token, if any
    pub fn new(base_url: String, anon_key: String, access_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token: RwLock::new(access_token),
            client: reqwest::Client::new(),
        }
    }

    fn token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let bearer = self.token().unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    /// Password sign-in. Stores the returned access token for later calls.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let response = self
            .request(reqwest::Method::POST, url)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let response = check(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.access_token);
        info!("Signed in as {}", token.user.id);
        Ok(token.user)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let response = check(response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Turns a non-2xx response into `BackendError::Api` carrying the service's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    debug!("Backend response status: {}", status);
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    warn!("Backend error: {} - {}", status.as_u16(), body);
    Err(BackendError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extracts the human-readable message from an error body.
///
/// Tries `message`, `msg`, `error_description`, `error`, then the raw text.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(Value::String(msg)) = map.get(key)
                && !msg.is_empty()
            {
                return msg.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

fn into_rows(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn require_filters(query: &Query, operation: &str) -> Result<(), BackendError> {
    if query.filters.is_empty() {
        return Err(BackendError::InvalidRequest(format!(
            "refusing to {operation} without a row filter"
        )));
    }
    Ok(())
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        if self.token().is_none() {
            return Ok(None);
        }
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if matches!(response.status().as_u16(), 401 | 403) {
            info!("Session token rejected, treating as signed out");
            return Ok(None);
        }
        let response = check(response).await?;
        let user = response
            .json::<User>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(Some(user))
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        debug!("select {} {:?}", table, query.to_params());
        let builder = self
            .request(reqwest::Method::GET, self.table_url(table))
            .query(&[("select", "*")])
            .query(&query.to_params());
        Ok(into_rows(self.send(builder).await?))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        debug!("insert {}", table);
        let builder = self
            .request(reqwest::Method::POST, self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let stored = into_rows(self.send(builder).await?);
        // Fall back to what we sent if the service returned no representation.
        Ok(stored.into_iter().next().unwrap_or(row))
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        require_filters(query, "update")?;
        debug!("update {} {:?}", table, query.to_params());
        let builder = self
            .request(reqwest::Method::PATCH, self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&query.to_params())
            .json(&patch);
        Ok(into_rows(self.send(builder).await?))
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<(), BackendError> {
        require_filters(query, "delete")?;
        debug!("delete {} {:?}", table, query.to_params());
        let builder = self
            .request(reqwest::Method::DELETE, self.table_url(table))
            .query(&query.to_params());
        self.send(builder).await?;
        Ok(())
    }
}
