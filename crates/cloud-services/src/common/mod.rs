//! Common utilities for the infrastructure gateway client
//!
//! Provides the authenticated HTTP wrapper shared by all subsystem services.

use crate::error::ServiceError;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts per request (first try included) for retryable failures.
const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles after each attempt.
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(200);

/// HTTP client wrapper with authentication and retries
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self.send(Method::GET, path, None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::NotFound(format!(
                "Resource not found: {path} - {body}"
            )));
        }
        Self::decode("GET", path, response).await
    }

    /// Make a PUT request (create-or-update)
    pub async fn put<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        Self::decode("PUT", path, response).await
    }

    /// Make a DELETE request. A 404 counts as success.
    pub async fn delete(&self, path: &str) -> Result<(), ServiceError> {
        let response = self.send(Method::DELETE, path, None).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Api(format!(
            "DELETE {path} failed: {status} - {body}"
        )))
    }

    /// Sends a request, retrying server errors and throttling.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ServiceError> {
        let url = self.build_url(path);
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;

        loop {
            debug!("{} {} (attempt {})", method, url, attempt);

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", self.auth_header())
                .header("Accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let result = request.send().await;
            let retryable = match &result {
                Ok(response) => {
                    response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(e) => e.is_timeout() || e.is_connect(),
            };

            if !retryable || attempt >= MAX_ATTEMPTS {
                return result.map_err(ServiceError::Http);
            }

            warn!(
                "{} {} failed (attempt {}/{}), retrying in {:?}",
                method, url, attempt, MAX_ATTEMPTS, delay
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        method: &str,
        path: &str,
        response: Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api(format!(
                "{method} {path} failed: {status} - {body}"
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ServiceError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }
}
