//! HTTP client for the BMP and CSTR services
//!
//! Endpoints are registered by name against a service base URL:
//!
//! | name                 | URL                                           |
//! |----------------------|-----------------------------------------------|
//! | `bmp_run`            | `{bmp}/api/v1/bmp/run`                        |
//! | `cstr_run`           | `{cstr}/api/v1/cstr/run`                      |
//! | `cstr_uncertainty`   | `{cstr}/api/v1/cstr/uncertainty-propagation`  |
//!
//! Only `200 OK` counts as success. Anything else becomes a
//! [`SimError::TransportFailure`] carrying the canonical status text
//! (`"Internal Server Error"`), which is what ends up in the stage result.

use super::traits::ComputeClient;
use crate::codec::{BmpRequest, BmpResponse, CstrRunRequest, CstrRunResponse, UncertaintyRequest};
use crate::config::OrchestratorConfig;
use crate::errors::{Result, SimError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;

pub const ENDPOINT_BMP_RUN: &str = "bmp_run";
pub const ENDPOINT_CSTR_RUN: &str = "cstr_run";
pub const ENDPOINT_CSTR_UNCERTAINTY: &str = "cstr_uncertainty";

/// Compute client over HTTP
#[derive(Debug, Clone)]
pub struct HttpComputeClient {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpComputeClient {
    /// Create a client with the standard endpoints registered
    ///
    /// # Example
    ///
    /// ```
    /// use procycla_core::drivers::HttpComputeClient;
    /// use std::time::Duration;
    ///
    /// let client = HttpComputeClient::new(
    ///     "http://bmp.local",
    ///     "http://cstr.local",
    ///     Duration::from_secs(600),
    /// ).unwrap();
    /// assert_eq!(client.endpoint_url("bmp_run").unwrap(), "http://bmp.local/api/v1/bmp/run");
    /// ```
    pub fn new(bmp_base: &str, cstr_base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SimError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut compute = Self {
            client,
            endpoints: HashMap::new(),
        };
        compute.register_endpoint(ENDPOINT_BMP_RUN, bmp_base, "/api/v1/bmp/run")?;
        compute.register_endpoint(ENDPOINT_CSTR_RUN, cstr_base, "/api/v1/cstr/run")?;
        compute.register_endpoint(
            ENDPOINT_CSTR_UNCERTAINTY,
            cstr_base,
            "/api/v1/cstr/uncertainty-propagation",
        )?;
        Ok(compute)
    }

    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        Self::new(
            &config.bmp_api_url,
            &config.cstr_api_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Register (or replace) a named endpoint
    pub fn register_endpoint(&mut self, name: &str, base_url: &str, path: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SimError::Config("Endpoint name cannot be empty".to_string()));
        }
        if base_url.is_empty() {
            return Err(SimError::Config(format!("Base URL for '{}' cannot be empty", name)));
        }
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        self.endpoints.insert(name.to_string(), url);
        Ok(())
    }

    pub fn endpoint_url(&self, name: &str) -> Result<&str> {
        self.endpoints
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SimError::Config(format!("Endpoint '{}' not registered", name)))
    }

    /// POST a JSON body and decode a JSON reply
    async fn post_json<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<JsonValue> {
        let url = self.endpoint_url(endpoint)?;
        tracing::debug!(endpoint, url, "POST");

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(endpoint, status = status.as_u16(), "compute service returned non-OK status");
            return Err(status_failure(status));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SimError::MalformedInput(format!("undecodable response from {}: {}", endpoint, e))
        })
    }
}

/// Transport failure carrying the status text a client would show
pub fn status_failure(status: StatusCode) -> SimError {
    let text = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string());
    SimError::TransportFailure(text)
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn run_bmp(&self, request: &BmpRequest) -> Result<BmpResponse> {
        let body = self.post_json(ENDPOINT_BMP_RUN, request).await?;
        BmpResponse::from_json(body)
    }

    async fn run_cstr(&self, request: &CstrRunRequest) -> Result<CstrRunResponse> {
        let body = self.post_json(ENDPOINT_CSTR_RUN, request).await?;
        CstrRunResponse::from_json(body)
    }

    async fn propagate_uncertainty(&self, request: &UncertaintyRequest) -> Result<Vec<JsonValue>> {
        let body = self.post_json(ENDPOINT_CSTR_UNCERTAINTY, request).await?;
        match body {
            JsonValue::Array(items) => Ok(items),
            other => Err(SimError::MalformedInput(format!(
                "uncertainty propagation returned {} instead of an array",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
