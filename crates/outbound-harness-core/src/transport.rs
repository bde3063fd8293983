// crates/outbound-harness-core/src/transport.rs
// ============================================================================
// Module: Outbound Transport
// Description: HTTP transport seam used by combined `handle` integrations.
// Purpose: Let the harness substitute interception for live network calls.
// Dependencies: async-trait, reqwest, serde, thiserror
// ============================================================================

//! ## Overview
//! `handle` implementations never talk to the network directly; they call
//! [`HttpTransport::send`] on the transport carried by their
//! [`HandleContext`]. The harness hands out an interception transport (see
//! [`crate::interception`]); production code uses [`LiveTransport`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::Environment;

// ============================================================================
// SECTION: Request / Response
// ============================================================================

/// Outbound HTTP request issued by integration code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// HTTP method (case-insensitive).
    pub method: String,
    /// Absolute URL including any query string.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
}

impl OutboundRequest {
    /// Creates a request with the given method and URL.
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// HTTP response returned to integration code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body text.
    pub body: String,
}

impl OutboundResponse {
    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] when the body is not valid JSON.
    pub fn json(&self) -> Result<Value, TransportError> {
        serde_json::from_str(&self.body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

// ============================================================================
// SECTION: Transport Trait
// ============================================================================

/// Transport errors surfaced to integration code.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No installed interception rule matched the request.
    #[error("no match for request {0}")]
    NoMatch(String),
    /// The interception scope was already torn down.
    #[error("interception scope closed")]
    Closed,
    /// The request URL or method was invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The live request failed.
    #[error("request failed: {0}")]
    Request(String),
    /// The response body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Sends outbound HTTP requests on behalf of integration code.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request cannot be completed.
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError>;
}

// ============================================================================
// SECTION: Handle Context
// ============================================================================

/// Per-invocation context passed to `handle`.
#[derive(Clone)]
pub struct HandleContext {
    /// Credential environment for this invocation.
    env: Environment,
    /// Transport used for outbound calls.
    transport: Arc<dyn HttpTransport>,
}

impl HandleContext {
    /// Creates a context from an environment and transport.
    #[must_use]
    pub fn new(env: Environment, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            env,
            transport,
        }
    }

    /// Returns the credential environment.
    #[must_use]
    pub const fn env(&self) -> &Environment {
        &self.env
    }

    /// Returns the outbound transport.
    #[must_use]
    pub fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    /// Sends a request through the context transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request cannot be completed.
    pub async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        self.transport.send(request).await
    }
}

impl fmt::Debug for HandleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleContext").field("env", &self.env).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Live Transport
// ============================================================================

/// Configuration for the live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTransportConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for LiveTransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: "outbound-harness/0.1".to_string(),
        }
    }
}

/// Transport that performs real network calls.
pub struct LiveTransport {
    /// HTTP client used for outbound requests.
    client: Client,
}

impl LiveTransport {
    /// Creates a live transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] when the HTTP client cannot be built.
    pub fn new(config: &LiveTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|_| TransportError::Request("http client build failed".to_string()))?;
        Ok(Self {
            client,
        })
    }
}

#[async_trait]
impl HttpTransport for LiveTransport {
    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("method {}", request.method)))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|_| TransportError::InvalidRequest(format!("url {}", request.url)))?;
        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|err| TransportError::Decode(err.to_string()))?;
        Ok(OutboundResponse {
            status,
            headers,
            body,
        })
    }
}
