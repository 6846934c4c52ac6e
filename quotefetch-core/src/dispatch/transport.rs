//! HTTP transport seam.
//!
//! The dispatcher only needs "GET this URL, give me status and body". Keeping
//! that behind a trait lets tests substitute canned responses for the network.

use crate::error::{PipelineError, Result};
use std::sync::Mutex;
use std::time::Duration;

/// Applied when configuration does not set a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single blocking GET. Transport-level failures map to `Network` errors;
/// non-2xx statuses are returned as responses and judged by the caller.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        (**self).get(url)
    }
}

/// Blocking `reqwest` transport with a fixed request timeout.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        let resp = self.client.get(url).send().map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out after {}s", self.timeout.as_secs())
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                e.to_string()
            };
            PipelineError::Network {
                status: e.status().map(|s| s.as_u16()),
                message,
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| PipelineError::Network {
            status: Some(status),
            message: format!("failed to read response body: {e}"),
        })?;

        Ok(HttpResponse { status, body })
    }
}

/// In-memory transport serving canned responses by URL prefix.
///
/// Every requested URL is recorded. Unrouted URLs get a 404.
#[derive(Debug, Default)]
pub struct CannedTransport {
    routes: Vec<(String, std::result::Result<HttpResponse, String>)>,
    calls: Mutex<Vec<String>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for URLs starting with `prefix`. First match wins.
    pub fn route(mut self, prefix: &str, response: HttpResponse) -> Self {
        self.routes.push((prefix.to_string(), Ok(response)));
        self
    }

    /// Fail URLs starting with `prefix` at the transport level.
    pub fn fail(mut self, prefix: &str, message: &str) -> Self {
        self.routes.push((prefix.to_string(), Err(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Transport for CannedTransport {
    fn get(&self, url: &str) -> Result<HttpResponse> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        match self.routes.iter().find(|(prefix, _)| url.starts_with(prefix)) {
            Some((_, Ok(response))) => Ok(response.clone()),
            Some((_, Err(message))) => Err(PipelineError::Network {
                status: None,
                message: message.clone(),
            }),
            None => Ok(HttpResponse {
                status: 404,
                body: format!("no route for {url}"),
            }),
        }
    }
}
