//! Request dispatch — render an endpoint's URL, issue one GET, decode the body.
//!
//! There is no retry here. A failed call surfaces immediately as a `Network`
//! or `Decode` error; the batch orchestrator isolates it to one item.

pub mod template;
pub mod transport;

pub use template::{append_query, join_url, render};
pub use transport::{CannedTransport, HttpResponse, ReqwestTransport, Transport, DEFAULT_TIMEOUT};

use crate::catalog::EndpointDefinition;
use crate::error::{PipelineError, Result};
use crate::record::{Params, Payload};
use crate::resolve::StaticCredentials;

const BODY_SNIPPET_CHARS: usize = 200;

pub struct Dispatcher<T: Transport> {
    base_url: String,
    transport: T,
    mask: Option<StaticCredentials>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.to_string(),
            transport,
            mask: None,
        }
    }

    /// Hide the credential value when URLs are logged.
    pub fn masking(mut self, credentials: &StaticCredentials) -> Self {
        self.mask = Some(credentials.clone());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Full request URL: base + rendered template + optional query string.
    pub fn request_url(
        &self,
        endpoint: &EndpointDefinition,
        resolved: &Params,
        query: &Params,
    ) -> Result<String> {
        let path = render(&endpoint.url_template, resolved)?;
        Ok(append_query(&join_url(&self.base_url, &path), query))
    }

    pub fn dispatch(&self, endpoint: &EndpointDefinition, resolved: &Params) -> Result<Payload> {
        self.dispatch_with_query(endpoint, resolved, &Params::new())
    }

    pub fn dispatch_with_query(
        &self,
        endpoint: &EndpointDefinition,
        resolved: &Params,
        query: &Params,
    ) -> Result<Payload> {
        let url = self.request_url(endpoint, resolved, query)?;
        tracing::debug!(endpoint = %endpoint.id, url = %self.loggable(&url), "dispatching");

        let response = self.transport.get(&url)?;
        if !response.is_success() {
            return Err(PipelineError::Network {
                status: Some(response.status),
                message: format!(
                    "{} returned {}",
                    endpoint.id,
                    snippet(&response.body)
                ),
            });
        }

        let value: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
            PipelineError::Decode(format!(
                "{} returned non-JSON body ({e}): {}",
                endpoint.id,
                snippet(&response.body)
            ))
        })?;
        Payload::from_value(value)
    }

    fn loggable(&self, url: &str) -> String {
        match &self.mask {
            Some(creds) => creds.redact(url),
            None => url.to_string(),
        }
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{head}...")
    }
}
