//! Parameter resolution — checks a caller's parameters against an endpoint's
//! required set and merges in the statically configured credentials.

use crate::catalog::EndpointDefinition;
use crate::error::{PipelineError, Result};
use crate::record::Params;

/// Parameters fixed by configuration rather than supplied per call.
///
/// One of them is the credential (the vendor API key). A caller can override
/// any other static parameter, but never the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    credential_key: String,
    params: Params,
}

impl StaticCredentials {
    pub fn new(credential_key: &str, credential: &str) -> Self {
        let mut params = Params::new();
        params.insert(credential_key.to_string(), credential.to_string());
        Self {
            credential_key: credential_key.to_string(),
            params,
        }
    }

    /// Add a non-credential static parameter.
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        if key != self.credential_key {
            self.params.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn credential_key(&self) -> &str {
        &self.credential_key
    }

    pub fn credential(&self) -> Option<&str> {
        self.params.get(&self.credential_key).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replace the credential value in `text` for logging.
    pub fn redact(&self, text: &str) -> String {
        match self.credential() {
            Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
            _ => text.to_string(),
        }
    }
}

/// Resolve the parameters for one call to `endpoint`.
///
/// Fails with `MissingParameter` naming every required key found in neither
/// `supplied` nor `credentials`. On success the result is the union of both,
/// with `supplied` winning collisions except on the credential key.
pub fn resolve(
    endpoint: &EndpointDefinition,
    supplied: &Params,
    credentials: &StaticCredentials,
) -> Result<Params> {
    let missing: Vec<String> = endpoint
        .required_params
        .iter()
        .filter(|name| !supplied.contains_key(*name) && !credentials.params.contains_key(*name))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(PipelineError::MissingParameter {
            endpoint: endpoint.id.clone(),
            missing,
        });
    }

    let mut resolved = credentials.params.clone();
    for (key, value) in supplied {
        if key == &credentials.credential_key {
            if value.as_str() != credentials.credential().unwrap_or_default() {
                tracing::warn!(
                    endpoint = %endpoint.id,
                    key = %key,
                    "ignoring caller-supplied credential"
                );
            }
            continue;
        }
        resolved.insert(key.clone(), value.clone());
    }
    Ok(resolved)
}
