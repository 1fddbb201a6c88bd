//! Per-endpoint API credentials.
//!
//! Configuration maps endpoint base URLs to the names of the environment
//! variables holding their keys. The variable itself is only read when a
//! request actually targets that endpoint, so a missing key for one
//! endpoint never blocks the others.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Bearer token sent for endpoints with no configured credential. Some
/// OpenAI-compatible servers insist on a non-empty Authorization header
/// even though they ignore the key.
pub const PLACEHOLDER_API_KEY: &str = "dummy";

/// Authentication material for one endpoint.
#[derive(Debug, Clone)]
pub enum EndpointAuth {
    Authenticated(SecretString),
    Unauthenticated,
}

impl EndpointAuth {
    /// Token to put in the Authorization header.
    pub fn bearer_token(&self) -> &str {
        match self {
            EndpointAuth::Authenticated(secret) => secret.expose_secret(),
            EndpointAuth::Unauthenticated => PLACEHOLDER_API_KEY,
        }
    }
}

/// Which environment variable holds the key for which endpoint.
///
/// Lookups match the base URL exactly as configured; `https://a/v1` and
/// `https://a/v1/` are different endpoints.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    env_vars: HashMap<String, String>,
}

impl CredentialTable {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            env_vars: pairs.into_iter().collect(),
        }
    }

    /// Resolve the credential for `base_url` from the process environment.
    ///
    /// Unknown endpoints get [`EndpointAuth::Unauthenticated`]. An endpoint
    /// that is configured but whose variable is unset is an error.
    pub fn resolve(&self, base_url: &str) -> Result<EndpointAuth, LlmError> {
        self.resolve_with(base_url, |var| std::env::var(var).ok())
    }

    /// As [`CredentialTable::resolve`], with the environment lookup injected.
    pub fn resolve_with(
        &self,
        base_url: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<EndpointAuth, LlmError> {
        match self.env_vars.get(base_url) {
            None => Ok(EndpointAuth::Unauthenticated),
            Some(env_var) => match lookup(env_var) {
                Some(value) => Ok(EndpointAuth::Authenticated(SecretString::from(value))),
                None => Err(LlmError::MissingCredential {
                    env_var: env_var.clone(),
                }),
            },
        }
    }
}
