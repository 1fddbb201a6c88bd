//! Tiered option resolution.
//!
//! Four tiers feed one request's effective options, strongest first:
//! overrides supplied inline on the mention, the channel's stored defaults,
//! the process-level defaults from the CLI, and the schema's built-in
//! defaults. Resolution is a pure field-wise fold; a field no tier supplies
//! fails the whole resolution by name.

use serde::Serialize;

use crate::error::OptionsError;
use crate::options::schema::{self, OptionsPatch};

/// Fully resolved options for one request: every schema field populated.
///
/// Computed per request and discarded with it; only the channel tier of its
/// derivation is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveOptions {
    pub base_url: String,
    pub model: String,
    pub role: String,
    pub temperature: f64,
    pub top_p: f64,
    pub broadcast_reply: bool,
}

impl EffectiveOptions {
    /// The resolved record as a patch with every field present. This is
    /// what a "set as channel defaults" request writes back to the store.
    pub fn to_patch(&self) -> OptionsPatch {
        OptionsPatch {
            base_url: Some(self.base_url.clone()),
            model: Some(self.model.clone()),
            role: Some(self.role.clone()),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            broadcast_reply: Some(self.broadcast_reply),
        }
    }
}

/// Merge the tiers in strict precedence order and require every field.
///
/// A higher tier's value shadows the lower tiers entirely; lower tiers are
/// not consulted for a field once a higher tier supplies it.
pub fn resolve(
    request: &OptionsPatch,
    channel: &OptionsPatch,
    process: &OptionsPatch,
) -> Result<EffectiveOptions, OptionsError> {
    let merged = request
        .clone()
        .or(channel.clone())
        .or(process.clone())
        .or(schema::builtin_defaults());
    Ok(EffectiveOptions {
        base_url: merged.base_url.ok_or_else(|| unresolved("base_url"))?,
        model: merged.model.ok_or_else(|| unresolved("model"))?,
        role: merged.role.ok_or_else(|| unresolved("role"))?,
        temperature: merged.temperature.ok_or_else(|| unresolved("temperature"))?,
        top_p: merged.top_p.ok_or_else(|| unresolved("top_p"))?,
        broadcast_reply: merged
            .broadcast_reply
            .ok_or_else(|| unresolved("broadcast_reply"))?,
    })
}

fn unresolved(field: &str) -> OptionsError {
    OptionsError::Unresolved {
        field: field.to_string(),
    }
}
