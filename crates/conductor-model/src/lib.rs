// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod catalog;
mod error;
pub(crate) mod estimate;
mod mock;
mod openai;
mod provider;
mod types;

pub use catalog::ModelCatalogEntry;
pub use error::{Error, ErrorKind, Result};
pub use mock::ScriptedProvider;
pub use openai::OpenAiProvider;
pub use provider::LlmProvider;
pub use types::*;

use std::sync::Arc;

use conductor_config::ModelConfig;

/// Construct a shared [`LlmProvider`] from configuration.
///
/// `"openai"` resolves the API key from `api_key`, then `api_key_env`;
/// `"mock"` returns a scripted provider with no queued responses (the
/// exhausted-script fallback makes it reply with a fixed placeholder, which
/// is enough for smoke runs without credentials).
pub fn from_config(cfg: &ModelConfig) -> Result<Arc<dyn LlmProvider>> {
    const OP: &str = "model.from_config";

    match cfg.provider.as_str() {
        "openai" => {
            let api_key = resolve_api_key(cfg).ok_or_else(|| {
                Error::new(
                    OP,
                    ErrorKind::Invalid,
                    format!(
                        "no API key: set model.api_key or the {} environment variable",
                        cfg.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")
                    ),
                )
            })?;
            Ok(Arc::new(OpenAiProvider::new(api_key, cfg.base_url.clone())))
        }
        "mock" => Ok(Arc::new(ScriptedProvider::new(Vec::new()))),
        other => Err(Error::new(
            OP,
            ErrorKind::Invalid,
            format!("unknown model provider: {other:?} (known: openai, mock)"),
        )),
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(key) = &cfg.api_key {
        return Some(key.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    std::env::var("OPENAI_API_KEY").ok()
}
