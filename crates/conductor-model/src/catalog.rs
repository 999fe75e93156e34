// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model catalog: static context-window and pricing metadata for known models.

use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::{Error, ErrorKind, Result};

/// Metadata for a single model.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    /// Model identifier as accepted by the provider API (e.g. "gpt-5")
    pub id: String,
    /// Total context window in tokens
    pub context_window: u64,
    /// Input price per 1M tokens, in USD cents
    pub input_cents: i64,
    /// Cached-input price per 1M tokens, in USD cents (0 ⇒ billed as input)
    pub cached_cents: i64,
    /// Output price per 1M tokens, in USD cents
    pub output_cents: i64,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    models: Vec<ModelCatalogEntry>,
}

/// Return all entries from the bundled static catalog.
pub fn static_catalog() -> &'static [ModelCatalogEntry] {
    static CATALOG: OnceLock<Vec<ModelCatalogEntry>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let yaml = include_str!("../models.yaml");
        let catalog: CatalogFile =
            serde_yaml::from_str(yaml).expect("bundled models.yaml must be valid");
        catalog.models
    })
}

/// Look up a single model by id.  Returns `None` when not in the catalog.
pub fn lookup(model: &str) -> Option<&'static ModelCatalogEntry> {
    let key = normalize(model);
    static_catalog().iter().find(|e| e.id == key)
}

/// Map common aliases to catalog keys.
pub fn normalize(model: &str) -> String {
    let m = model.trim().to_lowercase();
    match m.as_str() {
        "gpt-5-auto" | "gpt-5-latest" => "gpt-5".to_string(),
        "gpt-4o-latest" => "gpt-4o".to_string(),
        "gpt-5-code" | "gpt-5-coder" => "gpt-5-codex".to_string(),
        _ => m,
    }
}

/// Fail when `input_tokens` exceeds `compact_at_percent` of the model's
/// context window.  Unknown models pass (there is nothing to check against).
pub fn check_context_window(
    model: &str,
    input_tokens: usize,
    compact_at_percent: u32,
) -> Result<()> {
    const OP: &str = "catalog.check_context_window";

    let Some(entry) = lookup(model) else {
        return Ok(());
    };

    let budget = entry.context_window * u64::from(compact_at_percent) / 100;
    if input_tokens as u64 > budget {
        return Err(Error::new(
            OP,
            ErrorKind::Invalid,
            format!(
                "input tokens {input_tokens} exceed context window {} for model {model}",
                entry.context_window
            ),
        ));
    }

    Ok(())
}

/// Total USD cents (half-up rounding) at Standard pricing.
///
/// Reasoning tokens must be included in `output_tokens` by the caller.
/// Unknown model ⇒ 0.
pub fn calculate_cost(
    model: &str,
    input_tokens: i64,
    output_tokens: i64,
    cached_tokens: i64,
) -> i64 {
    let Some(entry) = lookup(model) else {
        return 0;
    };

    let cached_rate = if entry.cached_cents == 0 {
        entry.input_cents
    } else {
        entry.cached_cents
    };

    const PER_MILLION: i64 = 1_000_000;
    half_up_div(input_tokens * entry.input_cents, PER_MILLION)
        + half_up_div(cached_tokens * cached_rate, PER_MILLION)
        + half_up_div(output_tokens * entry.output_cents, PER_MILLION)
}

/// (a / b) with half-up rounding.  Assumes a >= 0 and b > 0.
fn half_up_div(a: i64, b: i64) -> i64 {
    (a + b / 2) / b
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_is_non_empty() {
        assert!(!static_catalog().is_empty());
    }

    #[test]
    fn gpt5_window_is_400k() {
        let entry = lookup("gpt-5").expect("gpt-5 must be in catalog");
        assert_eq!(entry.context_window, 400_000);
    }

    #[test]
    fn aliases_resolve_to_canonical_ids() {
        assert_eq!(lookup("gpt-5-latest").unwrap().id, "gpt-5");
        assert_eq!(lookup("GPT-5").unwrap().id, "gpt-5");
        assert_eq!(lookup("gpt-5-coder").unwrap().id, "gpt-5-codex");
    }

    #[test]
    fn unknown_model_is_absent() {
        assert!(lookup("totally-unknown-model").is_none());
    }

    // ── Context window ────────────────────────────────────────────────────────

    #[test]
    fn check_passes_below_threshold() {
        assert!(check_context_window("gpt-5", 320_000, 80).is_ok());
    }

    #[test]
    fn check_fails_above_threshold() {
        let err = check_context_window("gpt-5", 320_001, 80).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invalid);
    }

    #[test]
    fn check_passes_for_unknown_models() {
        assert!(check_context_window("mystery-model", usize::MAX / 2, 1).is_ok());
    }

    #[test]
    fn check_at_full_window_uses_100_percent() {
        assert!(check_context_window("gpt-5", 400_000, 100).is_ok());
        assert!(check_context_window("gpt-5", 400_001, 100).is_err());
    }

    // ── Cost ──────────────────────────────────────────────────────────────────

    #[test]
    fn gpt5_cost_rounds_half_up() {
        // 1M input · 125 + 200k cached · 12 + 500k output · 1000
        // = 125 + 2.4→2 + 500 = 627 cents
        let cost = calculate_cost("gpt-5", 1_000_000, 500_000, 200_000);
        assert_eq!(cost, 627);
    }

    #[test]
    fn unknown_model_costs_zero() {
        assert_eq!(calculate_cost("mystery-model", 1_000_000, 1_000_000, 0), 0);
    }

    #[test]
    fn zero_cached_rate_falls_back_to_input_rate() {
        // gpt-5-nano: cached_cents 0 ⇒ cached billed at input rate (5)
        let cost = calculate_cost("gpt-5-nano", 0, 0, 1_000_000);
        assert_eq!(cost, 5);
    }

    #[test]
    fn half_up_rounding_boundary() {
        assert_eq!(half_up_div(1, 2), 1); // 0.5 rounds up
        assert_eq!(half_up_div(2, 5), 0); // 0.4 rounds down
        assert_eq!(half_up_div(3, 5), 1); // 0.6 rounds up
    }
}
