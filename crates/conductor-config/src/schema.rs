// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" | "mock"
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies and gateways.
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-5".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            api_key: None,
            base_url: None,
        }
    }
}

/// Sandbox settings for the in-process shell tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Root directory of the sandbox.  Relative workdirs are resolved
    /// against this path and may never escape it.
    pub root_dir: String,
    /// Workdirs (relative to root_dir) the agent may run commands in.
    /// Empty list permits anything under root_dir.
    #[serde(default)]
    pub allowed_workdirs: Vec<String>,
    /// Workdir used when the model does not request one.
    pub default_workdir: String,
    /// Hard deadline for a single command, in seconds.
    pub timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            root_dir: ".".into(),
            allowed_workdirs: Vec::new(),
            default_workdir: ".".into(),
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long shutdown waits for in-flight conversations before giving up.
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_openai_gpt5() {
        let cfg = Config::default();
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.model.name, "gpt-5");
        assert_eq!(cfg.model.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn default_shell_timeout_is_three_minutes() {
        let cfg = ShellConfig::default();
        assert_eq!(cfg.timeout_secs, 180);
        assert!(cfg.allowed_workdirs.is_empty());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: Config = serde_yaml::from_str("shell:\n  root_dir: /work\n  default_workdir: repo\n  timeout_secs: 30\n").unwrap();
        assert_eq!(cfg.shell.root_dir, "/work");
        assert_eq!(cfg.shell.timeout_secs, 30);
        assert_eq!(cfg.model.provider, "openai");
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.name, cfg.model.name);
        assert_eq!(back.runtime.shutdown_grace_secs, cfg.runtime.shutdown_grace_secs);
    }
}
