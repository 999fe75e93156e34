// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::{default_config_path, load};
pub use schema::{Config, ModelConfig, RuntimeConfig, ShellConfig};
