// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use render_batch_core::BatchConfig;
use std::fs;
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Render.toml";

/// Loads the batch configuration.
///
/// An explicit path must exist. Without one, `Render.toml` in the working
/// directory is used if present, otherwise the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<BatchConfig> {
    match explicit {
        Some(path) => read_config(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                read_config(path)
            } else {
                log::info!("No '{}' found. Using default configuration.", path.display());
                Ok(BatchConfig::default())
            }
        }
    }
}

fn read_config(path: &Path) -> Result<BatchConfig> {
    log::info!("Loading configuration from '{}'", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
    parse_config(&text)
        .with_context(|| format!("Failed to parse TOML from '{}'", path.display()))
}

/// Parses a `Render.toml` document. Missing keys keep their defaults.
pub fn parse_config(text: &str) -> Result<BatchConfig> {
    Ok(toml::from_str(text)?)
}
