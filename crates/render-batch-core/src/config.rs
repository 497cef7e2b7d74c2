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

//! Batch configuration.
//!
//! Every field has a default, so an empty `Render.toml` (or none at all)
//! describes the two-image GPU batch the driver was written for.

use crate::error::BatchError;
use crate::layout::{MetadataPlacement, OutputLayout, OutputNaming};
use crate::renderer::{BlenderProcess, RenderCommand};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What happens to the batch when a renderer invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderFailurePolicy {
    /// Stop at the failed index.
    #[default]
    Abort,
    /// Record the failure and continue with the next index.
    Skip,
}

/// What happens when a fixed-path output cannot be moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenameFailurePolicy {
    /// Treat it as fatal for the batch.
    #[default]
    Fail,
    /// Log it, record it and continue.
    Warn,
}

impl fmt::Display for RenderFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderFailurePolicy::Abort => write!(f, "abort"),
            RenderFailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for RenderFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(RenderFailurePolicy::Abort),
            "skip" => Ok(RenderFailurePolicy::Skip),
            other => Err(format!(
                "unknown render failure policy '{other}' (expected 'abort' or 'skip')"
            )),
        }
    }
}

impl fmt::Display for RenameFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameFailurePolicy::Fail => write!(f, "fail"),
            RenameFailurePolicy::Warn => write!(f, "warn"),
        }
    }
}

impl FromStr for RenameFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(RenameFailurePolicy::Fail),
            "warn" => Ok(RenameFailurePolicy::Warn),
            other => Err(format!(
                "unknown rename failure policy '{other}' (expected 'fail' or 'warn')"
            )),
        }
    }
}

/// The `[renderer]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Renderer executable.
    pub executable: PathBuf,
    /// Scene-generation script.
    pub script: PathBuf,
    /// Passed to the script as `--use_gpu 1` / `--use_gpu 0`.
    pub use_gpu: bool,
    /// Extra script arguments, identical for every invocation.
    pub extra_args: Vec<String>,
    /// Kill a renderer that runs longer than this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("blender"),
            script: PathBuf::from("render_images.py"),
            use_gpu: true,
            extra_args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl RendererConfig {
    /// The static command line.
    pub fn command(&self) -> RenderCommand {
        RenderCommand {
            executable: self.executable.clone(),
            script: self.script.clone(),
            use_gpu: self.use_gpu,
            extra_args: self.extra_args.clone(),
        }
    }

    /// The per-invocation timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// A subprocess renderer built from this table.
    pub fn build(&self) -> BlenderProcess {
        BlenderProcess::new(self.command()).with_timeout(self.timeout())
    }
}

/// The `[output]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the renderer writes images.
    pub images_dir: PathBuf,
    /// Where the renderer writes scene descriptions.
    pub scenes_dir: PathBuf,
    /// Directory that receives the indexed scene description.
    pub metadata_placement: MetadataPlacement,
    /// Filename prefix.
    pub prefix: String,
    /// Dataset split name.
    pub split: String,
    /// Zero-padding the renderer uses for its fixed outputs.
    pub fixed_index_width: usize,
    /// Zero-padding of the indexed outputs.
    pub index_width: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let naming = OutputNaming::default();
        Self {
            images_dir: PathBuf::from("../output/images"),
            scenes_dir: PathBuf::from("../output/scenes"),
            metadata_placement: MetadataPlacement::default(),
            prefix: naming.prefix,
            split: naming.split,
            fixed_index_width: naming.fixed_index_width,
            index_width: naming.indexed_index_width,
        }
    }
}

impl OutputConfig {
    /// Resolves the output layout.
    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            images_dir: self.images_dir.clone(),
            scenes_dir: self.scenes_dir.clone(),
            metadata_placement: self.metadata_placement,
            naming: OutputNaming {
                prefix: self.prefix.clone(),
                split: self.split.clone(),
                fixed_index_width: self.fixed_index_width,
                indexed_index_width: self.index_width,
            },
        }
    }
}

/// Format of the default `info.date`.
pub const COLLECTION_DATE_FORMAT: &str = "%m/%d/%Y";

/// The `[collection]` table. Scene collection runs only when `output` is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Where to write the combined scenes document.
    pub output: Option<PathBuf>,
    /// `info.date`. Defaults to today as `MM/DD/YYYY`.
    pub date: String,
    /// `info.version`.
    pub version: String,
    /// `info.license`.
    pub license: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            output: None,
            date: chrono::Local::now().format(COLLECTION_DATE_FORMAT).to_string(),
            version: "1.0".to_string(),
            license: "Creative Commons Attribution (CC-BY 4.0)".to_string(),
        }
    }
}

/// Full configuration of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of render iterations (N).
    pub count: u32,
    /// Index of the first iteration.
    pub start_index: u32,
    /// Renderer invocation.
    pub renderer: RendererConfig,
    /// Output locations and naming.
    pub output: OutputConfig,
    /// Behaviour on renderer failure.
    pub on_render_failure: RenderFailurePolicy,
    /// Behaviour on rename failure.
    pub on_rename_failure: RenameFailurePolicy,
    /// Clear the terminal between iterations.
    pub clear_between: bool,
    /// Log the plan without running anything.
    pub dry_run: bool,
    /// Optional scene collection after the batch.
    pub collection: CollectionConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            count: 2,
            start_index: 1,
            renderer: RendererConfig::default(),
            output: OutputConfig::default(),
            on_render_failure: RenderFailurePolicy::default(),
            on_rename_failure: RenameFailurePolicy::default(),
            clear_between: true,
            dry_run: false,
            collection: CollectionConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Checks the configuration for values the driver cannot work with.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.output.prefix.is_empty() {
            return Err(BatchError::InvalidConfig(
                "output prefix must not be empty".into(),
            ));
        }
        if self.renderer.executable.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig(
                "renderer executable must not be empty".into(),
            ));
        }
        if self.renderer.timeout_secs == Some(0) {
            return Err(BatchError::InvalidConfig(
                "renderer timeout must be at least one second".into(),
            ));
        }
        if self.start_index.checked_add(self.count).is_none() {
            return Err(BatchError::InvalidConfig(format!(
                "start index {} plus count {} overflows the index range",
                self.start_index, self.count
            )));
        }
        // Only index 0 can format to the renderer's own stem.
        if self.count > 0
            && self.start_index == 0
            && self.output.layout().collides_with_fixed(0)
        {
            return Err(BatchError::InvalidConfig(
                "index 0 would be written to the renderer's fixed output paths".into(),
            ));
        }
        Ok(())
    }
}
