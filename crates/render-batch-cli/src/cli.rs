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

use clap::Parser;
use render_batch_core::{
    BatchConfig, MetadataPlacement, RenameFailurePolicy, RenderFailurePolicy,
};
use std::path::PathBuf;

/// Renders a batch of images with an external renderer and moves each
/// render's fixed-path outputs to indexed paths.
///
/// Flags override values from the config file; anything after `--` is
/// passed to the scene script unchanged.
#[derive(Parser, Debug)]
#[command(name = "render-batch", version, about)]
pub struct Cli {
    /// Config file to load instead of `./Render.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of images to render.
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// Index of the first image.
    #[arg(long)]
    pub start_index: Option<u32>,

    /// Ask the scene script to render on the GPU.
    #[arg(long, value_name = "0|1", value_parser = clap::value_parser!(u8).range(0..=1))]
    pub use_gpu: Option<u8>,

    /// Renderer executable.
    #[arg(long, value_name = "PATH")]
    pub renderer: Option<PathBuf>,

    /// Scene-generation script passed to the renderer.
    #[arg(long, value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Directory the renderer writes images to.
    #[arg(long, value_name = "DIR")]
    pub images_dir: Option<PathBuf>,

    /// Directory the renderer writes scene descriptions to.
    #[arg(long, value_name = "DIR")]
    pub scenes_dir: Option<PathBuf>,

    /// Where indexed scene descriptions go: `images-dir` or `scenes-dir`.
    #[arg(long, value_name = "PLACEMENT")]
    pub metadata_placement: Option<MetadataPlacement>,

    /// Filename prefix.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Dataset split name used in filenames.
    #[arg(long)]
    pub split: Option<String>,

    /// `abort` the batch or `skip` to the next image when a render fails.
    #[arg(long, value_name = "POLICY")]
    pub on_render_failure: Option<RenderFailurePolicy>,

    /// `fail` the batch or `warn` and continue when an output cannot be moved.
    #[arg(long, value_name = "POLICY")]
    pub on_rename_failure: Option<RenameFailurePolicy>,

    /// Kill a render that takes longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Do not clear the terminal between renders.
    #[arg(long)]
    pub no_clear: bool,

    /// Combine all indexed scene descriptions into this file afterwards.
    #[arg(long, value_name = "PATH")]
    pub collect_scenes: Option<PathBuf>,

    /// Print what would be done without running the renderer.
    #[arg(long)]
    pub dry_run: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Extra arguments for the scene script.
    #[arg(last = true, value_name = "SCRIPT_ARGS")]
    pub extra_args: Vec<String>,
}

impl Cli {
    /// Overrides `config` with every flag that was given.
    pub fn apply(&self, config: &mut BatchConfig) {
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(start_index) = self.start_index {
            config.start_index = start_index;
        }
        if let Some(use_gpu) = self.use_gpu {
            config.renderer.use_gpu = use_gpu == 1;
        }
        if let Some(renderer) = &self.renderer {
            config.renderer.executable = renderer.clone();
        }
        if let Some(script) = &self.script {
            config.renderer.script = script.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.renderer.timeout_secs = Some(timeout);
        }
        if !self.extra_args.is_empty() {
            config.renderer.extra_args = self.extra_args.clone();
        }
        if let Some(dir) = &self.images_dir {
            config.output.images_dir = dir.clone();
        }
        if let Some(dir) = &self.scenes_dir {
            config.output.scenes_dir = dir.clone();
        }
        if let Some(placement) = self.metadata_placement {
            config.output.metadata_placement = placement;
        }
        if let Some(prefix) = &self.prefix {
            config.output.prefix = prefix.clone();
        }
        if let Some(split) = &self.split {
            config.output.split = split.clone();
        }
        if let Some(policy) = self.on_render_failure {
            config.on_render_failure = policy;
        }
        if let Some(policy) = self.on_rename_failure {
            config.on_rename_failure = policy;
        }
        if self.no_clear {
            config.clear_between = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(path) = &self.collect_scenes {
            config.collection.output = Some(path.clone());
        }
    }
}
