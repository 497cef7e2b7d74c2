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

//! Output paths: where the renderer leaves its files, and where the driver
//! moves them.
//!
//! The renderer always writes `<images_dir>/CLEVR_new_000000.png` and
//! `<scenes_dir>/CLEVR_new_000000.json`. The driver renames them to
//! `CLEVR_new_<i>.png` / `CLEVR_new_<i>.json`. The indexed metadata lands in
//! the images directory unless [`MetadataPlacement::ScenesDir`] is selected.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extension of the rendered image.
pub const IMAGE_EXTENSION: &str = "png";
/// Extension of the scene description.
pub const METADATA_EXTENSION: &str = "json";

/// Directory that receives the indexed scene description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataPlacement {
    /// Next to the indexed image. This is what existing batches produce.
    #[default]
    ImagesDir,
    /// In the scenes directory, next to the renderer's fixed-path metadata.
    ScenesDir,
}

impl fmt::Display for MetadataPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataPlacement::ImagesDir => write!(f, "images-dir"),
            MetadataPlacement::ScenesDir => write!(f, "scenes-dir"),
        }
    }
}

impl FromStr for MetadataPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "images-dir" | "images" => Ok(MetadataPlacement::ImagesDir),
            "scenes-dir" | "scenes" => Ok(MetadataPlacement::ScenesDir),
            other => Err(format!(
                "unknown metadata placement '{other}' (expected 'images-dir' or 'scenes-dir')"
            )),
        }
    }
}

/// Filename stem scheme shared by the renderer and the driver:
/// `{prefix}_{split}_{index}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    /// Leading part of every filename, `CLEVR` by default.
    pub prefix: String,
    /// Dataset split name, `new` by default. Omitted from the stem when empty.
    pub split: String,
    /// Zero-padding used by the renderer for its fixed output (index 0).
    pub fixed_index_width: usize,
    /// Zero-padding of the indexed outputs. `0` means no padding.
    pub indexed_index_width: usize,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self {
            prefix: "CLEVR".to_string(),
            split: "new".to_string(),
            fixed_index_width: 6,
            indexed_index_width: 0,
        }
    }
}

impl OutputNaming {
    /// Formats the stem for `index`, padded to `width` digits.
    pub fn stem(&self, index: u32, width: usize) -> String {
        if self.split.is_empty() {
            format!("{}_{:0width$}", self.prefix, index, width = width)
        } else {
            format!(
                "{}_{}_{:0width$}",
                self.prefix,
                self.split,
                index,
                width = width
            )
        }
    }

    /// Stem of the renderer's fixed-path outputs, e.g. `CLEVR_new_000000`.
    pub fn fixed_stem(&self) -> String {
        self.stem(0, self.fixed_index_width)
    }

    /// Stem of the outputs for iteration `index`, e.g. `CLEVR_new_3`.
    pub fn indexed_stem(&self, index: u32) -> String {
        self.stem(index, self.indexed_index_width)
    }
}

/// An image path and a scene-description path produced by one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutputs {
    /// The rendered PNG.
    pub image: PathBuf,
    /// The JSON scene description.
    pub metadata: PathBuf,
}

impl RenderOutputs {
    /// Both paths, image first.
    pub fn paths(&self) -> [&Path; 2] {
        [&self.image, &self.metadata]
    }
}

/// Resolves fixed and indexed output paths from the configured directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Directory where the renderer writes images.
    pub images_dir: PathBuf,
    /// Directory where the renderer writes scene descriptions.
    pub scenes_dir: PathBuf,
    /// Directory that receives the indexed scene description.
    pub metadata_placement: MetadataPlacement,
    /// Filename scheme.
    pub naming: OutputNaming,
}

impl OutputLayout {
    /// The paths the renderer writes on every invocation.
    pub fn fixed_outputs(&self) -> RenderOutputs {
        let stem = self.naming.fixed_stem();
        RenderOutputs {
            image: self.images_dir.join(with_extension(&stem, IMAGE_EXTENSION)),
            metadata: self.scenes_dir.join(with_extension(&stem, METADATA_EXTENSION)),
        }
    }

    /// The durable paths for iteration `index`.
    pub fn indexed_outputs(&self, index: u32) -> RenderOutputs {
        let stem = self.naming.indexed_stem(index);
        let metadata_dir = match self.metadata_placement {
            MetadataPlacement::ImagesDir => &self.images_dir,
            MetadataPlacement::ScenesDir => &self.scenes_dir,
        };
        RenderOutputs {
            image: self.images_dir.join(with_extension(&stem, IMAGE_EXTENSION)),
            metadata: metadata_dir.join(with_extension(&stem, METADATA_EXTENSION)),
        }
    }

    /// Returns `true` if the indexed outputs of `index` would land on the
    /// renderer's fixed paths.
    pub fn collides_with_fixed(&self, index: u32) -> bool {
        let fixed = self.fixed_outputs();
        let indexed = self.indexed_outputs(index);
        let hits = |path: &PathBuf| *path == fixed.image || *path == fixed.metadata;
        let collides = hits(&indexed.image) || hits(&indexed.metadata);
        collides
    }
}

fn with_extension(stem: &str, extension: &str) -> String {
    format!("{stem}.{extension}")
}
