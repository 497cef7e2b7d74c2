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

//! Combines the indexed scene descriptions of a batch into one document:
//!
//! ```json
//! { "info": { "date": "10/19/2026", "version": "1.0", "split": "new", "license": "..." },
//!   "scenes": [ ... ] }
//! ```

use crate::config::CollectionConfig;
use crate::driver::IndexedOutput;
use crate::error::BatchError;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// The `info` block of a combined scenes document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    /// Date string, `MM/DD/YYYY` unless configured otherwise.
    pub date: String,
    /// Dataset version.
    pub version: String,
    /// Dataset split.
    pub split: String,
    /// License text.
    pub license: String,
}

impl CollectionInfo {
    /// Builds the info block from the `[collection]` table and the split name.
    pub fn from_config(config: &CollectionConfig, split: &str) -> Self {
        Self {
            date: config.date.clone(),
            version: config.version.clone(),
            split: split.to_string(),
            license: config.license.clone(),
        }
    }
}

#[derive(Serialize)]
struct SceneCollection<'a> {
    info: &'a CollectionInfo,
    scenes: Vec<Value>,
}

/// Reads the metadata of every completed iteration, in the given order, and
/// writes the combined document to `destination`. Returns the number of
/// scenes written.
pub fn collect_scenes(
    completed: &[IndexedOutput],
    info: &CollectionInfo,
    destination: &Path,
) -> Result<usize, BatchError> {
    let scenes = completed
        .iter()
        .map(|output| read_scene(&output.outputs.metadata))
        .collect::<Result<Vec<_>, _>>()?;

    let count = scenes.len();
    let document = SceneCollection { info, scenes };
    let encoded = serde_json::to_vec(&document).map_err(|e| BatchError::CollectionFailed {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })?;

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BatchError::CollectionFailed {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }
    fs::write(destination, encoded).map_err(|e| BatchError::CollectionFailed {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })?;

    log::info!(
        "Collected {count} scene(s) into '{}'",
        destination.display()
    );
    Ok(count)
}

fn read_scene(path: &Path) -> Result<Value, BatchError> {
    let failed = |reason: String| BatchError::CollectionFailed {
        path: path.to_path_buf(),
        reason,
    };
    let text = fs::read_to_string(path).map_err(|e| failed(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| failed(format!("invalid scene JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RenderOutputs;
    use tempfile::tempdir;

    fn info() -> CollectionInfo {
        CollectionInfo::from_config(&CollectionConfig::default(), "new")
    }

    fn output(dir: &Path, index: u32, scene: &str) -> IndexedOutput {
        let metadata = dir.join(format!("CLEVR_new_{index}.json"));
        fs::write(&metadata, scene).unwrap();
        IndexedOutput {
            index,
            outputs: RenderOutputs {
                image: dir.join(format!("CLEVR_new_{index}.png")),
                metadata,
            },
        }
    }

    #[test]
    fn scenes_are_combined_in_order_with_info_block() {
        let dir = tempdir().unwrap();
        let completed = vec![
            output(dir.path(), 1, r#"{"image_index": 1}"#),
            output(dir.path(), 3, r#"{"image_index": 3}"#),
        ];
        let destination = dir.path().join("out/CLEVR_scenes.json");

        let count = collect_scenes(&completed, &info(), &destination).unwrap();

        assert_eq!(count, 2);
        let doc: Value = serde_json::from_str(&fs::read_to_string(&destination).unwrap()).unwrap();
        assert_eq!(doc["info"]["split"], "new");
        assert_eq!(doc["info"]["version"], "1.0");
        assert_eq!(doc["scenes"][0]["image_index"], 1);
        assert_eq!(doc["scenes"][1]["image_index"], 3);
    }

    #[test]
    fn empty_batch_writes_empty_scene_list() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("scenes.json");

        assert_eq!(collect_scenes(&[], &info(), &destination).unwrap(), 0);

        let doc: Value = serde_json::from_str(&fs::read_to_string(&destination).unwrap()).unwrap();
        assert_eq!(doc["scenes"], Value::Array(Vec::new()));
    }

    #[test]
    fn malformed_scene_is_reported_with_its_path() {
        let dir = tempdir().unwrap();
        let completed = vec![output(dir.path(), 1, "not json")];

        let err = collect_scenes(&completed, &info(), &dir.path().join("s.json")).unwrap_err();

        match err {
            BatchError::CollectionFailed { path, .. } => {
                assert_eq!(path, dir.path().join("CLEVR_new_1.json"))
            }
            other => panic!("expected CollectionFailed, got {other:?}"),
        }
    }
}
