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

//! Errors raised while driving a render batch.

use crate::renderer::RendererError;
use std::path::PathBuf;
use thiserror::Error;

/// An error raised by the batch driver.
///
/// Iteration errors carry the index they belong to; every error is local to
/// that iteration.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The renderer could not be launched, exited unsuccessfully or timed out.
    #[error("iteration {index}: renderer invocation failed: {source}")]
    RendererInvocationFailed {
        /// Iteration index.
        index: u32,
        /// What went wrong with the subprocess.
        #[source]
        source: RendererError,
    },
    /// A fixed-path output could not be moved to its indexed path.
    #[error("iteration {index}: failed to move '{}' to '{}': {source}", .from.display(), .to.display())]
    RenameFailed {
        /// Iteration index.
        index: u32,
        /// Renderer's fixed output path.
        from: PathBuf,
        /// Indexed destination path.
        to: PathBuf,
        /// Underlying I/O error, `NotFound` when the renderer left no file.
        #[source]
        source: std::io::Error,
    },
    /// The batch configuration is unusable.
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),
    /// Indexed scene descriptions could not be combined into one document.
    #[error("failed to collect scenes into '{}': {reason}", .path.display())]
    CollectionFailed {
        /// File being read or written when the failure occurred.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

impl BatchError {
    /// The iteration the error belongs to, if any.
    pub fn index(&self) -> Option<u32> {
        match self {
            BatchError::RendererInvocationFailed { index, .. }
            | BatchError::RenameFailed { index, .. } => Some(*index),
            BatchError::InvalidConfig(_) | BatchError::CollectionFailed { .. } => None,
        }
    }
}
