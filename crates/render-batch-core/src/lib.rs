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

//! # Render Batch Core
//!
//! Drives an external renderer a fixed number of times and relocates the two
//! files it writes at fixed paths (an image and a JSON scene description) to
//! index-qualified paths before the next invocation overwrites them.
//!
//! The renderer is a black box reached through the [`Renderer`] trait;
//! [`BlenderProcess`] is the subprocess implementation.

#![warn(missing_docs)]

pub mod collect;
pub mod config;
pub mod driver;
pub mod error;
pub mod layout;
pub mod renderer;
mod timer;

pub use collect::{collect_scenes, CollectionInfo};
pub use config::{
    BatchConfig, CollectionConfig, OutputConfig, RenameFailurePolicy, RenderFailurePolicy,
    RendererConfig,
};
pub use driver::{
    BatchDriver, BatchObserver, BatchReport, IndexedOutput, IterationFailure, NoopObserver,
    COMPLETION_MESSAGE,
};
pub use error::BatchError;
pub use layout::{MetadataPlacement, OutputLayout, OutputNaming, RenderOutputs};
pub use renderer::{BlenderProcess, RenderCommand, Renderer, RendererError};
