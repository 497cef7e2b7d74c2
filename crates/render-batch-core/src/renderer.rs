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

//! The external renderer and how it is invoked.
//!
//! A render is a blocking subprocess call:
//!
//! ```text
//! <renderer> --background --python <script> -- --num_images 1 --use_gpu <0|1> [extra...]
//! ```
//!
//! The arguments never vary between iterations; the renderer knows nothing
//! about batching and always writes to the same two paths.

use crate::timer::Stopwatch;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// How often a child is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A failed render invocation.
#[derive(Debug, Error)]
pub enum RendererError {
    /// The renderer executable could not be started.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        /// Program that was being launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The renderer ran and exited with a non-zero status (or was killed by
    /// a signal, in which case `code` is `None`).
    #[error("renderer exited unsuccessfully ({})", describe_code(.code))]
    Exited {
        /// Process exit code, if any.
        code: Option<i32>,
    },
    /// The renderer did not finish before the configured timeout and was killed.
    #[error("renderer did not finish within {after:?} and was killed")]
    TimedOut {
        /// The timeout that was exceeded.
        after: Duration,
    },
    /// Waiting for the renderer failed.
    #[error("failed while waiting for the renderer: {0}")]
    Wait(#[source] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl RendererError {
    fn from_status(status: ExitStatus) -> Self {
        RendererError::Exited {
            code: status.code(),
        }
    }
}

/// Produces one image and one scene description at fixed paths per call.
pub trait Renderer {
    /// Renders a single image, blocking until the renderer is done.
    fn render_once(&mut self) -> Result<(), RendererError>;

    /// A human-readable description of what `render_once` runs.
    fn describe(&self) -> String;
}

/// The static command line of the external renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    /// Renderer executable, e.g. `blender`.
    pub executable: PathBuf,
    /// Scene-generation script passed with `--python`.
    pub script: PathBuf,
    /// Requests GPU rendering from the script (`--use_gpu 1`).
    pub use_gpu: bool,
    /// Extra script arguments appended after `--use_gpu`.
    pub extra_args: Vec<String>,
}

impl RenderCommand {
    /// Arguments passed to the executable, in order.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--background".into(),
            "--python".into(),
            self.script.clone().into_os_string(),
            "--".into(),
            "--num_images".into(),
            "1".into(),
            "--use_gpu".into(),
            if self.use_gpu { "1" } else { "0" }.into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Builds a ready-to-spawn [`Command`]. Output is inherited so the
    /// renderer's progress shows up in real time.
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(self.args());
        command
    }
}

impl fmt::Display for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.executable.display())?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs the renderer as a blocking subprocess.
#[derive(Debug, Clone)]
pub struct BlenderProcess {
    command: RenderCommand,
    timeout: Option<Duration>,
}

impl BlenderProcess {
    /// Creates a renderer without a timeout.
    pub fn new(command: RenderCommand) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Kills the renderer and fails the iteration when it runs longer than
    /// `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line this renderer runs.
    pub fn command(&self) -> &RenderCommand {
        &self.command
    }

    fn spawn(&self) -> Result<Child, RendererError> {
        self.command
            .to_command()
            .spawn()
            .map_err(|source| RendererError::Spawn {
                program: self.command.executable.display().to_string(),
                source,
            })
    }
}

impl Renderer for BlenderProcess {
    fn render_once(&mut self) -> Result<(), RendererError> {
        log::debug!("Spawning renderer: {}", self.command);
        let mut child = self.spawn()?;

        let status = match self.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout)?,
            None => child.wait().map_err(RendererError::Wait)?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(RendererError::from_status(status))
        }
    }

    fn describe(&self) -> String {
        self.command.to_string()
    }
}

/// Polls `child` until it exits or `timeout` passes. On timeout the child is
/// killed and reaped before returning.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, RendererError> {
    let watch = Stopwatch::start();
    loop {
        if let Some(status) = child.try_wait().map_err(RendererError::Wait)? {
            return Ok(status);
        }
        if watch.exceeded(timeout) {
            log::warn!(
                "Renderer (pid {}) exceeded {:?}, killing it",
                child.id(),
                timeout
            );
            // The child may have exited between try_wait and kill.
            if let Err(e) = child.kill() {
                log::debug!("kill after timeout failed: {e}");
            }
            child.wait().map_err(RendererError::Wait)?;
            return Err(RendererError::TimedOut { after: timeout });
        }
        thread::sleep(POLL_INTERVAL);
    }
}
