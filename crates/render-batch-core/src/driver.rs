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

//! The batch loop.
//!
//! For each index, in ascending order and strictly one at a time:
//!
//! 1. discard leftover fixed-path outputs,
//! 2. invoke the renderer and block until it exits,
//! 3. move the fixed-path image to its indexed path,
//! 4. move the fixed-path metadata to its indexed path.
//!
//! A failed render never reaches step 3, so a failed index has no indexed
//! files from this run.

use crate::config::{BatchConfig, RenameFailurePolicy, RenderFailurePolicy};
use crate::error::BatchError;
use crate::layout::{OutputLayout, RenderOutputs};
use crate::renderer::Renderer;
use crate::timer::Stopwatch;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

/// Printed once the batch loop ends. The text is fixed and does not follow the
/// configured batch size.
pub const COMPLETION_MESSAGE: &str = "Finished rendering images 1 to 10.";

/// One completed iteration and where its files ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedOutput {
    /// Iteration index.
    pub index: u32,
    /// Final paths.
    pub outputs: RenderOutputs,
}

/// A failed iteration that did not stop the batch.
#[derive(Debug)]
pub struct IterationFailure {
    /// Iteration index.
    pub index: u32,
    /// What went wrong.
    pub error: BatchError,
}

/// Outcome of a batch that ran to the end of its index range.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Completed iterations, in index order.
    pub completed: Vec<IndexedOutput>,
    /// Failures recorded under the `skip` / `warn` policies.
    pub failures: Vec<IterationFailure>,
    /// How many times the renderer was started.
    pub renderer_invocations: u32,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl BatchReport {
    /// `true` when every iteration completed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Receives progress events from [`BatchDriver::run`].
///
/// All methods default to no-ops.
pub trait BatchObserver {
    /// An iteration is about to start. `position` counts from 1 up to `total`.
    fn iteration_started(&mut self, _index: u32, _position: u32, _total: u32) {}

    /// An iteration moved both outputs into place.
    fn iteration_completed(&mut self, _output: &IndexedOutput, _elapsed: Duration) {}

    /// An iteration failed.
    fn iteration_failed(&mut self, _index: u32, _error: &BatchError) {}

    /// Called after one iteration and before the next one.
    fn between_iterations(&mut self) {}
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Runs a fixed-count sequence of renders.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    count: u32,
    start_index: u32,
    layout: OutputLayout,
    render_policy: RenderFailurePolicy,
    rename_policy: RenameFailurePolicy,
    dry_run: bool,
}

impl BatchDriver {
    /// Builds a driver from a validated configuration.
    pub fn from_config(config: &BatchConfig) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            count: config.count,
            start_index: config.start_index,
            layout: config.output.layout(),
            render_policy: config.on_render_failure,
            rename_policy: config.on_rename_failure,
            dry_run: config.dry_run,
        })
    }

    /// The output layout this driver renames into.
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// The indices this driver will render, in order.
    pub fn indices(&self) -> Range<u32> {
        // validate() guarantees this does not overflow.
        self.start_index..self.start_index + self.count
    }

    /// Runs the whole batch.
    ///
    /// Returns `Err` as soon as a failure is fatal under the configured
    /// policies. Otherwise returns a report; failures recorded under the
    /// `skip` / `warn` policies are in [`BatchReport::failures`].
    pub fn run<R, O>(&self, renderer: &mut R, observer: &mut O) -> Result<BatchReport, BatchError>
    where
        R: Renderer + ?Sized,
        O: BatchObserver + ?Sized,
    {
        let mut report = BatchReport {
            dry_run: self.dry_run,
            ..BatchReport::default()
        };

        log::info!(
            "Rendering {} image(s), indices {:?}, with: {}",
            self.count,
            self.indices(),
            renderer.describe()
        );

        for (position, index) in (1u32..).zip(self.indices()) {
            if position > 1 {
                observer.between_iterations();
            }
            observer.iteration_started(index, position, self.count);

            if self.dry_run {
                self.log_plan(index);
                continue;
            }

            let watch = Stopwatch::start();
            match self.run_iteration(index, renderer, &mut report) {
                Ok(output) => {
                    let elapsed = watch.elapsed();
                    log::info!(
                        "Iteration {index} done in {:.2}s: {}",
                        elapsed.as_secs_f64(),
                        output.outputs.image.display()
                    );
                    observer.iteration_completed(&output, elapsed);
                    report.completed.push(output);
                }
                Err(error) => {
                    observer.iteration_failed(index, &error);
                    if self.is_fatal(&error) {
                        log::error!("{error}; aborting batch");
                        return Err(error);
                    }
                    log::warn!("{error}; continuing with the next index");
                    report.failures.push(IterationFailure { index, error });
                }
            }
        }

        Ok(report)
    }

    fn is_fatal(&self, error: &BatchError) -> bool {
        match error {
            BatchError::RendererInvocationFailed { .. } => {
                self.render_policy == RenderFailurePolicy::Abort
            }
            BatchError::RenameFailed { .. } => self.rename_policy == RenameFailurePolicy::Fail,
            BatchError::InvalidConfig(_) | BatchError::CollectionFailed { .. } => true,
        }
    }

    fn run_iteration<R>(
        &self,
        index: u32,
        renderer: &mut R,
        report: &mut BatchReport,
    ) -> Result<IndexedOutput, BatchError>
    where
        R: Renderer + ?Sized,
    {
        let fixed = self.layout.fixed_outputs();
        discard_stale(&fixed);

        report.renderer_invocations += 1;
        renderer
            .render_once()
            .map_err(|source| BatchError::RendererInvocationFailed { index, source })?;

        let dest = self.layout.indexed_outputs(index);
        let image = move_output(index, &fixed.image, &dest.image);
        let metadata = move_output(index, &fixed.metadata, &dest.metadata);

        match (image, metadata) {
            (Ok(()), Ok(())) => Ok(IndexedOutput {
                index,
                outputs: dest,
            }),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(image_err), Err(metadata_err)) => {
                // Only one error propagates; the metadata one would otherwise be lost.
                log::warn!("{metadata_err}");
                Err(image_err)
            }
        }
    }

    fn log_plan(&self, index: u32) {
        let fixed = self.layout.fixed_outputs();
        let dest = self.layout.indexed_outputs(index);
        log::info!(
            "[dry run] iteration {index}: render, then {} -> {}, {} -> {}",
            fixed.image.display(),
            dest.image.display(),
            fixed.metadata.display(),
            dest.metadata.display()
        );
    }
}

/// Removes fixed-path outputs left behind by an earlier failed iteration so
/// they cannot be relabelled with the current index.
fn discard_stale(fixed: &RenderOutputs) {
    for path in fixed.paths() {
        match fs::remove_file(path) {
            Ok(()) => log::warn!("Discarded stale renderer output '{}'", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not discard stale renderer output '{}': {e}",
                path.display()
            ),
        }
    }
}

/// Moves `from` to `to`, overwriting `to`. Falls back to copy-and-delete when
/// a plain rename is refused (e.g. across filesystems).
fn move_output(index: u32, from: &Path, to: &Path) -> Result<(), BatchError> {
    let wrap = |source: io::Error| BatchError::RenameFailed {
        index,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
    }

    match fs::rename(from, to) {
        Ok(()) => {
            log::debug!("Moved '{}' -> '{}'", from.display(), to.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(wrap(e)),
        Err(e) => {
            log::debug!(
                "rename '{}' failed ({e}), falling back to copy",
                from.display()
            );
            copy_then_discard(from, to, |path| fs::remove_file(path)).map_err(wrap)
        }
    }
}

/// Copies `from` over `to`, then removes `from` with `remove`.
///
/// A failed copy removes whatever part of `to` was written. A failed removal
/// only warns: `to` is complete, and the leftover source sits on a fixed path
/// that is discarded before the next render.
fn copy_then_discard<F>(from: &Path, to: &Path, remove: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Err(e) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    if let Err(e) = remove(from) {
        log::warn!(
            "Copied '{}' -> '{}' but could not remove the source: {e}",
            from.display(),
            to.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MetadataPlacement;
    use crate::renderer::RendererError;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Writes `image <n>` / `{"call": n}` to the fixed paths on every call,
    /// optionally failing on selected calls.
    struct FakeRenderer {
        fixed: RenderOutputs,
        calls: u32,
        fail_on: Vec<u32>,
        skip_metadata: bool,
    }

    impl FakeRenderer {
        fn new(fixed: RenderOutputs) -> Self {
            Self {
                fixed,
                calls: 0,
                fail_on: Vec::new(),
                skip_metadata: false,
            }
        }
    }

    impl Renderer for FakeRenderer {
        fn render_once(&mut self) -> Result<(), RendererError> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(RendererError::Exited { code: Some(1) });
            }
            for path in self.fixed.paths() {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
            }
            fs::write(&self.fixed.image, format!("image {}", self.calls)).unwrap();
            if !self.skip_metadata {
                fs::write(&self.fixed.metadata, format!("{{\"call\": {}}}", self.calls)).unwrap();
            }
            Ok(())
        }

        fn describe(&self) -> String {
            "fake renderer".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        started: Vec<(u32, u32, u32)>,
        completed: Vec<u32>,
        failed: Vec<u32>,
        clears: u32,
    }

    impl BatchObserver for RecordingObserver {
        fn iteration_started(&mut self, index: u32, position: u32, total: u32) {
            self.started.push((index, position, total));
        }
        fn iteration_completed(&mut self, output: &IndexedOutput, _elapsed: Duration) {
            self.completed.push(output.index);
        }
        fn iteration_failed(&mut self, index: u32, _error: &BatchError) {
            self.failed.push(index);
        }
        fn between_iterations(&mut self) {
            self.clears += 1;
        }
    }

    fn config_in(root: &Path, count: u32) -> BatchConfig {
        let mut config = BatchConfig {
            count,
            ..BatchConfig::default()
        };
        config.output.images_dir = root.join("images");
        config.output.scenes_dir = root.join("scenes");
        config
    }

    fn setup(root: &Path, count: u32) -> (BatchDriver, FakeRenderer) {
        let driver = BatchDriver::from_config(&config_in(root, count)).unwrap();
        let renderer = FakeRenderer::new(driver.layout().fixed_outputs());
        (driver, renderer)
    }

    #[test]
    fn two_gpu_iterations_land_at_indices_one_and_two() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 2);
        let mut observer = RecordingObserver::default();

        let report = driver.run(&mut renderer, &mut observer).unwrap();

        assert!(report.is_success());
        assert_eq!(renderer.calls, 2);
        assert_eq!(report.renderer_invocations, 2);
        let images = dir.path().join("images");
        assert_eq!(fs::read_to_string(images.join("CLEVR_new_1.png")).unwrap(), "image 1");
        assert_eq!(fs::read_to_string(images.join("CLEVR_new_2.png")).unwrap(), "image 2");
        assert_eq!(
            fs::read_to_string(images.join("CLEVR_new_2.json")).unwrap(),
            "{\"call\": 2}"
        );
        assert!(!images.join("CLEVR_new_000000.png").exists());
        assert!(!dir.path().join("scenes/CLEVR_new_000000.json").exists());
        assert_eq!(observer.started, vec![(1, 1, 2), (2, 2, 2)]);
        assert_eq!(observer.completed, vec![1, 2]);
        assert_eq!(observer.clears, 1);
    }

    #[test]
    fn produces_exactly_n_contiguous_pairs() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 5);

        let report = driver.run(&mut renderer, &mut NoopObserver).unwrap();

        let indices: Vec<u32> = report.completed.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        let mut names: Vec<String> = fs::read_dir(dir.path().join("images"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 10);
        for i in 1..=5 {
            assert!(names.contains(&format!("CLEVR_new_{i}.png")));
            assert!(names.contains(&format!("CLEVR_new_{i}.json")));
        }
    }

    #[test]
    fn zero_count_never_invokes_the_renderer() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 0);
        let mut observer = RecordingObserver::default();

        let report = driver.run(&mut renderer, &mut observer).unwrap();

        assert_eq!(renderer.calls, 0);
        assert!(report.completed.is_empty());
        assert!(report.is_success());
        assert!(observer.started.is_empty());
        assert!(!dir.path().join("images").exists());
    }

    #[test]
    fn abort_policy_stops_at_failed_index() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 4);
        renderer.fail_on = vec![2];
        let mut observer = RecordingObserver::default();

        let err = driver.run(&mut renderer, &mut observer).unwrap_err();

        assert!(matches!(
            err,
            BatchError::RendererInvocationFailed { index: 2, .. }
        ));
        assert_eq!(err.index(), Some(2));
        assert_eq!(renderer.calls, 2);
        assert_eq!(observer.failed, vec![2]);
        let images = dir.path().join("images");
        assert!(images.join("CLEVR_new_1.png").exists());
        assert!(!images.join("CLEVR_new_2.png").exists());
        assert!(!images.join("CLEVR_new_2.json").exists());
        assert!(!images.join("CLEVR_new_3.png").exists());
    }

    #[test]
    fn skip_policy_records_failure_and_continues() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path(), 3);
        config.on_render_failure = RenderFailurePolicy::Skip;
        let driver = BatchDriver::from_config(&config).unwrap();
        let mut renderer = FakeRenderer::new(driver.layout().fixed_outputs());
        renderer.fail_on = vec![2];

        let report = driver.run(&mut renderer, &mut NoopObserver).unwrap();

        assert!(!report.is_success());
        assert_eq!(renderer.calls, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 2);
        let indices: Vec<u32> = report.completed.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 3]);
        let images = dir.path().join("images");
        assert!(!images.join("CLEVR_new_2.png").exists());
        assert!(!images.join("CLEVR_new_2.json").exists());
        // The third call's output is labelled 3, not 2.
        assert_eq!(fs::read_to_string(images.join("CLEVR_new_3.png")).unwrap(), "image 3");
    }

    #[test]
    fn missing_metadata_is_fatal_by_default() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 2);
        renderer.skip_metadata = true;

        let err = driver.run(&mut renderer, &mut NoopObserver).unwrap_err();

        match err {
            BatchError::RenameFailed {
                index, from, source, ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(from, driver.layout().fixed_outputs().metadata);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected RenameFailed, got {other:?}"),
        }
        assert_eq!(renderer.calls, 1);
    }

    #[test]
    fn warn_policy_keeps_going_after_rename_failure() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path(), 2);
        config.on_rename_failure = RenameFailurePolicy::Warn;
        let driver = BatchDriver::from_config(&config).unwrap();
        let mut renderer = FakeRenderer::new(driver.layout().fixed_outputs());
        renderer.skip_metadata = true;

        let report = driver.run(&mut renderer, &mut NoopObserver).unwrap();

        assert_eq!(renderer.calls, 2);
        assert!(report.completed.is_empty());
        assert_eq!(report.failures.len(), 2);
        // The image half of each pair was still moved.
        assert!(dir.path().join("images/CLEVR_new_1.png").exists());
        assert!(dir.path().join("images/CLEVR_new_2.png").exists());
    }

    #[test]
    fn rerun_overwrites_previous_outputs() {
        let dir = tempdir().unwrap();
        let (driver, mut first) = setup(dir.path(), 2);
        driver.run(&mut first, &mut NoopObserver).unwrap();

        let mut second = FakeRenderer::new(driver.layout().fixed_outputs());
        second.calls = 100;
        driver.run(&mut second, &mut NoopObserver).unwrap();

        let images = dir.path().join("images");
        assert_eq!(fs::read_to_string(images.join("CLEVR_new_1.png")).unwrap(), "image 101");
        assert_eq!(fs::read_to_string(images.join("CLEVR_new_2.png")).unwrap(), "image 102");
        assert!(!images.join("CLEVR_new_3.png").exists());
    }

    #[test]
    fn stale_fixed_outputs_are_not_relabelled() {
        let dir = tempdir().unwrap();
        let (driver, mut renderer) = setup(dir.path(), 1);
        let fixed = driver.layout().fixed_outputs();
        fs::create_dir_all(fixed.metadata.parent().unwrap()).unwrap();
        fs::write(&fixed.metadata, "stale").unwrap();
        renderer.skip_metadata = true;

        let err = driver.run(&mut renderer, &mut NoopObserver).unwrap_err();

        assert!(matches!(err, BatchError::RenameFailed { .. }));
        assert!(!dir.path().join("images/CLEVR_new_1.json").exists());
    }

    #[test]
    fn scenes_dir_placement_and_custom_start_index() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path(), 2);
        config.start_index = 10;
        config.output.metadata_placement = MetadataPlacement::ScenesDir;
        let driver = BatchDriver::from_config(&config).unwrap();
        let mut renderer = FakeRenderer::new(driver.layout().fixed_outputs());

        let report = driver.run(&mut renderer, &mut NoopObserver).unwrap();

        assert_eq!(driver.indices(), 10..12);
        assert_eq!(
            report.completed[1].outputs.metadata,
            dir.path().join("scenes/CLEVR_new_11.json")
        );
        assert!(dir.path().join("scenes/CLEVR_new_10.json").exists());
        assert!(dir.path().join("images/CLEVR_new_11.png").exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path(), 3);
        config.dry_run = true;
        let driver = BatchDriver::from_config(&config).unwrap();
        let mut renderer = FakeRenderer::new(driver.layout().fixed_outputs());
        let mut observer = RecordingObserver::default();

        let report = driver.run(&mut renderer, &mut observer).unwrap();

        assert!(report.dry_run);
        assert_eq!(renderer.calls, 0);
        assert_eq!(report.renderer_invocations, 0);
        assert_eq!(observer.started.len(), 3);
        assert!(!dir.path().join("images").exists());
    }

    #[test]
    fn copy_fallback_keeps_destination_when_source_removal_fails() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("CLEVR_new_000000.png");
        let to = dir.path().join("CLEVR_new_1.png");
        fs::write(&from, "image 1").unwrap();

        copy_then_discard(&from, &to, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&to).unwrap(), "image 1");
        // The leftover source is a fixed path; the next iteration discards it.
        assert!(from.exists());
    }

    #[test]
    fn copy_fallback_removes_source_on_success() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("CLEVR_new_000000.json");
        let to = dir.path().join("CLEVR_new_1.json");
        fs::write(&from, "{}").unwrap();

        copy_then_discard(&from, &to, |path| fs::remove_file(path)).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "{}");
    }

    #[test]
    fn failed_copy_leaves_no_destination() {
        let dir = tempdir().unwrap();
        let to = dir.path().join("CLEVR_new_1.png");

        let err = copy_then_discard(&dir.path().join("missing.png"), &to, |_| Ok(())).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!to.exists());
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = BatchConfig::default();
        config.renderer.executable = PathBuf::new();
        assert!(matches!(
            BatchDriver::from_config(&config),
            Err(BatchError::InvalidConfig(_))
        ));
    }
}
