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

use std::time::{Duration, Instant};

/// Measures the wall-clock time of one render iteration or one subprocess wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    /// Starts a new stopwatch.
    #[inline]
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Returns the time elapsed since the stopwatch was started.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns `true` once more than `limit` has elapsed.
    #[inline]
    pub fn exceeded(&self, limit: Duration) -> bool {
        self.elapsed() > limit
    }
}
