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

use render_batch_core::{BatchError, BatchObserver, BatchReport, IndexedOutput};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

// ANSI color codes
pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

// Visual symbols
pub const CHECK: &str = "✓";
pub const CROSS: &str = "✗";
pub const CAMERA: &str = "📷";

/// Clears the screen and moves the cursor home.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub const BANNER: &str = concat!(
    "\x1b[1m",
    "\x1b[36m", // BOLD, CYAN
    "╔═══════════════════════════════════════════════════════════╗\n",
    "║                    RENDER BATCH DRIVER                    ║\n",
    "╚═══════════════════════════════════════════════════════════╝",
    "\x1b[0m" // RESET
);

pub fn print_task_start(task_name: &str, emoji: &str, color: &str) {
    println!(
        "\n{}{}━━━ {} {} {}━━━{}",
        BOLD, color, emoji, task_name, emoji, RESET
    );
}

pub fn print_success(message: &str) {
    println!("{}{} {} {}{}", BOLD, GREEN, CHECK, message, RESET);
}

pub fn print_error(message: &str) {
    println!("{}{} {} {}{}", BOLD, RED, CROSS, message, RESET);
}

pub fn print_command_info(command: &str) {
    println!("{}{}📋 Command:{} {}", BOLD, CYAN, RESET, command);
}

/// Prints the end-of-batch summary box.
pub fn print_summary(report: &BatchReport, total: Duration) {
    println!(
        "\n{}{}╔═══════════════════════════════════════╗{}",
        BOLD, CYAN, RESET
    );
    println!(
        "{}{}║             BATCH SUMMARY             ║{}",
        BOLD, CYAN, RESET
    );
    println!(
        "{}{}╚═══════════════════════════════════════╝{}",
        BOLD, CYAN, RESET
    );

    if report.dry_run {
        println!("{}{}Dry run: nothing was rendered.{}", BOLD, YELLOW, RESET);
    } else if report.is_success() {
        print_success(&format!("{} image(s) rendered", report.completed.len()));
    } else {
        println!(
            "{}{} ⚠ {} rendered, {} failed{}",
            BOLD,
            YELLOW,
            report.completed.len(),
            report.failures.len(),
            RESET
        );
        for failure in &report.failures {
            print_error(&failure.error.to_string());
        }
    }

    println!(
        "{}{}Total time: {:.2}s{}",
        BOLD,
        BLUE,
        total.as_secs_f64(),
        RESET
    );
}

/// Console progress for a running batch.
pub struct ConsoleObserver {
    clear_between: bool,
}

impl ConsoleObserver {
    /// Clearing only happens when stdout is a terminal, and never in a dry
    /// run, where the plan is the whole output.
    pub fn new(clear_between: bool, dry_run: bool) -> Self {
        Self {
            clear_between: should_clear(clear_between, dry_run, io::stdout().is_terminal()),
        }
    }
}

fn should_clear(requested: bool, dry_run: bool, is_terminal: bool) -> bool {
    requested && !dry_run && is_terminal
}

impl BatchObserver for ConsoleObserver {
    fn iteration_started(&mut self, index: u32, position: u32, total: u32) {
        print_task_start(
            &format!("[{position}/{total}] Rendering image {index}"),
            CAMERA,
            BLUE,
        );
    }

    fn iteration_completed(&mut self, output: &IndexedOutput, elapsed: Duration) {
        print_success(&format!(
            "Image {} -> {} ({:.2}s)",
            output.index,
            output.outputs.image.display(),
            elapsed.as_secs_f64()
        ));
    }

    fn iteration_failed(&mut self, _index: u32, error: &BatchError) {
        print_error(&error.to_string());
    }

    fn between_iterations(&mut self) {
        if self.clear_between {
            print!("{CLEAR_SCREEN}");
            let _ = io::stdout().flush();
        }
    }
}
