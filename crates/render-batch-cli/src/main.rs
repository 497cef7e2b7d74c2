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

// Batch render driver
// Run with: render-batch [OPTIONS] [-- SCRIPT_ARGS...]

mod cli;
mod helpers;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use helpers::*;
use render_batch_core::{collect_scenes, BatchDriver, CollectionInfo, COMPLETION_MESSAGE};
use std::time::Instant;

fn init_logging(verbose: bool) {
    use env_logger::{Builder, Env};

    let default_level = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = settings::load_config(cli.config.as_deref())?;
    cli.apply(&mut config);

    let driver = BatchDriver::from_config(&config).context("Invalid batch configuration")?;
    let mut renderer = config.renderer.build();

    println!("{}", BANNER);
    print_command_info(&config.renderer.command().to_string());
    println!(
        "{}💡 Info:{} {} image(s) into '{}'",
        BOLD,
        RESET,
        config.count,
        config.output.images_dir.display()
    );

    let start_time = Instant::now();
    let mut observer = ConsoleObserver::new(config.clear_between, config.dry_run);
    let report = match driver.run(&mut renderer, &mut observer) {
        Ok(report) => report,
        Err(e) => {
            print_error(&format!(
                "Batch aborted after {:.2}s",
                start_time.elapsed().as_secs_f64()
            ));
            return Err(e.into());
        }
    };

    if let Some(destination) = &config.collection.output {
        if report.dry_run {
            log::info!(
                "[dry run] would collect scenes into '{}'",
                destination.display()
            );
        } else {
            let info = CollectionInfo::from_config(&config.collection, &config.output.split);
            let count = collect_scenes(&report.completed, &info, destination)?;
            print_success(&format!(
                "Collected {} scene(s) into '{}'",
                count,
                destination.display()
            ));
        }
    }

    print_summary(&report, start_time.elapsed());
    println!("{}", COMPLETION_MESSAGE);

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} render(s) failed",
            report.failures.len(),
            config.count
        );
    }

    Ok(())
}
