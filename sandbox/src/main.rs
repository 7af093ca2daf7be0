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

//! Sandbox: an engine-style controller pacing three subsystem loops.
//!
//! The controller lets everything run, parks the render loop as if the
//! window were minimized, pauses the whole engine for a frame, then shuts
//! down and prints each subsystem's last cycle timings as JSON.

use anyhow::Context;
use cadence_control::{ControlConfig, ControlEvent, ControlTable, CycleStats};
use cadence_core::Ticker;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Runs simulation, render, and io loops under a single controller.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// How long to run, in seconds.
    #[arg(long, short = 's', default_value_t = 3.0)]
    seconds: f64,

    /// JSON file holding a control table configuration.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Tick rate of the controller loop in Hz.
    #[arg(long, default_value_t = 20.0)]
    controller_hz: f64,
}

/// A worker loop: its name, target rate, and simulated work per iteration.
struct Subsystem {
    name: &'static str,
    hz: f64,
    work: Duration,
}

const SUBSYSTEMS: [Subsystem; 3] = [
    Subsystem {
        name: "simulation",
        hz: 60.0,
        work: Duration::from_millis(4),
    },
    Subsystem {
        name: "render",
        hz: 30.0,
        work: Duration::from_millis(12),
    },
    Subsystem {
        name: "io",
        hz: 10.0,
        work: Duration::from_millis(1),
    },
];

#[derive(Debug, Serialize)]
struct SubsystemReport {
    name: &'static str,
    cycles: u64,
    last_cycle: Option<CycleStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Running,
    Minimized,
    Restored,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    config.validate().context("invalid control configuration")?;
    let run_for = Duration::try_from_secs_f64(args.seconds).context("invalid --seconds")?;
    let controller_period = period_for(args.controller_hz)?;

    let table = Arc::new(ControlTable::with_config(config));
    let events = table.events();

    let workers = SUBSYSTEMS
        .iter()
        .map(|subsystem| spawn_subsystem(&table, subsystem))
        .collect::<anyhow::Result<Vec<_>>>()?;
    for (_, id) in &workers {
        while table.state(*id).is_none() {
            cadence_core::wait(Duration::from_millis(1));
        }
    }
    let render = workers
        .iter()
        .find(|(handle, _)| handle.thread().name() == Some("render"))
        .map(|(_, id)| *id)
        .context("render subsystem did not start")?;

    log::info!("Sandbox running for {run_for:?}");
    let started = cadence_core::now();
    let mut status = Ticker::new(Duration::from_millis(500));
    let mut stage = Stage::Running;

    // The controller is paced by the same table; terminate_all includes it.
    while table.cycle(controller_period) {
        for event in events.try_iter() {
            log_event(&workers, event);
        }

        let elapsed = cadence_core::now().saturating_sub(started);
        stage = match stage {
            Stage::Running if elapsed >= run_for / 3 => {
                log::info!("Window minimized: parking the render loop");
                table.suspend(render);
                Stage::Minimized
            }
            Stage::Minimized if elapsed >= run_for * 2 / 3 => {
                log::info!("Window restored");
                table.resume(render);

                // Freeze every other loop for one controller frame.
                table.suspend_all();
                log::info!("Engine paused ({} threads registered)", table.len());
                table.resume_all();
                Stage::Restored
            }
            Stage::Restored if elapsed >= run_for => {
                log::info!("Shutting down");
                table.terminate_all();
                stage
            }
            _ => stage,
        };

        if status.tick() {
            log::info!(
                "Controller: work {:?}, halt {:?}, stage {stage:?}",
                table.work_time(),
                table.halt_time()
            );
        }
    }

    let mut reports = Vec::with_capacity(workers.len());
    for (handle, _) in workers {
        let report = handle
            .join()
            .map_err(|_| anyhow::anyhow!("a subsystem thread panicked"))?;
        reports.push(report);
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn spawn_subsystem(
    table: &Arc<ControlTable>,
    subsystem: &Subsystem,
) -> anyhow::Result<(JoinHandle<SubsystemReport>, ThreadId)> {
    let name = subsystem.name;
    let work = subsystem.work;
    let period = period_for(subsystem.hz)?;
    let table = Arc::clone(table);

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut cycles = 0;
            let mut last_cycle = None;
            while table.cycle(period) {
                cycles += 1;
                last_cycle = table.stats();
                cadence_core::wait(work);
            }
            log::debug!("{name}: stopped after {cycles} cycles");
            SubsystemReport {
                name,
                cycles,
                last_cycle,
            }
        })
        .with_context(|| format!("failed to spawn the {name} thread"))?;
    let id = handle.thread().id();
    Ok((handle, id))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ControlConfig> {
    let Some(path) = path else {
        return Ok(ControlConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn period_for(hz: f64) -> anyhow::Result<Duration> {
    anyhow::ensure!(hz > 0.0, "rate must be positive, got {hz}");
    Duration::try_from_secs_f64(1.0 / hz).context("rate out of range")
}

fn log_event(workers: &[(JoinHandle<SubsystemReport>, ThreadId)], event: ControlEvent) {
    let name = workers
        .iter()
        .find(|(_, id)| *id == event.thread())
        .and_then(|(handle, _)| handle.thread().name())
        .unwrap_or("controller");
    match event {
        ControlEvent::Registered(_) => log::debug!("{name}: registered"),
        ControlEvent::Trapped(_) => log::info!("{name}: suspended"),
        ControlEvent::Released(_) => log::info!("{name}: resumed"),
        ControlEvent::Removed(_) => log::debug!("{name}: removed"),
    }
}
