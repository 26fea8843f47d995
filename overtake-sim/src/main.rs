/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use overtake_sim::{ScenarioConfig, Simulation, SimulationReport};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Platoon overtake scenario simulator.
///
/// Example:
///   overtake-sim --scenario demos/mid_hazard.yaml --seed 7
#[derive(Debug, Parser)]
#[command(
    name = "overtake-sim",
    about = "Platoon overtake maneuver – scenario simulator",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scenario file.  Built-in defaults are used when absent.
    #[arg(short = 's', long = "scenario")]
    scenario: Option<PathBuf>,

    /// Override the network loss seed.
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Make the leader deny the overtake request.
    #[arg(long = "deny", default_value_t = false)]
    deny: bool,

    /// Override the scenario duration.
    #[arg(short = 'd', long = "duration-ms")]
    duration_ms: Option<u64>,

    /// Pace events against the wall clock instead of running flat out.
    #[arg(short = 'r', long = "realtime", default_value_t = false)]
    realtime: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    info!("overtake-sim starting up...");

    let cli = Cli::parse();

    info!(
        scenario    = ?cli.scenario,
        seed        = ?cli.seed,
        deny        = cli.deny,
        duration_ms = ?cli.duration_ms,
        realtime    = cli.realtime,
        "Configuration"
    );

    // ── Load scenario ─────────────────────────────────────────────────────────
    let mut scenario = match &cli.scenario {
        Some(path) => match ScenarioConfig::load_from_file(path) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to load scenario: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No scenario file provided, using the built-in scenario");
            ScenarioConfig::default()
        }
    };

    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    if let Some(duration_ms) = cli.duration_ms {
        scenario.duration_ms = duration_ms;
    }
    if cli.deny {
        scenario.admission = false;
    }

    let mut sim = match Simulation::new(scenario) {
        Ok(sim) => sim,
        Err(e) => {
            error!("Invalid scenario: {:#}", e);
            process::exit(1);
        }
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let report = if cli.realtime {
        run_realtime(&mut sim).await
    } else {
        sim.run()
    };

    print_report(&report);
}

/// Step the simulation with each event released at its wall-clock time.
/// Ctrl-C stops early and still reports.
async fn run_realtime(sim: &mut Simulation) -> SimulationReport {
    let start = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while let Some(at_ms) = sim.next_event_ms() {
        tokio::select! {
            _ = &mut ctrl_c => {
                warn!(at_ms = sim.now_ms(), "interrupted, stopping early");
                break;
            }
            _ = sleep_until(start + Duration::from_millis(at_ms)) => {
                sim.step();
            }
        }
    }
    sim.report()
}

fn print_report(report: &SimulationReport) {
    info!(
        "Finished at {} ms: {} event(s), {} rollback(s), {} invariant violation(s)",
        report.elapsed_ms,
        report.stats.events,
        report.stats.rollbacks,
        report.stats.invariant_violations,
    );
    for v in &report.vehicles {
        info!(
            "  [{name}]  role={role:?}  state={state:?}  lane={lane}  pos={pos:.1}m  speed={speed:.1}m/s",
            name = v.external_id,
            role = v.role,
            state = v.state,
            lane = v.lane,
            pos = v.position,
            speed = v.speed,
        );
    }

    match serde_yaml::to_string(report) {
        Ok(yaml) => println!("{}", yaml),
        Err(e) => error!("Failed to serialise report: {:#}", e),
    }
}
