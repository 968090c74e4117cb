//! Runs the ego-vehicle pipeline against a scripted three-lane highway.
//!
//! Usage:
//!   lanepilot --steps 4000 --lane-change-at 300
//!   RUST_LOG=lanepilot=debug lanepilot --lane-keep-at 100

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lanepilot::common::params::PilotConfig;
use lanepilot::selfdrive::controls::radar_helpers::{GapRequest, LaneCode};
use lanepilot::selfdrive::ego_vehicle::EgoVehicle;
use lanepilot::simulation::ScriptedSimulation;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ROAD: &str = "E0";
const EGO: &str = "ego";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Left,
    Right,
}

#[derive(Parser)]
#[command(name = "lanepilot")]
#[command(about = "Drive an ego vehicle through a scripted highway scenario")]
struct Args {
    /// YAML configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 3000)]
    steps: u64,

    /// Tick at which a lane keep is requested
    #[arg(long)]
    lane_keep_at: Option<u64>,

    /// Tick at which a lane change is requested
    #[arg(long)]
    lane_change_at: Option<u64>,

    /// Destination side of the lane change
    #[arg(long, value_enum, default_value_t = Side::Right)]
    side: Side,

    /// Ask for virtual gap vehicles instead of the scripted ones
    #[arg(long)]
    virtual_gap: bool,
}

fn highway(config: &PilotConfig) -> ScriptedSimulation {
    let mut sim = ScriptedSimulation::new(config);
    sim.add_road(ROAD, 3, 5000.0, 33.0);
    sim.spawn_ego(EGO, ROAD, 0.0, 1, config.free_drive_speed);
    sim.spawn("lead", ROAD, 150.0, 1, 10.0);
    sim.spawn("lane2_front", ROAD, 80.0, 2, 9.0);
    sim.spawn("lane2_rear", ROAD, -40.0, 2, 9.0);
    sim.spawn("lane0_front", ROAD, 60.0, 0, 7.0);
    sim.spawn("lane0_rear", ROAD, -60.0, 0, 7.0);
    sim
}

fn gap_requests(side: Side, virtual_gap: bool) -> (GapRequest, GapRequest) {
    // Lane 2 sits at larger y than the ego lane, lane 0 at smaller y.
    let (code, front, rear) = match side {
        Side::Right => (LaneCode::Right, "lane2_front", "lane2_rear"),
        Side::Left => (LaneCode::Left, "lane0_front", "lane0_rear"),
    };
    if virtual_gap {
        (GapRequest::synthetic(code), GapRequest::synthetic(code))
    } else {
        (GapRequest::real(front, code), GapRequest::real(rear, code))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lanepilot=info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PilotConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PilotConfig::default(),
    };
    info!(?config, "configuration ready");

    let mut sim = highway(&config);
    let mut ego = EgoVehicle::new(EGO, &config);
    let (front, rear) = gap_requests(args.side, args.virtual_gap);

    for step in 0..args.steps {
        sim.advance();

        if args.lane_keep_at == Some(step) {
            if let Err(err) = ego.plan_lane_keep() {
                warn!(step, %err, "lane keep not started");
            }
        }
        if args.lane_change_at == Some(step) {
            if let Err(err) = ego.plan_lane_change(&sim, &front, &rear) {
                warn!(step, %err, "lane change not started");
            }
        }

        ego.tick(&mut sim, step);
        if step % 100 == 0 {
            info!(step, "{}", ego.diagnostics());
        }
    }

    info!(
        speed_limits = ?ego.speed_limits(&sim),
        lane_length = ?ego.lane_length(&sim),
        "finished: {}",
        ego.diagnostics()
    );
    Ok(())
}
