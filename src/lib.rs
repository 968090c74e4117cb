//! # lanepilot
//!
//! `lanepilot` is a Rust crate that provides the maneuver-control core of an autonomous ego vehicle driving
//! inside a discrete-time traffic simulation. Once per tick it estimates the ego state, classifies nearby
//! vehicles by lane, selects the vehicles the control laws refer to and steps a mission-based planner that
//! emits longitudinal and lateral setpoints.
//!
//! ## Modules
//!
//! `lanepilot` is organized into several modules, each serving a specific purpose:
//!
//! - [StateEstimator](selfdrive/controls/vehicle_state/struct.StateEstimator.html): Derives velocity, lane index,
//!   lateral offset and heading command from consecutive position snapshots.
//!
//! - [classify](selfdrive/controls/neighbors/fn.classify.html): Partitions neighbors into left/mid/right leader
//!   and follower buckets.
//!
//! - [TargetSelector](selfdrive/controls/radar_helpers/struct.TargetSelector.html): Picks the leading, following
//!   and gap vehicles, falling back to virtual vehicles and dead reckoning.
//!
//! - [ManeuverPlanner](selfdrive/controls/planner/struct.ManeuverPlanner.html): Runs lane-keep and lane-change
//!   missions through their phases.
//!
//! - [EgoVehicle](selfdrive/ego_vehicle/struct.EgoVehicle.html): Wires the pipeline together behind the
//!   simulator interfaces.
//!
//! ## Example
//!
//! ```rust
//! use lanepilot::common::params::PilotConfig;
//! use lanepilot::selfdrive::controls::mission::PlannerState;
//! use lanepilot::selfdrive::ego_vehicle::EgoVehicle;
//! use lanepilot::simulation::ScriptedSimulation;
//!
//! let config = PilotConfig::default();
//! let mut sim = ScriptedSimulation::new(&config);
//! sim.add_road("E0", 3, 1000.0, 30.0);
//! sim.spawn_ego("ego", "E0", 0.0, 1, 8.0);
//! sim.spawn("lead", "E0", 120.0, 1, 10.0);
//!
//! let mut ego = EgoVehicle::new("ego", &config);
//! for step in 0..10 {
//!     sim.advance();
//!     ego.tick(&mut sim, step);
//! }
//! ego.plan_lane_keep().unwrap();
//! assert_eq!(ego.planner().state(), PlannerState::LaneKeep);
//! ```
//!
//! ## License
//!
//! This project is licensed under the [MIT License](LICENSE).

pub mod common;
pub mod selfdrive;
pub mod simulation;
