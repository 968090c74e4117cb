//! Boundary with the traffic simulator.
//!
//! The planner core never talks to the simulator directly. Every tick it
//! reads snapshots through [`TelemetryFeed`], asks [`RoadNetwork`] for static
//! lane data and hands its setpoint to an [`ActuationSink`]. Reads are
//! instantaneous snapshots; any blocking lives on the other side of these
//! traits.

/// Per-tick ego snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct EgoSnapshot {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub road_id: String,
}

/// Per-tick snapshot of a vehicle inside the sensing radius.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborSnapshot {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub road_id: String,
    pub lane_index: i32,
    /// Longitudinal position along the lane
    pub lane_position: f64,
    /// Lateral position inside the lane
    pub lane_position_lat: f64,
}

/// Snapshot of one tracked vehicle, looked up by identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSnapshot {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
}

/// Telemetry the simulator publishes each tick.
pub trait TelemetryFeed {
    /// `None` when the ego vehicle has no data this tick.
    fn ego(&self, ego_id: &str) -> Option<EgoSnapshot>;

    /// Vehicles within `radius` upstream and downstream of the ego vehicle.
    /// `None` when the proximity subscription produced nothing this tick.
    fn neighbors(&self, ego_id: &str, radius: f64) -> Option<Vec<NeighborSnapshot>>;

    /// `None` once the vehicle has left the simulated network.
    fn vehicle(&self, vehicle_id: &str) -> Option<VehicleSnapshot>;
}

/// Static road-network queries.
pub trait RoadNetwork {
    fn lane_count(&self, road_id: &str) -> Option<usize>;

    fn lane_length(&self, road_id: &str, lane_index: usize) -> Option<f64>;

    fn max_speed(&self, road_id: &str, lane_index: usize) -> Option<f64>;
}

/// Absolute target handed to the simulator for the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuationCommand {
    /// Free driving: advance longitudinally, keep the current lateral position.
    Cruise { x: f64, heading: f64 },
    /// Maneuvering: full planar target.
    Track { x: f64, y: f64, heading: f64 },
}

impl ActuationCommand {
    pub fn x(&self) -> f64 {
        match *self {
            ActuationCommand::Cruise { x, .. } | ActuationCommand::Track { x, .. } => x,
        }
    }

    pub fn heading(&self) -> f64 {
        match *self {
            ActuationCommand::Cruise { heading, .. } | ActuationCommand::Track { heading, .. } => {
                heading
            }
        }
    }
}

/// Simulator-side actuation channel.
pub trait ActuationSink {
    fn move_to(&mut self, vehicle_id: &str, command: ActuationCommand);
}
