//! Scripted traffic for running the tick pipeline without an external
//! simulator.
//!
//! Every scripted vehicle drives at constant speed along its lane center.
//! The ego vehicle is moved only by the actuation commands it publishes.

use crate::common::params::PilotConfig;
use crate::selfdrive::controls::vehicle_state::{lane_index_from_y, lateral_offset};
use crate::selfdrive::interfaces::{
    ActuationCommand, ActuationSink, EgoSnapshot, NeighborSnapshot, RoadNetwork, TelemetryFeed,
    VehicleSnapshot,
};
use std::collections::HashMap;
use tracing::trace;

/// Static data of one road.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedRoad {
    pub lanes: usize,
    pub length: f64,
    pub max_speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedVehicle {
    pub id: String,
    pub road_id: String,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
}

#[derive(Debug, Clone)]
pub struct ScriptedSimulation {
    dt: f64,
    lane_width: f64,
    roads: HashMap<String, ScriptedRoad>,
    ego: Option<ScriptedVehicle>,
    ego_visible: bool,
    vehicles: Vec<ScriptedVehicle>,
    commands: Vec<ActuationCommand>,
}

impl ScriptedSimulation {
    pub fn new(config: &PilotConfig) -> Self {
        ScriptedSimulation {
            dt: config.time_step,
            lane_width: config.lane_width,
            roads: HashMap::new(),
            ego: None,
            ego_visible: true,
            vehicles: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn add_road(&mut self, road_id: &str, lanes: usize, length: f64, max_speed: f64) {
        self.roads.insert(
            road_id.to_string(),
            ScriptedRoad {
                lanes,
                length,
                max_speed,
            },
        );
    }

    /// Center line of `lane_index` on `road_id`; lane 0 is farthest from
    /// the reference edge at y = 0.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::common::params::PilotConfig;
    /// use lanepilot::simulation::ScriptedSimulation;
    ///
    /// let mut sim = ScriptedSimulation::new(&PilotConfig::default());
    /// sim.add_road("E0", 3, 1000.0, 30.0);
    /// assert_eq!(sim.lane_center("E0", 2), Some(-1.6));
    /// ```
    pub fn lane_center(&self, road_id: &str, lane_index: usize) -> Option<f64> {
        let road = self.roads.get(road_id)?;
        Some((lane_index as f64 + 0.5 - road.lanes as f64) * self.lane_width)
    }

    fn place(&self, id: &str, road_id: &str, x: f64, lane_index: usize, speed: f64) -> ScriptedVehicle {
        ScriptedVehicle {
            id: id.to_string(),
            road_id: road_id.to_string(),
            x,
            y: self.lane_center(road_id, lane_index).unwrap_or(0.0),
            speed,
        }
    }

    pub fn spawn_ego(&mut self, id: &str, road_id: &str, x: f64, lane_index: usize, speed: f64) {
        self.ego = Some(self.place(id, road_id, x, lane_index, speed));
    }

    pub fn spawn(&mut self, id: &str, road_id: &str, x: f64, lane_index: usize, speed: f64) {
        let vehicle = self.place(id, road_id, x, lane_index, speed);
        self.vehicles.push(vehicle);
    }

    /// Takes a vehicle off the network.
    pub fn remove(&mut self, id: &str) {
        self.vehicles.retain(|vehicle| vehicle.id != id);
    }

    /// Hides or restores the ego snapshot, as a dropped subscription would.
    pub fn set_ego_visible(&mut self, visible: bool) {
        self.ego_visible = visible;
    }

    /// Moves every scripted vehicle one step forward.
    pub fn advance(&mut self) {
        for vehicle in &mut self.vehicles {
            vehicle.x += vehicle.speed * self.dt;
        }
    }

    pub fn commands(&self) -> &[ActuationCommand] {
        &self.commands
    }

    pub fn ego_vehicle(&self) -> Option<&ScriptedVehicle> {
        self.ego.as_ref()
    }

    pub fn vehicles(&self) -> &[ScriptedVehicle] {
        &self.vehicles
    }

    fn lane_index(&self, vehicle: &ScriptedVehicle) -> Option<(i32, usize)> {
        let lanes = self.roads.get(&vehicle.road_id)?.lanes;
        Some((lane_index_from_y(vehicle.y, lanes, self.lane_width), lanes))
    }
}

impl TelemetryFeed for ScriptedSimulation {
    fn ego(&self, ego_id: &str) -> Option<EgoSnapshot> {
        let ego = self.ego.as_ref().filter(|ego| ego.id == ego_id && self.ego_visible)?;
        Some(EgoSnapshot {
            x: ego.x,
            y: ego.y,
            speed: ego.speed,
            road_id: ego.road_id.clone(),
        })
    }

    fn neighbors(&self, ego_id: &str, radius: f64) -> Option<Vec<NeighborSnapshot>> {
        let ego = self.ego.as_ref().filter(|ego| ego.id == ego_id)?;
        let neighbors = self
            .vehicles
            .iter()
            .filter(|vehicle| (vehicle.x - ego.x).abs() <= radius)
            .filter_map(|vehicle| {
                let (lane_index, lanes) = self.lane_index(vehicle)?;
                Some(NeighborSnapshot {
                    id: vehicle.id.clone(),
                    x: vehicle.x,
                    y: vehicle.y,
                    speed: vehicle.speed,
                    road_id: vehicle.road_id.clone(),
                    lane_index,
                    lane_position: vehicle.x,
                    lane_position_lat: lateral_offset(vehicle.y, lanes, lane_index, self.lane_width),
                })
            })
            .collect();
        Some(neighbors)
    }

    fn vehicle(&self, vehicle_id: &str) -> Option<VehicleSnapshot> {
        self.vehicles
            .iter()
            .find(|vehicle| vehicle.id == vehicle_id)
            .map(|vehicle| VehicleSnapshot {
                x: vehicle.x,
                y: vehicle.y,
                speed: vehicle.speed,
            })
    }
}

impl RoadNetwork for ScriptedSimulation {
    fn lane_count(&self, road_id: &str) -> Option<usize> {
        self.roads.get(road_id).map(|road| road.lanes)
    }

    fn lane_length(&self, road_id: &str, lane_index: usize) -> Option<f64> {
        self.roads
            .get(road_id)
            .filter(|road| lane_index < road.lanes)
            .map(|road| road.length)
    }

    fn max_speed(&self, road_id: &str, lane_index: usize) -> Option<f64> {
        self.roads
            .get(road_id)
            .filter(|road| lane_index < road.lanes)
            .map(|road| road.max_speed)
    }
}

impl ActuationSink for ScriptedSimulation {
    fn move_to(&mut self, vehicle_id: &str, command: ActuationCommand) {
        self.commands.push(command);
        let dt = self.dt;
        match self.ego.as_mut().filter(|ego| ego.id == vehicle_id) {
            Some(ego) => {
                ego.speed = (command.x() - ego.x) / dt;
                ego.x = command.x();
                if let ActuationCommand::Track { y, .. } = command {
                    ego.y = y;
                }
            }
            None => trace!(vehicle = %vehicle_id, "command for unknown vehicle ignored"),
        }
    }
}
