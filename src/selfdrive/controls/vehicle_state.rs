use crate::common::filters::VectorLowpassFilter;
use crate::common::params::PilotConfig;
use crate::selfdrive::controls::lat_control::heading_command;
use crate::selfdrive::interfaces::{EgoSnapshot, RoadNetwork};
use ndarray::{arr1, Array1};
use std::collections::HashMap;
use tracing::{trace, warn};

// Indices into the kinematic vectors
const X: usize = 0;
const Y: usize = 1;

/// Computes the lane index from the lateral coordinate.
///
/// Lanes are numbered so that y decreases away from the reference edge:
/// `lane_count - ceil(-y / lane_width)`.
///
/// # Examples
///
/// ```rust
/// use lanepilot::selfdrive::controls::vehicle_state::lane_index_from_y;
///
/// assert_eq!(lane_index_from_y(-1.6, 3, 3.2), 2);
/// assert_eq!(lane_index_from_y(-8.0, 3, 3.2), 0);
/// ```
pub fn lane_index_from_y(y: f64, lane_count: usize, lane_width: f64) -> i32 {
    lane_count as i32 - (-y / lane_width).ceil() as i32
}

/// Lateral offset of `y` from the center line of `lane_index`.
pub fn lateral_offset(y: f64, lane_count: usize, lane_index: i32, lane_width: f64) -> f64 {
    y - (-(lane_count as f64) + lane_index as f64 + 0.5) * lane_width
}

/// Lane counts per road id, filled lazily from the road network.
#[derive(Debug, Default, Clone)]
pub struct LaneCountCache {
    counts: HashMap<String, usize>,
}

impl LaneCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached count, querying `network` on the first miss.
    /// Unknown roads are not cached so a later query can still succeed.
    pub fn lane_count<R: RoadNetwork + ?Sized>(&mut self, network: &R, road_id: &str) -> Option<usize> {
        if let Some(&count) = self.counts.get(road_id) {
            return Some(count);
        }
        let count = network.lane_count(road_id)?;
        self.counts.insert(road_id.to_string(), count);
        Some(count)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Kinematic state of the ego vehicle.
#[derive(Debug, Clone)]
pub struct EgoState {
    /// Current position [x, y]
    position: Array1<f64>,
    /// Position one tick earlier
    prev_position: Array1<f64>,
    /// Finite-difference velocity [vx, vy]
    velocity: Array1<f64>,
    /// Speed reported by the simulator (not used by the control laws)
    pub reported_speed: f64,
    pub lane_index: i32,
    /// Lane the last completed lane change ended in
    pub prev_lane_index: Option<i32>,
    /// Destination lane of the active lane change
    pub goal_lane_index: Option<i32>,
    /// Offset from the current lane's center line
    pub lateral_offset: f64,
    /// Heading command in degrees, 90 is straight ahead
    pub heading: f64,
    pub road_id: String,
    pub lane_count: usize,
}

impl EgoState {
    pub fn new() -> Self {
        EgoState {
            position: Array1::zeros(2),
            prev_position: Array1::zeros(2),
            velocity: Array1::zeros(2),
            reported_speed: 0.0,
            lane_index: -1,
            prev_lane_index: None,
            goal_lane_index: None,
            lateral_offset: 0.0,
            heading: 90.0,
            road_id: String::new(),
            lane_count: 0,
        }
    }

    /// Builds a state at a fixed kinematic point, for planner inputs that do
    /// not come from the estimator.
    pub fn at(x: f64, y: f64, vx: f64, lane_index: i32) -> Self {
        let mut state = Self::new();
        state.position = arr1(&[x, y]);
        state.prev_position = state.position.clone();
        state.velocity = arr1(&[vx, 0.0]);
        state.lane_index = lane_index;
        state
    }

    pub fn x(&self) -> f64 {
        self.position[X]
    }

    pub fn y(&self) -> f64 {
        self.position[Y]
    }

    pub fn prev_x(&self) -> f64 {
        self.prev_position[X]
    }

    pub fn prev_y(&self) -> f64 {
        self.prev_position[Y]
    }

    pub fn vx(&self) -> f64 {
        self.velocity[X]
    }

    pub fn vy(&self) -> f64 {
        self.velocity[Y]
    }

    pub fn set_velocity(&mut self, vx: f64, vy: f64) {
        self.velocity = arr1(&[vx, vy]);
    }

    pub fn set_lateral(&mut self, y: f64, lane_index: i32, lateral_offset: f64) {
        self.position[Y] = y;
        self.lane_index = lane_index;
        self.lateral_offset = lateral_offset;
    }
}

impl Default for EgoState {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives [`EgoState`] from consecutive position snapshots.
///
/// The only component carrying state across ticks (the previous position).
#[derive(Debug, Clone)]
pub struct StateEstimator {
    state: EgoState,
    dt: f64,
    lane_width: f64,
    filter: Option<VectorLowpassFilter>,
    initted: bool,
}

impl StateEstimator {
    pub fn new(config: &PilotConfig) -> Self {
        StateEstimator {
            state: EgoState::new(),
            dt: config.time_step,
            lane_width: config.lane_width,
            filter: config
                .velocity_filter_hz
                .map(|fc| VectorLowpassFilter::new(fc, config.time_step)),
            initted: false,
        }
    }

    pub fn state(&self) -> &EgoState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut EgoState {
        &mut self.state
    }

    /// Updates the state from this tick's snapshot.
    ///
    /// Returns `false` and leaves the state untouched when the snapshot is
    /// missing. The first snapshot seeds the previous position, so the
    /// initial velocity is zero rather than a jump from the origin.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::common::params::PilotConfig;
    /// use lanepilot::selfdrive::controls::vehicle_state::{LaneCountCache, StateEstimator};
    /// use lanepilot::selfdrive::interfaces::{EgoSnapshot, RoadNetwork};
    ///
    /// struct ThreeLanes;
    /// impl RoadNetwork for ThreeLanes {
    ///     fn lane_count(&self, _: &str) -> Option<usize> { Some(3) }
    ///     fn lane_length(&self, _: &str, _: usize) -> Option<f64> { None }
    ///     fn max_speed(&self, _: &str, _: usize) -> Option<f64> { None }
    /// }
    ///
    /// let mut estimator = StateEstimator::new(&PilotConfig::default());
    /// let mut lanes = LaneCountCache::new();
    /// let snap = |x: f64| EgoSnapshot { x, y: -4.8, speed: 20.0, road_id: "E0".into() };
    /// estimator.update(Some(&snap(100.0)), &ThreeLanes, &mut lanes);
    /// estimator.update(Some(&snap(100.2)), &ThreeLanes, &mut lanes);
    /// assert!((estimator.state().vx() - 20.0).abs() < 1e-9);
    /// assert_eq!(estimator.state().lane_index, 1);
    /// ```
    pub fn update<R: RoadNetwork + ?Sized>(
        &mut self,
        snapshot: Option<&EgoSnapshot>,
        network: &R,
        lanes: &mut LaneCountCache,
    ) -> bool {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                trace!("ego telemetry missing, keeping previous state");
                return false;
            }
        };

        let position = arr1(&[snapshot.x, snapshot.y]);
        if self.initted {
            self.state.prev_position = std::mem::replace(&mut self.state.position, position);
        } else {
            self.state.prev_position = position.clone();
            self.state.position = position;
        }

        let raw_velocity = (&self.state.position - &self.state.prev_position) / self.dt;
        self.state.velocity = match self.filter.as_mut() {
            Some(filter) => filter.apply(&raw_velocity),
            None => raw_velocity,
        };
        self.state.reported_speed = snapshot.speed;

        if !self.initted || self.state.road_id != snapshot.road_id {
            self.state.road_id = snapshot.road_id.clone();
            match lanes.lane_count(network, &snapshot.road_id) {
                Some(count) => self.state.lane_count = count,
                None => warn!(
                    road_id = %snapshot.road_id,
                    "lane count unknown, keeping {}", self.state.lane_count
                ),
            }
        }

        self.state.lane_index =
            lane_index_from_y(self.state.y(), self.state.lane_count, self.lane_width);
        self.state.lateral_offset = lateral_offset(
            self.state.y(),
            self.state.lane_count,
            self.state.lane_index,
            self.lane_width,
        );
        self.state.heading = heading_command(self.state.vx(), self.state.vy());
        self.initted = true;
        true
    }
}
