use crate::common::params::{GapBand, PilotConfig};
use crate::selfdrive::controls::neighbors::{LaneBuckets, NeighborRecord, Point};
use crate::selfdrive::controls::vehicle_state::EgoState;
use crate::selfdrive::interfaces::{TelemetryFeed, VehicleSnapshot};
use tracing::{debug, warn};

/// A vehicle the planner can reason about: either a real neighbor or a
/// synthesized stand-in with no identity.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleRef {
    Real(NeighborRecord),
    Virtual(VirtualVehicle),
}

/// Synthesized vehicle, extrapolated by dead reckoning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualVehicle {
    pub position: Point,
    pub relative: Point,
    pub speed: f64,
}

impl VehicleRef {
    /// Creates a virtual vehicle at `position`, relative to `ego`.
    pub fn synthesize(position: Point, speed: f64, ego: Point) -> Self {
        VehicleRef::Virtual(VirtualVehicle {
            position,
            relative: position.relative_to(ego),
            speed,
        })
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, VehicleRef::Virtual(_))
    }

    /// Identity of a real vehicle.
    pub fn id(&self) -> Option<&str> {
        match self {
            VehicleRef::Real(record) => Some(&record.id),
            VehicleRef::Virtual(_) => None,
        }
    }

    pub fn position(&self) -> Point {
        match self {
            VehicleRef::Real(record) => record.position,
            VehicleRef::Virtual(vehicle) => vehicle.position,
        }
    }

    pub fn relative(&self) -> Point {
        match self {
            VehicleRef::Real(record) => record.relative,
            VehicleRef::Virtual(vehicle) => vehicle.relative,
        }
    }

    pub fn speed(&self) -> f64 {
        match self {
            VehicleRef::Real(record) => record.speed,
            VehicleRef::Virtual(vehicle) => vehicle.speed,
        }
    }

    pub fn x(&self) -> f64 {
        self.position().x
    }

    /// Advances the position by `speed * dt`.
    pub fn dead_reckon(&mut self, dt: f64) {
        match self {
            VehicleRef::Real(record) => record.position.x += record.speed * dt,
            VehicleRef::Virtual(vehicle) => vehicle.position.x += vehicle.speed * dt,
        }
    }

    /// Overwrites position and speed with fresh telemetry.
    pub fn observe(&mut self, snapshot: &VehicleSnapshot) {
        let position = Point::new(snapshot.x, snapshot.y);
        match self {
            VehicleRef::Real(record) => {
                record.position = position;
                record.speed = snapshot.speed;
            }
            VehicleRef::Virtual(vehicle) => {
                vehicle.position = position;
                vehicle.speed = snapshot.speed;
            }
        }
    }

    pub fn refresh_relative(&mut self, ego: Point) {
        match self {
            VehicleRef::Real(record) => record.relative = record.position.relative_to(ego),
            VehicleRef::Virtual(vehicle) => vehicle.relative = vehicle.position.relative_to(ego),
        }
    }

    /// Drops the identity, keeping the last known kinematics.
    pub fn into_virtual(self) -> VehicleRef {
        match self {
            VehicleRef::Real(record) => VehicleRef::Virtual(VirtualVehicle {
                position: record.position,
                relative: record.relative,
                speed: record.speed,
            }),
            virtual_vehicle => virtual_vehicle,
        }
    }
}

/// Destination-lane code carried by a gap vehicle.
///
/// Codes follow the mission-selection layer: `0` right (goal lane index + 1,
/// gap vehicle at larger y), `1` the ego lane, `2` left (goal lane index − 1,
/// gap vehicle at smaller y).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneCode {
    Right = 0,
    Mid = 1,
    Left = 2,
}

impl LaneCode {
    pub fn from_code(code: u8) -> Option<LaneCode> {
        match code {
            0 => Some(LaneCode::Right),
            1 => Some(LaneCode::Mid),
            2 => Some(LaneCode::Left),
            _ => None,
        }
    }

    /// Goal lane index for a lane change starting in `current_lane`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::selfdrive::controls::radar_helpers::LaneCode;
    ///
    /// assert_eq!(LaneCode::Right.goal_lane(1), 2);
    /// assert_eq!(LaneCode::Mid.goal_lane(1), 1);
    /// assert_eq!(LaneCode::Left.goal_lane(1), 0);
    /// ```
    pub fn goal_lane(&self, current_lane: i32) -> i32 {
        current_lane + self.lateral_sign() as i32
    }

    /// Sign of `gap.y - ego.y` for a vehicle in the destination lane.
    pub fn lateral_sign(&self) -> f64 {
        match self {
            LaneCode::Right => 1.0,
            LaneCode::Mid => 0.0,
            LaneCode::Left => -1.0,
        }
    }
}

/// A gap vehicle as named by the mission-selection layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GapRequest {
    pub id: Option<String>,
    pub is_virtual: bool,
    pub lane_code: LaneCode,
}

impl GapRequest {
    pub fn real(id: &str, lane_code: LaneCode) -> Self {
        GapRequest {
            id: Some(id.to_string()),
            is_virtual: false,
            lane_code,
        }
    }

    pub fn synthetic(lane_code: LaneCode) -> Self {
        GapRequest {
            id: None,
            is_virtual: true,
            lane_code,
        }
    }
}

/// Which side of the target gap a vehicle bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapSlot {
    Front,
    Rear,
}

/// What happened to a gap vehicle during one refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapUpdate {
    /// Fresh telemetry inside the lateral band.
    Observed,
    /// Extrapolated from the last known speed.
    DeadReckoned,
    /// Telemetry vanished; now virtual for good.
    Lost,
    /// Destination lane collapsed onto the ego lane; replaced by the current
    /// leader or follower.
    Replaced,
}

/// A tracked gap vehicle and its destination-lane code.
#[derive(Debug, Clone, PartialEq)]
pub struct GapTrack {
    pub vehicle: VehicleRef,
    pub lane_code: LaneCode,
}

impl GapTrack {
    /// Re-validates the gap vehicle against this tick's telemetry.
    ///
    /// # Arguments
    ///
    /// * `feed` - Telemetry, queried by identity for real vehicles.
    /// * `ego` - Ego position this tick.
    /// * `replacement` - Current leader (front slot) or follower (rear slot).
    /// * `band` - Lateral validity band.
    /// * `dt` - Time step for dead reckoning.
    pub fn refresh<F: TelemetryFeed + ?Sized>(
        &mut self,
        feed: &F,
        ego: Point,
        replacement: &VehicleRef,
        band: &GapBand,
        dt: f64,
    ) -> GapUpdate {
        let observed = match &self.vehicle {
            VehicleRef::Virtual(_) => None,
            VehicleRef::Real(record) => Some((record.id.clone(), feed.vehicle(&record.id))),
        };

        let update = match observed {
            None => {
                self.vehicle.dead_reckon(dt);
                GapUpdate::DeadReckoned
            }
            Some((id, None)) => {
                warn!(vehicle = %id, "gap vehicle left the network, dead reckoning from now on");
                self.vehicle = self.vehicle.clone().into_virtual();
                self.vehicle.dead_reckon(dt);
                GapUpdate::Lost
            }
            Some((_, Some(_))) if self.lane_code == LaneCode::Mid => {
                self.vehicle = replacement.clone();
                GapUpdate::Replaced
            }
            Some((id, Some(snapshot))) => {
                let lateral = (snapshot.y - ego.y) * self.lane_code.lateral_sign();
                if band.contains(lateral) {
                    self.vehicle.observe(&snapshot);
                    GapUpdate::Observed
                } else {
                    debug!(vehicle = %id, lateral, "gap vehicle outside lane band, dead reckoning");
                    self.vehicle.dead_reckon(dt);
                    GapUpdate::DeadReckoned
                }
            }
        };

        self.vehicle.refresh_relative(ego);
        update
    }
}

/// Front and rear vehicles bounding the target gap.
#[derive(Debug, Clone, PartialEq)]
pub struct GapPair {
    pub front: GapTrack,
    pub rear: GapTrack,
}

impl GapPair {
    /// Mean relative longitudinal offset of the two gap vehicles.
    pub fn mean_offset(&self) -> f64 {
        0.5 * (self.front.vehicle.relative().x + self.rear.vehicle.relative().x)
    }
}

/// Vehicles the control laws refer to during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    pub leading: VehicleRef,
    pub following: VehicleRef,
    pub gaps: Option<GapPair>,
}

/// Selects the leading, following and gap vehicles each tick.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    targets: Targets,
    dt: f64,
    sensing_radius: f64,
    virtual_speed: f64,
    lane_width: f64,
    band: GapBand,
}

impl TargetSelector {
    pub fn new(config: &PilotConfig) -> Self {
        let origin = Point::default();
        TargetSelector {
            targets: Targets {
                leading: VehicleRef::synthesize(
                    Point::new(config.sensing_radius, 0.0),
                    config.virtual_speed,
                    origin,
                ),
                following: VehicleRef::synthesize(
                    Point::new(-config.sensing_radius, 0.0),
                    config.virtual_speed,
                    origin,
                ),
                gaps: None,
            },
            dt: config.time_step,
            sensing_radius: config.sensing_radius,
            virtual_speed: config.virtual_speed,
            lane_width: config.lane_width,
            band: config.gap_band,
        }
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Nearest mid-lane leader, or a virtual one a sensing radius ahead.
    pub fn select_leading(&self, buckets: &LaneBuckets, ego: Point) -> VehicleRef {
        self.select(buckets.mid.leaders.first(), ego, self.sensing_radius)
    }

    /// Nearest mid-lane follower, or a virtual one a sensing radius behind.
    pub fn select_following(&self, buckets: &LaneBuckets, ego: Point) -> VehicleRef {
        self.select(buckets.mid.followers.first(), ego, -self.sensing_radius)
    }

    fn select(&self, nearest: Option<&NeighborRecord>, ego: Point, virtual_offset: f64) -> VehicleRef {
        match nearest {
            Some(record) => {
                let mut vehicle = VehicleRef::Real(record.clone());
                vehicle.refresh_relative(ego);
                vehicle
            }
            None => VehicleRef::synthesize(
                Point::new(ego.x + virtual_offset, ego.y),
                self.virtual_speed,
                ego,
            ),
        }
    }

    /// Runs the selector for one tick. Gap vehicles are only re-validated
    /// when `track_gaps` is set (a lane change is in progress).
    pub fn update<F: TelemetryFeed + ?Sized>(
        &mut self,
        buckets: &LaneBuckets,
        ego: &EgoState,
        feed: &F,
        track_gaps: bool,
    ) -> Option<(GapUpdate, GapUpdate)> {
        let ego_point = Point::new(ego.x(), ego.y());
        self.targets.leading = self.select_leading(buckets, ego_point);
        self.targets.following = self.select_following(buckets, ego_point);

        if !track_gaps {
            return None;
        }
        let (leading, following) = (&self.targets.leading, &self.targets.following);
        let (band, dt) = (self.band, self.dt);
        self.targets.gaps.as_mut().map(|gaps| {
            (
                gaps.front.refresh(feed, ego_point, leading, &band, dt),
                gaps.rear.refresh(feed, ego_point, following, &band, dt),
            )
        })
    }

    /// Turns a gap request into a tracked vehicle.
    ///
    /// Real vehicles are taken from this tick's buckets when present, or
    /// looked up by identity. A virtual request, or a real vehicle with no
    /// telemetry, becomes a virtual vehicle a sensing radius ahead (front) or
    /// behind (rear) in the destination lane.
    pub fn resolve_gap<F: TelemetryFeed + ?Sized>(
        &self,
        request: &GapRequest,
        slot: GapSlot,
        buckets: &LaneBuckets,
        ego: &EgoState,
        feed: &F,
    ) -> GapTrack {
        let ego_point = Point::new(ego.x(), ego.y());
        let real = match (&request.id, request.is_virtual) {
            (Some(id), false) => self.lookup_real(id, buckets, ego, feed),
            _ => None,
        };

        let vehicle = match real {
            Some(mut vehicle) => {
                vehicle.refresh_relative(ego_point);
                vehicle
            }
            None => {
                if !request.is_virtual {
                    warn!(vehicle = ?request.id, ?slot, "requested gap vehicle not found, using a virtual one");
                }
                let offset = match slot {
                    GapSlot::Front => self.sensing_radius,
                    GapSlot::Rear => -self.sensing_radius,
                };
                let position = Point::new(
                    ego_point.x + offset,
                    ego_point.y + request.lane_code.lateral_sign() * self.lane_width,
                );
                VehicleRef::synthesize(position, self.virtual_speed, ego_point)
            }
        };

        GapTrack {
            vehicle,
            lane_code: request.lane_code,
        }
    }

    fn lookup_real<F: TelemetryFeed + ?Sized>(
        &self,
        id: &str,
        buckets: &LaneBuckets,
        ego: &EgoState,
        feed: &F,
    ) -> Option<VehicleRef> {
        let known = [&buckets.left, &buckets.mid, &buckets.right]
            .into_iter()
            .flat_map(|bucket| bucket.leaders.iter().chain(bucket.followers.iter()))
            .find(|record| record.id == id)
            .cloned();

        match (known, feed.vehicle(id)) {
            (Some(record), snapshot) => {
                let mut vehicle = VehicleRef::Real(record);
                if let Some(snapshot) = snapshot {
                    vehicle.observe(&snapshot);
                }
                Some(vehicle)
            }
            (None, Some(snapshot)) => Some(VehicleRef::Real(NeighborRecord {
                id: id.to_string(),
                position: Point::new(snapshot.x, snapshot.y),
                relative: Point::default(),
                speed: snapshot.speed,
                road_id: ego.road_id.clone(),
                lane_index: -1,
                lane_count: ego.lane_count,
                lane_position: snapshot.x,
                lane_position_lat: 0.0,
            })),
            (None, None) => None,
        }
    }

    pub fn set_gaps(&mut self, gaps: GapPair) {
        self.targets.gaps = Some(gaps);
    }

    pub fn clear_gaps(&mut self) {
        self.targets.gaps = None;
    }
}
