//! Maneuver planner: a mission queue driving the longitudinal and lateral
//! speed commands of the ego vehicle.

use crate::common::params::PilotConfig;
use crate::selfdrive::controls::drive_helpers::{
    approach_accel, approach_complete, hold_accel, hold_complete, post_align_accel,
    post_align_complete, pre_align_accel, pre_align_complete,
};
use crate::selfdrive::controls::lat_control::{
    lane_traverse_complete, lane_traverse_speed, STRAIGHT_HEADING,
};
use crate::selfdrive::controls::mission::{
    lane_change_missions, lane_keep_missions, Maneuver, Mission, MissionQueue, Phase,
    PlannerState, Setpoint,
};
use crate::selfdrive::controls::radar_helpers::{GapPair, Targets, VehicleRef};
use crate::selfdrive::controls::vehicle_state::EgoState;
use crate::selfdrive::interfaces::ActuationCommand;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pre-align holds the speed command while the gap-front vehicle is closer
/// than this and clearly slower to pull away.
pub const STALL_GAP: f64 = 10.0;
pub const STALL_SPEED_RATIO: f64 = 0.7;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlannerError {
    #[error("cannot plan {requested} while the planner is in {state}")]
    InvalidManeuverRequest {
        requested: Maneuver,
        state: PlannerState,
    },
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Speed and acceleration commands carried across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    pub vx: f64,
    pub vy: f64,
    pub ax: f64,
    pub ay: f64,
}

/// Mission-based state machine for lane keeping and lane changing.
///
/// # Examples
///
/// ```rust
/// use lanepilot::common::params::PilotConfig;
/// use lanepilot::selfdrive::controls::mission::PlannerState;
/// use lanepilot::selfdrive::controls::neighbors::Point;
/// use lanepilot::selfdrive::controls::planner::ManeuverPlanner;
/// use lanepilot::selfdrive::controls::radar_helpers::VehicleRef;
/// use lanepilot::selfdrive::controls::vehicle_state::EgoState;
///
/// let mut planner = ManeuverPlanner::new(&PilotConfig::default());
/// let ego = EgoState::at(0.0, -4.8, 20.0, 1);
/// let leader = VehicleRef::synthesize(Point::new(200.0, -4.8), 33.3, Point::new(0.0, -4.8));
///
/// planner.plan_lane_keep(&ego, &leader).unwrap();
/// assert_eq!(planner.state(), PlannerState::LaneKeep);
/// assert!(planner.plan_lane_keep(&ego, &leader).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ManeuverPlanner {
    queue: MissionQueue,
    state: PlannerState,
    control: ControlState,
    dt: f64,
    lane_width: f64,
}

impl ManeuverPlanner {
    pub fn new(config: &PilotConfig) -> Self {
        ManeuverPlanner {
            queue: MissionQueue::new(),
            state: PlannerState::Idle,
            control: ControlState {
                vx: config.free_drive_speed,
                ..ControlState::default()
            },
            dt: config.time_step,
            lane_width: config.lane_width,
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn active_phase(&self) -> Option<Phase> {
        self.queue.front().map(|mission| mission.phase)
    }

    pub fn active_mission(&self) -> Option<&Mission> {
        self.queue.front()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    fn ensure_idle(&self, requested: Maneuver) -> Result<()> {
        if self.state == PlannerState::Idle && self.queue.is_empty() {
            return Ok(());
        }
        warn!(%requested, state = %self.state, phase = ?self.active_phase(), "maneuver request rejected");
        Err(PlannerError::InvalidManeuverRequest {
            requested,
            state: self.state,
        })
    }

    /// Queues pre-align, lane-traverse and post-align missions towards the
    /// lane named by the gap-front vehicle's lane code.
    ///
    /// The gap vehicles' relative positions must be current.
    pub fn plan_lane_change(&mut self, ego: &mut EgoState, gaps: &GapPair) -> Result<()> {
        self.ensure_idle(Maneuver::LaneChange)?;

        let mut missions = lane_change_missions();
        let accel = pre_align_accel(
            gaps.rear.vehicle.relative().x,
            gaps.front.vehicle.relative().x,
        );
        if let Some(pre_align) = missions.front_mut() {
            pre_align.set_longitudinal_accel(accel);
        }

        let goal = gaps.front.lane_code.goal_lane(ego.lane_index);
        ego.goal_lane_index = Some(goal);
        self.queue = missions;
        self.state = PlannerState::LaneChange;
        info!(
            lane = ego.lane_index,
            goal,
            mean_offset = gaps.mean_offset(),
            accel,
            "lane change planned"
        );
        Ok(())
    }

    /// Queues approach and hold missions behind `leading`.
    pub fn plan_lane_keep(&mut self, ego: &EgoState, leading: &VehicleRef) -> Result<()> {
        self.ensure_idle(Maneuver::LaneKeep)?;

        let mut missions = lane_keep_missions();
        if let Some(approach) = missions.front_mut() {
            approach.set_longitudinal_accel(approach_law(ego, leading));
        }
        self.queue = missions;
        self.state = PlannerState::LaneKeep;
        info!(
            leader = ?leading.id(),
            distance = leading.x() - ego.x(),
            "lane keep planned"
        );
        Ok(())
    }

    /// Runs the queue head for one tick and returns the actuation target.
    ///
    /// A completed phase is popped and its successor is set up and integrated
    /// in the same tick. When the last phase completes the speed command is
    /// handed back to the measured speed and the planner returns to idle.
    pub fn step(&mut self, ego: &mut EgoState, targets: &Targets) -> ActuationCommand {
        let phase = match self.active_phase() {
            Some(phase) => phase,
            None => {
                return ActuationCommand::Cruise {
                    x: ego.x() + self.dt * self.control.vx,
                    heading: STRAIGHT_HEADING,
                }
            }
        };

        if self.is_complete(phase, ego, targets) {
            self.queue.pop_front();
            match self.queue.front_mut() {
                Some(next) => {
                    setup(next, ego, targets, self.lane_width);
                    info!(completed = %phase, next = %next.phase, "phase complete");
                    self.integrate(ego, targets);
                }
                None => self.hand_back(ego, phase),
            }
        } else {
            self.integrate(ego, targets);
        }

        debug!(
            vx = self.control.vx,
            vy = self.control.vy,
            ax = self.control.ax,
            ay = self.control.ay,
            "control"
        );
        ActuationCommand::Track {
            x: ego.x() + self.dt * self.control.vx,
            y: ego.y() + self.dt * self.control.vy,
            heading: ego.heading,
        }
    }

    fn is_complete(&mut self, phase: Phase, ego: &mut EgoState, targets: &Targets) -> bool {
        let front = gap_front(targets);
        let rear = gap_rear(targets);
        match phase {
            Phase::PreAlign => pre_align_complete(rear.x(), ego.x(), front.x()),
            Phase::LaneTraverse => {
                let goal = ego.goal_lane_index.unwrap_or(ego.lane_index);
                let done = lane_traverse_complete(ego.lane_index, goal, ego.lateral_offset);
                if done {
                    ego.prev_lane_index = Some(ego.lane_index);
                    self.control.vy = 0.0;
                }
                done
            }
            Phase::PostAlign => post_align_complete(front.speed(), ego.vx()),
            Phase::Approach => approach_complete(targets.leading.x() - ego.x(), targets.leading.speed()),
            Phase::Hold => hold_complete(targets.leading.speed() - ego.vx()),
        }
    }

    fn integrate(&mut self, ego: &EgoState, targets: &Targets) {
        let mission = match self.queue.front_mut() {
            Some(mission) => mission,
            None => return,
        };
        if mission.phase == Phase::Approach {
            mission.set_longitudinal_accel(approach_law(ego, &targets.leading));
        }
        let mission = *mission;

        self.control.ax = mission.longitudinal.accel();
        self.control.ay = mission.lateral.accel();

        let front = gap_front(targets);
        self.control.vx = match (mission.phase, mission.longitudinal) {
            (Phase::PreAlign, Setpoint::Derived { .. })
                if front.relative().x < STALL_GAP && ego.vx() < STALL_SPEED_RATIO * front.speed() =>
            {
                self.control.vx
            }
            (Phase::Approach, Setpoint::Derived { .. }) if ego.vx() < 0.0 => 0.0,
            (_, setpoint) => setpoint.advance(self.control.vx, self.dt),
        };
        self.control.vy = mission.lateral.advance(self.control.vy, self.dt);
    }

    fn hand_back(&mut self, ego: &mut EgoState, completed: Phase) {
        self.control = ControlState {
            vx: ego.vx(),
            ..ControlState::default()
        };
        let finished = self.state;
        self.state = PlannerState::Idle;
        if finished == PlannerState::LaneChange {
            ego.goal_lane_index = None;
        }
        info!(maneuver = %finished, last = %completed, vx = ego.vx(), "maneuver complete");
    }
}

/// Leader of the target gap; the current leader stands in when no gap is
/// tracked.
fn gap_front(targets: &Targets) -> &VehicleRef {
    targets
        .gaps
        .as_ref()
        .map(|gaps| &gaps.front.vehicle)
        .unwrap_or(&targets.leading)
}

fn gap_rear(targets: &Targets) -> &VehicleRef {
    targets
        .gaps
        .as_ref()
        .map(|gaps| &gaps.rear.vehicle)
        .unwrap_or(&targets.following)
}

fn approach_law(ego: &EgoState, leading: &VehicleRef) -> f64 {
    approach_accel(
        leading.x() - ego.x(),
        leading.speed(),
        leading.speed() - ego.vx(),
    )
    .unwrap_or(0.0)
}

/// Prepares a mission that just became the queue head.
fn setup(mission: &mut Mission, ego: &EgoState, targets: &Targets, lane_width: f64) {
    match mission.phase {
        Phase::LaneTraverse => {
            let goal = ego.goal_lane_index.unwrap_or(ego.lane_index);
            mission.lateral = Setpoint::Explicit {
                target: lane_traverse_speed(ego.vx(), lane_width, ego.lane_index, goal),
                accel: 0.0,
            };
        }
        Phase::PostAlign => {
            let front = gap_front(targets);
            let accel = post_align_accel(front.x() - ego.x(), front.speed() - ego.vx());
            mission.set_longitudinal_accel(accel.unwrap_or(0.0));
        }
        Phase::Approach => mission.set_longitudinal_accel(approach_law(ego, &targets.leading)),
        Phase::Hold => mission.set_longitudinal_accel(hold_accel(targets.leading.speed() - ego.vx())),
        Phase::PreAlign => {
            if let Some(gaps) = &targets.gaps {
                mission.set_longitudinal_accel(pre_align_accel(
                    gaps.rear.vehicle.relative().x,
                    gaps.front.vehicle.relative().x,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfdrive::controls::neighbors::Point;
    use crate::selfdrive::controls::radar_helpers::{GapTrack, LaneCode};
    use approx::assert_abs_diff_eq;

    fn config() -> PilotConfig {
        PilotConfig::default()
    }

    fn ego(x: f64, vx: f64) -> EgoState {
        let mut ego = EgoState::at(x, -4.8, vx, 1);
        ego.lane_count = 3;
        ego
    }

    fn vehicle(x: f64, y: f64, speed: f64, ego: &EgoState) -> VehicleRef {
        VehicleRef::synthesize(Point::new(x, y), speed, Point::new(ego.x(), ego.y()))
    }

    fn gaps(front_x: f64, rear_x: f64, speed: f64, code: LaneCode, ego: &EgoState) -> GapPair {
        GapPair {
            front: GapTrack {
                vehicle: vehicle(front_x, -1.6, speed, ego),
                lane_code: code,
            },
            rear: GapTrack {
                vehicle: vehicle(rear_x, -1.6, speed, ego),
                lane_code: code,
            },
        }
    }

    fn targets(leading: VehicleRef, following: VehicleRef, gaps: Option<GapPair>) -> Targets {
        Targets {
            leading,
            following,
            gaps,
        }
    }

    fn assert_queue_matches_state(planner: &ManeuverPlanner) {
        assert_eq!(
            planner.queue_len() == 0,
            planner.state() == PlannerState::Idle,
            "queue length {} with state {}",
            planner.queue_len(),
            planner.state()
        );
    }

    #[test]
    fn test_idle_cruises_at_free_drive_speed() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 0.0);
        let t = targets(vehicle(300.0, -4.8, 33.3, &ego), vehicle(-100.0, -4.8, 33.3, &ego), None);
        match planner.step(&mut ego, &t) {
            ActuationCommand::Cruise { x, heading } => {
                assert_abs_diff_eq!(x, 100.08, epsilon = 1e-9);
                assert_eq!(heading, 90.0);
            }
            other => panic!("expected a cruise command, got {:?}", other),
        }
        assert_queue_matches_state(&planner);
    }

    #[test]
    fn test_plan_lane_change_scenario() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 20.0);
        let pair = gaps(250.0, 50.0, 20.0, LaneCode::Right, &ego);

        planner.plan_lane_change(&mut ego, &pair).unwrap();
        assert_eq!(ego.goal_lane_index, Some(2));
        assert_eq!(planner.queue_len(), 3);
        assert_eq!(planner.state(), PlannerState::LaneChange);
        assert_eq!(planner.active_phase(), Some(Phase::PreAlign));
        // mean offset 50 -> +4.0
        assert_eq!(planner.active_mission().unwrap().longitudinal.accel(), 4.0);
    }

    #[test]
    fn test_goal_lane_follows_code() {
        for (code, goal) in [(LaneCode::Right, 2), (LaneCode::Mid, 1), (LaneCode::Left, 0)] {
            let mut planner = ManeuverPlanner::new(&config());
            let mut ego = ego(100.0, 20.0);
            let pair = gaps(250.0, 50.0, 20.0, code, &ego);
            planner.plan_lane_change(&mut ego, &pair).unwrap();
            assert_eq!(ego.goal_lane_index, Some(goal));
        }
    }

    #[test]
    fn test_rejects_request_while_busy() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 20.0);
        let pair = gaps(250.0, 50.0, 20.0, LaneCode::Right, &ego);
        let leader = vehicle(300.0, -4.8, 33.3, &ego);

        planner.plan_lane_change(&mut ego, &pair).unwrap();
        let err = planner.plan_lane_keep(&ego, &leader).unwrap_err();
        assert_eq!(
            err,
            PlannerError::InvalidManeuverRequest {
                requested: Maneuver::LaneKeep,
                state: PlannerState::LaneChange,
            }
        );
        assert_eq!(
            err.to_string(),
            "cannot plan lane-keep while the planner is in lane-change"
        );
        assert!(planner.plan_lane_change(&mut ego, &pair).is_err());
        // The running maneuver is untouched.
        assert_eq!(planner.queue_len(), 3);
        assert_eq!(planner.state(), PlannerState::LaneChange);
        assert_eq!(ego.goal_lane_index, Some(2));
    }

    #[test]
    fn test_pre_align_integrates_accel() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 20.0);
        // Gap well ahead: mean offset 150 -> +8.0, ego not inside yet.
        let pair = gaps(350.0, 150.0, 20.0, LaneCode::Right, &ego);
        planner.plan_lane_change(&mut ego, &pair).unwrap();

        let t = targets(vehicle(300.0, -4.8, 33.3, &ego), vehicle(-100.0, -4.8, 33.3, &ego), Some(pair));
        let command = planner.step(&mut ego, &t);
        assert_abs_diff_eq!(planner.control().vx, 8.0 + 0.08, epsilon = 1e-12);
        assert_eq!(planner.control().ax, 8.0);
        assert_eq!(planner.active_phase(), Some(Phase::PreAlign));
        match command {
            ActuationCommand::Track { x, y, heading } => {
                assert_abs_diff_eq!(x, 100.0 + 0.01 * 8.08, epsilon = 1e-12);
                assert_eq!(y, -4.8);
                assert_eq!(heading, 90.0);
            }
            other => panic!("expected a tracking command, got {:?}", other),
        }
    }

    #[test]
    fn test_pre_align_stall_guard_holds_speed() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 5.0);
        // Gap front only 5 ahead and much faster than the ego vehicle.
        let pair = gaps(105.0, -50.0, 20.0, LaneCode::Right, &ego);
        planner.plan_lane_change(&mut ego, &pair).unwrap();

        let t = targets(vehicle(300.0, -4.8, 33.3, &ego), vehicle(-100.0, -4.8, 33.3, &ego), Some(pair));
        planner.step(&mut ego, &t);
        assert_eq!(planner.control().vx, 8.0);
    }

    #[test]
    fn test_lane_change_phases_are_monotone() {
        let cfg = config();
        let mut planner = ManeuverPlanner::new(&cfg);
        let mut ego = ego(100.0, 20.0);
        let pair = gaps(250.0, 50.0, 24.0, LaneCode::Right, &ego);
        planner.plan_lane_change(&mut ego, &pair).unwrap();
        let t = targets(vehicle(300.0, -4.8, 33.3, &ego), vehicle(-100.0, -4.8, 33.3, &ego), Some(pair));

        // Inside the gap: pre-align completes, lane traverse is set up.
        planner.step(&mut ego, &t);
        assert_eq!(planner.active_phase(), Some(Phase::LaneTraverse));
        let vy = planner.control().vy;
        assert_abs_diff_eq!(vy, 3.2 / (20.0 / 60.0 + 3.0), epsilon = 1e-12);
        assert_eq!(planner.queue_len(), 2);

        // Not centered in the goal lane yet: keep traversing.
        planner.step(&mut ego, &t);
        assert_eq!(planner.active_phase(), Some(Phase::LaneTraverse));
        assert_eq!(planner.control().vy, vy);

        // Centered in lane 2.
        ego.set_lateral(-1.6, 2, 0.0);
        planner.step(&mut ego, &t);
        assert_eq!(planner.active_phase(), Some(Phase::PostAlign));
        assert_eq!(ego.prev_lane_index, Some(2));
        assert_eq!(planner.control().vy, 0.0);

        for _ in 0..5 {
            planner.step(&mut ego, &t);
            assert_ne!(planner.active_phase(), Some(Phase::PreAlign));
            assert_ne!(planner.active_phase(), Some(Phase::LaneTraverse));
        }
        assert_queue_matches_state(&planner);
    }

    #[test]
    fn test_post_align_hands_back_to_measured_speed() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(100.0, 20.0);
        let pair = gaps(250.0, 50.0, 20.5, LaneCode::Right, &ego);
        planner.plan_lane_change(&mut ego, &pair).unwrap();
        let t = targets(vehicle(300.0, -4.8, 33.3, &ego), vehicle(-100.0, -4.8, 33.3, &ego), Some(pair));

        planner.step(&mut ego, &t); // -> lane traverse
        ego.set_lateral(-1.6, 2, 0.02);
        planner.step(&mut ego, &t); // -> post-align, leader within 1.0 of ego
        assert_eq!(planner.active_phase(), Some(Phase::PostAlign));

        ego.set_velocity(20.3, 0.0);
        let command = planner.step(&mut ego, &t);
        assert_eq!(planner.state(), PlannerState::Idle);
        assert_eq!(planner.queue_len(), 0);
        assert_eq!(
            *planner.control(),
            ControlState { vx: 20.3, vy: 0.0, ax: 0.0, ay: 0.0 }
        );
        assert_eq!(ego.goal_lane_index, None);
        assert!(matches!(command, ActuationCommand::Track { .. }));

        // Free driving from the next tick on.
        assert!(matches!(planner.step(&mut ego, &t), ActuationCommand::Cruise { .. }));
    }

    #[test]
    fn test_lane_keep_runs_to_idle() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(0.0, 10.0);
        // Leader at 20: safety distance 40, currently 120 ahead and faster.
        let leader = vehicle(120.0, -4.8, 20.0, &ego);
        planner.plan_lane_keep(&ego, &leader).unwrap();
        assert_eq!(planner.state(), PlannerState::LaneKeep);
        assert_eq!(planner.queue_len(), 2);
        assert_eq!(planner.active_mission().unwrap().longitudinal.accel(), 4.0);

        let t = targets(leader.clone(), vehicle(-200.0, -4.8, 33.3, &ego), None);
        planner.step(&mut ego, &t);
        assert_eq!(planner.active_phase(), Some(Phase::Approach));
        assert_abs_diff_eq!(planner.control().vx, 8.04, epsilon = 1e-12);

        // Settled at the safety distance: approach -> hold, hold accel +2.0.
        let mut ego = EgoState::at(80.0, -4.8, 10.0, 1);
        ego.lane_count = 3;
        planner.step(&mut ego, &t);
        assert_eq!(planner.active_phase(), Some(Phase::Hold));
        assert_eq!(planner.control().ax, 2.0);
        assert_queue_matches_state(&planner);

        // Matching the leader's speed ends the maneuver.
        ego.set_velocity(19.95, 0.0);
        planner.step(&mut ego, &t);
        assert_eq!(planner.state(), PlannerState::Idle);
        assert_eq!(planner.control().vx, 19.95);
        assert_queue_matches_state(&planner);

        // A new maneuver is accepted once idle.
        assert!(planner.plan_lane_keep(&ego, &leader).is_ok());
    }

    #[test]
    fn test_approach_clamps_reversing_vehicle() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(0.0, -1.0);
        let leader = vehicle(160.0, -4.8, 20.0, &ego);
        planner.plan_lane_keep(&ego, &leader).unwrap();
        let t = targets(leader, vehicle(-200.0, -4.8, 33.3, &ego), None);
        planner.step(&mut ego, &t);
        assert_eq!(planner.control().vx, 0.0);
    }

    #[test]
    fn test_approach_reevaluates_each_tick() {
        let mut planner = ManeuverPlanner::new(&config());
        let mut ego = ego(0.0, 10.0);
        let leader = vehicle(120.0, -4.8, 20.0, &ego);
        planner.plan_lane_keep(&ego, &leader).unwrap();
        assert_eq!(planner.active_mission().unwrap().longitudinal.accel(), 4.0);

        // Leader now far ahead: excess distance > 100 -> +8.0.
        let far = vehicle(400.0, -4.8, 20.0, &ego);
        let t = targets(far, vehicle(-200.0, -4.8, 33.3, &ego), None);
        planner.step(&mut ego, &t);
        assert_eq!(planner.control().ax, 8.0);
    }
}
