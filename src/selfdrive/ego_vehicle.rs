//! One ego vehicle and its per-tick pipeline.
//!
//! Every tick runs the same fixed sequence, in full, before the next
//! snapshot is read: estimate the ego state, classify neighbors, select
//! targets, step the planner and publish the actuation target.

use crate::common::params::PilotConfig;
use crate::selfdrive::controls::actuation::ControlOutputAdapter;
use crate::selfdrive::controls::mission::PlannerState;
use crate::selfdrive::controls::neighbors::{classify, LaneBuckets, NeighborRecord, Point};
use crate::selfdrive::controls::planner::{ManeuverPlanner, Result};
use crate::selfdrive::controls::radar_helpers::{
    GapPair, GapRequest, GapSlot, TargetSelector, Targets,
};
use crate::selfdrive::controls::vehicle_state::{EgoState, LaneCountCache, StateEstimator};
use crate::selfdrive::interfaces::{ActuationCommand, ActuationSink, RoadNetwork, TelemetryFeed};
use std::fmt;
use tracing::{debug, debug_span, trace};

#[derive(Debug, Clone)]
pub struct EgoVehicle {
    id: String,
    sensing_radius: f64,
    estimator: StateEstimator,
    lanes: LaneCountCache,
    neighbors: Vec<NeighborRecord>,
    buckets: LaneBuckets,
    selector: TargetSelector,
    planner: ManeuverPlanner,
    adapter: ControlOutputAdapter,
}

impl EgoVehicle {
    pub fn new(id: &str, config: &PilotConfig) -> Self {
        EgoVehicle {
            id: id.to_string(),
            sensing_radius: config.sensing_radius,
            estimator: StateEstimator::new(config),
            lanes: LaneCountCache::new(),
            neighbors: Vec::new(),
            buckets: LaneBuckets::default(),
            selector: TargetSelector::new(config),
            planner: ManeuverPlanner::new(config),
            adapter: ControlOutputAdapter::new(id),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &EgoState {
        self.estimator.state()
    }

    pub fn planner(&self) -> &ManeuverPlanner {
        &self.planner
    }

    pub fn targets(&self) -> &Targets {
        self.selector.targets()
    }

    pub fn buckets(&self) -> &LaneBuckets {
        &self.buckets
    }

    pub fn last_command(&self) -> Option<&ActuationCommand> {
        self.adapter.last()
    }

    /// Processes one simulation step.
    pub fn tick<S>(&mut self, sim: &mut S, step: u64) -> ActuationCommand
    where
        S: TelemetryFeed + RoadNetwork + ActuationSink,
    {
        let span = debug_span!("tick", step);
        let _enter = span.enter();

        let snapshot = sim.ego(&self.id);
        self.estimator
            .update(snapshot.as_ref(), &*sim, &mut self.lanes);
        self.refresh_neighbors(&*sim);

        let track_gaps = self.planner.state() == PlannerState::LaneChange;
        if let Some((front, rear)) =
            self.selector
                .update(&self.buckets, self.estimator.state(), &*sim, track_gaps)
        {
            trace!(?front, ?rear, "gap vehicles refreshed");
        }

        let command = self
            .planner
            .step(self.estimator.state_mut(), self.selector.targets());
        self.adapter.publish(sim, command);

        if self.planner.state() == PlannerState::Idle && self.selector.targets().gaps.is_some() {
            self.selector.clear_gaps();
        }
        debug!("{}", self.diagnostics());
        command
    }

    fn refresh_neighbors<S>(&mut self, sim: &S)
    where
        S: TelemetryFeed + RoadNetwork + ?Sized,
    {
        let snapshots = match sim.neighbors(&self.id, self.sensing_radius) {
            Some(snapshots) => snapshots,
            None => {
                trace!("neighbor telemetry missing, keeping previous buckets");
                return;
            }
        };

        let ego = self.estimator.state();
        let origin = Point::new(ego.x(), ego.y());
        self.neighbors.clear();
        for snapshot in &snapshots {
            match self.lanes.lane_count(sim, &snapshot.road_id) {
                Some(count) => self
                    .neighbors
                    .push(NeighborRecord::from_snapshot(snapshot, count, origin)),
                None => trace!(vehicle = %snapshot.id, road_id = %snapshot.road_id, "neighbor on unknown road"),
            }
        }
        self.buckets = classify(&self.neighbors, ego.lane_index, ego.lane_count, self.sensing_radius);
    }

    /// Requests a lane keep behind the current leader.
    pub fn plan_lane_keep(&mut self) -> Result<()> {
        self.planner
            .plan_lane_keep(self.estimator.state(), &self.selector.targets().leading)
    }

    /// Requests a lane change into the gap bounded by `front` and `rear`.
    ///
    /// Gap vehicles are resolved against the latest telemetry; nothing is
    /// tracked if the planner rejects the request.
    pub fn plan_lane_change<F>(&mut self, feed: &F, front: &GapRequest, rear: &GapRequest) -> Result<()>
    where
        F: TelemetryFeed + ?Sized,
    {
        let ego = self.estimator.state();
        let gaps = GapPair {
            front: self
                .selector
                .resolve_gap(front, GapSlot::Front, &self.buckets, ego, feed),
            rear: self
                .selector
                .resolve_gap(rear, GapSlot::Rear, &self.buckets, ego, feed),
        };
        self.planner
            .plan_lane_change(self.estimator.state_mut(), &gaps)?;
        self.selector.set_gaps(gaps);
        Ok(())
    }

    /// Speed limit of every lane on the current road, lane 0 first. Lanes the
    /// network knows nothing about are skipped.
    pub fn speed_limits<R: RoadNetwork + ?Sized>(&self, network: &R) -> Vec<f64> {
        let ego = self.estimator.state();
        (0..ego.lane_count)
            .filter_map(|lane| network.max_speed(&ego.road_id, lane))
            .collect()
    }

    /// Length of the lane the ego vehicle is in.
    pub fn lane_length<R: RoadNetwork + ?Sized>(&self, network: &R) -> Option<f64> {
        let ego = self.estimator.state();
        let lane = usize::try_from(ego.lane_index).ok()?;
        network.lane_length(&ego.road_id, lane)
    }

    pub fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics { vehicle: self }
    }
}

/// Human readable one-line snapshot of an ego vehicle.
pub struct Diagnostics<'a> {
    vehicle: &'a EgoVehicle,
}

impl fmt::Display for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ego = self.vehicle.state();
        let planner = self.vehicle.planner();
        write!(
            f,
            "{} x={:.2} y={:.2} vx={:.2} vy={:.2} lane={}/{} offset={:.2} state={}",
            self.vehicle.id,
            ego.x(),
            ego.y(),
            ego.vx(),
            ego.vy(),
            ego.lane_index,
            ego.lane_count,
            ego.lateral_offset,
            planner.state()
        )?;
        if let Some(phase) = planner.active_phase() {
            write!(f, " mission={}", phase)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfdrive::controls::mission::Phase;
    use crate::selfdrive::controls::planner::PlannerError;
    use crate::selfdrive::controls::radar_helpers::LaneCode;
    use crate::simulation::ScriptedSimulation;
    use approx::assert_abs_diff_eq;

    fn highway() -> (ScriptedSimulation, EgoVehicle) {
        let config = PilotConfig::default();
        let mut sim = ScriptedSimulation::new(&config);
        sim.add_road("E0", 3, 2000.0, 33.0);
        sim.spawn_ego("ego", "E0", 100.0, 1, 8.0);
        (sim, EgoVehicle::new("ego", &config))
    }

    fn run(sim: &mut ScriptedSimulation, ego: &mut EgoVehicle, ticks: u64) {
        for step in 0..ticks {
            sim.advance();
            ego.tick(sim, step);
        }
    }

    #[test]
    fn test_free_driving_without_neighbors() {
        let (mut sim, mut ego) = highway();
        run(&mut sim, &mut ego, 10);

        let state = ego.state();
        assert_eq!(state.lane_index, 1);
        assert_eq!(state.lane_count, 3);
        assert_abs_diff_eq!(state.vx(), 8.0, epsilon = 1e-6);
        assert_abs_diff_eq!(state.y(), -4.8, epsilon = 1e-12);
        assert_eq!(ego.planner().state(), PlannerState::Idle);
        assert!(ego.targets().leading.is_virtual());
        assert_abs_diff_eq!(ego.targets().leading.x(), state.x() + 200.0, epsilon = 1e-9);
        assert!(matches!(ego.last_command(), Some(ActuationCommand::Cruise { .. })));
        assert_eq!(sim.commands().len(), 10);
    }

    #[test]
    fn test_neighbors_are_bucketed() {
        let (mut sim, mut ego) = highway();
        sim.spawn("lead", "E0", 150.0, 1, 8.0);
        sim.spawn("right", "E0", 80.0, 0, 8.0);
        sim.spawn("left_far", "E0", 400.0, 2, 8.0);
        run(&mut sim, &mut ego, 2);

        let buckets = ego.buckets();
        assert_eq!(buckets.mid.leaders.len(), 1);
        assert_eq!(buckets.right.followers.len(), 1);
        assert!(buckets.left.is_empty());
        assert_eq!(ego.targets().leading.id(), Some("lead"));
        assert!(ego.targets().following.is_virtual());
    }

    #[test]
    fn test_lane_change_end_to_end() {
        let (mut sim, mut ego) = highway();
        sim.spawn("front", "E0", 160.0, 2, 8.0);
        sim.spawn("rear", "E0", 40.0, 2, 8.0);
        run(&mut sim, &mut ego, 5);

        ego.plan_lane_change(
            &sim,
            &GapRequest::real("front", LaneCode::Right),
            &GapRequest::real("rear", LaneCode::Right),
        )
        .unwrap();
        assert_eq!(ego.state().goal_lane_index, Some(2));
        assert_eq!(ego.planner().state(), PlannerState::LaneChange);
        assert_eq!(ego.planner().queue_len(), 3);

        let mut saw_traverse = false;
        for step in 5..1000 {
            sim.advance();
            ego.tick(&mut sim, step);
            if ego.planner().active_phase() == Some(Phase::LaneTraverse) {
                saw_traverse = true;
            }
            if ego.planner().state() == PlannerState::Idle {
                break;
            }
        }

        assert!(saw_traverse);
        assert_eq!(ego.planner().state(), PlannerState::Idle);
        assert_eq!(ego.planner().queue_len(), 0);
        assert_eq!(ego.state().lane_index, 2);
        assert_eq!(ego.state().prev_lane_index, Some(2));
        assert!(ego.state().lateral_offset.abs() < 0.1);
        assert!(ego.targets().gaps.is_none());
        assert_eq!(ego.planner().control().vy, 0.0);
    }

    #[test]
    fn test_lost_gap_vehicle_does_not_abort() {
        let (mut sim, mut ego) = highway();
        sim.spawn("front", "E0", 300.0, 2, 8.0);
        sim.spawn("rear", "E0", 200.0, 2, 8.0);
        run(&mut sim, &mut ego, 2);

        ego.plan_lane_change(
            &sim,
            &GapRequest::real("front", LaneCode::Right),
            &GapRequest::real("rear", LaneCode::Right),
        )
        .unwrap();
        sim.remove("front");
        run(&mut sim, &mut ego, 3);

        let gaps = ego.targets().gaps.as_ref().unwrap();
        assert!(gaps.front.vehicle.is_virtual());
        assert!(!gaps.rear.vehicle.is_virtual());
        assert_eq!(ego.planner().state(), PlannerState::LaneChange);
        assert_eq!(ego.planner().active_phase(), Some(Phase::PreAlign));
    }

    #[test]
    fn test_virtual_gap_request() {
        let (mut sim, mut ego) = highway();
        run(&mut sim, &mut ego, 2);
        let x = ego.state().x();

        ego.plan_lane_change(
            &sim,
            &GapRequest::synthetic(LaneCode::Left),
            &GapRequest::synthetic(LaneCode::Left),
        )
        .unwrap();
        let gaps = ego.targets().gaps.as_ref().unwrap();
        assert_abs_diff_eq!(gaps.front.vehicle.x(), x + 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gaps.rear.vehicle.x(), x - 200.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gaps.front.vehicle.position().y, -8.0, epsilon = 1e-9);
        assert_eq!(ego.state().goal_lane_index, Some(0));
    }

    #[test]
    fn test_rejected_request_keeps_maneuver() {
        let (mut sim, mut ego) = highway();
        sim.spawn("lead", "E0", 150.0, 1, 12.0);
        run(&mut sim, &mut ego, 2);

        ego.plan_lane_keep().unwrap();
        let err = ego
            .plan_lane_change(
                &sim,
                &GapRequest::synthetic(LaneCode::Right),
                &GapRequest::synthetic(LaneCode::Right),
            )
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidManeuverRequest { .. }));
        assert_eq!(ego.planner().state(), PlannerState::LaneKeep);
        assert!(ego.targets().gaps.is_none());
        assert_eq!(ego.state().goal_lane_index, None);
    }

    #[test]
    fn test_lane_keep_end_to_end() {
        let (mut sim, mut ego) = highway();
        // Same speed, 150 ahead: close in, then hold the leader's speed.
        sim.spawn("lead", "E0", 250.0, 1, 8.0);
        run(&mut sim, &mut ego, 2);

        ego.plan_lane_keep().unwrap();
        assert_eq!(ego.planner().active_phase(), Some(Phase::Approach));
        let mut saw_hold = false;
        for step in 2..20_000 {
            sim.advance();
            ego.tick(&mut sim, step);
            if ego.planner().active_phase() == Some(Phase::Hold) {
                saw_hold = true;
            }
            if ego.planner().state() == PlannerState::Idle {
                break;
            }
        }
        assert!(saw_hold);
        assert_eq!(ego.planner().state(), PlannerState::Idle);
        let distance = ego.targets().leading.x() - ego.state().x();
        assert!(distance > 0.0 && distance < 40.0, "distance {}", distance);
        assert_abs_diff_eq!(ego.planner().control().vx, ego.state().vx(), epsilon = 1e-12);
    }

    #[test]
    fn test_missing_ego_telemetry_keeps_state() {
        let (mut sim, mut ego) = highway();
        run(&mut sim, &mut ego, 3);
        let before = ego.state().x();

        sim.set_ego_visible(false);
        run(&mut sim, &mut ego, 1);
        assert_eq!(ego.state().x(), before);
        assert_eq!(sim.commands().len(), 4);
    }

    #[test]
    fn test_road_context() {
        let (mut sim, mut ego) = highway();
        run(&mut sim, &mut ego, 1);
        assert_eq!(ego.speed_limits(&sim), vec![33.0, 33.0, 33.0]);
        assert_eq!(ego.lane_length(&sim), Some(2000.0));
        let line = ego.diagnostics().to_string();
        assert!(line.starts_with("ego x=100."));
        assert!(line.contains("lane=1/3"));
        assert!(line.contains("state=idle"));
    }
}
