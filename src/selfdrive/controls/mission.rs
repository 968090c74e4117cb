//! Missions: the phases a maneuver is broken into.

use std::collections::VecDeque;
use std::fmt;

/// Planner mode. `Idle` exactly when the mission queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlannerState {
    #[default]
    Idle,
    LaneKeep,
    LaneChange,
}

impl fmt::Display for PlannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlannerState::Idle => "idle",
            PlannerState::LaneKeep => "lane-keep",
            PlannerState::LaneChange => "lane-change",
        };
        f.write_str(name)
    }
}

/// Maneuvers the mission-selection layer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maneuver {
    LaneKeep,
    LaneChange,
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maneuver::LaneKeep => f.write_str("lane-keep"),
            Maneuver::LaneChange => f.write_str("lane-change"),
        }
    }
}

/// Phase tag: selects both the completion predicate and the setpoint rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Match the target gap longitudinally.
    PreAlign,
    /// Move laterally into the goal lane.
    LaneTraverse,
    /// Match the new leader's speed.
    PostAlign,
    /// Close to the safety distance behind the leader.
    Approach,
    /// Hold the leader's speed.
    Hold,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::PreAlign => "pre-align",
            Phase::LaneTraverse => "lane-traverse",
            Phase::PostAlign => "post-align",
            Phase::Approach => "approach",
            Phase::Hold => "hold",
        };
        f.write_str(name)
    }
}

/// How a speed command evolves while a mission is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    /// Integrate the previous command: `v += accel * dt`.
    Derived { accel: f64 },
    /// Pin the command: `v = target + accel * dt`.
    Explicit { target: f64, accel: f64 },
}

impl Setpoint {
    pub const fn hold() -> Self {
        Setpoint::Derived { accel: 0.0 }
    }

    pub fn accel(&self) -> f64 {
        match *self {
            Setpoint::Derived { accel } | Setpoint::Explicit { accel, .. } => accel,
        }
    }

    /// Next speed command from the previous one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::selfdrive::controls::mission::Setpoint;
    ///
    /// assert_eq!(Setpoint::Derived { accel: 2.0 }.advance(10.0, 0.5), 11.0);
    /// assert_eq!(Setpoint::Explicit { target: 1.0, accel: 0.0 }.advance(10.0, 0.5), 1.0);
    /// ```
    pub fn advance(&self, previous: f64, dt: f64) -> f64 {
        match *self {
            Setpoint::Derived { accel } => previous + accel * dt,
            Setpoint::Explicit { target, accel } => target + accel * dt,
        }
    }
}

/// One phase of a maneuver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mission {
    pub phase: Phase,
    pub longitudinal: Setpoint,
    pub lateral: Setpoint,
}

impl Mission {
    /// A fresh mission that changes nothing until it is set up.
    pub const fn new(phase: Phase) -> Self {
        Mission {
            phase,
            longitudinal: Setpoint::hold(),
            lateral: Setpoint::hold(),
        }
    }

    pub fn set_longitudinal_accel(&mut self, accel: f64) {
        self.longitudinal = match self.longitudinal {
            Setpoint::Derived { .. } => Setpoint::Derived { accel },
            Setpoint::Explicit { target, .. } => Setpoint::Explicit { target, accel },
        };
    }
}

pub type MissionQueue = VecDeque<Mission>;

/// Missions of a lane change, in execution order.
pub fn lane_change_missions() -> MissionQueue {
    [Phase::PreAlign, Phase::LaneTraverse, Phase::PostAlign]
        .into_iter()
        .map(Mission::new)
        .collect()
}

/// Missions of a lane keep, in execution order.
pub fn lane_keep_missions() -> MissionQueue {
    [Phase::Approach, Phase::Hold]
        .into_iter()
        .map(Mission::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mission_sequences() {
        let phases: Vec<Phase> = lane_change_missions().iter().map(|m| m.phase).collect();
        assert_eq!(phases, vec![Phase::PreAlign, Phase::LaneTraverse, Phase::PostAlign]);
        let phases: Vec<Phase> = lane_keep_missions().iter().map(|m| m.phase).collect();
        assert_eq!(phases, vec![Phase::Approach, Phase::Hold]);
    }

    #[test]
    fn test_set_longitudinal_accel_keeps_kind() {
        let mut mission = Mission::new(Phase::PreAlign);
        mission.set_longitudinal_accel(-4.0);
        assert_eq!(mission.longitudinal, Setpoint::Derived { accel: -4.0 });

        mission.longitudinal = Setpoint::Explicit { target: 20.0, accel: 0.0 };
        mission.set_longitudinal_accel(1.0);
        assert_eq!(mission.longitudinal, Setpoint::Explicit { target: 20.0, accel: 1.0 });
    }

    #[test]
    fn test_setpoint_advance() {
        let dt = 0.01;
        assert_eq!(Setpoint::hold().advance(7.0, dt), 7.0);
        assert!((Setpoint::Derived { accel: -8.0 }.advance(7.0, dt) - 6.92).abs() < 1e-12);
        assert!((Setpoint::Explicit { target: -1.0, accel: 1.0 }.advance(7.0, dt) + 0.99).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        assert_eq!(PlannerState::LaneChange.to_string(), "lane-change");
        assert_eq!(Phase::LaneTraverse.to_string(), "lane-traverse");
        assert_eq!(Maneuver::LaneKeep.to_string(), "lane-keep");
    }
}
