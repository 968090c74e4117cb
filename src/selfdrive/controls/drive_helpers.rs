use tracing::trace;

/// Headway (time units) used to derive the lane-keep safety distance.
pub const HEADWAY_TIME: f64 = 2.0;
/// Half-width of the distance window that ends the approach phase.
pub const APPROACH_TOLERANCE: f64 = 10.0;
/// Relative speed below which the hold phase is complete.
pub const HOLD_SPEED_TOLERANCE: f64 = 0.1;
/// Speed window around the new leader that ends the post-align phase.
pub const POST_ALIGN_SPEED_TOLERANCE: f64 = 1.0;
/// Clearance the ego vehicle keeps from both gap vehicles before it may leave
/// the pre-align phase.
pub const GAP_CLEARANCE: f64 = 10.0;
/// Accelerations applied while holding the leader's speed.
pub const HOLD_ACCEL: f64 = 2.0;

/// One row predicate of a [`StepTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bucket {
    /// `x < bound`
    Below(f64),
    /// `lo <= x < hi`
    Within(f64, f64),
    /// `x >= bound`
    AtLeast(f64),
    /// `x > bound`
    Above(f64),
    /// Matches anything
    Otherwise,
}

impl Bucket {
    pub fn contains(&self, x: f64) -> bool {
        match *self {
            Bucket::Below(bound) => x < bound,
            Bucket::Within(lo, hi) => lo <= x && x < hi,
            Bucket::AtLeast(bound) => x >= bound,
            Bucket::Above(bound) => x > bound,
            Bucket::Otherwise => true,
        }
    }
}

/// Piecewise-constant lookup table evaluated top to bottom; the first row
/// whose bucket contains the key wins.
#[derive(Debug, Clone, Copy)]
pub struct StepTable {
    pub rows: &'static [(Bucket, f64)],
}

impl StepTable {
    /// # Examples
    ///
    /// ```rust
    /// use lanepilot::selfdrive::controls::drive_helpers::PRE_ALIGN_TABLE;
    ///
    /// assert_eq!(PRE_ALIGN_TABLE.lookup(75.0), 4.0);
    /// ```
    pub fn lookup(&self, key: f64) -> f64 {
        self.rows
            .iter()
            .find(|(bucket, _)| bucket.contains(key))
            .map(|&(_, value)| value)
            .unwrap_or(0.0)
    }
}

/// Pre-align acceleration keyed by the mean relative offset of the gap
/// vehicles. Boundaries belong to the upper bucket.
pub const PRE_ALIGN_TABLE: StepTable = StepTable {
    rows: &[
        (Bucket::Below(-120.0), -8.0),
        (Bucket::Within(-120.0, -50.0), -4.0),
        (Bucket::Within(-50.0, 0.0), -2.0),
        (Bucket::Within(0.0, 50.0), 2.0),
        (Bucket::Within(50.0, 120.0), 4.0),
        (Bucket::Otherwise, 8.0),
    ],
};

/// Post-align acceleration keyed by distance to the new leader, when the
/// leader is faster than the ego vehicle.
pub const POST_ALIGN_FASTER_LEADER: StepTable = StepTable {
    rows: &[
        (Bucket::Above(100.0), 8.0),
        (Bucket::Within(50.0, 100.0), 4.0),
        (Bucket::AtLeast(0.0), 2.0),
        (Bucket::Otherwise, -8.0),
    ],
};

/// Post-align acceleration keyed by distance to the new leader, when the
/// leader is slower than the ego vehicle.
pub const POST_ALIGN_SLOWER_LEADER: StepTable = StepTable {
    rows: &[
        (Bucket::Above(100.0), -2.0),
        (Bucket::Within(50.0, 100.0), -4.0),
        (Bucket::AtLeast(0.0), -8.0),
        (Bucket::Otherwise, -6.0),
    ],
};

/// Approach acceleration keyed by distance beyond the safety distance, when
/// the leader is faster than the ego vehicle.
pub const APPROACH_FASTER_LEADER: StepTable = StepTable {
    rows: &[
        (Bucket::Above(100.0), 8.0),
        (Bucket::Within(50.0, 100.0), 4.0),
        (Bucket::Within(0.0, 50.0), 2.0),
        (Bucket::Otherwise, 0.0),
    ],
};

/// Approach acceleration keyed by distance beyond the safety distance, when
/// the leader is slower than the ego vehicle.
pub const APPROACH_SLOWER_LEADER: StepTable = StepTable {
    rows: &[
        (Bucket::Above(100.0), 3.0),
        (Bucket::Within(50.0, 100.0), 1.0),
        (Bucket::Within(0.0, 50.0 * 3.6), -3.0),
        (Bucket::Otherwise, -8.0),
    ],
};

/// Picks the table matching the sign of the relative speed. Equal speeds have
/// no table; callers keep a zero acceleration.
fn by_relative_speed(
    rel_speed: f64,
    faster: StepTable,
    slower: StepTable,
) -> Option<StepTable> {
    if rel_speed > 0.0 {
        Some(faster)
    } else if rel_speed < 0.0 {
        Some(slower)
    } else {
        None
    }
}

/// Acceleration that moves the ego vehicle alongside the target gap.
///
/// # Arguments
///
/// * `rear_offset` - Relative longitudinal offset of the gap-rear vehicle.
/// * `front_offset` - Relative longitudinal offset of the gap-front vehicle.
pub fn pre_align_accel(rear_offset: f64, front_offset: f64) -> f64 {
    PRE_ALIGN_TABLE.lookup(0.5 * (rear_offset + front_offset))
}

/// Checks whether the ego vehicle sits inside the gap with clearance on both
/// sides.
pub fn pre_align_complete(rear_x: f64, ego_x: f64, front_x: f64) -> bool {
    rear_x + GAP_CLEARANCE < ego_x && ego_x < front_x - GAP_CLEARANCE
}

/// Acceleration that matches the new leader after the lane traverse.
///
/// # Arguments
///
/// * `distance` - Distance from the ego vehicle to the new leader.
/// * `rel_speed` - Leader speed minus ego speed.
///
/// # Returns
///
/// `None` when the speeds are equal; that case has no rule.
///
/// # Examples
///
/// ```rust
/// use lanepilot::selfdrive::controls::drive_helpers::post_align_accel;
///
/// assert_eq!(post_align_accel(120.0, 2.0), Some(8.0));
/// assert_eq!(post_align_accel(-5.0, -2.0), Some(-6.0));
/// assert_eq!(post_align_accel(30.0, 0.0), None);
/// ```
pub fn post_align_accel(distance: f64, rel_speed: f64) -> Option<f64> {
    let table = by_relative_speed(rel_speed, POST_ALIGN_FASTER_LEADER, POST_ALIGN_SLOWER_LEADER);
    if table.is_none() {
        trace!(distance, "post-align with equal speeds, no acceleration rule");
    }
    table.map(|table| table.lookup(distance))
}

pub fn post_align_complete(leader_speed: f64, ego_vx: f64) -> bool {
    leader_speed - POST_ALIGN_SPEED_TOLERANCE < ego_vx
        && ego_vx < leader_speed + POST_ALIGN_SPEED_TOLERANCE
}

/// Distance kept behind a leader travelling at `leader_speed`.
pub fn safety_distance(leader_speed: f64) -> f64 {
    leader_speed * HEADWAY_TIME
}

/// Acceleration that brings the ego vehicle to the safety distance behind its
/// leader.
///
/// # Arguments
///
/// * `distance` - Distance from the ego vehicle to the leader.
/// * `leader_speed` - Leader speed.
/// * `rel_speed` - Leader speed minus ego speed.
///
/// # Returns
///
/// `None` when the speeds are equal.
pub fn approach_accel(distance: f64, leader_speed: f64, rel_speed: f64) -> Option<f64> {
    let excess = distance - safety_distance(leader_speed);
    by_relative_speed(rel_speed, APPROACH_FASTER_LEADER, APPROACH_SLOWER_LEADER)
        .map(|table| table.lookup(excess))
}

pub fn approach_complete(distance: f64, leader_speed: f64) -> bool {
    let safety = safety_distance(leader_speed);
    safety - APPROACH_TOLERANCE < distance && distance < safety + APPROACH_TOLERANCE
}

/// Constant correction towards the leader's speed.
pub fn hold_accel(rel_speed: f64) -> f64 {
    if rel_speed > 0.0 {
        HOLD_ACCEL
    } else if rel_speed < 0.0 {
        -HOLD_ACCEL
    } else {
        0.0
    }
}

pub fn hold_complete(rel_speed: f64) -> bool {
    rel_speed.abs() < HOLD_SPEED_TOLERANCE
}
