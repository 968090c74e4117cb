/// Heading used when the forward speed is zero (straight ahead).
pub const STRAIGHT_HEADING: f64 = 90.0;

/// Lane-traverse completes once the ego vehicle is this close to the
/// destination lane's center line.
pub const LANE_CENTER_TOLERANCE: f64 = 0.1;

/// Calculates the heading command from the planar velocity.
///
/// # Arguments
///
/// * `vx` - Longitudinal velocity.
/// * `vy` - Lateral velocity.
///
/// # Returns
///
/// Heading in degrees, `90 - atan(vy / vx)`. A zero `vx` yields
/// [`STRAIGHT_HEADING`] instead of dividing by zero.
///
/// # Examples
///
/// ```rust
/// use lanepilot::selfdrive::controls::lat_control::heading_command;
///
/// assert_eq!(heading_command(0.0, 3.0), 90.0);
/// assert!((heading_command(10.0, 10.0) - 45.0).abs() < 1e-9);
/// ```
pub fn heading_command(vx: f64, vy: f64) -> f64 {
    if vx == 0.0 {
        STRAIGHT_HEADING
    } else {
        STRAIGHT_HEADING - (vy / vx).atan().to_degrees()
    }
}

/// Calculates the lateral speed used to traverse one lane.
///
/// The traverse takes `|vx| / 60 + 3` time units, so faster vehicles change
/// lanes more gently. The sign points towards the goal lane; a goal equal to
/// the current lane yields zero.
///
/// # Arguments
///
/// * `vx` - Longitudinal speed of the ego vehicle.
/// * `lane_width` - Lane width.
/// * `current_lane` - Lane index the ego vehicle is in.
/// * `goal_lane` - Destination lane index.
///
/// # Examples
///
/// ```rust
/// use lanepilot::selfdrive::controls::lat_control::lane_traverse_speed;
///
/// // At 30 units/s the traverse lasts 3.5 time units.
/// let vy = lane_traverse_speed(30.0, 3.5, 1, 2);
/// assert!((vy - 1.0).abs() < 1e-9);
/// assert!(lane_traverse_speed(30.0, 3.5, 2, 1) < 0.0);
/// assert_eq!(lane_traverse_speed(30.0, 3.5, 1, 1), 0.0);
/// ```
pub fn lane_traverse_speed(vx: f64, lane_width: f64, current_lane: i32, goal_lane: i32) -> f64 {
    let speed = lane_width / (vx.abs() / 60.0 + 3.0);
    match goal_lane.cmp(&current_lane) {
        std::cmp::Ordering::Greater => speed,
        std::cmp::Ordering::Less => -speed,
        std::cmp::Ordering::Equal => 0.0,
    }
}

/// Checks whether the ego vehicle has settled in the goal lane.
pub fn lane_traverse_complete(lane_index: i32, goal_lane: i32, lateral_offset: f64) -> bool {
    lane_index == goal_lane && lateral_offset.abs() < LANE_CENTER_TOLERANCE
}
