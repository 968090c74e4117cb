use crate::selfdrive::interfaces::NeighborSnapshot;

/// Planar point in simulation coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// `self - origin`
    pub fn relative_to(&self, origin: Point) -> Point {
        Point {
            x: self.x - origin.x,
            y: self.y - origin.y,
        }
    }
}

/// A neighbor vehicle as seen from the ego vehicle during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    pub id: String,
    /// Absolute position
    pub position: Point,
    /// Position relative to the ego vehicle
    pub relative: Point,
    pub speed: f64,
    pub road_id: String,
    pub lane_index: i32,
    /// Lane count of the neighbor's road
    pub lane_count: usize,
    /// Longitudinal position along its lane
    pub lane_position: f64,
    /// Lateral position inside its lane
    pub lane_position_lat: f64,
}

impl NeighborRecord {
    /// Builds a record from a telemetry snapshot. `lane_count` comes from the
    /// road network since the feed does not carry it.
    pub fn from_snapshot(snapshot: &NeighborSnapshot, lane_count: usize, ego: Point) -> Self {
        let position = Point::new(snapshot.x, snapshot.y);
        NeighborRecord {
            id: snapshot.id.clone(),
            position,
            relative: position.relative_to(ego),
            speed: snapshot.speed,
            road_id: snapshot.road_id.clone(),
            lane_index: snapshot.lane_index,
            lane_count,
            lane_position: snapshot.lane_position,
            lane_position_lat: snapshot.lane_position_lat,
        }
    }

    /// Lane number counted from the outer edge, comparable across roads
    /// with different lane counts.
    pub fn lanes_from_edge(&self) -> i32 {
        self.lane_count as i32 - self.lane_index
    }
}

/// Lateral bucket relative to the ego lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneSide {
    Left,
    Mid,
    Right,
}

impl LaneSide {
    /// Maps the edge-count difference (neighbor minus ego) to a side;
    /// anything beyond the adjacent lanes is out of scope.
    pub fn from_delta(delta: i32) -> Option<LaneSide> {
        match delta {
            -1 => Some(LaneSide::Left),
            0 => Some(LaneSide::Mid),
            1 => Some(LaneSide::Right),
            _ => None,
        }
    }
}

/// Leaders and followers of one lateral bucket, each ordered by ascending
/// absolute longitudinal offset (nearest first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneBucket {
    pub leaders: Vec<NeighborRecord>,
    pub followers: Vec<NeighborRecord>,
}

impl LaneBucket {
    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty() && self.followers.is_empty()
    }

    fn sort(&mut self) {
        for list in [&mut self.leaders, &mut self.followers] {
            list.sort_by(|a, b| a.relative.x.abs().total_cmp(&b.relative.x.abs()));
        }
    }
}

/// The six ordered neighbor sequences of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneBuckets {
    pub left: LaneBucket,
    pub mid: LaneBucket,
    pub right: LaneBucket,
}

impl LaneBuckets {
    pub fn bucket(&self, side: LaneSide) -> &LaneBucket {
        match side {
            LaneSide::Left => &self.left,
            LaneSide::Mid => &self.mid,
            LaneSide::Right => &self.right,
        }
    }

    fn bucket_mut(&mut self, side: LaneSide) -> &mut LaneBucket {
        match side {
            LaneSide::Left => &mut self.left,
            LaneSide::Mid => &mut self.mid,
            LaneSide::Right => &mut self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.mid.is_empty() && self.right.is_empty()
    }

    pub fn len(&self) -> usize {
        [&self.left, &self.mid, &self.right]
            .iter()
            .map(|b| b.leaders.len() + b.followers.len())
            .sum()
    }
}

/// Partitions neighbors into left/mid/right leader/follower buckets.
///
/// # Arguments
///
/// * `neighbors` - This tick's neighbor records.
/// * `ego_lane_index` - Ego lane index.
/// * `ego_lane_count` - Lane count of the ego road.
/// * `sensing_radius` - Records farther than this longitudinally are ignored.
///
/// Neighbors more than one lane away and neighbors exactly abreast of the
/// ego vehicle land in no bucket. Never fails; an empty input yields six
/// empty sequences.
///
/// # Examples
///
/// ```rust
/// use lanepilot::selfdrive::controls::neighbors::classify;
///
/// let buckets = classify(&[], 1, 3, 200.0);
/// assert!(buckets.is_empty());
/// ```
pub fn classify(
    neighbors: &[NeighborRecord],
    ego_lane_index: i32,
    ego_lane_count: usize,
    sensing_radius: f64,
) -> LaneBuckets {
    let ego_from_edge = ego_lane_count as i32 - ego_lane_index;
    let mut buckets = LaneBuckets::default();

    for neighbor in neighbors {
        if neighbor.relative.x.abs() > sensing_radius {
            continue;
        }
        let side = match LaneSide::from_delta(neighbor.lanes_from_edge() - ego_from_edge) {
            Some(side) => side,
            None => continue,
        };
        let bucket = buckets.bucket_mut(side);
        if neighbor.relative.x > 0.0 {
            bucket.leaders.push(neighbor.clone());
        } else if neighbor.relative.x < 0.0 {
            bucket.followers.push(neighbor.clone());
        }
    }

    buckets.left.sort();
    buckets.mid.sort();
    buckets.right.sort();
    buckets
}
