pub mod actuation;
pub mod drive_helpers;
pub mod lat_control;
pub mod mission;
pub mod neighbors;
pub mod planner;
pub mod radar_helpers;
pub mod vehicle_state;
