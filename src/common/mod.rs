pub mod filters;
pub mod params;
