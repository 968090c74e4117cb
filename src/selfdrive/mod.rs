pub mod controls;
pub mod ego_vehicle;
pub mod interfaces;
