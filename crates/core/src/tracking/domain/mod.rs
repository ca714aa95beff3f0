pub mod region_tracker;
pub mod track;
pub mod track_registry;
