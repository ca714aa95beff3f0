pub mod engine_config;
pub mod engine_stats;
pub mod infrastructure;
pub mod mailbox;
pub mod next_track_notifier;
pub mod pending;
pub mod tracking_engine;
