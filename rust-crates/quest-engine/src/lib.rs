pub mod config;

pub mod dedup;

pub mod felt;

pub mod indexer;

pub mod models;

pub mod notify;

pub mod projector;

pub mod schedule;

pub mod store;

pub mod tracker;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::EngineConfig;
pub use felt::Felt;
pub use projector::QuestView;
pub use tracker::{
    QuestTracker,
    Status,
    TrackerEvent,
    TrackerState,
};

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
