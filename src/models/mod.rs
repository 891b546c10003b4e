pub mod config;
pub mod job;
pub mod rank;

pub use config::ServiceConfig;
pub use job::{Job, JobState, PollerParams, Snapshot, StartRequest};
pub use rank::{Device, LookupParams, RankOutcome, RankRecord, RankValue};
