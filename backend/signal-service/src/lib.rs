pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use jobs::{AbandonedCheckoutDetector, AffinityAggregator, JobRun, PeriodicJob};
pub use services::{
    CommerceSignals, ExclusionCache, ExclusionStore, Insights, NegativeSignalProcessor,
    ScoringEngine, SignalCatalog, SignalRecorder,
};
