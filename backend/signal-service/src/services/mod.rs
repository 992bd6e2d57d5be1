pub mod exclusions;
pub mod insights;
pub mod scoring;
pub mod session;
pub mod signals;
pub mod tracking;

pub use exclusions::{ExclusionCache, ExclusionStore, NegativeSignalProcessor};
pub use insights::{DateRange, Insights, ProStats};
pub use scoring::ScoringEngine;
pub use session::{DeviceType, ReferralSource, SessionContext};
pub use signals::SignalCatalog;
pub use tracking::{CommerceSignals, NewSignal, RecordedSignal, SignalRecorder};
