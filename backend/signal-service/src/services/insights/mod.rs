//! Aggregate statistics over exclusions and recent signals.

pub mod analytics;

pub use analytics::{
    CommerceReport, ContentEngagement, ContentSort, DateRange, FunnelStep, ProductSignals,
    SessionReport, Timeline,
};

use crate::db::EventStore;
use crate::error::Result;
use crate::models::{EventTypeCount, ExclusionTypeCount};
use crate::services::exclusions::ExclusionStore;
use crate::services::signals::{base_signal_types, NEGATIVE_SIGNAL_TYPES, SOCIAL_SIGNAL_TYPES};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

const RECENT_WINDOW_DAYS: i64 = 7;
const TOP_SIGNALS_WINDOW_DAYS: i64 = 30;
const TOP_SIGNALS_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProStats {
    pub total_exclusions: i64,
    pub exclusions_by_type: Vec<ExclusionTypeCount>,
    pub negative_events_7d: i64,
    pub social_events_7d: i64,
    /// Most frequent extended signal types over 30 days
    pub top_pro_signals: Vec<EventTypeCount>,
}

pub struct Insights {
    events: Arc<dyn EventStore>,
    exclusions: Arc<ExclusionStore>,
}

impl Insights {
    pub fn new(events: Arc<dyn EventStore>, exclusions: Arc<ExclusionStore>) -> Self {
        Self { events, exclusions }
    }

    pub async fn pro_stats(&self) -> Result<ProStats> {
        self.pro_stats_at(Utc::now()).await
    }

    pub async fn pro_stats_at(&self, now: DateTime<Utc>) -> Result<ProStats> {
        let exclusion_stats = self.exclusions.stats().await?;

        let recent = now - Duration::days(RECENT_WINDOW_DAYS);
        let negative_events_7d = self
            .events
            .count_events(&NEGATIVE_SIGNAL_TYPES, recent)
            .await?;
        let social_events_7d = self
            .events
            .count_events(&SOCIAL_SIGNAL_TYPES, recent)
            .await?;

        let base_types: Vec<&str> = base_signal_types().collect();
        let top_pro_signals = self
            .events
            .top_event_types(
                now - Duration::days(TOP_SIGNALS_WINDOW_DAYS),
                &base_types,
                TOP_SIGNALS_LIMIT,
            )
            .await?;

        Ok(ProStats {
            total_exclusions: exclusion_stats.total_exclusions,
            exclusions_by_type: exclusion_stats.exclusions_by_type,
            negative_events_7d,
            social_events_7d,
            top_pro_signals,
        })
    }
}
