// ============================================
// Signal Recorder
// ============================================
//
// Entry point for incoming signals:
// 1. Reject unknown event types (nothing is stored)
// 2. Resolve the effective weight through the SignalCatalog
// 3. Append the event through the EventSink
// 4. Turn negative signals into exclusions
//
// A recorder built without a sink reports TrackerUnavailable for every
// write. Store hooks treat that as "tracking is off" and skip quietly.

pub mod commerce;

pub use commerce::{CommerceContext, CommerceSignals, LineItem};

use crate::config::SignalConfig;
use crate::db::EventSink;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::NewEvent;
use crate::services::exclusions::{ExclusionCache, NegativeSignalProcessor};
use crate::services::signals::{SignalCatalog, GRADED_SIGNAL, REACTION_SIGNAL, REACTION_TYPES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Incoming signal before weighting
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewSignal {
    pub visitor_hash: String,
    /// Defaults to `rest_<unix ts>` when absent
    pub session_id: Option<String>,
    pub event_type: String,
    pub target_id: i64,
    pub event_value: Option<f64>,
    pub meta: Option<serde_json::Value>,
    pub user_id: Option<i64>,
}

impl NewSignal {
    pub fn new(visitor_hash: impl Into<String>, event_type: impl Into<String>, target_id: i64) -> Self {
        Self {
            visitor_hash: visitor_hash.into(),
            event_type: event_type.into(),
            target_id,
            ..Default::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn value(mut self, event_value: f64) -> Self {
        self.event_value = Some(event_value);
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordedSignal {
    pub event_id: i64,
    pub event_type: String,
    pub target_id: i64,
    pub weight: f64,
    /// Exclusion created by a negative signal
    pub exclusion_id: Option<i64>,
}

pub fn default_session_id(now: DateTime<Utc>) -> String {
    format!("rest_{}", now.timestamp())
}

pub struct SignalRecorder {
    catalog: Arc<SignalCatalog>,
    sink: Option<Arc<dyn EventSink>>,
    negative: Option<Arc<NegativeSignalProcessor>>,
}

impl SignalRecorder {
    pub fn new(catalog: Arc<SignalCatalog>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            catalog,
            sink: Some(sink),
            negative: None,
        }
    }

    /// Catalog built from `config`; negative signals create exclusions
    /// only when enabled there
    pub fn from_config(
        config: &SignalConfig,
        sink: Arc<dyn EventSink>,
        processor: Arc<NegativeSignalProcessor>,
    ) -> Self {
        let recorder = Self::new(Arc::new(SignalCatalog::new(config)), sink);
        if config.negative_signals_enabled {
            recorder.with_negative_processor(processor)
        } else {
            recorder
        }
    }

    /// Recorder with no backing sink
    pub fn unavailable(catalog: Arc<SignalCatalog>) -> Self {
        Self {
            catalog,
            sink: None,
            negative: None,
        }
    }

    /// Enable exclusion creation for negative signals
    pub fn with_negative_processor(mut self, processor: Arc<NegativeSignalProcessor>) -> Self {
        self.negative = Some(processor);
        self
    }

    pub fn is_available(&self) -> bool {
        self.sink.is_some()
    }

    pub fn catalog(&self) -> &SignalCatalog {
        &self.catalog
    }

    /// Weight the signal through the catalog and store it
    pub async fn record(
        &self,
        cache: &mut ExclusionCache,
        signal: NewSignal,
    ) -> Result<RecordedSignal> {
        let weight = self
            .catalog
            .resolve_weight(&signal.event_type, signal.event_value)?;
        self.record_with_weight(cache, signal, weight).await
    }

    /// Store a signal whose weight was decided by the caller (server-side
    /// hooks). The event type must still be known to the catalog.
    pub async fn record_with_weight(
        &self,
        cache: &mut ExclusionCache,
        signal: NewSignal,
        weight: f64,
    ) -> Result<RecordedSignal> {
        if !self.catalog.contains(&signal.event_type) {
            return Err(AppError::UnknownSignalType(signal.event_type));
        }
        if signal.visitor_hash.trim().is_empty() {
            return Err(AppError::Validation("visitor_hash is required".to_string()));
        }
        let sink = self.sink.as_ref().ok_or(AppError::TrackerUnavailable)?;

        let now = Utc::now();
        let NewSignal {
            visitor_hash,
            session_id,
            event_type,
            target_id,
            event_value,
            meta,
            user_id,
        } = signal;

        let event_id = sink
            .append(NewEvent {
                visitor_hash: visitor_hash.clone(),
                session_id: session_id.unwrap_or_else(|| default_session_id(now)),
                event_type: event_type.clone(),
                target_id,
                event_value,
                weight,
                meta,
                created_at: now,
            })
            .await?;

        metrics::record_signal(&event_type);
        debug!(
            visitor_hash = %visitor_hash,
            event_type = %event_type,
            target_id = target_id,
            weight = weight,
            event_id = event_id,
            "Signal recorded"
        );

        let exclusion_id = match &self.negative {
            Some(processor) => {
                match processor
                    .process_event(cache, &event_type, target_id, &visitor_hash, user_id)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(
                            visitor_hash = %visitor_hash,
                            event_type = %event_type,
                            target_id = target_id,
                            error = %e,
                            "Failed to create exclusion from negative signal"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(RecordedSignal {
            event_id,
            event_type,
            target_id,
            weight,
            exclusion_id,
        })
    }

    /// 1–5 star rating on a post
    pub async fn record_star_rating(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
        session_id: Option<String>,
        post_id: i64,
        rating: i64,
    ) -> Result<RecordedSignal> {
        let signal = NewSignal {
            visitor_hash: visitor_hash.to_string(),
            session_id,
            event_type: GRADED_SIGNAL.to_string(),
            target_id: post_id,
            event_value: Some(rating as f64),
            meta: Some(json!({ "rating": rating })),
            user_id: None,
        };
        self.record(cache, signal).await
    }

    /// Named reaction (celebrate, insightful, curious) on a post
    pub async fn record_reaction(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
        session_id: Option<String>,
        post_id: i64,
        reaction: &str,
    ) -> Result<RecordedSignal> {
        if !REACTION_TYPES.contains(&reaction) {
            return Err(AppError::InvalidReactionType(reaction.to_string()));
        }

        let signal = NewSignal {
            visitor_hash: visitor_hash.to_string(),
            session_id,
            event_type: REACTION_SIGNAL.to_string(),
            target_id: post_id,
            event_value: None,
            meta: Some(json!({ "reaction": reaction })),
            user_id: None,
        };
        self.record(cache, signal).await
    }
}
