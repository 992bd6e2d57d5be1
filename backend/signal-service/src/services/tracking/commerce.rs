//! Server-side store hooks. Each hook emits one signal per line item
//! through the SignalRecorder and never fails the calling store flow.

use super::{NewSignal, SignalRecorder};
use crate::error::AppError;
use crate::services::exclusions::ExclusionCache;
use std::sync::Arc;
use tracing::{debug, warn};

const QUANTITY_INCREASE_WEIGHT: f64 = 1.5;
const QUANTITY_DECREASE_WEIGHT: f64 = -1.0;

/// Visitor the store event belongs to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommerceContext {
    pub visitor_hash: String,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
}

impl CommerceContext {
    pub fn new(visitor_hash: impl Into<String>) -> Self {
        Self {
            visitor_hash: visitor_hash.into(),
            ..Default::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Session the store events are grouped under. Without an explicit
    /// session every hook of one visitor shares `store_<visitor_hash>`, so
    /// a checkout start and its completion always land in the same session.
    pub fn store_session_id(&self) -> String {
        match &self.session_id {
            Some(session_id) if !session_id.is_empty() => session_id.clone(),
            _ => format!("store_{}", self.visitor_hash),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub product_id: i64,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product_id: i64, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

pub struct CommerceSignals {
    recorder: Arc<SignalRecorder>,
}

impl CommerceSignals {
    pub fn new(recorder: Arc<SignalRecorder>) -> Self {
        Self { recorder }
    }

    pub async fn on_remove_from_cart(&self, ctx: &CommerceContext, product_id: i64) -> usize {
        self.emit(ctx, "remove_from_cart", &[product_id], None).await
    }

    pub async fn on_checkout_start(&self, ctx: &CommerceContext, cart: &[LineItem]) -> usize {
        self.emit_items(ctx, "checkout_start", cart).await
    }

    pub async fn on_checkout_complete(&self, ctx: &CommerceContext, order: &[LineItem]) -> usize {
        self.emit_items(ctx, "checkout_complete", order).await
    }

    pub async fn on_refund_request(&self, ctx: &CommerceContext, order: &[LineItem]) -> usize {
        self.emit_items(ctx, "refund_request", order).await
    }

    pub async fn on_coupon_apply(&self, ctx: &CommerceContext, cart: &[LineItem]) -> usize {
        self.emit_items(ctx, "coupon_apply", cart).await
    }

    /// Positive when the quantity grew, negative otherwise
    pub async fn on_quantity_change(
        &self,
        ctx: &CommerceContext,
        product_id: i64,
        quantity: u32,
        old_quantity: u32,
    ) -> usize {
        let weight = if quantity > old_quantity {
            QUANTITY_INCREASE_WEIGHT
        } else {
            QUANTITY_DECREASE_WEIGHT
        };
        self.emit(ctx, "quantity_change", &[product_id], Some(weight))
            .await
    }

    pub async fn on_subscription_signup(
        &self,
        ctx: &CommerceContext,
        subscription: &[LineItem],
    ) -> usize {
        self.emit_items(ctx, "subscription_signup", subscription)
            .await
    }

    pub async fn on_reorder(&self, ctx: &CommerceContext, order: &[LineItem]) -> usize {
        self.emit_items(ctx, "reorder", order).await
    }

    async fn emit_items(&self, ctx: &CommerceContext, event_type: &str, items: &[LineItem]) -> usize {
        let product_ids: Vec<i64> = items.iter().map(|item| item.product_id).collect();
        self.emit(ctx, event_type, &product_ids, None).await
    }

    /// Returns how many events were stored. `weight` overrides the catalog.
    async fn emit(
        &self,
        ctx: &CommerceContext,
        event_type: &str,
        product_ids: &[i64],
        weight: Option<f64>,
    ) -> usize {
        if !self.recorder.is_available() {
            debug!(event_type = %event_type, "Tracker unavailable, store signal skipped");
            return 0;
        }

        let mut cache = ExclusionCache::new();
        let session_id = ctx.store_session_id();
        let mut stored = 0;

        for &product_id in product_ids.iter().filter(|id| **id > 0) {
            let mut signal = NewSignal::new(ctx.visitor_hash.as_str(), event_type, product_id).value(0.0);
            signal.session_id = Some(session_id.clone());
            signal.user_id = ctx.user_id;

            let result = match weight {
                Some(weight) => {
                    self.recorder
                        .record_with_weight(&mut cache, signal, weight)
                        .await
                }
                None => self.recorder.record(&mut cache, signal).await,
            };

            match result {
                Ok(_) => stored += 1,
                Err(AppError::TrackerUnavailable) => {
                    debug!(event_type = %event_type, "Tracker unavailable, store signal skipped");
                    break;
                }
                Err(e) => {
                    warn!(
                        visitor_hash = %ctx.visitor_hash,
                        event_type = %event_type,
                        product_id = product_id,
                        error = %e,
                        "Failed to record store signal"
                    );
                }
            }
        }

        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryEventStore;
    use crate::services::signals::SignalCatalog;

    fn commerce() -> (CommerceSignals, Arc<InMemoryEventStore>) {
        let events = Arc::new(InMemoryEventStore::new());
        let recorder = SignalRecorder::new(Arc::new(SignalCatalog::default()), events.clone());
        (CommerceSignals::new(Arc::new(recorder)), events)
    }

    #[tokio::test]
    async fn test_one_event_per_line_item() {
        let (commerce, events) = commerce();
        let ctx = CommerceContext::new("v1").session("s1");
        let order = [LineItem::new(10, 1), LineItem::new(11, 3), LineItem::new(0, 1)];

        assert_eq!(commerce.on_checkout_complete(&ctx, &order).await, 2);

        let stored = events.all().await;
        assert!(stored.iter().all(|e| e.event_type == "checkout_complete"));
        assert!(stored.iter().all(|e| e.weight == 9.0 && e.session_id == "s1"));
        assert!(stored.iter().all(|e| e.event_value == Some(0.0)));
    }

    #[tokio::test]
    async fn test_catalog_weights_for_hooks() {
        let (commerce, events) = commerce();
        let ctx = CommerceContext::new("v1");
        let items = [LineItem::new(5, 1)];

        commerce.on_remove_from_cart(&ctx, 5).await;
        commerce.on_checkout_start(&ctx, &items).await;
        commerce.on_refund_request(&ctx, &items).await;
        commerce.on_coupon_apply(&ctx, &items).await;
        commerce.on_subscription_signup(&ctx, &items).await;
        commerce.on_reorder(&ctx, &items).await;

        let weights: Vec<(String, f64)> = events
            .all()
            .await
            .into_iter()
            .map(|e| (e.event_type, e.weight))
            .collect();
        assert_eq!(
            weights,
            vec![
                ("remove_from_cart".to_string(), -3.0),
                ("checkout_start".to_string(), 7.0),
                ("refund_request".to_string(), -6.0),
                ("coupon_apply".to_string(), 2.0),
                ("subscription_signup".to_string(), 8.0),
                ("reorder".to_string(), 7.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_quantity_change_direction() {
        let (commerce, events) = commerce();
        let ctx = CommerceContext::new("v1");

        commerce.on_quantity_change(&ctx, 5, 3, 1).await;
        commerce.on_quantity_change(&ctx, 5, 1, 3).await;
        commerce.on_quantity_change(&ctx, 5, 2, 2).await;

        let weights: Vec<f64> = events.all().await.into_iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![1.5, -1.0, -1.0]);
    }

    #[tokio::test]
    async fn test_hooks_without_session_share_store_session() {
        let (commerce, events) = commerce();
        let ctx = CommerceContext::new("v1");
        let cart = [LineItem::new(5, 1)];

        commerce.on_checkout_start(&ctx, &cart).await;
        commerce.on_checkout_complete(&ctx, &cart).await;
        commerce
            .on_checkout_start(&CommerceContext::new("v2").session(""), &cart)
            .await;

        let sessions: Vec<String> = events
            .all()
            .await
            .into_iter()
            .map(|e| e.session_id)
            .collect();
        assert_eq!(sessions, vec!["store_v1", "store_v1", "store_v2"]);
    }

    #[tokio::test]
    async fn test_unavailable_tracker_is_skipped() {
        let recorder = SignalRecorder::unavailable(Arc::new(SignalCatalog::default()));
        let commerce = CommerceSignals::new(Arc::new(recorder));
        let ctx = CommerceContext::new("v1");

        assert_eq!(
            commerce
                .on_checkout_start(&ctx, &[LineItem::new(1, 1)])
                .await,
            0
        );
    }
}
