// ============================================
// Signal Catalog
// ============================================
//
// Maps every known event type to its base weight and resolves the
// effective weight of an incoming signal:
// - escalating types scale positive weights and clamp them to a cap
// - graded types select the weight from a rating table
// - everything else passes the base weight through
//
// Adjustments are strategies registered per event type, so new scoring
// behavior is added without touching the catalog lookup.

pub mod catalog;

pub use catalog::{
    base_signal_types, BASE_SIGNALS, ESCALATING_SIGNAL, EXTENDED_SIGNALS, GRADED_SIGNAL,
    NEGATIVE_SIGNAL_TYPES, REACTION_SIGNAL, REACTION_TYPES, SOCIAL_SIGNAL_TYPES,
};

use crate::config::SignalConfig;
use crate::error::{AppError, Result};
use crate::models::SignalDefinition;
use std::collections::HashMap;

/// Type-specific weight rule applied after the base weight lookup
pub trait WeightAdjustment: Send + Sync {
    fn adjust(&self, base_weight: f64, declared_value: Option<f64>) -> Result<f64>;
}

/// Repeat-visit intensity: base weight scaled by the declared value, then
/// multiplied and clamped when positive
#[derive(Debug, Clone)]
pub struct EscalatingWeight {
    pub multiplier: f64,
    pub cap: f64,
}

impl EscalatingWeight {
    pub fn new(multiplier: f64, cap: f64) -> Self {
        Self { multiplier, cap }
    }

    /// Escalate an already computed weight
    pub fn escalate(&self, computed: f64) -> f64 {
        if computed > 0.0 {
            (computed * self.multiplier).min(self.cap)
        } else {
            computed
        }
    }
}

impl Default for EscalatingWeight {
    fn default() -> Self {
        Self::new(1.5, 10.0)
    }
}

impl WeightAdjustment for EscalatingWeight {
    fn adjust(&self, base_weight: f64, declared_value: Option<f64>) -> Result<f64> {
        let scale = declared_value.unwrap_or(1.0);
        Ok(self.escalate(base_weight * scale))
    }
}

/// Explicit 1–5 rating mapped through a fixed table
#[derive(Debug, Clone)]
pub struct GradedRating {
    table: [f64; 5],
}

impl GradedRating {
    pub fn new(table: [f64; 5]) -> Self {
        Self { table }
    }

    pub fn weight_for(&self, rating: f64) -> Result<f64> {
        if rating.fract() != 0.0 || !(1.0..=5.0).contains(&rating) {
            return Err(AppError::InvalidRatingValue(rating.to_string()));
        }
        Ok(self.table[rating as usize - 1])
    }
}

impl Default for GradedRating {
    fn default() -> Self {
        Self::new([-2.0, 0.0, 2.0, 3.5, 5.0])
    }
}

impl WeightAdjustment for GradedRating {
    fn adjust(&self, _base_weight: f64, declared_value: Option<f64>) -> Result<f64> {
        let rating = declared_value
            .ok_or_else(|| AppError::InvalidRatingValue("missing".to_string()))?;
        self.weight_for(rating)
    }
}

pub struct SignalCatalog {
    definitions: HashMap<&'static str, SignalDefinition>,
    adjustments: HashMap<String, Box<dyn WeightAdjustment>>,
}

impl SignalCatalog {
    /// Full catalog with the escalating and graded strategies registered
    pub fn new(config: &SignalConfig) -> Self {
        Self::without_adjustments()
            .with_adjustment(
                ESCALATING_SIGNAL,
                EscalatingWeight::new(config.escalating_multiplier, config.escalating_cap),
            )
            .with_adjustment(GRADED_SIGNAL, GradedRating::default())
    }

    /// Full catalog where every type passes its base weight through
    pub fn without_adjustments() -> Self {
        let definitions = BASE_SIGNALS
            .iter()
            .chain(EXTENDED_SIGNALS.iter())
            .map(|def| (def.event_type, *def))
            .collect();

        Self {
            definitions,
            adjustments: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy for one event type
    pub fn with_adjustment(
        mut self,
        event_type: impl Into<String>,
        adjustment: impl WeightAdjustment + 'static,
    ) -> Self {
        self.adjustments
            .insert(event_type.into(), Box::new(adjustment));
        self
    }

    pub fn definition(&self, event_type: &str) -> Option<&SignalDefinition> {
        self.definitions.get(event_type)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.definitions.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Effective weight for one signal. Pure; call before persisting.
    pub fn resolve_weight(&self, event_type: &str, declared_value: Option<f64>) -> Result<f64> {
        let definition = self
            .definition(event_type)
            .ok_or_else(|| AppError::UnknownSignalType(event_type.to_string()))?;

        match self.adjustments.get(event_type) {
            Some(adjustment) => adjustment.adjust(definition.base_weight, declared_value),
            None => Ok(definition.base_weight),
        }
    }
}

impl Default for SignalCatalog {
    fn default() -> Self {
        Self::new(&SignalConfig::default())
    }
}
