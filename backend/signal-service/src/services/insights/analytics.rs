//! Site-wide engagement reports over a calendar date range: the reading
//! funnel, the store funnel, session breakdowns, per-post engagement and
//! a zero-filled daily timeline.

use super::Insights;
use crate::db::{EventQuery, CHECKOUT_COMPLETION_TYPES, CHECKOUT_START};
use crate::error::{AppError, Result};
use crate::models::Event;
use crate::services::session::{DeviceType, ReferralSource};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_PERIOD_DAYS: i64 = 30;
const MAX_PERIOD_DAYS: i64 = 36_500;
const CONTENT_LIMIT: usize = 25;
const TOP_PRODUCTS_LIMIT: usize = 10;

const DWELL_THRESHOLD_SECS: f64 = 15.0;
const SCROLL_THRESHOLD_PCT: f64 = 50.0;

const REC_ACTION_TYPES: [&str; 3] = ["related_post_click", "like", "bookmark_save"];

const PRODUCT_SIGNAL_TYPES: [&str; 9] = [
    "product_view",
    "add_to_cart",
    "add_to_wishlist",
    "purchase_complete",
    "checkout_complete",
    "product_review",
    "product_rating",
    "cross_sell_click",
    "product_tab_switch",
];

static PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)d$").expect("Invalid period regex"));

/// Inclusive range of UTC calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `days` days ending on `today`
    pub fn last_days(days: i64, today: NaiveDate) -> Self {
        let days = if days > 0 {
            days.min(MAX_PERIOD_DAYS)
        } else {
            DEFAULT_PERIOD_DAYS
        };

        Self {
            start: today - Duration::days(days - 1),
            end: today,
        }
    }

    /// A custom range when both bounds are present, otherwise a preset
    /// period such as `7d` or `90d` (30 days when absent or malformed).
    /// Unparseable or inverted custom bounds fall back to the last 30 days.
    pub fn resolve(
        period: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
    ) -> Self {
        fn present(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        if let (Some(start), Some(end)) = (present(start), present(end)) {
            return match (parse_day(start), parse_day(end)) {
                (Some(start), Some(end)) if start <= end => Self { start, end },
                _ => Self::last_days(DEFAULT_PERIOD_DAYS, today),
            };
        }

        let days = period
            .and_then(|p| PERIOD.captures(p.trim()))
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .unwrap_or(DEFAULT_PERIOD_DAYS);

        Self::last_days(days, today)
    }

    /// Start of the first day
    pub fn since(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last instant of the final day
    pub fn until(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc() - Duration::nanoseconds(1)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    fn query(&self) -> EventQuery {
        EventQuery::new().since(self.since()).until(self.until())
    }
}

fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|at| at.with_timezone(&Utc).date_naive())
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelStep {
    pub label: &'static str,
    pub count: i64,
}

impl FunnelStep {
    fn new(label: &'static str, count: i64) -> Self {
        Self { label, count }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSignals {
    pub post_id: i64,
    pub signals: i64,
    pub purchases: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommerceReport {
    pub funnel: Vec<FunnelStep>,
    /// 1 - purchases / add_to_cart, clamped to [0, 1]
    pub cart_abandonment_rate: f64,
    /// Mean event count of visitors who purchased in the range
    pub avg_order_signals: f64,
    pub top_products: Vec<ProductSignals>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub devices: BTreeMap<&'static str, i64>,
    pub referrals: BTreeMap<&'static str, i64>,
    pub avg_session_depth: f64,
    pub return_visitor_pct: f64,
    pub avg_signals_per_session: f64,
    pub total_sessions: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentSort {
    #[default]
    Signals,
    Visitors,
    Dwell,
    ReadRate,
}

impl FromStr for ContentSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "signals" => Ok(ContentSort::Signals),
            "visitors" => Ok(ContentSort::Visitors),
            "dwell" => Ok(ContentSort::Dwell),
            "read_rate" => Ok(ContentSort::ReadRate),
            other => Err(AppError::Validation(format!("Invalid content sort: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentEngagement {
    pub post_id: i64,
    pub total_signals: i64,
    pub unique_visitors: i64,
    pub avg_dwell_time: f64,
    pub read_completion_rate: f64,
}

/// Daily event and distinct-visitor counts, one entry per day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub labels: Vec<String>,
    pub events: Vec<i64>,
    pub visitors: Vec<i64>,
}

#[derive(Default)]
struct PostTally<'a> {
    total: i64,
    visitors: HashSet<&'a str>,
    dwell: Vec<f64>,
    page_views: i64,
    read_completions: i64,
}

impl PostTally<'_> {
    fn avg_dwell(&self) -> f64 {
        mean(&self.dwell)
    }

    fn read_rate(&self) -> f64 {
        if self.page_views > 0 {
            self.read_completions as f64 / self.page_views as f64
        } else {
            0.0
        }
    }
}

impl Insights {
    async fn events_in(&self, range: &DateRange) -> Result<Vec<Event>> {
        self.events.query(&range.query()).await
    }

    /// Page views → 15s+ dwell → 50%+ scroll → read completion → rec action
    pub async fn engagement_funnel(&self, range: &DateRange) -> Result<Vec<FunnelStep>> {
        let events = self.events_in(range).await?;

        Ok(vec![
            FunnelStep::new("Page Views", count_types(&events, &["page_view"])),
            FunnelStep::new(
                "15s+ Dwell Time",
                count_where(&events, |e| {
                    e.event_type == "dwell_time" && value_at_least(e, DWELL_THRESHOLD_SECS)
                }),
            ),
            FunnelStep::new(
                "50%+ Scroll Depth",
                count_where(&events, |e| {
                    e.event_type == "scroll_depth" && value_at_least(e, SCROLL_THRESHOLD_PCT)
                }),
            ),
            FunnelStep::new("Read Completion", count_types(&events, &["read_completion"])),
            FunnelStep::new("Rec Click / Action", count_types(&events, &REC_ACTION_TYPES)),
        ])
    }

    pub async fn commerce_report(&self, range: &DateRange) -> Result<CommerceReport> {
        let events = self.events_in(range).await?;

        let add_to_cart = count_types(&events, &["add_to_cart"]);
        let purchases = count_types(&events, &CHECKOUT_COMPLETION_TYPES);

        let funnel = vec![
            FunnelStep::new("Product Views", count_types(&events, &["product_view"])),
            FunnelStep::new("Add to Cart", add_to_cart),
            FunnelStep::new("Checkout Start", count_types(&events, &[CHECKOUT_START])),
            FunnelStep::new("Purchase Complete", purchases),
        ];

        let cart_abandonment_rate = if add_to_cart > 0 {
            round_to(1.0 - purchases as f64 / add_to_cart as f64, 4).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let purchasers: HashSet<&str> = events
            .iter()
            .filter(|e| CHECKOUT_COMPLETION_TYPES.contains(&e.event_type.as_str()))
            .map(|e| e.visitor_hash.as_str())
            .collect();
        let mut per_purchaser: HashMap<&str, i64> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| purchasers.contains(e.visitor_hash.as_str()))
        {
            *per_purchaser.entry(event.visitor_hash.as_str()).or_default() += 1;
        }
        let counts: Vec<f64> = per_purchaser.values().map(|c| *c as f64).collect();
        let avg_order_signals = round_to(mean(&counts), 2);

        let mut products: HashMap<i64, ProductSignals> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| e.target_id > 0 && PRODUCT_SIGNAL_TYPES.contains(&e.event_type.as_str()))
        {
            let entry = products
                .entry(event.target_id)
                .or_insert_with(|| ProductSignals {
                    post_id: event.target_id,
                    signals: 0,
                    purchases: 0,
                });
            entry.signals += 1;
            if CHECKOUT_COMPLETION_TYPES.contains(&event.event_type.as_str()) {
                entry.purchases += 1;
            }
        }
        let mut top_products: Vec<ProductSignals> = products.into_values().collect();
        top_products.sort_by(|a, b| b.signals.cmp(&a.signals).then(a.post_id.cmp(&b.post_id)));
        top_products.truncate(TOP_PRODUCTS_LIMIT);

        Ok(CommerceReport {
            funnel,
            cart_abandonment_rate,
            avg_order_signals,
            top_products,
        })
    }

    /// Device and referral counts come from the `device` / `source` meta
    /// keys of `device_type` / `referral_source` events; unknown values are
    /// ignored.
    pub async fn session_report(&self, range: &DateRange) -> Result<SessionReport> {
        let events = self.events_in(range).await?;

        let mut devices: BTreeMap<&'static str, i64> =
            DeviceType::ALL.iter().map(|d| (d.as_str(), 0)).collect();
        let mut referrals: BTreeMap<&'static str, i64> =
            ReferralSource::ALL.iter().map(|r| (r.as_str(), 0)).collect();

        for event in &events {
            let (tally, key) = match event.event_type.as_str() {
                "device_type" => (&mut devices, "device"),
                "referral_source" => (&mut referrals, "source"),
                _ => continue,
            };
            let Some(value) = meta_str(event, key) else {
                continue;
            };
            if let Some(count) = tally.get_mut(value.to_lowercase().as_str()) {
                *count += 1;
            }
        }

        let depths: Vec<f64> = events
            .iter()
            .filter(|e| e.event_type == "session_depth")
            .filter_map(|e| e.event_value)
            .collect();

        let visitors: HashSet<&str> = events.iter().map(|e| e.visitor_hash.as_str()).collect();
        let returning: HashSet<&str> = events
            .iter()
            .filter(|e| e.event_type == "return_visitor")
            .map(|e| e.visitor_hash.as_str())
            .collect();
        let return_visitor_pct = if visitors.is_empty() {
            0.0
        } else {
            round_to(returning.len() as f64 / visitors.len() as f64, 4)
        };

        let sessions: HashSet<&str> = events.iter().map(|e| e.session_id.as_str()).collect();
        let total_sessions = sessions.len() as i64;
        let avg_signals_per_session = if total_sessions > 0 {
            round_to(events.len() as f64 / total_sessions as f64, 2)
        } else {
            0.0
        };

        Ok(SessionReport {
            devices,
            referrals,
            avg_session_depth: round_to(mean(&depths), 2),
            return_visitor_pct,
            avg_signals_per_session,
            total_sessions,
        })
    }

    /// Most engaged posts (at most 25) ordered by `sort`, ties by post id
    pub async fn content_engagement(
        &self,
        range: &DateRange,
        sort: ContentSort,
    ) -> Result<Vec<ContentEngagement>> {
        let events = self.events_in(range).await?;

        let mut tallies: HashMap<i64, PostTally<'_>> = HashMap::new();
        for event in events.iter().filter(|e| e.target_id > 0) {
            let tally = tallies.entry(event.target_id).or_default();
            tally.total += 1;
            tally.visitors.insert(event.visitor_hash.as_str());
            match event.event_type.as_str() {
                "dwell_time" => tally.dwell.extend(event.event_value),
                "page_view" => tally.page_views += 1,
                "read_completion" => tally.read_completions += 1,
                _ => {}
            }
        }

        let mut ranked: Vec<(i64, PostTally<'_>)> = tallies.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            let order = match sort {
                ContentSort::Signals => b.total.cmp(&a.total),
                ContentSort::Visitors => b.visitors.len().cmp(&a.visitors.len()),
                ContentSort::Dwell => b.avg_dwell().total_cmp(&a.avg_dwell()),
                ContentSort::ReadRate => b.read_rate().total_cmp(&a.read_rate()),
            };
            order.then(a_id.cmp(b_id))
        });
        ranked.truncate(CONTENT_LIMIT);

        debug!(post_count = ranked.len(), sort = ?sort, "Content engagement computed");

        Ok(ranked
            .into_iter()
            .map(|(post_id, tally)| ContentEngagement {
                post_id,
                total_signals: tally.total,
                unique_visitors: tally.visitors.len() as i64,
                avg_dwell_time: round_to(tally.avg_dwell(), 2),
                read_completion_rate: round_to(tally.read_rate(), 2),
            })
            .collect())
    }

    pub async fn timeline(&self, range: &DateRange) -> Result<Timeline> {
        let events = self.events_in(range).await?;

        let mut per_day: HashMap<NaiveDate, (i64, HashSet<&str>)> = HashMap::new();
        for event in &events {
            let (count, visitors) = per_day.entry(event.created_at.date_naive()).or_default();
            *count += 1;
            visitors.insert(event.visitor_hash.as_str());
        }

        let mut timeline = Timeline {
            labels: Vec::new(),
            events: Vec::new(),
            visitors: Vec::new(),
        };
        for day in range.days() {
            let (count, visitors) = per_day
                .get(&day)
                .map_or((0, 0), |(count, visitors)| (*count, visitors.len() as i64));
            timeline.labels.push(day.format("%Y-%m-%d").to_string());
            timeline.events.push(count);
            timeline.visitors.push(visitors);
        }

        Ok(timeline)
    }
}

fn count_where(events: &[Event], predicate: impl Fn(&Event) -> bool) -> i64 {
    events.iter().filter(|e| predicate(e)).count() as i64
}

fn count_types(events: &[Event], types: &[&str]) -> i64 {
    count_where(events, |e| types.contains(&e.event_type.as_str()))
}

fn value_at_least(event: &Event, threshold: f64) -> bool {
    event.event_value.map_or(false, |v| v >= threshold)
}

fn meta_str<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.meta.as_ref()?.get(key)?.as_str()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EventSink, InMemoryEventStore, InMemoryExclusionRepository};
    use crate::models::NewEvent;
    use crate::services::exclusions::ExclusionStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, m, d, h, min, s).unwrap()
    }

    struct Ev {
        visitor: &'static str,
        session: &'static str,
        event_type: &'static str,
        target_id: i64,
        value: Option<f64>,
        meta: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    }

    fn ev(visitor: &'static str, event_type: &'static str, target_id: i64) -> Ev {
        Ev {
            visitor,
            session: "s1",
            event_type,
            target_id,
            value: None,
            meta: None,
            created_at: at(3, 5, 12, 0, 0),
        }
    }

    impl Ev {
        fn session(mut self, session: &'static str) -> Self {
            self.session = session;
            self
        }

        fn value(mut self, value: f64) -> Self {
            self.value = Some(value);
            self
        }

        fn meta(mut self, meta: serde_json::Value) -> Self {
            self.meta = Some(meta);
            self
        }

        fn at(mut self, created_at: DateTime<Utc>) -> Self {
            self.created_at = created_at;
            self
        }
    }

    async fn insights(events: Vec<Ev>) -> Insights {
        let store = Arc::new(InMemoryEventStore::new());
        for e in events {
            store
                .append(NewEvent {
                    visitor_hash: e.visitor.to_string(),
                    session_id: e.session.to_string(),
                    event_type: e.event_type.to_string(),
                    target_id: e.target_id,
                    event_value: e.value,
                    weight: 1.0,
                    meta: e.meta,
                    created_at: e.created_at,
                })
                .await
                .unwrap();
        }
        let exclusions = Arc::new(ExclusionStore::new(Arc::new(
            InMemoryExclusionRepository::new(),
        )));
        Insights::new(store, exclusions)
    }

    fn march() -> DateRange {
        DateRange {
            start: day(2026, 3, 1),
            end: day(2026, 3, 10),
        }
    }

    #[test]
    fn test_date_range_resolution() {
        let today = day(2026, 3, 10);

        let week = DateRange::resolve(Some("7d"), None, None, today);
        assert_eq!((week.start, week.end), (day(2026, 3, 4), today));

        let default = DateRange::resolve(None, None, None, today);
        assert_eq!(default.start, day(2026, 2, 9));
        assert_eq!(DateRange::resolve(Some("week"), None, None, today), default);
        assert_eq!(DateRange::resolve(Some("0d"), None, None, today), default);

        let custom = DateRange::resolve(Some("7d"), Some("2026-01-01"), Some("2026-01-31"), today);
        assert_eq!((custom.start, custom.end), (day(2026, 1, 1), day(2026, 1, 31)));

        // Inverted or unparseable custom bounds
        assert_eq!(
            DateRange::resolve(Some("7d"), Some("2026-02-01"), Some("2026-01-01"), today),
            default
        );
        assert_eq!(
            DateRange::resolve(None, Some("yesterday"), Some("2026-01-01"), today),
            default
        );

        // A single bound falls back to the preset
        assert_eq!(
            DateRange::resolve(Some("7d"), Some("2026-02-01"), Some(""), today),
            week
        );

        assert_eq!(week.since(), at(3, 4, 0, 0, 0));
        assert!(week.until() > at(3, 10, 23, 59, 59));
        assert!(week.until() < at(3, 11, 0, 0, 0));
        assert_eq!(week.days().count(), 7);
    }

    #[tokio::test]
    async fn test_engagement_funnel() {
        let insights = insights(vec![
            ev("v1", "page_view", 1).at(at(3, 1, 0, 0, 0)),
            ev("v1", "page_view", 1).at(at(3, 10, 23, 59, 59)),
            ev("v1", "page_view", 1).at(at(2, 28, 23, 59, 59)),
            ev("v1", "dwell_time", 1).value(20.0),
            ev("v1", "dwell_time", 1).value(10.0),
            ev("v1", "scroll_depth", 1).value(50.0),
            ev("v1", "scroll_depth", 1).value(49.0),
            ev("v1", "read_completion", 1),
            ev("v1", "like", 1),
            ev("v1", "bookmark_save", 1),
            ev("v1", "native_share", 1),
        ])
        .await;

        let counts: Vec<i64> = insights
            .engagement_funnel(&march())
            .await
            .unwrap()
            .into_iter()
            .map(|step| step.count)
            .collect();
        assert_eq!(counts, vec![2, 1, 1, 1, 2]);
    }

    #[tokio::test]
    async fn test_commerce_report() {
        let insights = insights(vec![
            ev("a", "product_view", 1),
            ev("a", "add_to_cart", 1),
            ev("a", "checkout_start", 1),
            ev("a", "checkout_complete", 1),
            ev("b", "product_view", 1),
            ev("b", "product_view", 2),
            ev("b", "add_to_cart", 2),
            ev("b", "add_to_cart", 1),
            ev("b", "page_view", 3),
            ev("c", "purchase_complete", 2),
            ev("c", "like", 5),
        ])
        .await;

        let report = insights.commerce_report(&march()).await.unwrap();

        let funnel: Vec<i64> = report.funnel.iter().map(|step| step.count).collect();
        assert_eq!(funnel, vec![3, 3, 1, 2]);
        assert_eq!(report.cart_abandonment_rate, 0.3333);
        // a: 4 events, c: 2 events
        assert_eq!(report.avg_order_signals, 3.0);
        assert_eq!(
            report.top_products,
            vec![
                ProductSignals {
                    post_id: 1,
                    signals: 5,
                    purchases: 1
                },
                ProductSignals {
                    post_id: 2,
                    signals: 3,
                    purchases: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_commerce_report_without_carts() {
        let insights = insights(vec![ev("a", "purchase_complete", 1)]).await;
        let report = insights.commerce_report(&march()).await.unwrap();
        assert_eq!(report.cart_abandonment_rate, 0.0);
        assert_eq!(report.avg_order_signals, 1.0);
    }

    #[tokio::test]
    async fn test_session_report() {
        let insights = insights(vec![
            ev("v1", "device_type", 0).meta(json!({"device": "mobile"})),
            ev("v1", "referral_source", 0).meta(json!({"source": "organic"})),
            ev("v1", "session_depth", 0).value(3.0),
            ev("v1", "return_visitor", 0).session("s2"),
            ev("v2", "device_type", 0).session("s3").meta(json!({"device": "Mobile"})),
            ev("v2", "referral_source", 0).session("s3").meta(json!({"source": "email"})),
            ev("v2", "session_depth", 0).session("s3").value(4.0),
            ev("v3", "device_type", 0).session("s4").meta(json!({"device": "desktop"})),
            ev("v3", "device_type", 0).session("s4").meta(json!({"device": "watch"})),
            ev("v4", "device_type", 0).session("s5"),
        ])
        .await;

        let report = insights.session_report(&march()).await.unwrap();

        assert_eq!(
            report.devices,
            BTreeMap::from([("desktop", 1), ("mobile", 2), ("tablet", 0)])
        );
        assert_eq!(report.referrals.len(), 6);
        assert_eq!(report.referrals["organic"], 1);
        assert_eq!(report.referrals["email"], 1);
        assert_eq!(report.referrals["direct"], 0);
        assert_eq!(report.avg_session_depth, 3.5);
        assert_eq!(report.return_visitor_pct, 0.25);
        assert_eq!(report.total_sessions, 5);
        assert_eq!(report.avg_signals_per_session, 2.0);
    }

    #[tokio::test]
    async fn test_content_engagement_sorting() {
        let insights = insights(vec![
            ev("v1", "page_view", 1),
            ev("v2", "page_view", 1),
            ev("v1", "read_completion", 1),
            ev("v1", "dwell_time", 1).value(30.0),
            ev("v3", "page_view", 2),
            ev("v3", "read_completion", 2),
            ev("v3", "dwell_time", 2).value(10.0),
            ev("v3", "dwell_time", 2).value(20.0),
            ev("v1", "like", 3),
            ev("v1", "page_view", 0),
        ])
        .await;

        let order = |posts: Vec<ContentEngagement>| -> Vec<i64> {
            posts.into_iter().map(|p| p.post_id).collect()
        };

        let by_signals = insights
            .content_engagement(&march(), ContentSort::Signals)
            .await
            .unwrap();
        assert_eq!(
            by_signals[0],
            ContentEngagement {
                post_id: 1,
                total_signals: 4,
                unique_visitors: 2,
                avg_dwell_time: 30.0,
                read_completion_rate: 0.5,
            }
        );
        assert_eq!(order(by_signals), vec![1, 2, 3]);

        for (sort, expected) in [
            ("visitors", vec![1, 2, 3]),
            ("dwell", vec![1, 2, 3]),
            ("read_rate", vec![2, 1, 3]),
        ] {
            let posts = insights
                .content_engagement(&march(), sort.parse().unwrap())
                .await
                .unwrap();
            assert_eq!(order(posts), expected, "sort {sort}");
        }

        assert!(matches!(
            "popularity".parse::<ContentSort>(),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_content_engagement_is_capped() {
        let events = (1..=30).map(|post_id| ev("v1", "page_view", post_id)).collect();
        let insights = insights(events).await;

        let posts = insights
            .content_engagement(&march(), ContentSort::default())
            .await
            .unwrap();
        assert_eq!(posts.len(), 25);
        assert_eq!(posts[0].post_id, 1);
    }

    #[tokio::test]
    async fn test_timeline_zero_fills_days() {
        let insights = insights(vec![
            ev("v1", "page_view", 1).at(at(3, 8, 9, 0, 0)),
            ev("v1", "like", 1).at(at(3, 8, 10, 0, 0)),
            ev("v1", "page_view", 2).at(at(3, 10, 9, 0, 0)),
            ev("v2", "page_view", 2).at(at(3, 10, 23, 0, 0)),
            ev("v2", "page_view", 2).at(at(3, 11, 0, 0, 0)),
        ])
        .await;

        let range = DateRange {
            start: day(2026, 3, 8),
            end: day(2026, 3, 10),
        };
        let timeline = insights.timeline(&range).await.unwrap();

        assert_eq!(
            timeline.labels,
            vec!["2026-03-08", "2026-03-09", "2026-03-10"]
        );
        assert_eq!(timeline.events, vec![2, 0, 2]);
        assert_eq!(timeline.visitors, vec![1, 0, 2]);
    }
}
