//! Session context derived from request headers: where the visitor came
//! from and what kind of device they are on.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const SEARCH_ENGINES: [&str; 6] = ["google", "bing", "yahoo", "duckduckgo", "baidu", "yandex"];

const SOCIAL_PLATFORMS: [&str; 9] = [
    "facebook",
    "twitter",
    "linkedin",
    "instagram",
    "pinterest",
    "reddit",
    "tiktok",
    "youtube",
    "t.co",
];

const EMAIL_SERVICES: [&str; 4] = ["mail.google", "outlook", "mail.yahoo", "protonmail"];

static TABLET_UA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)iPad|Tablet").expect("Invalid tablet user agent regex"));

static MOBILE_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Mobile|iPhone|iPod|Android.*Mobile|webOS|BlackBerry|Opera Mini|IEMobile")
        .expect("Invalid mobile user agent regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralSource {
    Direct,
    Internal,
    Organic,
    Social,
    Email,
    Referral,
}

impl ReferralSource {
    pub const ALL: [ReferralSource; 6] = [
        ReferralSource::Organic,
        ReferralSource::Direct,
        ReferralSource::Social,
        ReferralSource::Referral,
        ReferralSource::Email,
        ReferralSource::Internal,
    ];

    /// Classify a Referer header against the site's own host. Host
    /// substrings are checked in the order organic, social, email.
    pub fn classify(referer: Option<&str>, site_host: &str) -> Self {
        let host = referer
            .filter(|r| !r.trim().is_empty())
            .and_then(|r| Url::parse(r).ok())
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));

        let Some(host) = host else {
            return ReferralSource::Direct;
        };

        if host.eq_ignore_ascii_case(site_host) {
            return ReferralSource::Internal;
        }

        let contains_any = |needles: &[&str]| needles.iter().any(|n| host.contains(n));

        if contains_any(&SEARCH_ENGINES) {
            ReferralSource::Organic
        } else if contains_any(&SOCIAL_PLATFORMS) {
            ReferralSource::Social
        } else if contains_any(&EMAIL_SERVICES) {
            ReferralSource::Email
        } else {
            ReferralSource::Referral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralSource::Direct => "direct",
            ReferralSource::Internal => "internal",
            ReferralSource::Organic => "organic",
            ReferralSource::Social => "social",
            ReferralSource::Email => "email",
            ReferralSource::Referral => "referral",
        }
    }
}

impl fmt::Display for ReferralSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Desktop, DeviceType::Mobile, DeviceType::Tablet];

    /// Tablets are checked first since their agents often mention Mobile
    pub fn classify(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent else {
            return DeviceType::Desktop;
        };

        if TABLET_UA.is_match(ua) || is_android_tablet(ua) {
            DeviceType::Tablet
        } else if MOBILE_UA.is_match(ua) {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An "Android" token with no "Mobile" anywhere after it
fn is_android_tablet(ua: &str) -> bool {
    let ua = ua.to_ascii_lowercase();
    ua.match_indices("android")
        .any(|(idx, token)| !ua[idx + token.len()..].contains("mobile"))
}

/// Per-request session attributes attached to tracker data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub referral_source: ReferralSource,
    pub device_type: DeviceType,
    pub is_logged_in: bool,
    pub is_first_visit: bool,
}

impl SessionContext {
    pub fn from_headers(
        referer: Option<&str>,
        user_agent: Option<&str>,
        site_host: &str,
        is_logged_in: bool,
        is_returning: bool,
    ) -> Self {
        Self {
            referral_source: ReferralSource::classify(referer, site_host),
            device_type: DeviceType::classify(user_agent),
            is_logged_in,
            is_first_visit: !is_returning,
        }
    }
}
