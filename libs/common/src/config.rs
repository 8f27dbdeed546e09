//! Sync layer configuration types.

use serde::{Deserialize, Serialize};

/// Top-level sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Backend base URL, without trailing slash.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request time budget for a single transport attempt.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// City id the views are filtered by at startup (e.g. "jakarta").
    #[serde(default = "default_city")]
    pub default_city: String,

    /// Value sent as `X-Admin-Secret` on admin endpoints. Empty disables them.
    #[serde(default)]
    pub admin_secret: String,

    /// Retry policy shared by every resource that does not override it.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Polled resources.
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceConfig>,

    /// Which map layer categories are drawn.
    #[serde(default)]
    pub layer_filter: LayerFilter,

    /// Where the auth token is persisted. Empty keeps it in memory only.
    #[serde(default)]
    pub token_path: String,
}

/// Retry behavior for one resource (or the global default).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch cycle, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay unit; the wait after failed attempt `n` is `n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,

    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,

    #[serde(default = "default_true")]
    pub retry_on_network: bool,
}

/// One polled backend resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Unique key (e.g. "risk", "weather").
    pub name: String,
    /// Path template relative to `api_base_url`; `{city}` is substituted.
    pub endpoint: String,
    pub refresh_interval_ms: u64,
    /// Age after which the cached value is flagged stale. Defaults to 3x the interval.
    #[serde(default)]
    pub max_age_ms: Option<u64>,
    /// Per-resource override of the global retry policy.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ResourceConfig {
    pub fn new(name: &str, endpoint: &str, refresh_interval_ms: u64) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            refresh_interval_ms,
            max_age_ms: None,
            retry: None,
        }
    }

    pub fn effective_max_age_ms(&self) -> u64 {
        self.max_age_ms
            .unwrap_or_else(|| self.refresh_interval_ms.saturating_mul(3))
    }
}

/// Map layer categories shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerFilter {
    #[default]
    All,
    Zones,
    Evacuation,
    Reports,
}

impl LayerFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "zones" => Some(Self::Zones),
            "evacuation" => Some(Self::Evacuation),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }
}

// ── Well-known resource names ─────────────────────────────────────────

pub const RESOURCE_RISK: &str = "risk";
pub const RESOURCE_WEATHER: &str = "weather";
pub const RESOURCE_EARTHQUAKE: &str = "earthquake";
pub const RESOURCE_EARTHQUAKES_FELT: &str = "earthquakes-felt";
pub const RESOURCE_EARLY_WARNINGS: &str = "early-warnings";
pub const RESOURCE_EVACUATION: &str = "evacuation";
pub const RESOURCE_RISK_ZONES: &str = "risk-zones";
pub const RESOURCE_REPORTS: &str = "reports";
pub const RESOURCE_CITIES: &str = "cities";
pub const RESOURCE_STATS: &str = "stats";
pub const RESOURCE_ADMIN_REPORTS: &str = "admin-reports";

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_api_base_url() -> String {
    "http://localhost:5000".into()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_city() -> String {
    "jakarta".into()
}
fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_retryable_status_codes() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

fn default_resources() -> Vec<ResourceConfig> {
    vec![
        // Map data refreshes fast; all cities are fetched and filtered locally.
        ResourceConfig::new(RESOURCE_EVACUATION, "/api/evacuation", 5_000),
        ResourceConfig::new(RESOURCE_RISK_ZONES, "/api/risk-zones", 5_000),
        ResourceConfig::new(RESOURCE_REPORTS, "/api/reports", 5_000),
        ResourceConfig::new(RESOURCE_EARLY_WARNINGS, "/api/early-warnings", 30_000),
        ResourceConfig::new(RESOURCE_EARTHQUAKE, "/api/earthquake", 60_000),
        ResourceConfig::new(RESOURCE_EARTHQUAKES_FELT, "/api/earthquakes-felt", 60_000),
        ResourceConfig::new(RESOURCE_RISK, "/api/risk?city={city}", 60_000),
        ResourceConfig::new(RESOURCE_WEATHER, "/api/weather?city={city}", 60_000),
        ResourceConfig::new(RESOURCE_STATS, "/api/stats", 300_000),
        ResourceConfig::new(RESOURCE_CITIES, "/api/cities", 3_600_000),
    ]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            retryable_status_codes: default_retryable_status_codes(),
            retry_on_timeout: true,
            retry_on_network: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            default_city: default_city(),
            admin_secret: String::new(),
            retry: RetryConfig::default(),
            resources: default_resources(),
            layer_filter: LayerFilter::default(),
            token_path: String::new(),
        }
    }
}

impl SyncConfig {
    /// Retry config in effect for `resource`.
    pub fn retry_for<'a>(&'a self, resource: &'a ResourceConfig) -> &'a RetryConfig {
        resource.retry.as_ref().unwrap_or(&self.retry)
    }

    /// Adds the admin report queue at its 30s cadence unless already present.
    pub fn with_admin_reports(mut self) -> Self {
        if !self.resources.iter().any(|r| r.name == RESOURCE_ADMIN_REPORTS) {
            self.resources.push(ResourceConfig::new(
                RESOURCE_ADMIN_REPORTS,
                "/api/admin/reports",
                30_000,
            ));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_observed_cadences() {
        let cfg = SyncConfig::default();
        let interval = |name: &str| {
            cfg.resources
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.refresh_interval_ms)
        };
        assert_eq!(interval(RESOURCE_RISK_ZONES), Some(5_000));
        assert_eq!(interval(RESOURCE_EARLY_WARNINGS), Some(30_000));
        assert_eq!(interval(RESOURCE_EARTHQUAKE), Some(60_000));
        assert_eq!(interval(RESOURCE_ADMIN_REPORTS), None);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: SyncConfig = serde_json::from_str(
            r#"{"api_base_url": "https://siaga.example", "retry": {"max_attempts": 2}}"#,
        )
        .expect("config should deserialize");
        assert_eq!(cfg.api_base_url, "https://siaga.example");
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.retry.base_delay_ms, 1000);
        assert_eq!(cfg.retry.retryable_status_codes, vec![408, 429, 500, 502, 503, 504]);
        assert_eq!(cfg.default_city, "jakarta");
        assert!(!cfg.resources.is_empty());
    }

    #[test]
    fn test_max_age_defaults_to_three_intervals() {
        let mut res = ResourceConfig::new("x", "/api/x", 5_000);
        assert_eq!(res.effective_max_age_ms(), 15_000);
        res.max_age_ms = Some(7_000);
        assert_eq!(res.effective_max_age_ms(), 7_000);
    }

    #[test]
    fn test_retry_override() {
        let mut cfg = SyncConfig::default();
        let mut res = ResourceConfig::new("x", "/api/x", 5_000);
        assert_eq!(cfg.retry_for(&res).max_attempts, 4);
        res.retry = Some(RetryConfig { max_attempts: 1, ..RetryConfig::default() });
        cfg.resources.push(res.clone());
        assert_eq!(cfg.retry_for(&res).max_attempts, 1);
    }

    #[test]
    fn test_layer_filter_parse() {
        assert_eq!(LayerFilter::parse(" Zones "), Some(LayerFilter::Zones));
        assert_eq!(LayerFilter::parse("everything"), None);
    }
}
