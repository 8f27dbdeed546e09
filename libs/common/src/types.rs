//! Backend payload types.
//!
//! Every list field defaults to empty: a response missing its top-level
//! array is treated as "no entries", not as a decode failure.

use serde::{Deserialize, Serialize};

// ── Reference data ────────────────────────────────────────────────────

/// A supported city as returned by GET /api/cities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub province: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitiesResponse {
    #[serde(default)]
    pub cities: Vec<City>,
}

/// Platform counters from GET /api/stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    #[serde(default)]
    pub cities: u64,
    #[serde(default)]
    pub risk_zones: u64,
    #[serde(default)]
    pub evacuation_points: u64,
    #[serde(default)]
    pub users: u64,
    #[serde(default)]
    pub reports: u64,
}

// ── Weather & risk ────────────────────────────────────────────────────

/// Current conditions from GET /api/weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    #[serde(default)]
    pub source: String,
    // Numeric fields arrive as numbers, numeric strings, or "N/A".
    #[serde(default)]
    pub temperature: serde_json::Value,
    #[serde(default)]
    pub humidity: serde_json::Value,
    #[serde(default)]
    pub wind_speed: serde_json::Value,
    #[serde(default)]
    pub wind_direction: serde_json::Value,
    #[serde(default)]
    pub weather_code: i64,
    #[serde(default)]
    pub weather_desc: String,
    #[serde(default)]
    pub local_datetime: String,
    #[serde(default)]
    pub visibility: serde_json::Value,
    #[serde(default)]
    pub uv_index: serde_json::Value,
    #[serde(default)]
    pub forecast: Vec<serde_json::Value>,
}

/// City risk assessment from GET /api/risk.
///
/// The backend embeds its own `weather` object here; it is deliberately not
/// decoded so that weather only ever reaches a view from the weather resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub alert_level: String,
    #[serde(default)]
    pub flood_risk: String,
    #[serde(default)]
    pub landslide_risk: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub timestamp: String,
}

// ── Earthquakes & warnings ────────────────────────────────────────────

/// One earthquake record (latest or felt list).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Earthquake {
    #[serde(default)]
    pub datetime: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub magnitude: String,
    #[serde(default)]
    pub depth: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub potential: String,
    #[serde(default)]
    pub felt: String,
}

impl Earthquake {
    pub fn magnitude_value(&self) -> Option<f64> {
        self.magnitude.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarthquakesFeltResponse {
    #[serde(default)]
    pub earthquakes: Vec<Earthquake>,
}

/// A nowcast warning from GET /api/early-warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarlyWarning {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EarlyWarningsResponse {
    #[serde(default)]
    pub warnings: Vec<EarlyWarning>,
}

// ── Map data ──────────────────────────────────────────────────────────

/// A circular hazard zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskZone {
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_zone_radius")]
    pub radius: f64,
    /// "high" or "medium".
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

fn default_zone_radius() -> f64 {
    500.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskZonesResponse {
    #[serde(default)]
    pub zones: Vec<RiskZone>,
    #[serde(default)]
    pub weather: Option<WeatherReport>,
}

/// A shelter / gathering point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvacuationPoint {
    #[serde(default)]
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub capacity: u64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvacuationResponse {
    #[serde(default)]
    pub points: Vec<EvacuationPoint>,
}

/// A citizen damage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub reporter_name: String,
    /// "pending", "approved" or "rejected".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportsResponse {
    #[serde(default)]
    pub reports: Vec<DamageReport>,
}

/// Admin moderation queue from GET /api/admin/reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminReports {
    #[serde(default)]
    pub reports: Vec<DamageReport>,
    #[serde(default)]
    pub pending_count: u64,
    #[serde(default)]
    pub approved_count: u64,
    #[serde(default)]
    pub rejected_count: u64,
}

/// Response to approve / reject / delete.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// ── Submissions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessDamageRequest {
    /// `data:<mime>;base64,<payload>` URI.
    pub image: String,
}

/// Successful image assessment from POST /api/assess-damage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageAssessment {
    #[serde(default)]
    pub disaster_type: Option<String>,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub damage_description: String,
    #[serde(default)]
    pub affected_areas: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub estimated_impact: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Body of POST /api/reports.
#[derive(Debug, Clone, Serialize)]
pub struct NewReport {
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub description: String,
    pub image_url: String,
    pub reporter_name: String,
    pub reporter_phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReportResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub report: Option<serde_json::Value>,
}

// ── Auth ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub reports_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

/// A persisted login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: AuthUser,
}
