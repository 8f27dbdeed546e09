//! Typed client for the SiagaAI backend REST API.

use crate::endpoint::{encode_component, encode_path_segment};
use crate::retry::{send_with_retry, RetryPolicy};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::{
    AdminActionResponse, AdminReports, AssessDamageRequest, ChatRequest, ChatResponse,
    CitiesResponse, DamageAssessment, Earthquake, EarthquakesFeltResponse, EarlyWarningsResponse,
    Error, EvacuationResponse, LoginResponse, NewReport, PlatformStats, ReportsResponse, Result,
    RiskAssessment, RiskZonesResponse, SubmitReportResponse, SyncConfig, VerifyResponse,
    WeatherReport,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const ADMIN_SECRET_HEADER: &str = "X-Admin-Secret";

#[derive(Clone)]
pub struct SiagaClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    admin_secret: Option<String>,
}

impl SiagaClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            admin_secret: None,
        }
    }

    /// HTTP client for the configured backend, with the global retry policy
    /// and the admin secret when one is set.
    pub fn from_config(cfg: &SyncConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            &cfg.api_base_url,
            Duration::from_millis(cfg.request_timeout_ms),
        )?;
        info!("SiagaAI client targeting {}", cfg.api_base_url);
        Ok(Self::new(Arc::new(transport), RetryPolicy::from_config(&cfg.retry))
            .with_admin_secret(&cfg.admin_secret))
    }

    pub fn with_admin_secret(mut self, secret: &str) -> Self {
        let secret = secret.trim();
        self.admin_secret = (!secret.is_empty()).then(|| secret.to_string());
        self
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn has_admin_secret(&self) -> bool {
        self.admin_secret.is_some()
    }

    // ── Read endpoints ───────────────────────────────────────────────

    pub async fn cities(&self) -> Result<CitiesResponse> {
        self.execute(ApiRequest::get("/api/cities")).await
    }

    pub async fn stats(&self) -> Result<PlatformStats> {
        self.execute(ApiRequest::get("/api/stats")).await
    }

    pub async fn risk(&self, city: &str) -> Result<RiskAssessment> {
        self.execute(ApiRequest::get(format!("/api/risk?city={}", encode_component(city))))
            .await
    }

    pub async fn weather(&self, city: &str) -> Result<WeatherReport> {
        self.execute(ApiRequest::get(format!(
            "/api/weather?city={}",
            encode_component(city)
        )))
        .await
    }

    pub async fn earthquake(&self) -> Result<Earthquake> {
        self.execute(ApiRequest::get("/api/earthquake")).await
    }

    pub async fn earthquakes_felt(&self) -> Result<EarthquakesFeltResponse> {
        self.execute(ApiRequest::get("/api/earthquakes-felt")).await
    }

    pub async fn early_warnings(&self) -> Result<EarlyWarningsResponse> {
        self.execute(ApiRequest::get("/api/early-warnings")).await
    }

    pub async fn evacuation(&self) -> Result<EvacuationResponse> {
        self.execute(ApiRequest::get("/api/evacuation")).await
    }

    pub async fn risk_zones(&self) -> Result<RiskZonesResponse> {
        self.execute(ApiRequest::get("/api/risk-zones")).await
    }

    pub async fn reports(&self) -> Result<ReportsResponse> {
        self.execute(ApiRequest::get("/api/reports")).await
    }

    // ── Submissions ──────────────────────────────────────────────────

    pub async fn chat(&self, message: &str, city: &str) -> Result<ChatResponse> {
        let body = serde_json::to_value(ChatRequest {
            message: message.to_string(),
            city: city.to_string(),
        })?;
        self.execute(ApiRequest::post("/api/chat", body)).await
    }

    /// Upload an image for AI damage assessment. A non-disaster photo comes
    /// back as `Error::HttpStatus { status: 400, .. }` carrying the reason.
    pub async fn assess_damage(&self, image: &[u8], mime: &str) -> Result<DamageAssessment> {
        let body = serde_json::to_value(AssessDamageRequest {
            image: image_data_uri(image, mime),
        })?;
        self.execute(ApiRequest::post("/api/assess-damage", body)).await
    }

    pub async fn submit_report(&self, report: &NewReport) -> Result<SubmitReportResponse> {
        let body = serde_json::to_value(report)?;
        self.execute(ApiRequest::post("/api/reports", body)).await
    }

    // ── Admin ────────────────────────────────────────────────────────

    /// Moderation queue; `status` of `None` or `"all"` lists everything.
    pub async fn admin_reports(&self, status: Option<&str>) -> Result<AdminReports> {
        let path = match status {
            Some(s) if !s.is_empty() && s != "all" => {
                format!("/api/admin/reports?status={}", encode_component(s))
            }
            _ => "/api/admin/reports".to_string(),
        };
        let request = self.admin(ApiRequest::get(path))?;
        self.execute(request).await
    }

    pub async fn approve_report(&self, id: &str) -> Result<AdminActionResponse> {
        let path = format!("/api/admin/reports/{}/approve", encode_path_segment(id));
        let request = self.admin(ApiRequest::post(path, json!({})))?;
        self.execute(request).await
    }

    pub async fn reject_report(&self, id: &str) -> Result<AdminActionResponse> {
        let path = format!("/api/admin/reports/{}/reject", encode_path_segment(id));
        let request = self.admin(ApiRequest::post(path, json!({})))?;
        self.execute(request).await
    }

    pub async fn delete_report(&self, id: &str) -> Result<AdminActionResponse> {
        let path = format!("/api/admin/reports/{}", encode_path_segment(id));
        let request = self.admin(ApiRequest::delete(path))?;
        self.execute(request).await
    }

    // ── Auth ─────────────────────────────────────────────────────────

    pub async fn google_login(&self, credential: &str) -> Result<LoginResponse> {
        self.execute(ApiRequest::post(
            "/api/auth/google",
            json!({ "credential": credential }),
        ))
        .await
    }

    pub async fn verify_token(&self, token: &str) -> Result<VerifyResponse> {
        self.execute(ApiRequest::post("/api/auth/verify", json!({ "token": token })))
            .await
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        let request = ApiRequest::post("/api/auth/logout", json!({}))
            .with_header("Authorization", format!("Bearer {}", token));
        let delivery = send_with_retry(&*self.transport, &RetryPolicy::no_retry(), &request, None)
            .await;
        delivery.into_success().map(|_| ())
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    fn admin(&self, request: ApiRequest) -> Result<ApiRequest> {
        let secret = self
            .admin_secret
            .as_deref()
            .ok_or_else(|| Error::Auth("admin secret is not configured".into()))?;
        Ok(request.with_header(ADMIN_SECRET_HEADER, secret))
    }

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let delivery = send_with_retry(&*self.transport, &self.retry, &request, None).await;
        let attempts = delivery.attempts;
        let resp = delivery.into_success()?;
        debug!(
            "{} {} -> {} after {} attempt(s)",
            request.method.as_str(),
            request.path,
            resp.status,
            attempts
        );
        decode(parse_payload(&resp)?)
    }
}

/// Parse a successful body and reject application-level failures: a
/// top-level string `error` field or `"success": false`.
pub fn parse_payload(resp: &ApiResponse) -> Result<Value> {
    if resp.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(&resp.body)?;
    check_application_error(&value)?;
    Ok(value)
}

pub fn check_application_error(value: &Value) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return Ok(());
    };
    let message = obj.get("error").and_then(|e| e.as_str());
    if let Some(message) = message {
        return Err(Error::Application(message.to_string()));
    }
    if obj.get("success").and_then(|s| s.as_bool()) == Some(false) {
        return Err(Error::Application("request rejected".into()));
    }
    Ok(())
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

pub fn image_data_uri(image: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(image))
}
