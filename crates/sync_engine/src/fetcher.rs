//! Per-resource fetcher with coalesced refreshes and stale-while-revalidate.
//!
//! A fetcher owns the latest [`FetchResult`] of one endpoint. Concurrent
//! refresh requests share a single in-flight cycle. A failed cycle keeps the
//! previous value and records the error next to it.

use chrono::{DateTime, Utc};
use common::{Error, ResourceConfig, Result, SyncConfig};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use siaga_client::rest::{decode, parse_payload, ADMIN_SECRET_HEADER};
use siaga_client::{send_with_retry, ApiRequest, EndpointTemplate, RetryPolicy, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Static description of a polled resource.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub name: String,
    pub endpoint: EndpointTemplate,
    pub refresh_interval: Duration,
    pub max_age: Duration,
    pub retry: RetryPolicy,
    pub headers: Vec<(String, String)>,
}

impl ResourceSpec {
    pub fn new(name: &str, endpoint: &str, refresh_interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            endpoint: EndpointTemplate::new(endpoint),
            refresh_interval,
            max_age: refresh_interval.saturating_mul(3),
            retry: RetryPolicy::default(),
            headers: Vec::new(),
        }
    }

    pub fn from_config(cfg: &SyncConfig, res: &ResourceConfig) -> Self {
        let mut headers = Vec::new();
        if res.endpoint.starts_with("/api/admin") && !cfg.admin_secret.is_empty() {
            headers.push((ADMIN_SECRET_HEADER.to_string(), cfg.admin_secret.clone()));
        }
        Self {
            name: res.name.clone(),
            endpoint: EndpointTemplate::new(res.endpoint.as_str()),
            refresh_interval: Duration::from_millis(res.refresh_interval_ms),
            max_age: Duration::from_millis(res.effective_max_age_ms()),
            retry: RetryPolicy::from_config(cfg.retry_for(res)),
            headers,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Latest known state of a resource.
#[derive(Debug, Clone)]
pub struct FetchResult<T> {
    /// Last successfully decoded value. Survives later failures.
    pub value: Option<T>,
    /// Wall-clock time `value` was received.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Error of the most recent cycle; cleared by the next success.
    pub error: Option<Error>,
    /// No value yet, or the value is older than the resource's max age.
    pub is_stale: bool,
    /// City the value was fetched for, when the endpoint is city-scoped.
    pub scope: Option<String>,
    /// Attempts made by the most recent cycle.
    pub attempts: u32,
    pub(crate) received: Option<Instant>,
    pub(crate) max_age: Option<Duration>,
}

impl<T> Default for FetchResult<T> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            error: None,
            is_stale: true,
            scope: None,
            attempts: 0,
            received: None,
            max_age: None,
        }
    }
}

impl<T: Clone> FetchResult<T> {
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Time since the value was received, on the tokio clock.
    pub fn age(&self) -> Option<Duration> {
        self.received.map(|at| at.elapsed())
    }

    /// Staleness evaluated now. Results built outside a fetcher carry no
    /// max age and keep their flag.
    pub fn stale_now(&self) -> bool {
        if self.value.is_none() {
            return true;
        }
        match (self.received, self.max_age) {
            (Some(at), Some(max_age)) => at.elapsed() > max_age,
            _ => self.is_stale,
        }
    }

    pub(crate) fn restamped(&self) -> Self {
        let mut out = self.clone();
        out.is_stale = out.stale_now();
        out
    }

    fn aged(&self, max_age: Duration) -> Self {
        let mut out = self.clone();
        out.max_age = Some(max_age);
        out.is_stale = match self.received {
            Some(_) => out.stale_now(),
            None => true,
        };
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Fetching,
}

/// Receives every applied result, synchronously and in completion order.
pub trait UpdateSink<T>: Send + Sync {
    fn publish(&self, resource: &str, result: &FetchResult<T>);
}

type Cycle<T> = Shared<BoxFuture<'static, FetchResult<T>>>;

struct InFlight<T> {
    id: u64,
    path: String,
    cycle: Cycle<T>,
}

struct Inner<T> {
    spec: ResourceSpec,
    transport: Arc<dyn Transport>,
    city: watch::Receiver<String>,
    sink: Option<Arc<dyn UpdateSink<T>>>,
    state: Mutex<FetchResult<T>>,
    in_flight: Mutex<Option<InFlight<T>>>,
    next_cycle: AtomicU64,
    stopped: AtomicBool,
}

/// Handle to one resource's fetch state. Cheap to clone.
pub struct ResourceFetcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    // State stays consistent across a panicking holder; recover the guard.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T> ResourceFetcher<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        spec: ResourceSpec,
        transport: Arc<dyn Transport>,
        city: watch::Receiver<String>,
        sink: Option<Arc<dyn UpdateSink<T>>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                spec,
                transport,
                city,
                sink,
                state: Mutex::new(FetchResult::default()),
                in_flight: Mutex::new(None),
                next_cycle: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.inner.spec
    }

    pub fn phase(&self) -> FetchPhase {
        if lock(&self.inner.in_flight).is_some() {
            FetchPhase::Fetching
        } else {
            FetchPhase::Idle
        }
    }

    /// Latest result with staleness evaluated now.
    pub fn result(&self) -> FetchResult<T> {
        lock(&self.inner.state).aged(self.inner.spec.max_age)
    }

    /// Run one fetch cycle, or join the cycle already in flight for the
    /// same path. A cycle rendered for a previous city is never joined.
    pub async fn fetch_once(&self) -> FetchResult<T> {
        let city = self.inner.city.borrow().clone();
        let path = self.inner.spec.endpoint.render(&city);

        let cycle = {
            let mut slot = lock(&self.inner.in_flight);
            let joinable = slot
                .as_ref()
                .filter(|f| f.path == path)
                .map(|f| f.cycle.clone());
            match joinable {
                Some(existing) => {
                    debug!("{}: joining in-flight fetch", self.name());
                    existing
                }
                None => {
                    if let Some(old) = slot.as_ref() {
                        debug!("{}: {} superseded by {}", self.name(), old.path, path);
                    }
                    let id = self.inner.next_cycle.fetch_add(1, Ordering::Relaxed);
                    let inner = Arc::clone(&self.inner);
                    let request_path = path.clone();
                    let cycle = async move {
                        let result = inner.run_cycle(city, request_path).await;
                        let mut slot = lock(&inner.in_flight);
                        if slot.as_ref().is_some_and(|f| f.id == id) {
                            *slot = None;
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        id,
                        path,
                        cycle: cycle.clone(),
                    });
                    cycle
                }
            }
        };
        cycle.await
    }

    /// Stop applying results. An in-flight cycle finishes its current
    /// attempt but its outcome is discarded and no further retries run.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }
}

impl<T> Inner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn run_cycle(&self, city: String, path: String) -> FetchResult<T> {
        if self.stopped.load(Ordering::Acquire) {
            return lock(&self.state).aged(self.spec.max_age);
        }

        let mut request = ApiRequest::get(path);
        for (name, value) in &self.spec.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }

        let delivery =
            send_with_retry(&*self.transport, &self.spec.retry, &request, Some(&self.stopped))
                .await;
        let attempts = delivery.attempts;
        let decoded = delivery
            .into_success()
            .and_then(|resp| parse_payload(&resp))
            .and_then(decode::<T>);

        let snapshot = {
            let mut state = lock(&self.state);
            if self.stopped.load(Ordering::Acquire) {
                debug!("{}: stopped, discarding fetch outcome", self.spec.name);
                return state.aged(self.spec.max_age);
            }
            if self.spec.endpoint.uses_city() && *self.city.borrow() != city {
                debug!(
                    "{}: city moved on from {}, discarding fetch outcome",
                    self.spec.name, city
                );
                return state.aged(self.spec.max_age);
            }

            state.attempts = attempts;
            match decoded {
                Ok(value) => {
                    state.value = Some(value);
                    state.fetched_at = Some(Utc::now());
                    state.received = Some(Instant::now());
                    state.error = None;
                    state.scope = self.spec.endpoint.uses_city().then(|| city.clone());
                }
                Err(e) => {
                    warn!(
                        "{}: fetch failed after {} attempt(s): {}{}",
                        self.spec.name,
                        attempts,
                        e,
                        if state.value.is_some() { " (keeping previous value)" } else { "" }
                    );
                    state.error = Some(e);
                }
            }
            state.aged(self.spec.max_age)
        };

        if let Some(sink) = &self.sink {
            sink.publish(&self.spec.name, &snapshot);
        }
        snapshot
    }
}

/// Build one fetcher per configured resource, rejecting duplicate names.
pub fn fetchers_from_config<T>(
    cfg: &SyncConfig,
    transport: Arc<dyn Transport>,
    city: watch::Receiver<String>,
    sink: Option<Arc<dyn UpdateSink<T>>>,
) -> Result<Vec<ResourceFetcher<T>>>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let mut out: Vec<ResourceFetcher<T>> = Vec::with_capacity(cfg.resources.len());
    for res in &cfg.resources {
        if out.iter().any(|f| f.name() == res.name) {
            return Err(Error::Config(format!("duplicate resource name '{}'", res.name)));
        }
        out.push(ResourceFetcher::new(
            ResourceSpec::from_config(cfg, res),
            Arc::clone(&transport),
            city.clone(),
            sink.clone(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use siaga_client::mock::{Scripted, ScriptedTransport};

    fn fetcher(
        transport: &Arc<ScriptedTransport>,
        spec: ResourceSpec,
        city: &str,
    ) -> (ResourceFetcher<Value>, watch::Sender<String>) {
        let (tx, rx) = watch::channel(city.to_string());
        (ResourceFetcher::new(spec, transport.clone(), rx, None), tx)
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&common::RetryConfig {
            max_attempts,
            base_delay_ms: 100,
            ..common::RetryConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always("/api/reports", Scripted::json(json!({"reports": [{"_id": "r1"}]})));
        transport.set_latency("/api/reports", Duration::from_millis(200));
        let (f, _city) = fetcher(
            &transport,
            ResourceSpec::new("reports", "/api/reports", Duration::from_secs(5)),
            "jakarta",
        );

        let (a, b) = tokio::join!(f.fetch_once(), f.fetch_once());

        assert_eq!(transport.calls_to("/api/reports"), 1);
        assert_eq!(a.value, b.value);
        assert_eq!(a.fetched_at, b.fetched_at);
        assert_eq!(f.phase(), FetchPhase::Idle);

        // The next refresh after completion is a fresh cycle.
        f.fetch_once().await;
        assert_eq!(transport.calls_to("/api/reports"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_value() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/api/stats", Scripted::json(json!({"cities": 12})));
        transport.always("/api/stats", Scripted::status(503, ""));
        let spec = ResourceSpec::new("stats", "/api/stats", Duration::from_secs(300))
            .with_retry(quick_retry(2));
        let (f, _city) = fetcher(&transport, spec, "jakarta");

        let first = f.fetch_once().await;
        assert_eq!(first.value, Some(json!({"cities": 12})));
        assert!(first.error.is_none());
        assert!(!first.is_stale);

        let second = f.fetch_once().await;
        assert_eq!(second.value, Some(json!({"cities": 12})));
        assert_eq!(second.fetched_at, first.fetched_at);
        assert_eq!(second.error.as_ref().and_then(Error::status), Some(503));
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_without_value_is_explicit() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(
            "/api/cities",
            Scripted::fail(Error::NetworkUnavailable("offline".into())),
        );
        let spec = ResourceSpec::new("cities", "/api/cities", Duration::from_secs(60))
            .with_retry(RetryPolicy::no_retry());
        let (f, _city) = fetcher(&transport, spec, "jakarta");

        let result = f.fetch_once().await;
        assert!(result.value.is_none());
        assert!(result.is_stale);
        assert!(matches!(result.error, Some(Error::NetworkUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_goes_stale_after_max_age() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always("/api/early-warnings", Scripted::json(json!({"warnings": []})));
        let spec = ResourceSpec::new("early-warnings", "/api/early-warnings", Duration::from_secs(30))
            .with_max_age(Duration::from_secs(45));
        let (f, _city) = fetcher(&transport, spec, "jakarta");

        f.fetch_once().await;
        assert!(!f.result().is_stale);
        tokio::time::advance(Duration::from_secs(46)).await;
        assert!(f.result().is_stale);
        assert!(f.result().value.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_result() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always("/api/evacuation", Scripted::json(json!({"points": []})));
        transport.set_latency("/api/evacuation", Duration::from_millis(500));
        let (f, _city) = fetcher(
            &transport,
            ResourceSpec::new("evacuation", "/api/evacuation", Duration::from_secs(5)),
            "jakarta",
        );

        let pending = tokio::spawn({
            let f = f.clone();
            async move { f.fetch_once().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.stop();

        let result = pending.await.expect("task joins");
        assert!(result.value.is_none());
        assert!(f.result().value.is_none());
        assert_eq!(transport.calls_to("/api/evacuation"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_city_scope_recorded_and_encoded() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(
            "/api/risk?city=bandung",
            Scripted::json(json!({"city": "Bandung", "alert_level": "green"})),
        );
        let (f, city) = fetcher(
            &transport,
            ResourceSpec::new("risk", "/api/risk?city={city}", Duration::from_secs(60)),
            "jakarta",
        );
        city.send_replace("bandung".to_string());

        let result = f.fetch_once().await;
        assert_eq!(result.scope.as_deref(), Some("bandung"));
        assert_eq!(transport.calls_to("/api/risk?city=bandung"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_city_change_does_not_join_old_cycle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(
            "/api/weather?city=jakarta",
            Scripted::json(json!({"city": "Jakarta", "weather_desc": "Cerah"})),
        );
        transport.always(
            "/api/weather?city=medan",
            Scripted::json(json!({"city": "Medan", "weather_desc": "Hujan"})),
        );
        transport.set_latency("/api/weather?city=jakarta", Duration::from_secs(2));
        let (f, city) = fetcher(
            &transport,
            ResourceSpec::new("weather", "/api/weather?city={city}", Duration::from_secs(60)),
            "jakarta",
        );

        let old = tokio::spawn({
            let f = f.clone();
            async move { f.fetch_once().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(f.phase(), FetchPhase::Fetching);
        city.send_replace("medan".to_string());

        let fresh = f.fetch_once().await;
        assert_eq!(fresh.scope.as_deref(), Some("medan"));
        assert_eq!(transport.calls_to("/api/weather?city=medan"), 1);

        // The jakarta cycle lands later and must not overwrite medan.
        let late = old.await.expect("task joins");
        assert_eq!(late.scope.as_deref(), Some("medan"));
        let current = f.result();
        assert_eq!(current.scope.as_deref(), Some("medan"));
        assert_eq!(current.value, Some(json!({"city": "Medan", "weather_desc": "Hujan"})));
        assert_eq!(f.phase(), FetchPhase::Idle);
    }

    #[test]
    fn test_admin_resource_carries_secret_header() {
        let cfg = SyncConfig {
            admin_secret: "rahasia".into(),
            ..SyncConfig::default()
        }
        .with_admin_reports();
        let res = cfg
            .resources
            .iter()
            .find(|r| r.name == common::config::RESOURCE_ADMIN_REPORTS)
            .expect("admin resource");
        let spec = ResourceSpec::from_config(&cfg, res);
        assert_eq!(
            spec.headers,
            vec![(ADMIN_SECRET_HEADER.to_string(), "rahasia".to_string())]
        );
        assert_eq!(spec.max_age, Duration::from_secs(90));
    }

    #[test]
    fn test_duplicate_resource_names_rejected() {
        let mut cfg = SyncConfig::default();
        cfg.resources.push(common::ResourceConfig::new("stats", "/api/stats", 1000));
        let (_tx, rx) = watch::channel(String::new());
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new());
        let err = fetchers_from_config::<Value>(&cfg, transport, rx, None)
            .err()
            .expect("duplicate rejected");
        assert!(matches!(err, Error::Config(_)));
    }
}
