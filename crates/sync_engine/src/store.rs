//! Derived, city-filtered views over the latest fetch results.
//!
//! The store keeps the raw result of every resource and recomputes the
//! views that depend on a resource whenever it publishes. Each view is an
//! immutable `Arc<ViewSnapshot>`; readers always get a complete snapshot.

use crate::entity::{EntityCategory, MapEntity};
use crate::fetcher::{FetchResult, UpdateSink};
use chrono::{DateTime, Utc};
use common::config::{
    RESOURCE_ADMIN_REPORTS, RESOURCE_CITIES, RESOURCE_EARLY_WARNINGS, RESOURCE_EARTHQUAKE,
    RESOURCE_EARTHQUAKES_FELT, RESOURCE_EVACUATION, RESOURCE_REPORTS, RESOURCE_RISK,
    RESOURCE_RISK_ZONES, RESOURCE_STATS, RESOURCE_WEATHER,
};
use common::{
    AdminReports, CitiesResponse, City, DamageReport, EarlyWarning, EarlyWarningsResponse,
    Earthquake, EarthquakesFeltResponse, Error, EvacuationPoint, EvacuationResponse,
    PlatformStats, ReportsResponse, RiskAssessment, RiskZone, RiskZonesResponse, WeatherReport,
};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    RiskWeather,
    MapLayers,
    Earthquakes,
    EarlyWarnings,
    AdminReports,
    Stats,
    Cities,
}

impl ViewKind {
    pub const ALL: [ViewKind; 7] = [
        ViewKind::RiskWeather,
        ViewKind::MapLayers,
        ViewKind::Earthquakes,
        ViewKind::EarlyWarnings,
        ViewKind::AdminReports,
        ViewKind::Stats,
        ViewKind::Cities,
    ];

    /// Resources this view is computed from.
    pub fn dependencies(&self) -> &'static [&'static str] {
        match self {
            ViewKind::RiskWeather => &[RESOURCE_RISK, RESOURCE_WEATHER],
            ViewKind::MapLayers => &[
                RESOURCE_RISK_ZONES,
                RESOURCE_EVACUATION,
                RESOURCE_REPORTS,
                RESOURCE_WEATHER,
            ],
            ViewKind::Earthquakes => &[RESOURCE_EARTHQUAKE, RESOURCE_EARTHQUAKES_FELT],
            ViewKind::EarlyWarnings => &[RESOURCE_EARLY_WARNINGS],
            ViewKind::AdminReports => &[RESOURCE_ADMIN_REPORTS],
            ViewKind::Stats => &[RESOURCE_STATS],
            ViewKind::Cities => &[RESOURCE_CITIES],
        }
    }

    /// Views whose content changes with the active city.
    pub fn is_city_scoped(&self) -> bool {
        matches!(self, ViewKind::RiskWeather | ViewKind::MapLayers)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::RiskWeather => "risk-weather",
            ViewKind::MapLayers => "map-layers",
            ViewKind::Earthquakes => "earthquakes",
            ViewKind::EarlyWarnings => "early-warnings",
            ViewKind::AdminReports => "admin-reports",
            ViewKind::Stats => "stats",
            ViewKind::Cities => "cities",
        }
    }
}

/// Freshness of one input to a view, as of the snapshot's `produced_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub resource: String,
    pub has_value: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub error: Option<Error>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskWeatherView {
    pub risk: Option<RiskAssessment>,
    /// Present only when the last weather fetch for this city succeeded.
    pub weather: Option<WeatherReport>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapLayersView {
    pub zones: Vec<RiskZone>,
    pub evacuation_points: Vec<EvacuationPoint>,
    pub reports: Vec<DamageReport>,
    pub zone_weather: Option<WeatherReport>,
}

impl MapLayersView {
    pub fn entities(&self, category: EntityCategory) -> Vec<MapEntity> {
        match category {
            EntityCategory::Zone => self.zones.iter().map(MapEntity::from_zone).collect(),
            EntityCategory::EvacuationPoint => self
                .evacuation_points
                .iter()
                .map(MapEntity::from_evacuation_point)
                .collect(),
            EntityCategory::Report => self.reports.iter().map(MapEntity::from_report).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EarthquakeView {
    pub latest: Option<Earthquake>,
    pub felt: Vec<Earthquake>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    RiskWeather(RiskWeatherView),
    MapLayers(MapLayersView),
    Earthquakes(EarthquakeView),
    EarlyWarnings(Vec<EarlyWarning>),
    AdminReports(Option<AdminReports>),
    Stats(Option<PlatformStats>),
    Cities(Vec<City>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub kind: ViewKind,
    /// Store-wide sequence number; later snapshots have larger versions.
    pub version: u64,
    pub produced_at: DateTime<Utc>,
    pub city: String,
    pub data: ViewData,
    pub sources: Vec<SourceStatus>,
}

impl ViewSnapshot {
    pub fn any_stale(&self) -> bool {
        self.sources.iter().any(|s| s.is_stale)
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.sources
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| (s.resource.as_str(), e)))
    }

    pub fn risk_weather(&self) -> Option<&RiskWeatherView> {
        match &self.data {
            ViewData::RiskWeather(v) => Some(v),
            _ => None,
        }
    }

    pub fn map_layers(&self) -> Option<&MapLayersView> {
        match &self.data {
            ViewData::MapLayers(v) => Some(v),
            _ => None,
        }
    }
}

type Callback = Arc<dyn Fn(&Arc<ViewSnapshot>) + Send + Sync>;

struct Subscriber {
    kind: ViewKind,
    callback: Callback,
}

/// Live subscription; unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    store: Weak<MergedViewStore>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            lock(&store.subscribers).remove(&self.id);
        }
    }
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MergedViewStore {
    raw: DashMap<String, FetchResult<Value>>,
    city: RwLock<String>,
    views: HashMap<ViewKind, watch::Sender<Arc<ViewSnapshot>>>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_subscriber: AtomicU64,
    version: AtomicU64,
    // Serializes recompute + notify so snapshots go out in completion order.
    recompute: Mutex<()>,
    disposed: AtomicBool,
}

impl MergedViewStore {
    pub fn create(city: &str) -> Arc<Self> {
        let version = AtomicU64::new(0);
        let raw = DashMap::new();
        let views = ViewKind::ALL
            .iter()
            .map(|kind| {
                let snapshot = compute(*kind, &raw, city, version.fetch_add(1, Ordering::AcqRel));
                let (tx, _rx) = watch::channel(Arc::new(snapshot));
                (*kind, tx)
            })
            .collect();

        Arc::new(Self {
            raw,
            city: RwLock::new(city.to_string()),
            views,
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(1),
            version,
            recompute: Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn city(&self) -> String {
        self.city
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Latest snapshot of a view. Never partial.
    pub fn get_snapshot(&self, kind: ViewKind) -> Arc<ViewSnapshot> {
        match self.views.get(&kind) {
            Some(tx) => Arc::clone(&tx.borrow()),
            None => Arc::new(compute(kind, &self.raw, &self.city(), 0)),
        }
    }

    /// Watch channel for a view, for async consumers.
    pub fn watch(&self, kind: ViewKind) -> Option<watch::Receiver<Arc<ViewSnapshot>>> {
        self.views.get(&kind).map(|tx| tx.subscribe())
    }

    /// Call `callback` with every new snapshot of `kind`.
    ///
    /// Callbacks run synchronously on the publishing task, in order, and
    /// must not call back into `set_city` or `publish`.
    pub fn subscribe<F>(self: &Arc<Self>, kind: ViewKind, callback: F) -> Subscription
    where
        F: Fn(&Arc<ViewSnapshot>) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).insert(
            id,
            Subscriber {
                kind,
                callback: Arc::new(callback),
            },
        );
        Subscription {
            id,
            store: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Latest raw result of a resource, staleness evaluated now.
    pub fn raw(&self, resource: &str) -> Option<FetchResult<Value>> {
        self.raw.get(resource).map(|r| r.value().restamped())
    }

    /// Switch the active city and recompute the city-scoped views from
    /// cached data. No network access.
    pub fn set_city(&self, city: &str) {
        if self.is_disposed() {
            return;
        }
        let _guard = lock(&self.recompute);
        match self.city.write() {
            Ok(mut c) => *c = city.to_string(),
            Err(poisoned) => *poisoned.into_inner() = city.to_string(),
        }
        debug!("active city set to {}", city);
        let kinds: Vec<ViewKind> = ViewKind::ALL
            .into_iter()
            .filter(|k| k.is_city_scoped())
            .collect();
        self.recompute_and_notify(&kinds, city);
    }

    /// Drop all subscribers and ignore further updates.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        lock(&self.subscribers).clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn recompute_and_notify(&self, kinds: &[ViewKind], city: &str) {
        for kind in kinds {
            let version = self.version.fetch_add(1, Ordering::AcqRel);
            let snapshot = Arc::new(compute(*kind, &self.raw, city, version));
            if let Some(tx) = self.views.get(kind) {
                tx.send_replace(Arc::clone(&snapshot));
            }

            let callbacks: Vec<Callback> = lock(&self.subscribers)
                .values()
                .filter(|s| s.kind == *kind)
                .map(|s| Arc::clone(&s.callback))
                .collect();
            for callback in callbacks {
                callback(&snapshot);
            }
        }
    }
}

impl UpdateSink<Value> for MergedViewStore {
    fn publish(&self, resource: &str, result: &FetchResult<Value>) {
        if self.is_disposed() {
            return;
        }
        let _guard = lock(&self.recompute);
        self.raw.insert(resource.to_string(), result.clone());

        let kinds: Vec<ViewKind> = ViewKind::ALL
            .into_iter()
            .filter(|k| k.dependencies().contains(&resource))
            .collect();
        if kinds.is_empty() {
            debug!("{}: no view depends on this resource", resource);
            return;
        }
        let city = self.city();
        self.recompute_and_notify(&kinds, &city);
    }
}

// ── View computation (pure over the raw results) ──────────────────────

fn compute(
    kind: ViewKind,
    raw: &DashMap<String, FetchResult<Value>>,
    city: &str,
    version: u64,
) -> ViewSnapshot {
    let data = match kind {
        ViewKind::RiskWeather => ViewData::RiskWeather(risk_weather(raw, city)),
        ViewKind::MapLayers => ViewData::MapLayers(map_layers(raw, city)),
        ViewKind::Earthquakes => ViewData::Earthquakes(EarthquakeView {
            latest: value_of::<Earthquake>(raw, RESOURCE_EARTHQUAKE),
            felt: value_of::<EarthquakesFeltResponse>(raw, RESOURCE_EARTHQUAKES_FELT)
                .map(|r| r.earthquakes)
                .unwrap_or_default(),
        }),
        ViewKind::EarlyWarnings => ViewData::EarlyWarnings(
            value_of::<EarlyWarningsResponse>(raw, RESOURCE_EARLY_WARNINGS)
                .map(|r| r.warnings)
                .unwrap_or_default(),
        ),
        ViewKind::AdminReports => {
            ViewData::AdminReports(value_of::<AdminReports>(raw, RESOURCE_ADMIN_REPORTS))
        }
        ViewKind::Stats => ViewData::Stats(value_of::<PlatformStats>(raw, RESOURCE_STATS)),
        ViewKind::Cities => ViewData::Cities(
            value_of::<CitiesResponse>(raw, RESOURCE_CITIES)
                .map(|r| r.cities)
                .unwrap_or_default(),
        ),
    };

    ViewSnapshot {
        kind,
        version,
        produced_at: Utc::now(),
        city: city.to_string(),
        data,
        sources: kind
            .dependencies()
            .iter()
            .map(|name| source_status(raw, name))
            .collect(),
    }
}

fn source_status(raw: &DashMap<String, FetchResult<Value>>, resource: &str) -> SourceStatus {
    match raw.get(resource) {
        Some(entry) => {
            let r = entry.value();
            SourceStatus {
                resource: resource.to_string(),
                has_value: r.value.is_some(),
                fetched_at: r.fetched_at,
                is_stale: r.stale_now(),
                error: r.error.clone(),
            }
        }
        None => SourceStatus {
            resource: resource.to_string(),
            has_value: false,
            fetched_at: None,
            is_stale: true,
            error: None,
        },
    }
}

fn value_of<T: DeserializeOwned>(
    raw: &DashMap<String, FetchResult<Value>>,
    resource: &str,
) -> Option<T> {
    let entry = raw.get(resource)?;
    let value = entry.value().value.clone()?;
    drop(entry);
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("{}: cached value does not match view shape: {}", resource, e);
            None
        }
    }
}

/// Value of a city-scoped resource, only when it was fetched for `city`.
fn scoped_value_of<T: DeserializeOwned>(
    raw: &DashMap<String, FetchResult<Value>>,
    resource: &str,
    city: &str,
) -> Option<T> {
    let in_scope = raw
        .get(resource)
        .map(|r| r.scope.as_deref().map_or(true, |s| s == city))?;
    if !in_scope {
        return None;
    }
    value_of(raw, resource)
}

/// Weather is merged only if the latest weather cycle did not fail.
fn current_weather(
    raw: &DashMap<String, FetchResult<Value>>,
    city: &str,
) -> Option<WeatherReport> {
    let failed = raw
        .get(RESOURCE_WEATHER)
        .map(|r| r.error.is_some())
        .unwrap_or(true);
    if failed {
        return None;
    }
    scoped_value_of(raw, RESOURCE_WEATHER, city)
}

fn risk_weather(raw: &DashMap<String, FetchResult<Value>>, city: &str) -> RiskWeatherView {
    RiskWeatherView {
        risk: scoped_value_of(raw, RESOURCE_RISK, city),
        weather: current_weather(raw, city),
    }
}

fn map_layers(raw: &DashMap<String, FetchResult<Value>>, city: &str) -> MapLayersView {
    let in_city = |c: &str| city.is_empty() || c.eq_ignore_ascii_case(city);

    MapLayersView {
        zones: value_of::<RiskZonesResponse>(raw, RESOURCE_RISK_ZONES)
            .map(|r| r.zones)
            .unwrap_or_default()
            .into_iter()
            .filter(|z| in_city(&z.city))
            .collect(),
        evacuation_points: value_of::<EvacuationResponse>(raw, RESOURCE_EVACUATION)
            .map(|r| r.points)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| in_city(&p.city))
            .collect(),
        reports: value_of::<ReportsResponse>(raw, RESOURCE_REPORTS)
            .map(|r| r.reports)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| in_city(&r.city))
            .collect(),
        zone_weather: current_weather(raw, city),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{ResourceFetcher, ResourceSpec};
    use serde_json::json;
    use siaga_client::mock::{Scripted, ScriptedTransport};
    use siaga_client::RetryPolicy;
    use std::time::Duration;

    fn fetcher_into(
        store: &Arc<MergedViewStore>,
        transport: &Arc<ScriptedTransport>,
        name: &str,
        endpoint: &str,
        city: &watch::Receiver<String>,
    ) -> ResourceFetcher<Value> {
        let spec = ResourceSpec::new(name, endpoint, Duration::from_secs(60))
            .with_retry(RetryPolicy::no_retry());
        let sink: Arc<dyn UpdateSink<Value>> = store.clone();
        ResourceFetcher::new(spec, transport.clone(), city.clone(), Some(sink))
    }

    fn zones_body() -> Value {
        json!({"zones": [
            {"name": "Kampung Melayu", "lat": -6.22, "lng": 106.86, "risk": "high", "city": "jakarta"},
            {"name": "Dayeuhkolot", "lat": -6.98, "lng": 107.62, "risk": "high", "city": "bandung"}
        ], "weather": null})
    }

    #[tokio::test]
    async fn test_weather_omitted_after_failed_fetch() {
        let store = MergedViewStore::create("jakarta");
        let transport = Arc::new(ScriptedTransport::new());
        let (_tx, city) = watch::channel("jakarta".to_string());
        transport.push(
            "/api/risk?city=jakarta",
            Scripted::json(json!({"city": "Jakarta", "alert_level": "yellow"})),
        );
        transport.push(
            "/api/weather?city=jakarta",
            Scripted::json(json!({"temperature": 31, "weather_desc": "Hujan Ringan"})),
        );
        transport.push(
            "/api/weather?city=jakarta",
            Scripted::json(json!({"error": "Weather data tidak tersedia"})),
        );
        let risk = fetcher_into(&store, &transport, "risk", "/api/risk?city={city}", &city);
        let weather =
            fetcher_into(&store, &transport, "weather", "/api/weather?city={city}", &city);

        risk.fetch_once().await;
        weather.fetch_once().await;
        let snap = store.get_snapshot(ViewKind::RiskWeather);
        let view = snap.risk_weather().expect("risk view");
        assert_eq!(view.risk.as_ref().map(|r| r.alert_level.as_str()), Some("yellow"));
        assert_eq!(
            view.weather.as_ref().map(|w| w.weather_desc.as_str()),
            Some("Hujan Ringan")
        );

        // The failed cycle keeps the cached weather but the view drops it.
        weather.fetch_once().await;
        assert!(weather.result().value.is_some());
        let snap = store.get_snapshot(ViewKind::RiskWeather);
        let view = snap.risk_weather().expect("risk view");
        assert!(view.risk.is_some());
        assert!(view.weather.is_none());
        assert!(snap.errors().any(|(name, _)| name == "weather"));
    }

    #[tokio::test]
    async fn test_city_change_refilters_without_fetching() {
        let store = MergedViewStore::create("jakarta");
        let transport = Arc::new(ScriptedTransport::new());
        let (_tx, city) = watch::channel("jakarta".to_string());
        transport.push("/api/risk-zones", Scripted::json(zones_body()));
        let zones = fetcher_into(&store, &transport, "risk-zones", "/api/risk-zones", &city);

        zones.fetch_once().await;
        let jakarta = store.get_snapshot(ViewKind::MapLayers);
        let names: Vec<_> = jakarta
            .map_layers()
            .map(|m| m.zones.iter().map(|z| z.name.clone()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["Kampung Melayu".to_string()]);

        store.set_city("bandung");
        let bandung = store.get_snapshot(ViewKind::MapLayers);
        let layers = bandung.map_layers().expect("map view");
        assert_eq!(layers.zones.len(), 1);
        assert_eq!(layers.zones[0].name, "Dayeuhkolot");
        assert_eq!(bandung.city, "bandung");
        assert!(bandung.version > jakarta.version);
        assert_eq!(transport.calls_to("/api/risk-zones"), 1);
    }

    #[tokio::test]
    async fn test_risk_for_other_city_is_not_shown() {
        let store = MergedViewStore::create("jakarta");
        let transport = Arc::new(ScriptedTransport::new());
        let (_tx, city) = watch::channel("jakarta".to_string());
        transport.push(
            "/api/risk?city=jakarta",
            Scripted::json(json!({"city": "Jakarta", "alert_level": "red"})),
        );
        let risk = fetcher_into(&store, &transport, "risk", "/api/risk?city={city}", &city);
        risk.fetch_once().await;

        store.set_city("surabaya");
        let snap = store.get_snapshot(ViewKind::RiskWeather);
        assert!(snap.risk_weather().expect("view").risk.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_get_only_their_view() {
        let store = MergedViewStore::create("jakarta");
        let transport = Arc::new(ScriptedTransport::new());
        let (_tx, city) = watch::channel("jakarta".to_string());
        transport.push("/api/stats", Scripted::json(json!({"cities": 10, "reports": 3})));
        let stats = fetcher_into(&store, &transport, "stats", "/api/stats", &city);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sub = store.subscribe(ViewKind::Stats, {
            let seen = Arc::clone(&seen);
            move |snap: &Arc<ViewSnapshot>| lock(&seen).push(snap.data.clone())
        });
        let map_calls = Arc::new(AtomicU64::new(0));
        let _map_sub = store.subscribe(ViewKind::MapLayers, {
            let map_calls = Arc::clone(&map_calls);
            move |_: &Arc<ViewSnapshot>| {
                map_calls.fetch_add(1, Ordering::Relaxed);
            }
        });

        stats.fetch_once().await;
        assert_eq!(map_calls.load(Ordering::Relaxed), 0);
        {
            let seen = lock(&seen);
            assert_eq!(seen.len(), 1);
            match &seen[0] {
                ViewData::Stats(Some(s)) => assert_eq!(s.reports, 3),
                other => panic!("unexpected view data: {:?}", other),
            }
        }

        drop(sub);
        assert_eq!(store.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_evaluated_at_recompute() {
        let store = MergedViewStore::create("jakarta");
        let transport = Arc::new(ScriptedTransport::new());
        let (_tx, city) = watch::channel("jakarta".to_string());
        transport.push("/api/risk-zones", Scripted::json(zones_body()));
        let spec = ResourceSpec::new("risk-zones", "/api/risk-zones", Duration::from_secs(5))
            .with_max_age(Duration::from_secs(15))
            .with_retry(RetryPolicy::no_retry());
        let sink: Arc<dyn UpdateSink<Value>> = store.clone();
        let zones = ResourceFetcher::new(spec, transport.clone(), city, Some(sink));

        zones.fetch_once().await;
        let zone_source = |snap: &ViewSnapshot| {
            snap.sources
                .iter()
                .find(|s| s.resource == "risk-zones")
                .map(|s| s.is_stale)
        };
        assert_eq!(zone_source(&store.get_snapshot(ViewKind::MapLayers)), Some(false));

        // No publish in between, as when polling is paused.
        tokio::time::advance(Duration::from_secs(16)).await;
        store.set_city("bandung");
        let snap = store.get_snapshot(ViewKind::MapLayers);
        assert_eq!(zone_source(&snap), Some(true));
        assert_eq!(snap.map_layers().map(|m| m.zones.len()), Some(1));
        assert!(store.raw("risk-zones").is_some_and(|r| r.is_stale));
    }

    #[tokio::test]
    async fn test_dispose_stops_updates() {
        let store = MergedViewStore::create("jakarta");
        let before = store.get_snapshot(ViewKind::Cities);
        assert!(before.any_stale());

        store.dispose();
        let result = FetchResult::<Value> {
            value: Some(json!({"cities": [{"id": "jakarta", "name": "Jakarta"}]})),
            is_stale: false,
            ..FetchResult::default()
        };
        store.publish("cities", &result);
        assert_eq!(store.get_snapshot(ViewKind::Cities).version, before.version);
        assert!(store.raw("cities").is_none());
    }
}
