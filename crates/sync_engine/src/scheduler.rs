//! Independent polling loops, one tokio task per resource.

use crate::fetcher::{fetchers_from_config, FetchPhase, FetchResult, ResourceFetcher, UpdateSink};
use crate::store::MergedViewStore;
use chrono::{DateTime, Utc};
use common::{Error, Result, SyncConfig};
use futures_util::future::join_all;
use serde_json::Value;
use siaga_client::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Point-in-time status of one resource.
#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub name: String,
    pub phase: FetchPhase,
    pub refresh_interval: Duration,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub has_value: bool,
    pub error: Option<Error>,
}

pub struct PollingScheduler {
    fetchers: Vec<ResourceFetcher<Value>>,
    store: Option<Arc<MergedViewStore>>,
    city: watch::Sender<String>,
    shutdown: watch::Sender<bool>,
    paused: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PollingScheduler {
    /// Scheduler for every configured resource, publishing into `store`.
    pub fn new(
        cfg: &SyncConfig,
        transport: Arc<dyn Transport>,
        store: Arc<MergedViewStore>,
    ) -> Result<Self> {
        let sink: Arc<dyn UpdateSink<Value>> = store.clone();
        Self::build(cfg, transport, store, sink)
    }

    /// Like [`new`](Self::new); `observer` sees every applied cycle right
    /// after the store does.
    pub fn with_observer(
        cfg: &SyncConfig,
        transport: Arc<dyn Transport>,
        store: Arc<MergedViewStore>,
        observer: Arc<dyn UpdateSink<Value>>,
    ) -> Result<Self> {
        let first: Arc<dyn UpdateSink<Value>> = store.clone();
        let sink: Arc<dyn UpdateSink<Value>> = Arc::new(Fanout(vec![first, observer]));
        Self::build(cfg, transport, store, sink)
    }

    fn build(
        cfg: &SyncConfig,
        transport: Arc<dyn Transport>,
        store: Arc<MergedViewStore>,
        sink: Arc<dyn UpdateSink<Value>>,
    ) -> Result<Self> {
        let (city_tx, city_rx) = watch::channel(cfg.default_city.clone());
        let fetchers = fetchers_from_config(cfg, transport, city_rx, Some(sink))?;
        Ok(Self::assemble(fetchers, Some(store), city_tx))
    }

    /// Scheduler over prebuilt fetchers. `city` must be the sender whose
    /// receivers the fetchers were built with.
    pub fn with_fetchers(
        fetchers: Vec<ResourceFetcher<Value>>,
        city: watch::Sender<String>,
    ) -> Self {
        Self::assemble(fetchers, None, city)
    }

    fn assemble(
        fetchers: Vec<ResourceFetcher<Value>>,
        store: Option<Arc<MergedViewStore>>,
        city: watch::Sender<String>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (paused, _) = watch::channel(false);
        Self {
            fetchers,
            store,
            city,
            shutdown,
            paused,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.fetchers.iter().map(|f| f.name()).collect()
    }

    pub fn fetcher(&self, name: &str) -> Option<&ResourceFetcher<Value>> {
        self.fetchers.iter().find(|f| f.name() == name)
    }

    pub fn store(&self) -> Option<&Arc<MergedViewStore>> {
        self.store.as_ref()
    }

    pub fn city(&self) -> String {
        self.city.borrow().clone()
    }

    /// Spawn one polling loop per resource. The first fetch of each runs
    /// immediately. Calling `start` twice, or after `stop`, does nothing.
    pub fn start(&self) {
        if self.stopped.load(Ordering::Acquire) {
            warn!("start() called on a stopped scheduler; ignoring");
            return;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        for fetcher in &self.fetchers {
            info!(
                "Polling {} every {}ms ({})",
                fetcher.name(),
                fetcher.spec().refresh_interval.as_millis(),
                fetcher.spec().endpoint.as_str()
            );
            tasks.push(tokio::spawn(poll_loop(
                fetcher.clone(),
                self.shutdown.subscribe(),
                self.paused.subscribe(),
            )));
        }
    }

    /// Cancel every timer. In-flight cycles finish but their results are
    /// dropped. Terminal: a stopped scheduler cannot be restarted.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for fetcher in &self.fetchers {
            fetcher.stop();
        }
        self.shutdown.send_replace(true);
        info!("Polling stopped ({} resources)", self.fetchers.len());
    }

    /// Wait for every polling task to exit after `stop`.
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!("polling task ended abnormally: {}", e);
            }
        }
    }

    /// Skip ticks until `resume`. Timer phase is kept.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        info!("Polling paused");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        info!("Polling resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Out-of-band fetch of one resource, coalesced with any in-flight
    /// cycle. The resource's timer is left alone.
    pub async fn refresh_now(&self, name: &str) -> Result<FetchResult<Value>> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }
        let fetcher = self
            .fetcher(name)
            .ok_or_else(|| Error::UnknownResource(name.to_string()))?;
        debug!("{}: manual refresh", name);
        Ok(fetcher.fetch_once().await)
    }

    /// One fetch of every resource, concurrently.
    pub async fn refresh_all(&self) -> Vec<(String, FetchResult<Value>)> {
        let results = join_all(self.fetchers.iter().map(|f| f.fetch_once())).await;
        self.fetchers
            .iter()
            .map(|f| f.name().to_string())
            .zip(results)
            .collect()
    }

    /// Switch the active city. Cached views are re-filtered at once, then
    /// every `{city}` resource is refetched out of band.
    pub async fn set_city(&self, city: &str) -> Vec<(String, FetchResult<Value>)> {
        self.city.send_replace(city.to_string());
        if let Some(store) = &self.store {
            store.set_city(city);
        }
        info!("City changed to {}", city);

        if self.is_stopped() {
            return Vec::new();
        }
        let scoped: Vec<&ResourceFetcher<Value>> = self
            .fetchers
            .iter()
            .filter(|f| f.spec().endpoint.uses_city())
            .collect();
        let results = join_all(scoped.iter().map(|f| f.fetch_once())).await;
        scoped
            .iter()
            .map(|f| f.name().to_string())
            .zip(results)
            .collect()
    }

    pub fn status(&self) -> Vec<ResourceStatus> {
        self.fetchers
            .iter()
            .map(|f| {
                let result = f.result();
                ResourceStatus {
                    name: f.name().to_string(),
                    phase: f.phase(),
                    refresh_interval: f.spec().refresh_interval,
                    fetched_at: result.fetched_at,
                    is_stale: result.is_stale,
                    has_value: result.value.is_some(),
                    error: result.error,
                }
            })
            .collect()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Fanout(Vec<Arc<dyn UpdateSink<Value>>>);

impl UpdateSink<Value> for Fanout {
    fn publish(&self, resource: &str, result: &FetchResult<Value>) {
        for sink in &self.0 {
            sink.publish(resource, result);
        }
    }
}

async fn poll_loop(
    fetcher: ResourceFetcher<Value>,
    mut shutdown: watch::Receiver<bool>,
    paused: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(fetcher.spec().refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        if *paused.borrow() {
            debug!("{}: paused, skipping tick", fetcher.name());
            continue;
        }

        let result = fetcher.fetch_once().await;
        match &result.error {
            None => debug!("{}: refreshed ({} attempt(s))", fetcher.name(), result.attempts),
            Some(e) => debug!("{}: cycle failed: {}", fetcher.name(), e),
        }
    }
    debug!("{}: polling loop exited", fetcher.name());
}
