//! Scripted in-memory transport for tests.
//!
//! Replies are keyed by the exact request path (query included). Queued
//! replies are consumed in order; once a route's queue is empty its
//! `always` reply, if any, is repeated.

use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use async_trait::async_trait;
use common::Error;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(ApiResponse),
    Fail(Error),
}

impl Scripted {
    pub fn status(status: u16, body: &str) -> Self {
        Scripted::Respond(ApiResponse::new(status, body))
    }

    pub fn json(body: serde_json::Value) -> Self {
        Scripted::Respond(ApiResponse::new(200, body.to_string()))
    }

    pub fn fail(err: Error) -> Self {
        Scripted::Fail(err)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Offset from transport creation, on the tokio clock.
    pub at: Duration,
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Scripted>,
    fallback: Option<Scripted>,
    latency: Duration,
}

pub struct ScriptedTransport {
    created: Instant,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-shot reply for `path`.
    pub fn push(&self, path: &str, reply: Scripted) {
        self.with_route(path, |r| r.queue.push_back(reply));
    }

    /// Reply used whenever the queue for `path` is empty.
    pub fn always(&self, path: &str, reply: Scripted) {
        self.with_route(path, |r| r.fallback = Some(reply));
    }

    /// Simulated time each call to `path` takes before replying.
    pub fn set_latency(&self, path: &str, latency: Duration) {
        self.with_route(path, |r| r.latency = latency);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    pub fn call_offsets(&self, path: &str) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .map(|c| c.at)
            .collect()
    }

    fn with_route(&self, path: &str, f: impl FnOnce(&mut Route)) {
        if let Ok(mut routes) = self.routes.lock() {
            f(routes.entry(path.to_string()).or_default());
        }
    }

    fn next_reply(&self, path: &str) -> (Option<Scripted>, Duration) {
        let Ok(mut routes) = self.routes.lock() else {
            return (None, Duration::ZERO);
        };
        match routes.get_mut(path) {
            Some(route) => {
                let reply = route.queue.pop_front().or_else(|| route.fallback.clone());
                (reply, route.latency)
            }
            None => (None, Duration::ZERO),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method: request.method,
                path: request.path.clone(),
                headers: request.headers.clone(),
                body: request.body.clone(),
                at: Instant::now().duration_since(self.created),
            });
        }

        let (reply, latency) = self.next_reply(&request.path);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(Scripted::Respond(resp)) => Ok(resp),
            Some(Scripted::Fail(err)) => Err(err),
            None => Err(Error::NetworkUnavailable(format!(
                "no scripted reply for {}",
                request.path
            ))),
        }
    }
}
