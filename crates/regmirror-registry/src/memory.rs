use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use regmirror_core::FetchError;

#[derive(Debug, Clone)]
enum Route {
    Body(Vec<u8>),
    Status(u16),
    Broken(String),
    Flaky { failures_left: usize, body: Vec<u8> },
}

/// An in-memory registry for offline fixtures: canned bodies per URL,
/// injected failures, optional latency, and a request counter per URL.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<HashMap<String, usize>>,
    latency: Duration,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn insert_bytes(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        lock(&self.routes).insert(url.into(), Route::Body(body.into()));
    }

    pub fn insert_json(&self, url: impl Into<String>, body: &serde_json::Value) {
        self.insert_bytes(url, body.to_string());
    }

    pub fn insert_status(&self, url: impl Into<String>, status: u16) {
        lock(&self.routes).insert(url.into(), Route::Status(status));
    }

    pub fn insert_transport_error(&self, url: impl Into<String>, cause: impl Into<String>) {
        lock(&self.routes).insert(url.into(), Route::Broken(cause.into()));
    }

    /// Fails with 503 `failures` times, then serves `body`.
    pub fn insert_flaky(&self, url: impl Into<String>, failures: usize, body: impl Into<Vec<u8>>) {
        lock(&self.routes).insert(
            url.into(),
            Route::Flaky {
                failures_left: failures,
                body: body.into(),
            },
        );
    }

    pub fn requests(&self, url: &str) -> usize {
        lock(&self.requests).get(url).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        lock(&self.requests).values().sum()
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *lock(&self.requests).entry(url.to_string()).or_default() += 1;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut routes = lock(&self.routes);
        match routes.get_mut(url) {
            None => Err(FetchError::status(url, 404)),
            Some(Route::Body(body)) => Ok(body.clone()),
            Some(Route::Status(status)) => Err(FetchError::status(url, *status)),
            Some(Route::Broken(cause)) => Err(FetchError::transport(url, cause.as_str())),
            Some(Route::Flaky {
                failures_left,
                body,
            }) => {
                if *failures_left > 0 {
                    *failures_left -= 1;
                    return Err(FetchError::status(url, 503));
                }
                Ok(body.clone())
            }
        }
    }
}

impl crate::Transport for MemoryTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.respond(url)
    }

    fn get_to_writer(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        let body = self.respond(url)?;
        sink.write_all(&body)
            .map_err(|err| FetchError::transport(url, err))?;
        Ok(body.len() as u64)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
