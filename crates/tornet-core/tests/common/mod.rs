//! Test doubles and common utilities for contract tests
//!
//! This module provides scripted collaborators that record how the core
//! drives them without touching the network or the real relay daemon.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tornet_core::config::{DiagnosticsConfig, ExitCountries, GeoProviderConfig, ResolverConfig};
use tornet_core::error::{Error, Result};
use tornet_core::traits::{HttpProbe, ProbeResponse, RelayControl, RelayState, Route};
use tornet_core::{CircuitResult, CircuitRotator, DiagnosticEngine, IpResolver};

pub const LOOKUP_URL: &str = "https://lookup.test/ip";
pub const RELAY_PROBE_A: &str = "https://probe-a.test/json";
pub const RELAY_PROBE_B: &str = "https://probe-b.test/json";
pub const DIRECT_PROBE: &str = "https://probe-direct.test/json";
pub const EXIT_CHECK_URL: &str = "https://exit-check.test/api/ip";

/// One scripted answer: a response, or a transport failure message
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(u16, String),
    Fail(String),
}

impl Scripted {
    pub fn ok(body: impl Into<String>) -> Self {
        Scripted::Respond(200, body.into())
    }

    pub fn status(status: u16) -> Self {
        Scripted::Respond(status, String::new())
    }

    pub fn unreachable() -> Self {
        Scripted::Fail("connection refused".to_string())
    }
}

/// An HttpProbe answering from a per-(url, route) script
///
/// Each key holds a queue; the last entry repeats once the queue is drained.
/// Unscripted requests fail as unreachable.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    script: Arc<Mutex<HashMap<(String, Route), VecDeque<Scripted>>>>,
    calls: Arc<Mutex<Vec<(String, Route, Duration)>>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an answer for `url` on `route`
    pub fn on(&self, url: &str, route: Route, answer: Scripted) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry((url.to_string(), route))
            .or_default()
            .push_back(answer);
        self
    }

    /// Every request made so far, in order
    pub fn calls(&self) -> Vec<(String, Route, Duration)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests made to `url` on any route
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == url)
            .count()
    }
}

#[async_trait]
impl HttpProbe for ScriptedProbe {
    async fn get(&self, url: &str, route: Route, timeout: Duration) -> Result<ProbeResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), route, timeout));

        let mut script = self.script.lock().unwrap();
        let answer = match script.get_mut(&(url.to_string(), route)) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match answer {
            Some(Scripted::Respond(status, body)) => Ok(ProbeResponse::new(status, body)),
            Some(Scripted::Fail(msg)) => Err(Error::network(msg)),
            None => Err(Error::network(format!("unscripted request to {} via {}", url, route))),
        }
    }
}

/// A relay daemon double implementing both RelayState and RelayControl
#[derive(Clone)]
pub struct FakeRelay {
    running: Arc<AtomicBool>,
    reloads: Arc<AtomicUsize>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    state_polls: Arc<AtomicUsize>,
    fail_reload: Arc<AtomicBool>,
    countries: Arc<Mutex<Vec<ExitCountries>>>,
}

impl FakeRelay {
    pub fn new(running: bool) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(running)),
            reloads: Arc::new(AtomicUsize::new(0)),
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            state_polls: Arc::new(AtomicUsize::new(0)),
            fail_reload: Arc::new(AtomicBool::new(false)),
            countries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn running() -> Self {
        Self::new(true)
    }

    pub fn stopped() -> Self {
        Self::new(false)
    }

    pub fn fail_reloads(&self) {
        self.fail_reload.store(true, Ordering::SeqCst);
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn state_polls(&self) -> usize {
        self.state_polls.load(Ordering::SeqCst)
    }

    pub fn applied_countries(&self) -> Vec<ExitCountries> {
        self.countries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayState for FakeRelay {
    async fn is_running(&self) -> bool {
        self.state_polls.fetch_add(1, Ordering::SeqCst);
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayControl for FakeRelay {
    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(Error::relay_control("no tor process found"));
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_exit_countries(&self, countries: &ExitCountries) -> Result<()> {
        self.countries.lock().unwrap().push(countries.clone());
        Ok(())
    }
}

/// A rotator handing out a fixed sequence of results, then unresolved ones
pub struct SequenceRotator {
    results: Mutex<VecDeque<Option<IpAddr>>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl SequenceRotator {
    pub fn new(ips: impl IntoIterator<Item = Option<IpAddr>>) -> Self {
        Self {
            results: Mutex::new(ips.into_iter().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Make every rotation take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared handle on the call counter
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CircuitRotator for SequenceRotator {
    async fn rotate(&self) -> CircuitResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.results.lock().unwrap().pop_front().flatten();
        match next {
            Some(ip) => CircuitResult::resolved(ip),
            None => CircuitResult::unresolved(),
        }
    }
}

/// Resolver settings pointing at the scripted lookup URL
pub fn test_resolver_config() -> ResolverConfig {
    ResolverConfig {
        lookup_url: LOOKUP_URL.to_string(),
        relay_timeout_secs: 10,
        direct_timeout_secs: 5,
    }
}

/// Diagnostic settings pointing at scripted probe URLs
pub fn test_diagnostics_config() -> DiagnosticsConfig {
    DiagnosticsConfig {
        relay_probes: vec![RELAY_PROBE_A.to_string(), RELAY_PROBE_B.to_string()],
        direct_probe: DIRECT_PROBE.to_string(),
        geo_providers: vec![
            GeoProviderConfig::new("first", "https://geo-1.test/{ip}"),
            GeoProviderConfig::new("second", "https://geo-2.test/{ip}"),
            GeoProviderConfig::new("third", "https://geo-3.test/{ip}"),
        ],
        exit_check_url: EXIT_CHECK_URL.to_string(),
        probe_timeout_secs: 10,
    }
}

pub fn resolver(probe: &ScriptedProbe, relay: &FakeRelay) -> IpResolver {
    IpResolver::new(
        Arc::new(probe.clone()),
        Arc::new(relay.clone()),
        test_resolver_config(),
    )
}

pub fn diagnostic_engine(probe: &ScriptedProbe, relay: &FakeRelay) -> DiagnosticEngine {
    DiagnosticEngine::new(
        Arc::new(probe.clone()),
        Arc::new(relay.clone()),
        resolver(probe, relay),
        test_diagnostics_config(),
    )
}

/// Identity probe body in the shape ip-api/ipinfo return
pub fn identity_body(org: &str, city: &str) -> String {
    serde_json::json!({ "org": org, "city": city, "country": "Nowhere" }).to_string()
}

pub fn ip(raw: &str) -> IpAddr {
    raw.parse().expect("valid test address")
}
