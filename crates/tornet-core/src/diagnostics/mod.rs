//! Network-hygiene diagnostics
//!
//! The DiagnosticEngine runs independent checks against the relay and the
//! direct path and can fold them into one [`DiagnosticReport`]:
//!
//! - [`DiagnosticEngine::check_dns_leak`]: does the relay path reveal the
//!   same organisation/location as the direct path?
//! - [`DiagnosticEngine::get_ip_info`]: attribution for an address, via an
//!   ordered provider fallback chain
//! - [`DiagnosticEngine::check_circuit_status`]: is the relay actually
//!   changing the observed address?
//! - [`DiagnosticEngine::check_relay_exit`]: does the exit-check service
//!   recognise us as a relay exit?
//!
//! Diagnostics only read state. They can run while a rotation plan is active.

pub mod geo;
pub mod leak;

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use geo::IpInfo;
pub use leak::LeakVerdict;

use crate::config::DiagnosticsConfig;
use crate::error::{Error, Result};
use crate::resolver::IpResolver;
use crate::traits::{HttpProbe, RelayState, Route};

/// Combined result of [`DiagnosticEngine::comprehensive_check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub dns_leak: LeakVerdict,
    pub circuit_active: bool,
    /// Attribution of the current address, if any provider answered
    pub ip_info: Option<IpInfo>,
    /// Exit-check service verdict, if it could be reached
    pub exit_confirmed: Option<bool>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosticReport {
    /// Overall pass: no leak and an active circuit
    pub fn passed(&self) -> bool {
        self.dns_leak == LeakVerdict::Passed && self.circuit_active
    }
}

/// Runs leak, attribution and liveness checks
pub struct DiagnosticEngine {
    probe: Arc<dyn HttpProbe>,
    relay_state: Arc<dyn RelayState>,
    resolver: IpResolver,
    config: DiagnosticsConfig,
}

impl DiagnosticEngine {
    pub fn new(
        probe: Arc<dyn HttpProbe>,
        relay_state: Arc<dyn RelayState>,
        resolver: IpResolver,
        config: DiagnosticsConfig,
    ) -> Self {
        Self {
            probe,
            relay_state,
            resolver,
            config,
        }
    }

    /// Compare relay-path identity against the direct path
    ///
    /// Every relay-path probe is queried through the relay and the direct
    /// probe without it. A non-marked relay token that matches a direct token
    /// is a leak. No direct comparison point, or no relay-path tokens at all,
    /// is inconclusive.
    pub async fn check_dns_leak(&self) -> LeakVerdict {
        let mut relay_tokens = Vec::new();
        for url in &self.config.relay_probes {
            match self.identity(url, Route::Relay).await {
                Some(tokens) => {
                    debug!("Relay-path identity from {}: {:?}", url, tokens);
                    relay_tokens.extend(tokens);
                }
                None => warn!("Relay-path identity probe {} gave no usable answer", url),
            }
        }

        let Some(direct_tokens) = self.identity(&self.config.direct_probe, Route::Direct).await else {
            warn!("Direct identity probe unreachable, leak test inconclusive");
            return LeakVerdict::Inconclusive;
        };
        if direct_tokens.is_empty() {
            warn!("Direct identity probe returned no identity fields, leak test inconclusive");
            return LeakVerdict::Inconclusive;
        }
        if relay_tokens.is_empty() {
            warn!("No relay-path identity obtained, leak test inconclusive");
            return LeakVerdict::Inconclusive;
        }

        match leak::find_leak(&relay_tokens, &direct_tokens) {
            Some((relay, direct)) => {
                warn!("Possible leak: relay-path '{}' matches direct-path '{}'", relay, direct);
                LeakVerdict::Failed
            }
            None => {
                info!("No identity overlap between relay and direct paths");
                LeakVerdict::Passed
            }
        }
    }

    /// Attribution for `ip`, or for the current address when `None`
    ///
    /// Providers are tried in configured order; the first 2xx answer with a
    /// valid body wins and later providers are not queried.
    pub async fn get_ip_info(&self, ip: Option<IpAddr>) -> Option<IpInfo> {
        let ip = match ip {
            Some(ip) => ip,
            None => match self.resolver.resolve().await {
                Ok(ip) => ip,
                Err(e) => {
                    warn!("Cannot look up IP info, address unresolved: {}", e);
                    return None;
                }
            },
        };

        let route = self.resolver.current_route().await;
        let timeout = self.config.probe_timeout();

        for provider in &self.config.geo_providers {
            let url = provider.url_for(ip);
            let response = match self.probe.get(&url, route, timeout).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Provider {} failed: {}", provider.name, e);
                    continue;
                }
            };
            if !response.is_success() {
                debug!("Provider {} returned HTTP {}", provider.name, response.status);
                continue;
            }
            match geo::parse_provider_body(&response.body) {
                Some(fields) => {
                    info!("IP info for {} from {}", ip, provider.name);
                    return Some(IpInfo {
                        provider: provider.name.clone(),
                        fields,
                    });
                }
                None => debug!("Provider {} returned an unusable body", provider.name),
            }
        }

        warn!("No geolocation provider answered for {}", ip);
        None
    }

    /// Whether the relay is actually changing the observed address
    ///
    /// Active when only the relay path resolves, or both resolve to
    /// different addresses. Equal addresses mean the relay is not
    /// anonymising.
    pub async fn check_circuit_status(&self) -> bool {
        let relay = self.resolver.resolve_via(Route::Relay).await;
        let direct = self.resolver.resolve_via(Route::Direct).await;

        match (relay, direct) {
            (Ok(relay), Ok(direct)) if relay != direct => {
                info!("Circuit active: relay {} differs from direct {}", relay, direct);
                true
            }
            (Ok(relay), Ok(_)) => {
                warn!("Circuit inactive: relay and direct paths both report {}", relay);
                false
            }
            (Ok(relay), Err(e)) => {
                info!("Circuit active via {} (direct path unavailable: {})", relay, e);
                true
            }
            (Err(e), _) => {
                warn!("Circuit inactive: relay path unresolved: {}", e);
                false
            }
        }
    }

    /// Ask the exit-check service whether we appear as a relay exit
    pub async fn check_relay_exit(&self) -> Option<bool> {
        let response = match self
            .probe
            .get(&self.config.exit_check_url, Route::Relay, self.config.probe_timeout())
            .await
        {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!("Exit check returned HTTP {}", response.status);
                return None;
            }
            Err(e) => {
                debug!("Exit check failed: {}", e);
                return None;
            }
        };

        let value: serde_json::Value = serde_json::from_str(&response.body).ok()?;
        value.get("IsTor").and_then(|v| v.as_bool())
    }

    /// Whether the direct path can reach the lookup endpoint at all
    pub async fn check_connectivity(&self) -> bool {
        let config = self.resolver.config();
        match self
            .probe
            .get(&config.lookup_url, Route::Direct, config.direct_timeout())
            .await
        {
            Ok(response) => response.is_success(),
            Err(e) => {
                warn!("Connectivity check failed: {}", e);
                false
            }
        }
    }

    /// Run every check and combine them
    ///
    /// # Errors
    ///
    /// [`Error::RelayUnavailable`] when the relay is not running; no probe
    /// is issued in that case.
    pub async fn comprehensive_check(&self) -> Result<DiagnosticReport> {
        if !self.relay_state.is_running().await {
            return Err(Error::relay_unavailable(
                "relay is not running; start it before running a security check",
            ));
        }

        info!("Security check 1/4: IP attribution");
        let ip_info = self.get_ip_info(None).await;

        info!("Security check 2/4: DNS leak test");
        let dns_leak = self.check_dns_leak().await;

        info!("Security check 3/4: circuit status");
        let circuit_active = self.check_circuit_status().await;

        info!("Security check 4/4: exit confirmation");
        let exit_confirmed = self.check_relay_exit().await;

        let report = DiagnosticReport {
            dns_leak,
            circuit_active,
            ip_info,
            exit_confirmed,
            generated_at: Utc::now(),
        };
        info!("Security check finished (passed={})", report.passed());
        Ok(report)
    }

    /// Identity tokens from one probe, `None` if unusable
    async fn identity(&self, url: &str, route: Route) -> Option<Vec<String>> {
        if route == Route::Relay && !self.relay_state.is_running().await {
            return None;
        }
        let response = self
            .probe
            .get(url, route, self.config.probe_timeout())
            .await
            .ok()?;
        if !response.is_success() {
            return None;
        }
        leak::identity_tokens(&response.body)
    }
}
