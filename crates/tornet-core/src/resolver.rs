//! Public IP resolution
//!
//! [`IpResolver`] asks a "what is my IP" endpoint for the caller's address,
//! picking the relay route whenever the relay is running. One request per
//! call; the caller owns any retry policy.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::traits::{HttpProbe, RelayState, Route};

/// Resolves the current public IP address
#[derive(Clone)]
pub struct IpResolver {
    probe: Arc<dyn HttpProbe>,
    relay_state: Arc<dyn RelayState>,
    config: ResolverConfig,
}

impl IpResolver {
    pub fn new(
        probe: Arc<dyn HttpProbe>,
        relay_state: Arc<dyn RelayState>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            probe,
            relay_state,
            config,
        }
    }

    /// Resolve through the relay when it is running, directly otherwise
    pub async fn resolve(&self) -> Result<IpAddr> {
        let route = self.current_route().await;
        self.resolve_via(route).await
    }

    /// Route a fresh resolution would take right now
    pub async fn current_route(&self) -> Route {
        if self.relay_state.is_running().await {
            Route::Relay
        } else {
            Route::Direct
        }
    }

    /// Resolve on an explicit route, regardless of relay state
    pub async fn resolve_via(&self, route: Route) -> Result<IpAddr> {
        let timeout = self.timeout_for(route);
        debug!("Resolving public IP via {} (timeout {:?})", route, timeout);

        let response = self
            .probe
            .get(&self.config.lookup_url, route, timeout)
            .await?;

        if !response.is_success() {
            return Err(Error::network(format!(
                "IP lookup via {} returned HTTP {}",
                route, response.status
            )));
        }

        let text = response.body.trim();
        text.parse::<IpAddr>().map_err(|_| {
            Error::network(format!("IP lookup via {} returned invalid address: {:?}", route, text))
        })
    }

    pub fn timeout_for(&self, route: Route) -> Duration {
        match route {
            Route::Relay => self.config.relay_timeout(),
            Route::Direct => self.config.direct_timeout(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}
