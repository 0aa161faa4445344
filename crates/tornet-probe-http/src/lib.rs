// # HTTP Probe
//
// This crate provides the reqwest-backed `HttpProbe` for tornet.
//
// ## Routes
//
// Two clients are built once and reused:
// - **Direct**: plain client, no proxy
// - **Relay**: every request goes through the relay's SOCKS port using
//   `socks5h`, so hostname resolution happens on the far side of the relay
//   and DNS lookups never leave the host in the clear
//
// ## Architecture
//
// The probe is deliberately dumb: one GET, status and body back. Deciding
// what a 4xx or an odd body means is the caller's job.

use std::net::SocketAddr;
use std::time::Duration;

use tornet_core::traits::{HttpProbe, ProbeResponse, Route};
use tornet_core::{Error, Result};

use tracing::debug;

const USER_AGENT: &str = concat!("tornet/", env!("CARGO_PKG_VERSION"));

/// HTTP probe with a direct and a relay-routed client
pub struct ReqwestProbe {
    direct: reqwest::Client,
    relay: reqwest::Client,
    socks_addr: SocketAddr,
}

impl ReqwestProbe {
    /// Build both clients
    ///
    /// # Parameters
    ///
    /// - `socks_addr`: the relay's local SOCKS listener (e.g. `127.0.0.1:9050`)
    pub fn new(socks_addr: SocketAddr) -> Result<Self> {
        let direct = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::network(format!("Failed to build direct client: {}", e)))?;

        let proxy = reqwest::Proxy::all(socks_url(socks_addr))
            .map_err(|e| Error::config(format!("Invalid SOCKS address {}: {}", socks_addr, e)))?;
        let relay = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .proxy(proxy)
            .build()
            .map_err(|e| Error::network(format!("Failed to build relay client: {}", e)))?;

        Ok(Self {
            direct,
            relay,
            socks_addr,
        })
    }

    pub fn socks_addr(&self) -> SocketAddr {
        self.socks_addr
    }

    fn client(&self, route: Route) -> &reqwest::Client {
        match route {
            Route::Direct => &self.direct,
            Route::Relay => &self.relay,
        }
    }
}

/// Proxy URL with remote name resolution
fn socks_url(addr: SocketAddr) -> String {
    format!("socks5h://{}", addr)
}

#[async_trait::async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str, route: Route, timeout: Duration) -> Result<ProbeResponse> {
        debug!("GET {} via {} (timeout {:?})", url, route, timeout);

        let response = self
            .client(route)
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::network(format!("GET {} via {} failed: {}", url, route, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read body from {}: {}", url, e)))?;

        debug!("GET {} via {} -> HTTP {}", url, route, status);
        Ok(ProbeResponse::new(status, body))
    }
}
