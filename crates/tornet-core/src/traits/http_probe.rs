// # HTTP Probe Trait
//
// Defines the single-request HTTP capability every resolver and diagnostic
// builds on.
//
// ## Implementations
//
// - reqwest with a SOCKS5h relay client: `tornet-probe-http` crate
// - Scripted test double: `tests/common/mod.rs`

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Network path a probe takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Straight out of the host's own interface
    Direct,
    /// Through the relay's local SOCKS endpoint
    Relay,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Direct => write!(f, "direct"),
            Route::Relay => write!(f, "relay"),
        }
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

impl ProbeResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP probe implementations
///
/// Implementations issue exactly one GET per call, bounded by `timeout`.
/// A response with any status is `Ok`; only transport failures (connect,
/// timeout, body read) are `Err(Error::Network)`. Interpreting the status
/// is the caller's job.
///
/// No retries, no caching.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get(
        &self,
        url: &str,
        route: Route,
        timeout: Duration,
    ) -> Result<ProbeResponse, crate::Error>;
}
