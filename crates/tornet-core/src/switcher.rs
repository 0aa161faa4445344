//! Exit circuit switching
//!
//! [`CircuitSwitcher`] asks the relay for a fresh circuit and then looks up
//! the address the world now sees. Neither step is fatal: a failed reload
//! still resolves (the relay may rebuild on its own), and a failed resolve
//! yields an unresolved [`CircuitResult`].

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::resolver::IpResolver;
use crate::traits::RelayControl;

/// Outcome of one rotation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitResult {
    /// Address observed after the rotation, if it could be resolved
    pub ip: Option<IpAddr>,
    pub succeeded: bool,
    pub observed_at: DateTime<Utc>,
}

impl CircuitResult {
    pub fn resolved(ip: IpAddr) -> Self {
        Self {
            ip: Some(ip),
            succeeded: true,
            observed_at: Utc::now(),
        }
    }

    pub fn unresolved() -> Self {
        Self {
            ip: None,
            succeeded: false,
            observed_at: Utc::now(),
        }
    }
}

/// Something that can produce a new exit circuit on demand
///
/// This is the seam [`crate::IntervalScheduler`] drives; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait CircuitRotator: Send + Sync {
    async fn rotate(&self) -> CircuitResult;
}

/// Reloads the relay and confirms the resulting address
pub struct CircuitSwitcher {
    control: Arc<dyn RelayControl>,
    resolver: IpResolver,
}

impl CircuitSwitcher {
    pub fn new(control: Arc<dyn RelayControl>, resolver: IpResolver) -> Self {
        Self { control, resolver }
    }
}

#[async_trait]
impl CircuitRotator for CircuitSwitcher {
    async fn rotate(&self) -> CircuitResult {
        if let Err(e) = self.control.reload().await {
            warn!("Relay reload failed, resolving anyway: {}", e);
        } else {
            debug!("Relay reload requested");
        }

        match self.resolver.resolve().await {
            Ok(ip) => {
                info!("Circuit rotated, exit address {}", ip);
                CircuitResult::resolved(ip)
            }
            Err(e) => {
                warn!("Could not resolve address after rotation: {}", e);
                CircuitResult::unresolved()
            }
        }
    }
}
