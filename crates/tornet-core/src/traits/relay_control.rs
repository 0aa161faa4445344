// # Relay Control Traits
//
// Defines how the core observes and steers the local relay daemon.
//
// ## Implementations
//
// - System service manager / container signalling: `tornet-relay-system` crate
// - Test doubles: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use tornet_core::{RelayControl, RelayState};
//
// async fn rotate(relay: &dyn RelayControl, state: &dyn RelayState) {
//     if state.is_running().await {
//         if let Err(e) = relay.reload().await {
//             tracing::warn!("Reload failed: {}", e);
//         }
//     }
// }
// ```

use async_trait::async_trait;

use crate::config::ExitCountries;

/// Liveness view of the relay daemon
///
/// The core polls this before every resolution and diagnostic step. It never
/// mutates relay state through this trait.
#[async_trait]
pub trait RelayState: Send + Sync {
    /// Whether the relay process is currently running
    ///
    /// Implementations should treat probe failures as "not running" rather
    /// than erroring.
    async fn is_running(&self) -> bool;
}

/// Lifecycle requests sent to the relay daemon
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Run service-manager commands or signal the relay process
/// - ✅ Append exit-node preferences to the relay's own configuration
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed commands (the caller logs and moves on)
/// - ❌ Resolve IP addresses (use `IpResolver`)
/// - ❌ Decide when to rotate (owned by `IntervalScheduler`)
///
/// Every method is best effort: a returned error is logged by the caller and
/// never aborts a rotation plan.
#[async_trait]
pub trait RelayControl: Send + Sync {
    /// Ask the relay to drop its current circuit and build a new one
    async fn reload(&self) -> Result<(), crate::Error>;

    /// Start the relay daemon
    async fn start(&self) -> Result<(), crate::Error>;

    /// Stop the relay daemon
    ///
    /// Container-aware implementations signal the process directly instead
    /// of going through a service manager.
    async fn stop(&self) -> Result<(), crate::Error>;

    /// Persist preferred exit-node countries into the relay configuration
    ///
    /// Takes effect on the next reload. The core never reads the preference
    /// back.
    async fn apply_exit_countries(&self, countries: &ExitCountries) -> Result<(), crate::Error>;
}
