// # tornet-core
//
// Rotation controller and diagnostic engine for Tor exit circuits.
//
// ## Architecture Overview
//
// - **IpResolver**: Resolves the public IP, through the relay when it is running
// - **CircuitSwitcher**: Reloads the relay and confirms the new exit address
// - **IntervalScheduler**: Paces rotations according to a RotationPlan
// - **DiagnosticEngine**: Leak detection, IP attribution and circuit liveness
// - **LifecycleManager**: Signal-driven shutdown of the relay and rotation tasks
//
// OS-facing collaborators are traits (`RelayState`, `RelayControl`,
// `HttpProbe`) implemented in sibling crates.
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Policy lives here, OS glue lives in plugins
// 2. **Single-shot probes**: No retries below the scheduler
// 3. **Cancellable waits**: Every suspension point honours a CancellationToken
// 4. **Library-First**: The binary only wires components together

pub mod traits;
pub mod config;
pub mod error;
pub mod resolver;
pub mod switcher;
pub mod scheduler;
pub mod diagnostics;
pub mod lifecycle;

// Re-export core types for convenience
pub use traits::{HttpProbe, ProbeResponse, RelayControl, RelayState, Route};
pub use config::{ExitCountries, IntervalSpec, RotationPlan, TornetConfig};
pub use error::{Error, Result};
pub use resolver::IpResolver;
pub use switcher::{CircuitResult, CircuitRotator, CircuitSwitcher};
pub use scheduler::{IntervalScheduler, RunOutcome, SchedulerState};
pub use diagnostics::{DiagnosticEngine, DiagnosticReport, IpInfo, LeakVerdict};
pub use lifecycle::{LifecycleManager, ShutdownOutcome};
