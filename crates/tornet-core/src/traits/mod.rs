//! Collaborator traits for tornet
//!
//! This module defines the narrow interfaces the core drives but does not own.
//!
//! - [`RelayState`]: Observe whether the relay daemon is running
//! - [`RelayControl`]: Reload, start and stop the relay daemon
//! - [`HttpProbe`]: Issue a single GET, directly or through the relay

pub mod relay_control;
pub mod http_probe;

pub use relay_control::{RelayControl, RelayState};
pub use http_probe::{HttpProbe, ProbeResponse, Route};
