//! Configuration types for tornet
//!
//! This module defines the rotation plan types the scheduler consumes and the
//! grouped settings the binary assembles at startup. Everything here is parsed
//! and validated once; the scheduler never re-reads raw strings.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Countries picked from when the user does not name any
pub const DEFAULT_EXIT_COUNTRIES: &[&str] = &["us", "de", "fr", "nl", "ca"];

/// Wait between two rotations
///
/// Parsed from `"60"` (fixed) or `"10-120"` (uniform random per cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntervalSpec {
    /// Always wait exactly this many seconds
    Fixed(u64),
    /// Draw a wait uniformly from `lo..=hi` seconds each cycle
    Range { lo: u64, hi: u64 },
}

impl IntervalSpec {
    /// Create a range interval, rejecting `lo > hi`
    pub fn range(lo: u64, hi: u64) -> Result<Self> {
        if lo > hi {
            return Err(Error::config(format!(
                "Interval range lower bound {} exceeds upper bound {}",
                lo, hi
            )));
        }
        Ok(Self::Range { lo, hi })
    }

    /// Sample the wait for one cycle
    ///
    /// A hand-built `Range` with `lo > hi` samples from the swapped bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = match *self {
            IntervalSpec::Fixed(secs) => secs,
            IntervalSpec::Range { lo, hi } if lo == hi => lo,
            IntervalSpec::Range { lo, hi } => rng.gen_range(lo.min(hi)..=lo.max(hi)),
        };
        Duration::from_secs(secs)
    }

    /// Longest wait this interval can produce
    pub fn upper_bound(&self) -> Duration {
        match *self {
            IntervalSpec::Fixed(secs) => Duration::from_secs(secs),
            IntervalSpec::Range { lo, hi } => Duration::from_secs(lo.max(hi)),
        }
    }
}

fn parse_seconds(raw: &str, what: &str) -> Result<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::config(format!("Interval {} is empty", what)));
    }
    raw.parse::<u64>().map_err(|_| {
        Error::config(format!(
            "Interval {} '{}' is not a non-negative integer",
            what, raw
        ))
    })
}

impl FromStr for IntervalSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_seconds(lo, "lower bound")?;
                let hi = parse_seconds(hi, "upper bound")?;
                IntervalSpec::range(lo, hi)
            }
            None => Ok(IntervalSpec::Fixed(parse_seconds(s, "value")?)),
        }
    }
}

impl TryFrom<String> for IntervalSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IntervalSpec> for String {
    fn from(spec: IntervalSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for IntervalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalSpec::Fixed(secs) => write!(f, "{}", secs),
            IntervalSpec::Range { lo, hi } => write!(f, "{}-{}", lo, hi),
        }
    }
}

/// How often and how many times to rotate
///
/// Immutable once handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPlan {
    /// Wait before each rotation
    pub interval: IntervalSpec,
    /// Number of rotations; 0 repeats until cancelled
    pub count: u32,
}

impl RotationPlan {
    /// Create a plan from already-parsed parts
    pub fn new(interval: IntervalSpec, count: u32) -> Self {
        Self { interval, count }
    }

    /// Build a plan from raw user input
    pub fn parse(interval: &str, count: &str) -> Result<Self> {
        let interval = interval.parse()?;
        let count = count.trim().parse::<u32>().map_err(|_| {
            Error::config(format!(
                "Count '{}' is not a non-negative integer",
                count.trim()
            ))
        })?;
        Ok(Self::new(interval, count))
    }

    /// Whether the plan only ends on cancellation
    pub fn is_unbounded(&self) -> bool {
        self.count == 0
    }
}

/// Preferred exit-node countries, passed through to the relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ExitCountries(Vec<String>);

impl ExitCountries {
    /// Validate and normalise a list of country codes
    pub fn new<I, S>(codes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for code in codes {
            let code = code.as_ref().trim().to_lowercase();
            if code.is_empty() {
                return Err(Error::config("Exit country list contains an empty entry"));
            }
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::config(format!(
                    "Exit country '{}' is not a two-letter country code",
                    code
                )));
            }
            if !out.contains(&code) {
                out.push(code);
            }
        }
        if out.is_empty() {
            return Err(Error::config("Exit country list is empty"));
        }
        Ok(Self(out))
    }

    /// Pick one of [`DEFAULT_EXIT_COUNTRIES`] at random
    pub fn random_default<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = DEFAULT_EXIT_COUNTRIES.choose(rng).copied().unwrap_or("us");
        Self(vec![code.to_string()])
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

impl FromStr for ExitCountries {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split(','))
    }
}

impl TryFrom<Vec<String>> for ExitCountries {
    type Error = Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ExitCountries> for Vec<String> {
    fn from(countries: ExitCountries) -> Self {
        countries.0
    }
}

impl fmt::Display for ExitCountries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Main tornet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TornetConfig {
    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

impl TornetConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.resolver.validate()?;
        self.diagnostics.validate()?;
        self.relay.validate()?;
        Ok(())
    }
}

/// Rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    pub plan: RotationPlan,

    /// `None` lets the binary pick a random default country
    #[serde(default)]
    pub exit_countries: Option<ExitCountries>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            plan: RotationPlan::new(IntervalSpec::Fixed(60), 10),
            exit_countries: None,
        }
    }
}

/// "What is my IP" lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Endpoint returning the caller's address as plain text
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    /// Timeout for lookups through the relay (in seconds)
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,

    /// Timeout for direct lookups (in seconds)
    #[serde(default = "default_direct_timeout_secs")]
    pub direct_timeout_secs: u64,
}

impl ResolverConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_url(&self.lookup_url, "Lookup URL")?;
        if self.relay_timeout_secs == 0 || self.direct_timeout_secs == 0 {
            return Err(Error::config("Resolver timeouts must be > 0"));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_url: default_lookup_url(),
            relay_timeout_secs: default_relay_timeout_secs(),
            direct_timeout_secs: default_direct_timeout_secs(),
        }
    }
}

/// An IP-geolocation endpoint; `{ip}` in the template is replaced per query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoProviderConfig {
    pub name: String,
    pub url_template: String,
}

impl GeoProviderConfig {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
        }
    }

    pub fn url_for(&self, ip: std::net::IpAddr) -> String {
        self.url_template.replace("{ip}", &ip.to_string())
    }
}

/// Diagnostic probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Identity probes queried through the relay (at least two)
    #[serde(default = "default_relay_probes")]
    pub relay_probes: Vec<String>,

    /// Identity probe queried directly, the comparison point
    #[serde(default = "default_direct_probe")]
    pub direct_probe: String,

    /// Geolocation fallback chain, tried in order
    #[serde(default = "default_geo_providers")]
    pub geo_providers: Vec<GeoProviderConfig>,

    /// Endpoint reporting whether the caller is a known exit
    #[serde(default = "default_exit_check_url")]
    pub exit_check_url: String,

    /// Timeout for every diagnostic probe (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl DiagnosticsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_probes.len() < 2 {
            return Err(Error::config(
                "At least two relay-path identity probes are required",
            ));
        }
        for url in &self.relay_probes {
            validate_url(url, "Relay probe URL")?;
        }
        validate_url(&self.direct_probe, "Direct probe URL")?;
        validate_url(&self.exit_check_url, "Exit check URL")?;
        if self.geo_providers.is_empty() {
            return Err(Error::config("No geolocation providers configured"));
        }
        for provider in &self.geo_providers {
            if provider.name.is_empty() {
                return Err(Error::config("Geolocation provider name cannot be empty"));
            }
            validate_url(&provider.url_template, "Geolocation provider URL")?;
        }
        if self.probe_timeout_secs == 0 {
            return Err(Error::config("Probe timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            relay_probes: default_relay_probes(),
            direct_probe: default_direct_probe(),
            geo_providers: default_geo_providers(),
            exit_check_url: default_exit_check_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Local relay daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Local SOCKS endpoint exposed by the relay
    #[serde(default = "default_socks_addr")]
    pub socks_addr: SocketAddr,

    /// Service name for systemctl/service
    #[serde(default = "default_relay_name")]
    pub service_name: String,

    /// Process name for pgrep/pidof
    #[serde(default = "default_relay_name")]
    pub process_name: String,

    /// Relay configuration file receiving exit-node preferences
    #[serde(default = "default_torrc_path")]
    pub torrc_path: String,

    /// Signal the relay process directly instead of using a service manager
    #[serde(default)]
    pub container: bool,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() || self.process_name.is_empty() {
            return Err(Error::config("Relay service and process names cannot be empty"));
        }
        if self.torrc_path.is_empty() {
            return Err(Error::config("torrc path cannot be empty"));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            socks_addr: default_socks_addr(),
            service_name: default_relay_name(),
            process_name: default_relay_name(),
            torrc_path: default_torrc_path(),
            container: false,
        }
    }
}

fn validate_url(url: &str, what: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::config(format!("{} cannot be empty", what)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

fn default_lookup_url() -> String {
    "https://api.ipify.org".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    10
}

fn default_direct_timeout_secs() -> u64 {
    5
}

fn default_relay_probes() -> Vec<String> {
    vec![
        "https://ipinfo.io/json".to_string(),
        "http://ip-api.com/json/".to_string(),
    ]
}

fn default_direct_probe() -> String {
    "http://ip-api.com/json/".to_string()
}

fn default_geo_providers() -> Vec<GeoProviderConfig> {
    vec![
        GeoProviderConfig::new("ip-api", "http://ip-api.com/json/{ip}"),
        GeoProviderConfig::new("ipinfo", "https://ipinfo.io/{ip}/json"),
        GeoProviderConfig::new("ipwhois", "https://ipwho.is/{ip}"),
    ]
}

fn default_exit_check_url() -> String {
    "https://check.torproject.org/api/ip".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_socks_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9050))
}

fn default_relay_name() -> String {
    "tor".to_string()
}

fn default_torrc_path() -> String {
    "/etc/tor/torrc".to_string()
}
