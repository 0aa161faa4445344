// # tornet - Tor exit rotation CLI
//
// This binary is a THIN integration layer: it parses arguments, builds the
// collaborators and hands control to tornet-core. Rotation, diagnostics and
// shutdown policy all live in the core crate.
//
// ## Configuration
//
// Every flag can also be set through the environment:
//
// ### Rotation
// - `TORNET_INTERVAL`: Seconds between rotations, `N` or `LO-HI` (default 60)
// - `TORNET_COUNT`: Number of rotations, 0 for unlimited (default 10)
// - `TORNET_COUNTRIES`: Comma-separated exit country codes (default: one at random)
//
// ### Relay
// - `TORNET_SOCKS_ADDR`: Relay SOCKS listener (default 127.0.0.1:9050)
// - `TORNET_TORRC`: Relay configuration file (default /etc/tor/torrc)
//
// ### Output
// - `TORNET_JSON`: Print results as JSON
// - `TORNET_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// tornet --interval 30-90 --count 0 --countries us,nl
// tornet --security-check --json
// ```

use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use tornet_core::diagnostics::DiagnosticEngine;
use tornet_core::lifecycle::wait_for_termination_signal;
use tornet_core::traits::{RelayControl, RelayState};
use tornet_core::{
    CircuitResult, CircuitSwitcher, ExitCountries, IntervalScheduler, IpResolver,
    LifecycleManager, RotationPlan, RunOutcome, TornetConfig,
};
use tornet_probe_http::ReqwestProbe;
use tornet_relay_system::{InitSystem, SystemRelayControl};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TornetExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<TornetExitCode> for ExitCode {
    fn from(code: TornetExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Rotate your public IP through Tor exit circuits
#[derive(Parser, Debug)]
#[command(name = "tornet", author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .multiple(false)
        .args(["ip", "ip_info", "dns_leak_test", "circuit_status", "security_check", "stop"])
))]
struct Args {
    /// Seconds between rotations: a number, or a range like 30-90
    #[arg(long, env = "TORNET_INTERVAL", default_value = "60")]
    interval: String,

    /// Number of rotations; 0 rotates until interrupted
    #[arg(long, env = "TORNET_COUNT", default_value = "10")]
    count: String,

    /// Comma-separated exit country codes (e.g. us,de,fr)
    #[arg(long, env = "TORNET_COUNTRIES")]
    countries: Option<String>,

    /// Print the current IP address and exit
    #[arg(long, env = "TORNET_IP")]
    ip: bool,

    /// Print attribution for the current IP address and exit
    #[arg(long, env = "TORNET_IP_INFO")]
    ip_info: bool,

    /// Compare relay-path and direct-path identity and exit
    #[arg(long, env = "TORNET_DNS_LEAK_TEST")]
    dns_leak_test: bool,

    /// Check whether the relay changes the observed address and exit
    #[arg(long, env = "TORNET_CIRCUIT_STATUS")]
    circuit_status: bool,

    /// Run every diagnostic and exit
    #[arg(long, env = "TORNET_SECURITY_CHECK")]
    security_check: bool,

    /// Stop other running tornet processes and the relay, then exit
    #[arg(long, env = "TORNET_STOP")]
    stop: bool,

    /// Print results as JSON
    #[arg(long, env = "TORNET_JSON")]
    json: bool,

    /// Relay SOCKS listener
    #[arg(long, env = "TORNET_SOCKS_ADDR", default_value = "127.0.0.1:9050")]
    socks_addr: SocketAddr,

    /// Relay configuration file receiving exit-node preferences
    #[arg(long, env = "TORNET_TORRC", default_value = "/etc/tor/torrc")]
    torrc: String,

    /// Log verbosity: trace, debug, info, warn or error
    #[arg(long, env = "TORNET_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// What this invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    ShowIp,
    IpInfo,
    DnsLeakTest,
    CircuitStatus,
    SecurityCheck,
    Stop,
    Rotate,
}

/// Application configuration
struct Config {
    tornet: TornetConfig,
    mode: Mode,
    json: bool,
    log_level: String,
}

impl Config {
    /// Build configuration from parsed arguments
    ///
    /// Interval, count and country strings are parsed here so malformed
    /// input is rejected before anything touches the relay.
    fn from_args(args: Args) -> Result<Self> {
        let plan = RotationPlan::parse(&args.interval, &args.count)?;
        let exit_countries = args
            .countries
            .as_deref()
            .map(str::parse::<ExitCountries>)
            .transpose()?;

        let mut tornet = TornetConfig::default();
        tornet.rotation.plan = plan;
        tornet.rotation.exit_countries = exit_countries;
        tornet.relay.socks_addr = args.socks_addr;
        tornet.relay.torrc_path = args.torrc;

        let mode = if args.ip {
            Mode::ShowIp
        } else if args.ip_info {
            Mode::IpInfo
        } else if args.dns_leak_test {
            Mode::DnsLeakTest
        } else if args.circuit_status {
            Mode::CircuitStatus
        } else if args.security_check {
            Mode::SecurityCheck
        } else if args.stop {
            Mode::Stop
        } else {
            Mode::Rotate
        };

        Ok(Self {
            tornet,
            mode,
            json: args.json,
            log_level: args.log_level,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.tornet.validate()?;

        if self.level().is_none() {
            anyhow::bail!(
                "TORNET_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    fn level(&self) -> Option<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_args(Args::parse()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return TornetExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return TornetExitCode::ConfigError.into();
    }

    // Logs go to stderr so stdout carries only results
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level().unwrap_or(Level::INFO))
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TornetExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TornetExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(config).await {
            Ok(()) => TornetExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                exit_code_for(&e)
            }
        }
    });

    result.into()
}

/// Configuration errors end startup with 1; anything else is a runtime error
fn exit_code_for(err: &anyhow::Error) -> TornetExitCode {
    match err.downcast_ref::<tornet_core::Error>() {
        Some(e) if !e.is_recoverable() => TornetExitCode::ConfigError,
        _ => TornetExitCode::RuntimeError,
    }
}

/// Wire collaborators together and run the selected mode
async fn run(config: Config) -> Result<()> {
    let Config { tornet, mode, json, .. } = config;

    let probe = Arc::new(ReqwestProbe::new(tornet.relay.socks_addr)?);
    let relay = Arc::new(SystemRelayControl::from_config(&tornet.relay));
    let resolver = IpResolver::new(probe.clone(), relay.clone(), tornet.resolver.clone());
    let engine = DiagnosticEngine::new(
        probe.clone(),
        relay.clone(),
        resolver.clone(),
        tornet.diagnostics.clone(),
    );
    let lifecycle = Arc::new(LifecycleManager::new(relay.clone()));

    let signals = Arc::clone(&lifecycle);
    tokio::spawn(async move {
        match wait_for_termination_signal().await {
            Ok(signal) => {
                info!("Received {}", signal);
                signals.on_termination_signal().await;
            }
            Err(e) => error!("Failed to install signal handlers: {}", e),
        }
    });

    match mode {
        Mode::ShowIp => {
            let ip = resolver.resolve().await?;
            if json {
                println!("{}", serde_json::json!({ "ip": ip }));
            } else {
                println!("Your IP: {}", ip);
            }
        }
        Mode::IpInfo => match engine.get_ip_info(None).await {
            Some(info) if json => println!("{}", serde_json::to_string_pretty(&info)?),
            Some(info) => {
                println!("IP info (from {}):", info.provider);
                for (field, value) in &info.fields {
                    println!("  {}: {}", field, value);
                }
            }
            None => anyhow::bail!("No IP information provider answered"),
        },
        Mode::DnsLeakTest => {
            let verdict = engine.check_dns_leak().await;
            if json {
                println!("{}", serde_json::json!({ "dns_leak": verdict }));
            } else {
                println!("DNS leak test: {}", verdict_label(verdict));
            }
        }
        Mode::CircuitStatus => {
            let active = engine.check_circuit_status().await;
            if json {
                println!("{}", serde_json::json!({ "circuit_active": active }));
            } else if active {
                println!("Tor circuit is active");
            } else {
                println!("Tor circuit is NOT active");
            }
        }
        Mode::SecurityCheck => {
            let report = engine.comprehensive_check().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Mode::Stop => {
            match relay.stop_peer_processes().await {
                Ok(0) => {}
                Ok(count) => println!("Stopped {} running tornet process(es)", count),
                Err(e) => warn!("Could not stop other tornet processes: {}", e),
            }
            lifecycle.shutdown().await;
            println!("Tor services stopped");
        }
        Mode::Rotate => {
            prepare_relay(&tornet, &relay).await?;

            if !engine.check_connectivity().await {
                return Err(tornet_core::Error::network(
                    "No internet connection; check your network and try again",
                )
                .into());
            }

            let scheduler =
                IntervalScheduler::new(Box::new(CircuitSwitcher::new(relay.clone(), resolver)));
            let outcome = scheduler
                .run(tornet.rotation.plan, lifecycle.child_token(), move |result| {
                    print_result(result, json)
                })
                .await;

            match outcome {
                RunOutcome::Completed { rotations } => info!("Finished after {} rotation(s)", rotations),
                RunOutcome::Cancelled { rotations } => info!("Stopped after {} rotation(s)", rotations),
            }
        }
    }

    Ok(())
}

/// Startup sequence before the first rotation
///
/// Only a missing relay binary is fatal; the other steps warn and carry on.
async fn prepare_relay(tornet: &TornetConfig, relay: &SystemRelayControl) -> Result<()> {
    if !relay.is_installed().await {
        return Err(tornet_core::Error::config(
            "Tor is not installed. Please install Tor and try again",
        )
        .into());
    }

    let countries = match &tornet.rotation.exit_countries {
        Some(countries) => countries.clone(),
        None => {
            let picked = ExitCountries::random_default(&mut rand::thread_rng());
            println!("Randomly selected country: {}", picked);
            picked
        }
    };
    if let Err(e) = relay.apply_exit_countries(&countries).await {
        warn!("Could not update relay exit countries: {}", e);
    }

    if let Err(e) = relay.reload().await {
        warn!("Relay reload failed: {}", e);
    }

    if relay.init_system() != InitSystem::Container {
        if let Err(e) = relay.start().await {
            warn!("Relay start failed: {}", e);
        }
        println!("Tor service started. Please wait a minute for Tor to connect.");
    }

    if !relay.is_running().await {
        warn!("Relay is not running yet; lookups will go direct until it is");
    }

    Ok(())
}

fn print_result(result: &CircuitResult, json: bool) {
    let Some(ip) = result.ip else {
        return;
    };
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to encode result: {}", e),
        }
    } else {
        println!("Your IP has been changed to: {}", ip);
    }
}

fn verdict_label(verdict: tornet_core::LeakVerdict) -> &'static str {
    match verdict {
        tornet_core::LeakVerdict::Passed => "PASSED",
        tornet_core::LeakVerdict::Failed => "FAILED (possible leak)",
        tornet_core::LeakVerdict::Inconclusive => "INCONCLUSIVE",
    }
}

fn print_report(report: &tornet_core::DiagnosticReport) {
    println!("Security check");
    match &report.ip_info {
        Some(info) => {
            let country = info.get("country").unwrap_or("unknown");
            let org = info
                .get("org")
                .or_else(|| info.get("isp"))
                .unwrap_or("unknown");
            println!("  IP info:        {} / {} (via {})", country, org, info.provider);
        }
        None => println!("  IP info:        unavailable"),
    }
    println!("  DNS leak test:  {}", verdict_label(report.dns_leak));
    println!(
        "  Circuit:        {}",
        if report.circuit_active { "active" } else { "NOT active" }
    );
    match report.exit_confirmed {
        Some(true) => println!("  Exit check:     recognised as Tor exit"),
        Some(false) => println!("  Exit check:     NOT recognised as Tor exit"),
        None => println!("  Exit check:     unavailable"),
    }
    println!(
        "  Overall:        {}",
        if report.passed() { "PASSED" } else { "FAILED" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(argv: &[&str]) -> Result<Config> {
        let args = Args::try_parse_from(std::iter::once("tornet").chain(argv.iter().copied()))?;
        Config::from_args(args)
    }

    #[test]
    fn test_defaults_select_rotation() {
        let config = config(&[]).unwrap();
        assert_eq!(config.mode, Mode::Rotate);
        assert_eq!(config.tornet.rotation.plan.count, 10);
        assert_eq!(config.tornet.rotation.plan.interval.to_string(), "60");
        assert!(config.tornet.rotation.exit_countries.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_range_interval_and_countries() {
        let config = config(&["--interval", "30-90", "--count", "0", "--countries", "us,NL"]).unwrap();
        assert!(config.tornet.rotation.plan.is_unbounded());
        assert_eq!(config.tornet.rotation.plan.interval.to_string(), "30-90");
        assert_eq!(
            config.tornet.rotation.exit_countries.unwrap().codes(),
            &["us".to_string(), "nl".to_string()]
        );
    }

    #[test]
    fn test_malformed_interval_rejected() {
        assert!(config(&["--interval", "ten"]).is_err());
        assert!(config(&["--interval", "90-30"]).is_err());
        assert!(config(&["--count", "-1"]).is_err());
    }

    #[test]
    fn test_mode_flags_are_exclusive() {
        assert!(config(&["--ip", "--stop"]).is_err());
        assert_eq!(config(&["--security-check"]).unwrap().mode, Mode::SecurityCheck);
        assert_eq!(config(&["--dns-leak-test"]).unwrap().mode, Mode::DnsLeakTest);
    }

    #[test]
    fn test_invalid_log_level_fails_validation() {
        let config = config(&["--log-level", "loud"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_errors_map_to_exit_code_one() {
        let err: anyhow::Error = tornet_core::Error::config("bad").into();
        assert_eq!(exit_code_for(&err), TornetExitCode::ConfigError);

        let err: anyhow::Error = tornet_core::Error::network("down").into();
        assert_eq!(exit_code_for(&err), TornetExitCode::RuntimeError);
    }
}
