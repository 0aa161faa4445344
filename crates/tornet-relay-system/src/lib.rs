// # System Relay Control
//
// This crate drives the host's Tor daemon for tornet.
//
// ## Init flavours
//
// - **Systemd**: `systemctl <verb> tor` (Arch and Manjaro hosts)
// - **SysV**: `service tor <verb>` (everything else)
// - **Container**: no service manager; signal the process directly
//   (`SIGHUP` to reload, `SIGTERM` to stop). The container entrypoint owns
//   the daemon, so start is a no-op.
//
// Service-manager commands are prefixed with `sudo` unless we already run
// as root.
//
// ## Peer processes
//
// `stop_peer_processes` sends `SIGTERM` to every other running tornet
// process. A rotation loop left running after the relay stops would
// resolve over the direct path.
//
// ## Platform Support
//
// Process signalling and the root check are Unix-only. Elsewhere the
// container flavour reports an error and `sudo` is always used.

pub mod torrc;

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tornet_core::config::RelayConfig;
use tornet_core::traits::{RelayControl, RelayState};
use tornet_core::{Error, ExitCountries, Result};
use tracing::{debug, info, warn};

/// Process name of this binary when it cannot be read from the executable path
const DEFAULT_PEER_NAME: &str = "tornet";

/// Release files marking a systemd-managed distribution
const SYSTEMD_RELEASE_FILES: &[&str] = &["arch-release", "manjaro-release"];

/// How the relay daemon is managed on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    SysV,
    Container,
}

impl InitSystem {
    /// Detect from the process environment and `/etc`
    pub fn detect(force_container: bool) -> Self {
        let docker = std::env::var_os("DOCKER_ENV").is_some_and(|v| !v.is_empty());
        Self::detect_in(force_container || docker, Path::new("/etc"))
    }

    /// Detection against an explicit `/etc` directory
    pub fn detect_in(container: bool, etc_dir: &Path) -> Self {
        if container {
            return InitSystem::Container;
        }
        if SYSTEMD_RELEASE_FILES
            .iter()
            .any(|name| etc_dir.join(name).exists())
        {
            InitSystem::Systemd
        } else {
            InitSystem::SysV
        }
    }

    /// Program and arguments for a service-manager verb
    ///
    /// `None` for [`InitSystem::Container`], which has no service manager.
    pub fn service_command(&self, verb: &str, service: &str) -> Option<(&'static str, Vec<String>)> {
        match self {
            InitSystem::Systemd => Some(("systemctl", vec![verb.to_string(), service.to_string()])),
            InitSystem::SysV => Some(("service", vec![service.to_string(), verb.to_string()])),
            InitSystem::Container => None,
        }
    }
}

/// [`RelayControl`] and [`RelayState`] backed by the host's process tools
pub struct SystemRelayControl {
    init: InitSystem,
    service_name: String,
    process_name: String,
    torrc_path: PathBuf,
    peer_name: String,
    use_sudo: bool,
}

impl SystemRelayControl {
    pub fn new(init: InitSystem, config: &RelayConfig) -> Self {
        Self {
            init,
            service_name: config.service_name.clone(),
            process_name: config.process_name.clone(),
            torrc_path: PathBuf::from(&config.torrc_path),
            peer_name: own_process_name(),
            use_sudo: !running_as_root(),
        }
    }

    /// Detect the init flavour and build a controller for it
    pub fn from_config(config: &RelayConfig) -> Self {
        let init = InitSystem::detect(config.container);
        info!("Relay control via {:?}", init);
        Self::new(init, config)
    }

    pub fn init_system(&self) -> InitSystem {
        self.init
    }

    /// Whether the relay binary is on PATH
    pub async fn is_installed(&self) -> bool {
        match Command::new("which").arg(&self.process_name).output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("which {} failed to run: {}", self.process_name, e);
                false
            }
        }
    }

    /// Send `SIGTERM` to every other tornet process
    ///
    /// # Returns
    ///
    /// The number of processes signalled. Finding none is not an error;
    /// a process that exits before it is signalled is skipped.
    pub async fn stop_peer_processes(&self) -> Result<usize> {
        let output = run("pgrep", ["-x".to_string(), self.peer_name.clone()]).await?;
        let pids = peer_pids(&String::from_utf8_lossy(&output.stdout), std::process::id());

        let mut stopped = 0;
        for pid in pids {
            match send_signal(pid, RelaySignal::Terminate) {
                Ok(()) => {
                    info!("Stopped {} process {}", self.peer_name, pid);
                    stopped += 1;
                }
                Err(e) => warn!("Could not stop {} process {}: {}", self.peer_name, pid, e),
            }
        }
        Ok(stopped)
    }

    async fn service(&self, verb: &str) -> Result<()> {
        let Some((program, args)) = self.init.service_command(verb, &self.service_name) else {
            return Err(Error::relay_control(format!(
                "no service manager for {:?}",
                self.init
            )));
        };

        let output = if self.use_sudo {
            run("sudo", std::iter::once(program.to_string()).chain(args)).await?
        } else {
            run(program, args).await?
        };

        if output.status.success() {
            debug!("{} {} {} succeeded", program, verb, self.service_name);
            Ok(())
        } else {
            Err(Error::relay_control(format!(
                "{} {} {} exited with {}: {}",
                program,
                verb,
                self.service_name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    /// PIDs of the relay process, via `pidof`
    async fn relay_pids(&self) -> Result<Vec<i32>> {
        let output = run("pidof", [self.process_name.clone()]).await?;
        let pids = parse_pids(&String::from_utf8_lossy(&output.stdout));
        if pids.is_empty() {
            return Err(Error::relay_control(format!(
                "no {} process found",
                self.process_name
            )));
        }
        Ok(pids)
    }

    async fn signal_relay(&self, signal: RelaySignal) -> Result<()> {
        let pids = self.relay_pids().await?;
        for pid in pids {
            send_signal(pid, signal)?;
            debug!("Sent {:?} to {} ({})", signal, self.process_name, pid);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RelayState for SystemRelayControl {
    async fn is_running(&self) -> bool {
        match Command::new("pgrep")
            .arg("-x")
            .arg(&self.process_name)
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("pgrep failed to run: {}", e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl RelayControl for SystemRelayControl {
    async fn reload(&self) -> Result<()> {
        match self.init {
            InitSystem::Container => self.signal_relay(RelaySignal::Reload).await,
            _ => self.service("reload").await,
        }
    }

    async fn start(&self) -> Result<()> {
        match self.init {
            InitSystem::Container => {
                info!("Container mode: relay is started by the container, skipping start");
                Ok(())
            }
            _ => self.service("start").await,
        }
    }

    async fn stop(&self) -> Result<()> {
        match self.init {
            InitSystem::Container => self.signal_relay(RelaySignal::Terminate).await,
            _ => self.service("stop").await,
        }
    }

    async fn apply_exit_countries(&self, countries: &ExitCountries) -> Result<()> {
        torrc::append_exit_policy(&self.torrc_path, countries).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelaySignal {
    Reload,
    Terminate,
}

async fn run<I, S>(program: &str, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::relay_control(format!("failed to run {}: {}", program, e)))
}

/// Whitespace-separated PIDs as printed by `pidof`
fn parse_pids(stdout: &str) -> Vec<i32> {
    stdout
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .filter(|pid| *pid > 0)
        .collect()
}

/// PIDs from `pgrep` output, minus our own
fn peer_pids(stdout: &str, own_pid: u32) -> Vec<i32> {
    parse_pids(stdout)
        .into_iter()
        .filter(|pid| u32::try_from(*pid).ok() != Some(own_pid))
        .collect()
}

/// File name of the running executable
fn own_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_PEER_NAME.to_string())
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: RelaySignal) -> Result<()> {
    let signum = match signal {
        RelaySignal::Reload => libc::SIGHUP,
        RelaySignal::Terminate => libc::SIGTERM,
    };
    // SAFETY: kill takes plain integers; an invalid pid is reported via errno.
    let rc = unsafe { libc::kill(pid, signum) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::relay_control(format!(
            "kill({}, {:?}) failed: {}",
            pid,
            signal,
            std::io::Error::last_os_error()
        )))
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, signal: RelaySignal) -> Result<()> {
    Err(Error::relay_control(format!(
        "{:?} signalling is only supported on Unix",
        signal
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_wins_over_release_files() {
        let etc = tempfile::tempdir().unwrap();
        std::fs::write(etc.path().join("arch-release"), "").unwrap();
        assert_eq!(InitSystem::detect_in(true, etc.path()), InitSystem::Container);
    }

    #[test]
    fn test_release_files_select_systemd() {
        for name in SYSTEMD_RELEASE_FILES {
            let etc = tempfile::tempdir().unwrap();
            std::fs::write(etc.path().join(name), "").unwrap();
            assert_eq!(InitSystem::detect_in(false, etc.path()), InitSystem::Systemd);
        }
    }

    #[test]
    fn test_plain_host_uses_sysv() {
        let etc = tempfile::tempdir().unwrap();
        assert_eq!(InitSystem::detect_in(false, etc.path()), InitSystem::SysV);
    }

    #[test]
    fn test_service_command_argument_order() {
        assert_eq!(
            InitSystem::Systemd.service_command("reload", "tor"),
            Some(("systemctl", vec!["reload".to_string(), "tor".to_string()]))
        );
        assert_eq!(
            InitSystem::SysV.service_command("stop", "tor"),
            Some(("service", vec!["tor".to_string(), "stop".to_string()]))
        );
        assert_eq!(InitSystem::Container.service_command("start", "tor"), None);
    }

    #[test]
    fn test_parse_pids() {
        assert_eq!(parse_pids("1234 5678\n"), vec![1234, 5678]);
        assert_eq!(parse_pids("\n"), Vec::<i32>::new());
        assert_eq!(parse_pids("12 junk 0 -3"), vec![12]);
    }

    #[test]
    fn test_peer_pids_exclude_own_process() {
        assert_eq!(peer_pids("4100\n4242\n4300\n", 4242), vec![4100, 4300]);
        assert_eq!(peer_pids("4242\n", 4242), Vec::<i32>::new());
        assert_eq!(peer_pids("", 4242), Vec::<i32>::new());
    }

    #[tokio::test]
    async fn test_no_peers_is_not_an_error() {
        let mut control = SystemRelayControl::new(InitSystem::SysV, &RelayConfig::default());
        control.peer_name = "tornet-test-no-such-peer".to_string();

        // pgrep may be absent on minimal hosts; that surfaces as a relay control error
        match control.stop_peer_processes().await {
            Ok(count) => assert_eq!(count, 0),
            Err(e) => assert!(matches!(e, Error::RelayControl(_))),
        }
    }

    #[tokio::test]
    async fn test_container_start_is_noop() {
        let control = SystemRelayControl::new(InitSystem::Container, &RelayConfig::default());
        assert!(control.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_container_reload_without_process_fails() {
        let config = RelayConfig {
            process_name: "tornet-test-no-such-process".to_string(),
            ..RelayConfig::default()
        };
        let control = SystemRelayControl::new(InitSystem::Container, &config);

        let err = control.reload().await.unwrap_err();
        assert!(matches!(err, Error::RelayControl(_)));
    }

    #[tokio::test]
    async fn test_apply_exit_countries_writes_configured_torrc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torrc");
        let config = RelayConfig {
            torrc_path: path.display().to_string(),
            ..RelayConfig::default()
        };
        let control = SystemRelayControl::new(InitSystem::SysV, &config);

        control
            .apply_exit_countries(&"de,ca".parse().unwrap())
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("ExitNodes {de},{ca}"));
    }
}
