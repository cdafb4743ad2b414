//! Launch and shutdown of the agent daemon that newer GnuPG versions route
//! every passphrase prompt through.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use super::version::Version;
use crate::config::EngineConfig;
use crate::constants::default_constants::{
    AGENT_POLL_INTERVAL_MS, AGENT_SHUTDOWN_TIMEOUT_MS, FIXED_LOCALE,
};
use crate::constants::env_variables::{LC_ALL, PINENTRY_USER_DATA};
use crate::util::fs_util::{path_to_str, resolve_executable};
use crate::util::process::ProcessControl;

lazy_static! {
    static ref AGENT_INFO: Regex = Regex::new(r"GPG_AGENT_INFO[=\s]+([^;\s]+)").unwrap();
}

/// `<socket>:<pid>:<protocol>` as announced by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub socket: String,
    pub pid: Option<u32>,
    pub protocol: Option<String>,
}

impl AgentInfo {
    /// Parses an announcement line in either shell syntax
    /// (`setenv GPG_AGENT_INFO ...;` or `GPG_AGENT_INFO=...; export ...`).
    pub fn parse(line: &str) -> Option<AgentInfo> {
        let value = AGENT_INFO.captures(line)?.get(1)?.as_str();
        let mut parts = value.splitn(3, ':');
        let socket = parts.next().filter(|s| !s.is_empty())?.to_string();
        let pid = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|pid| *pid > 0 && i32::try_from(*pid).is_ok());
        let protocol = parts.next().map(str::to_string);
        Some(AgentInfo { socket, pid, protocol })
    }

    pub fn to_env_value(&self) -> String {
        let mut value = self.socket.clone();
        if let Some(pid) = self.pid {
            value.push_str(&format!(":{}", pid));
            if let Some(protocol) = &self.protocol {
                value.push_str(&format!(":{}", protocol));
            }
        }
        value
    }
}

/// A daemon started for one engine run.
#[derive(Debug)]
pub struct Agent {
    info: Option<AgentInfo>,
    /// The launcher reported success, so the daemon is ours to stop.
    started: bool,
}

impl Agent {
    pub fn launch(config: &EngineConfig, version: &Version, pins: &str) -> Result<Agent> {
        let pinentry = resolve_executable(&config.pinentry);
        let mut args: Vec<String> = [
            "--daemon",
            "--options",
            "/dev/null",
            "--csh",
            "--keep-display",
            "--no-grab",
            "--ignore-cache-for-signing",
            "--pinentry-touch-file",
            "/dev/null",
            "--disable-scdaemon",
            "--pinentry-program",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(path_to_str(&pinentry)?.to_string());
        if !version.has_standard_socket_only() {
            args.push("--no-use-standard-socket".to_string());
        }
        if let Some(homedir) = &config.homedir {
            args.push("--homedir".to_string());
            args.push(path_to_str(homedir)?.to_string());
        }
        if config.debug {
            debug!("Agent arguments: {} {}", config.agent, args.join(" "));
        }

        let mut child = Command::new(resolve_executable(&config.agent))
            .args(&args)
            .env(LC_ALL, FIXED_LOCALE)
            .env(PINENTRY_USER_DATA, pins)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to launch {}", config.agent))?;

        let mut line = String::new();
        if let Some(stdout) = child.stdout.take() {
            BufReader::new(stdout).read_line(&mut line)?;
        }
        let status = child.wait()?;
        let info = AgentInfo::parse(&line);
        debug!("Agent launcher exited with {}, announced {:?}", status, info);

        Ok(Agent { info, started: status.success() })
    }

    pub fn info(&self) -> Option<&AgentInfo> {
        self.info.as_ref()
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Stops the daemon by PID when it announced one, otherwise through
    /// `gpgconf` if this launch started it.
    pub fn shutdown(self, config: &EngineConfig) -> Result<()> {
        match self.info.as_ref().and_then(|info| info.pid) {
            Some(pid) => {
                let timeout = Duration::from_millis(AGENT_SHUTDOWN_TIMEOUT_MS);
                terminate_and_wait(ProcessControl::new(pid), timeout)
            }
            None if self.started => kill_with_gpgconf(config),
            None => {
                debug!("No agent of ours to stop");
                Ok(())
            }
        }
    }
}

/// Sends SIGTERM and polls until the process is gone, resending the signal
/// on every poll. Escalates to SIGKILL after `timeout`.
pub(crate) fn terminate_and_wait(process: ProcessControl, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    process.terminate()?;
    while process.is_running() {
        if Instant::now() >= deadline {
            warn!("Agent {} ignored SIGTERM for {:?}, killing it", process.pid(), timeout);
            return process.kill();
        }
        thread::sleep(Duration::from_millis(AGENT_POLL_INTERVAL_MS));
        process.terminate()?;
    }
    debug!("Agent {} stopped", process.pid());
    Ok(())
}

fn kill_with_gpgconf(config: &EngineConfig) -> Result<()> {
    let mut command = Command::new(resolve_executable(&config.gpgconf));
    if let Some(homedir) = &config.homedir {
        command.arg("--homedir").arg(homedir);
    }
    let status = command
        .args(["--kill", "gpg-agent"])
        .env(LC_ALL, FIXED_LOCALE)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run {}", config.gpgconf))?;
    if !status.success() {
        warn!("{} --kill gpg-agent exited with {}", config.gpgconf, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_csh_announcement() {
        let info =
            AgentInfo::parse("setenv GPG_AGENT_INFO /tmp/gpg-XYZ/S.gpg-agent:4711:1;").unwrap();
        assert_eq!(info, AgentInfo {
            socket: "/tmp/gpg-XYZ/S.gpg-agent".to_string(),
            pid: Some(4711),
            protocol: Some("1".to_string()),
        });
        assert_eq!(info.to_env_value(), "/tmp/gpg-XYZ/S.gpg-agent:4711:1");
    }

    #[test]
    fn parse_sh_announcement() {
        let info = AgentInfo::parse("GPG_AGENT_INFO=/run/S.gpg-agent:12:1; export GPG_AGENT_INFO;")
            .unwrap();
        assert_eq!(info.pid, Some(12));
    }

    #[test]
    fn group_pids_are_dropped() {
        for line in [
            "setenv GPG_AGENT_INFO /tmp/S.gpg-agent:0:1;",
            "setenv GPG_AGENT_INFO /tmp/S.gpg-agent:4294967295:1;",
            "setenv GPG_AGENT_INFO /tmp/S.gpg-agent:2147483648:1;",
        ] {
            let info = AgentInfo::parse(line).unwrap();
            assert_eq!(info.socket, "/tmp/S.gpg-agent");
            assert_eq!(info.pid, None);
        }
    }

    #[test]
    fn parse_nothing() {
        assert_eq!(AgentInfo::parse(""), None);
        assert_eq!(AgentInfo::parse("gpg-agent: a gpg-agent is already running"), None);
    }

    #[test]
    fn terminate_stops_a_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let process = ProcessControl::new(child.id());
        let handle = std::thread::spawn(move || child.wait().unwrap());
        terminate_and_wait(process, Duration::from_secs(5)).unwrap();
        assert!(!handle.join().unwrap().success());
        assert!(!process.is_running());
    }

    #[test]
    fn announcement_free_launcher_is_not_stopped_by_pid() {
        let agent = Agent { info: None, started: false };
        agent.shutdown(&EngineConfig::default()).unwrap();
    }
}
