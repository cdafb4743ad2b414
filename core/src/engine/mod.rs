//! The subprocess engine.
//!
//! An [`Engine`] is configured for one operation at a time: [`Engine::reset`],
//! then operation, sources, sink and handlers, then [`Engine::run`]. After the
//! run the error accessors describe what the default classifiers saw.

pub mod agent;
mod channel;
mod io_loop;
pub mod version;

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::process::{Command, ExitStatus};

use anyhow::Result;
use log::{debug, warn};
use nix::errno::Errno;
use zeroize::Zeroizing;

pub use self::agent::{Agent, AgentInfo};
pub use self::channel::{Sink, Source};
use self::channel::RunContext;
use self::io_loop::{run_loop, Dispatch};
pub use self::version::Version;
use crate::config::EngineConfig;
use crate::constants::default_constants::FIXED_LOCALE;
use crate::constants::env_variables::{GPG_AGENT_INFO, LC_ALL, PINENTRY_USER_DATA};
use crate::constants::fd_numbers::{FD_COMMAND, FD_STATUS};
use crate::error::ErrorCode;
use crate::status::{classifier, ErrorState, LineContext, LineHandler};
use crate::util::fs_util::{is_writable_dir, path_to_str, resolve_executable};

#[derive(Debug)]
pub enum EngineErr {
    NoOperation,
    Multiplex(Errno),
    ZeroReady,
    CannotTakePipe(&'static str),
    UnsupportedVersion(Version),
    MissingVersion,
    VersionProbe(String),
}

impl Display for EngineErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use EngineErr::*;

        match self {
            NoOperation => write!(f, "No operation specified"),
            Multiplex(errno) => write!(f, "Error selecting on subprocess channels: {}", errno),
            ZeroReady => write!(f, "Blocking multiplex call returned with nothing ready"),
            CannotTakePipe(name) => write!(f, "Cannot take subprocess {} pipe", name),
            UnsupportedVersion(version) => write!(
                f,
                "Found GnuPG {}, at least {} is required",
                version,
                Version::minimum()
            ),
            MissingVersion => write!(f, "No GnuPG version information found"),
            VersionProbe(reason) => write!(f, "Unable to determine GnuPG version: {}", reason),
        }
    }
}

impl Error for EngineErr {}

pub struct Engine {
    config: EngineConfig,
    version: Option<Version>,
    operation: Option<String>,
    arguments: Vec<String>,
    input: Option<Source>,
    message: Option<Source>,
    output: Option<Sink>,
    pins: BTreeMap<String, String>,
    status_handlers: Vec<LineHandler>,
    error_handlers: Vec<LineHandler>,
    error: ErrorState,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut engine = Engine {
            config,
            version: None,
            operation: None,
            arguments: Vec::new(),
            input: None,
            message: None,
            output: None,
            pins: BTreeMap::new(),
            status_handlers: Vec::new(),
            error_handlers: Vec::new(),
            error: ErrorState::default(),
        };
        engine.reset();
        engine
    }

    /// Engine with a known version, skipping the probe.
    pub fn with_version(config: EngineConfig, version: Version) -> Self {
        let mut engine = Engine::new(config);
        engine.version = Some(version);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Forgets everything about the previous operation and installs the
    /// default classifiers (and debug echo handlers in debug mode) as the
    /// first handlers of the next run.
    pub fn reset(&mut self) {
        self.operation = None;
        self.arguments.clear();
        self.input = None;
        self.message = None;
        self.output = None;
        self.pins.clear();
        self.error = ErrorState::default();

        self.status_handlers = vec![Box::new(classifier::handle_status)];
        self.error_handlers = vec![Box::new(classifier::handle_error)];
        if self.config.debug {
            self.status_handlers.push(Box::new(|line: &str, _: &mut LineContext<'_>| {
                debug!("STATUS: {}", line)
            }));
            self.error_handlers.push(Box::new(|line: &str, _: &mut LineContext<'_>| {
                debug!("ERROR: {}", line)
            }));
        }
    }

    /// `operation` may carry operands, e.g. `--verify - -&5`.
    pub fn set_operation<S: Into<String>>(&mut self, operation: S, arguments: &[&str]) {
        self.operation = Some(operation.into());
        self.arguments = arguments.iter().map(|a| a.to_string()).collect();
    }

    pub fn set_input<S: Into<Source>>(&mut self, source: S) {
        self.input = Some(source.into());
    }

    /// Data for the message channel, read by the subprocess from `-&5`.
    pub fn set_message<S: Into<Source>>(&mut self, source: S) {
        self.message = Some(source.into());
    }

    pub fn set_output(&mut self, sink: Sink) {
        self.output = Some(sink);
    }

    /// The sink after a run. Buffered output if no sink was set.
    pub fn take_output(&mut self) -> Option<Sink> {
        self.output.take()
    }

    pub fn add_status_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &mut LineContext<'_>) + Send + 'static,
    {
        self.status_handlers.push(Box::new(handler));
    }

    pub fn add_error_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str, &mut LineContext<'_>) + Send + 'static,
    {
        self.error_handlers.push(Box::new(handler));
    }

    /// Key id to passphrase pairs handed to the relay of this run.
    pub fn set_pins(&mut self, pins: BTreeMap<String, String>) {
        self.pins = pins;
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error.code
    }

    pub fn error_filename(&self) -> Option<&str> {
        self.error.filename.as_deref()
    }

    pub fn error_key_id(&self) -> Option<&str> {
        self.error.key_id.as_deref()
    }

    /// Probes `gpg --version` once per engine.
    pub fn version(&mut self) -> Result<Version> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }

        let mut probe = Engine::with_version(self.config.clone(), Version::minimum());
        probe.set_operation("--version", &[]);
        probe.set_output(Sink::buffer());
        probe.run().map_err(|e| EngineErr::VersionProbe(e.to_string()))?;
        let output = probe.take_output().and_then(Sink::into_bytes).unwrap_or_default();
        let output = String::from_utf8_lossy(&output);

        let version = Version::from_version_output(&output).ok_or(EngineErr::MissingVersion)?;
        if !version.is_supported() {
            return Err(EngineErr::UnsupportedVersion(version).into());
        }
        debug!("Detected GnuPG {}", version);
        self.version = Some(version.clone());
        Ok(version)
    }

    pub fn run(&mut self) -> Result<()> {
        let operation = self.operation.clone().ok_or(EngineErr::NoOperation)?;
        let version = self.version()?;
        let pins = Zeroizing::new(serde_json::to_string(&self.pins)?);

        let agent = if version.requires_agent() {
            Some(Agent::launch(&self.config, &version, &pins)?)
        } else {
            None
        };

        let result = self.run_subprocess(&operation, &version, &pins, agent.as_ref());

        if let Some(agent) = agent {
            if self.config.debug {
                debug!("Stopping agent {:?}", agent.info());
            }
            if let Err(e) = agent.shutdown(&self.config) {
                warn!("Failed to stop gpg-agent: {}", e);
            }
        }
        result
    }

    fn run_subprocess(
        &mut self,
        operation: &str,
        version: &Version,
        pins: &str,
        agent: Option<&Agent>,
    ) -> Result<()> {
        let args = self.build_arguments(operation, version)?;
        if self.config.debug {
            debug!("Running {} {}", self.config.binary, args.join(" "));
        }

        let mut command = Command::new(resolve_executable(&self.config.binary));
        command.args(&args).env(LC_ALL, FIXED_LOCALE).env(PINENTRY_USER_DATA, pins);
        if let Some(info) = agent.and_then(Agent::info) {
            command.env(GPG_AGENT_INFO, info.to_env_value());
        }

        let mut ctx = RunContext::spawn(command)?;
        let mut output = self.output.take().unwrap_or_default();
        let dispatch = Dispatch {
            status_handlers: &mut self.status_handlers,
            error_handlers: &mut self.error_handlers,
            state: &mut self.error,
        };
        let result =
            run_loop(&mut ctx.pipes, self.input.take(), self.message.take(), &mut output, dispatch);
        self.output = Some(output);

        let status = ctx.finish()?;
        result?;
        self.map_exit_status(status);
        Ok(())
    }

    fn map_exit_status(&mut self, status: ExitStatus) {
        if self.config.debug {
            debug!("Subprocess exit status: {}", status);
        }
        if status.success() || self.error.code != ErrorCode::None {
            return;
        }
        self.error.code = if self.error.need_passphrase > 0 {
            ErrorCode::MissingPassphrase
        } else {
            ErrorCode::Unknown
        };
    }

    fn build_arguments(&self, operation: &str, version: &Version) -> Result<Vec<String>> {
        let mut args: Vec<String> = vec![
            "--status-fd".to_string(),
            FD_STATUS.to_string(),
            "--command-fd".to_string(),
            FD_COMMAND.to_string(),
            "--no-secmem-warning".to_string(),
            "--no-tty".to_string(),
            "--no-default-keyring".to_string(),
            "--no-options".to_string(),
        ];

        if version.at_least("1.0.7") {
            if !version.requires_agent() {
                args.push("--no-use-agent".to_string());
            }
            args.push("--no-permission-warning".to_string());
        }
        if version.at_least("1.4.2") {
            args.push("--exit-on-status-write-error".to_string());
        }
        if version.at_least("1.3.2") {
            args.push("--trust-model".to_string());
            args.push("always".to_string());
        } else {
            args.push("--always-trust".to_string());
        }

        if let Some(homedir) = &self.config.homedir {
            args.push("--homedir".to_string());
            args.push(path_to_str(homedir)?.to_string());
            if !is_writable_dir(homedir) {
                args.push("--no-random-seed-file".to_string());
            }
        }
        let keyrings = [
            ("--keyring", &self.config.public_keyring),
            ("--secret-keyring", &self.config.private_keyring),
            ("--trustdb-name", &self.config.trust_db),
        ];
        for (flag, path) in keyrings {
            if let Some(path) = path {
                args.push(flag.to_string());
                args.push(path_to_str(path)?.to_string());
            }
        }

        args.extend(self.arguments.iter().cloned());
        args.extend(operation.split_whitespace().map(str::to_string));
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Stand-in binary that reports an old version, so no agent is
    /// involved, and otherwise behaves like `cat`. Status lines and the exit
    /// code come from files next to it.
    const FAKE_GPG: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
for arg in "$@"; do
    if [ "$arg" = "--version" ]; then
        echo "gpg (GnuPG) 1.4.23"
        exit 0
    fi
done
echo "$@" > "$dir/args"
if [ -f "$dir/status" ]; then
    sed 's/^/[GNUPG:] /' "$dir/status" >&3
fi
cat
if [ -f "$dir/exit" ]; then
    exit "$(cat "$dir/exit")"
fi
"#;

    fn fake_gpg(dir: &Path) -> EngineConfig {
        let binary = dir.join("gpg");
        fs::write(&binary, FAKE_GPG).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        EngineConfig {
            binary: binary.to_str().unwrap().to_string(),
            ..EngineConfig::default().with_homedir(dir)
        }
    }

    #[test]
    fn run_without_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        let err = engine.run().unwrap_err();
        assert!(matches!(err.downcast_ref::<EngineErr>(), Some(EngineErr::NoOperation)));
    }

    #[test]
    fn version_is_probed_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        assert_eq!(engine.version().unwrap().to_string(), "1.4.23");
        fs::remove_file(dir.path().join("gpg")).unwrap();
        assert_eq!(engine.version().unwrap().to_string(), "1.4.23");
    }

    #[test]
    fn missing_binary_fails_version_probe() {
        let config = EngineConfig {
            binary: "/nonexistent/gpg".to_string(),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        let err = engine.version().unwrap_err();
        assert!(matches!(err.downcast_ref::<EngineErr>(), Some(EngineErr::VersionProbe(_))));
    }

    #[test]
    fn argument_vector() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        engine.set_operation("--verify - -&5", &["--armor"]);
        engine.set_input("");
        engine.run().unwrap();

        let args = fs::read_to_string(dir.path().join("args")).unwrap();
        let expected = format!(
            "--status-fd 3 --command-fd 4 --no-secmem-warning --no-tty --no-default-keyring \
             --no-options --no-use-agent --no-permission-warning --exit-on-status-write-error \
             --trust-model always --homedir {} --armor --verify - -&5",
            dir.path().display()
        );
        assert_eq!(args.trim_end(), expected);
    }

    #[test]
    fn old_versions_use_always_trust() {
        let engine = Engine::with_version(EngineConfig::default(), Version::minimum());
        let args = engine.build_arguments("--list-keys", &Version::minimum()).unwrap();
        assert!(args.contains(&"--always-trust".to_string()));
        assert!(!args.contains(&"--no-use-agent".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--list-keys"));
    }

    #[test]
    fn keyring_overrides() {
        let config = EngineConfig {
            public_keyring: Some("/k/pub.gpg".into()),
            private_keyring: Some("/k/sec.gpg".into()),
            trust_db: Some("/k/trustdb.gpg".into()),
            ..EngineConfig::default()
        };
        let version = Version::parse("2.2.40").unwrap();
        let engine = Engine::with_version(config, version.clone());
        let args = engine.build_arguments("--list-keys", &version).unwrap().join(" ");
        assert!(args.contains("--keyring /k/pub.gpg --secret-keyring /k/sec.gpg"));
        assert!(args.contains("--trustdb-name /k/trustdb.gpg"));
        assert!(!args.contains("--no-use-agent"));
    }

    #[test]
    fn output_and_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        let lines = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&lines);

        fs::write(dir.path().join("status"), "PLAINTEXT 62 0\n").unwrap();
        engine.set_operation("--decrypt", &[]);
        engine.set_input("payload");
        engine.add_status_handler(move |line: &str, _: &mut LineContext<'_>| {
            collected.lock().push(line.to_string())
        });
        engine.run().unwrap();

        assert_eq!(engine.take_output().and_then(Sink::into_bytes), Some(b"payload".to_vec()));
        assert_eq!(*lines.lock(), vec!["PLAINTEXT 62 0".to_string()]);
        assert_eq!(engine.error_code(), ErrorCode::None);
    }

    #[test]
    fn reset_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        engine.set_operation("--decrypt", &[]);
        engine.add_status_handler(|_: &str, ctx: &mut LineContext<'_>| {
            ctx.state_mut().code = ErrorCode::BadSignature
        });
        fs::write(dir.path().join("status"), "PLAINTEXT 62 0\n").unwrap();
        engine.run().unwrap();
        assert_eq!(engine.error_code(), ErrorCode::BadSignature);

        engine.reset();
        engine.reset();
        engine.set_operation("--decrypt", &[]);
        engine.run().unwrap();
        assert_eq!(engine.error_code(), ErrorCode::None);
    }

    #[test]
    fn non_zero_exit_is_unknown_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(fake_gpg(dir.path()));
        fs::write(dir.path().join("exit"), "2").unwrap();
        engine.set_operation("--decrypt", &[]);
        engine.run().unwrap();
        assert_eq!(engine.error_code(), ErrorCode::Unknown);
    }
}
