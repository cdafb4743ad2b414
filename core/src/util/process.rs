//! Liveness checks and graceful termination for processes that are not our
//! children (the detached agent daemon).

use anyhow::Result;
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessControl {
    pid: u32,
}

impl ProcessControl {
    pub fn new(pid: u32) -> Self {
        ProcessControl { pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `kill(2)` treats 0 and negative ids as process groups, so those never
    /// name a single process.
    #[cfg(unix)]
    fn target(&self) -> Option<Pid> {
        i32::try_from(self.pid).ok().filter(|pid| *pid > 0).map(Pid::from_raw)
    }

    #[cfg(unix)]
    pub fn is_running(&self) -> bool {
        let Some(pid) = self.target() else {
            return false;
        };
        match kill(pid, None) {
            Ok(()) => true,
            // exists, owned by somebody else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Sends SIGTERM. A process that is already gone is not an error.
    #[cfg(unix)]
    pub fn terminate(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    #[cfg(unix)]
    pub fn kill(&self) -> Result<()> {
        self.signal(Signal::SIGKILL)
    }

    #[cfg(unix)]
    fn signal(&self, signal: Signal) -> Result<()> {
        let Some(pid) = self.target() else {
            return Ok(());
        };
        match kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(unix))]
    pub fn is_running(&self) -> bool {
        use std::process::Command;

        let filter = format!("PID eq {}", self.pid);
        match Command::new("tasklist").args(["/FI", &filter, "/NH"]).output() {
            Ok(output) => {
                String::from_utf8_lossy(&output.stdout).contains(&self.pid.to_string())
            }
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> Result<()> {
        use std::process::Command;

        Command::new("taskkill").args(["/PID", &self.pid.to_string()]).output()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn kill(&self) -> Result<()> {
        use std::process::Command;

        Command::new("taskkill").args(["/F", "/PID", &self.pid.to_string()]).output()?;
        Ok(())
    }
}
