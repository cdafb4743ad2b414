//! Pipe plumbing between the engine and one subprocess.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};

use anyhow::{Context, Result};
use log::debug;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use os_pipe::{PipeReader, PipeWriter};

use crate::constants::fd_numbers::{FD_COMMAND, FD_MESSAGE, FD_STATUS};

/// Where the engine takes bytes for the input and message channels from.
pub enum Source {
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl From<Vec<u8>> for Source {
    fn from(value: Vec<u8>) -> Self {
        Source::Bytes(value)
    }
}

impl From<&[u8]> for Source {
    fn from(value: &[u8]) -> Self {
        Source::Bytes(value.to_vec())
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Source::Bytes(value.as_bytes().to_vec())
    }
}

/// Where the output channel ends up.
pub enum Sink {
    Buffer(Vec<u8>),
    Stream(Box<dyn Write + Send>),
}

impl Sink {
    pub fn buffer() -> Self {
        Sink::Buffer(Vec::new())
    }

    /// Buffered output, `None` for streams.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Sink::Buffer(buffer) => Some(buffer),
            Sink::Stream(_) => None,
        }
    }

    pub(crate) fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Sink::Buffer(buffer) => {
                buffer.extend_from_slice(data);
                Ok(())
            }
            Sink::Stream(stream) => stream.write_all(data),
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Buffer(_) => Ok(()),
            Sink::Stream(stream) => stream.flush(),
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Sink::buffer()
    }
}

/// Parent ends of the six channels. `None` once closed.
#[derive(Default)]
pub(crate) struct Pipes {
    pub input: Option<PipeWriter>,
    pub output: Option<PipeReader>,
    pub error: Option<PipeReader>,
    pub status: Option<PipeReader>,
    pub command: Option<PipeWriter>,
    pub message: Option<PipeWriter>,
}

impl Pipes {
    fn set_nonblocking(&self) -> Result<()> {
        let readers = [&self.output, &self.error, &self.status];
        let writers = [&self.input, &self.command, &self.message];
        for fd in readers.iter().filter_map(|r| r.as_ref().map(|r| r.as_fd())) {
            set_fd_nonblocking(fd)?;
        }
        for fd in writers.iter().filter_map(|w| w.as_ref().map(|w| w.as_fd())) {
            set_fd_nonblocking(fd)?;
        }
        Ok(())
    }

    pub fn close_all(&mut self) {
        *self = Pipes::default();
    }
}

fn set_fd_nonblocking(fd: BorrowedFd<'_>) -> Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// One running subprocess together with the parent ends of its channels.
/// Built fresh for every run and consumed by [`RunContext::finish`].
pub(crate) struct RunContext {
    child: Child,
    pub pipes: Pipes,
}

impl RunContext {
    /// Spawns `command` with input, output and error on the standard
    /// descriptors and status, command and message on 3, 4 and 5.
    ///
    /// The command is consumed so its copies of the child ends are closed
    /// once the process is running, otherwise end-of-file would never be
    /// seen on the output channels.
    pub fn spawn(mut command: Command) -> Result<Self> {
        let (input_r, input_w) = os_pipe::pipe()?;
        let (output_r, output_w) = os_pipe::pipe()?;
        let (error_r, error_w) = os_pipe::pipe()?;
        let (status_r, status_w) = os_pipe::pipe()?;
        let (command_r, command_w) = os_pipe::pipe()?;
        let (message_r, message_w) = os_pipe::pipe()?;

        command.stdin(input_r).stdout(output_w).stderr(error_w);
        let extra: [(RawFd, RawFd); 3] = [
            (status_w.as_raw_fd(), FD_STATUS),
            (command_r.as_raw_fd(), FD_COMMAND),
            (message_r.as_raw_fd(), FD_MESSAGE),
        ];
        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(move || map_descriptors(&extra));
        }

        let child = command.spawn().context("Failed to launch subprocess")?;
        debug!("Spawned subprocess {}", child.id());
        drop(command);
        drop((status_w, command_r, message_r));

        let pipes = Pipes {
            input: Some(input_w),
            output: Some(output_r),
            error: Some(error_r),
            status: Some(status_r),
            command: Some(command_w),
            message: Some(message_w),
        };
        pipes.set_nonblocking()?;
        Ok(RunContext { child, pipes })
    }

    /// Closes whatever is still open and reaps the subprocess.
    pub fn finish(mut self) -> Result<ExitStatus> {
        self.pipes.close_all();
        let status = self.child.wait()?;
        debug!("Subprocess {} exited with {}", self.child.id(), status);
        Ok(status)
    }
}

/// Moves every source descriptor out of the target range first so a
/// source that already sits on another target number is not clobbered.
fn map_descriptors(pairs: &[(RawFd, RawFd)]) -> io::Result<()> {
    use nix::libc;

    let mut moved = [0 as RawFd; 3];
    for (slot, (source, _)) in moved.iter_mut().zip(pairs) {
        let fd = unsafe { libc::fcntl(*source, libc::F_DUPFD_CLOEXEC, 10) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        *slot = fd;
    }
    for (fd, (_, target)) in moved.iter().zip(pairs) {
        if unsafe { libc::dup2(*fd, *target) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn extra_descriptors_reach_the_child() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo out; echo err >&2; echo status >&3; read line <&4; echo \"$line\" >&3"]);
        let mut ctx = RunContext::spawn(command).unwrap();

        // leave blocking semantics to the test: wait for exit, then drain
        let mut cmd = ctx.pipes.command.take().unwrap();
        loop {
            match cmd.write(b"from parent\n") {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => panic!("{}", e),
            }
        }
        drop(cmd);
        let mut output = ctx.pipes.output.take().unwrap();
        let mut error = ctx.pipes.error.take().unwrap();
        let mut status = ctx.pipes.status.take().unwrap();
        let exit = ctx.finish().unwrap();
        assert!(exit.success());

        let mut buf = String::new();
        output.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "out\n");
        buf.clear();
        error.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "err\n");
        buf.clear();
        status.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "status\nfrom parent\n");
    }

    #[test]
    fn sink_buffers() {
        let mut sink = Sink::buffer();
        sink.write_all(b"abc").unwrap();
        sink.write_all(b"def").unwrap();
        assert_eq!(sink.into_bytes(), Some(b"abcdef".to_vec()));
    }
}
