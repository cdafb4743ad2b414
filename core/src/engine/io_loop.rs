//! The multiplexing loop that moves bytes between the caller and the six
//! channels of a running subprocess.
//!
//! Each pass builds the sets of channels that can still read or write,
//! waits until one of the pipes is ready, moves at most one chunk per
//! channel and dispatches every complete status and error line. Input and
//! message pipes are closed as soon as their source is exhausted; the loop
//! ends when nothing is left to read or write.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use os_pipe::{PipeReader, PipeWriter};

use super::channel::{Pipes, Sink, Source};
use super::EngineErr;
use crate::constants::default_constants::{CHUNK_SIZE, STATUS_PREFIX};
use crate::status::{ErrorState, LineContext, LineHandler};
use crate::util::bytes::{byte_substr, consume, take_line};

/// Handlers and error state the loop reports lines to.
pub(crate) struct Dispatch<'a> {
    pub status_handlers: &'a mut [LineHandler],
    pub error_handlers: &'a mut [LineHandler],
    pub state: &'a mut ErrorState,
}

/// Bytes waiting to go into the input or message pipe, and where more come
/// from.
struct Feed {
    source: Option<Box<dyn Read + Send>>,
    pending: Vec<u8>,
    complete: bool,
}

impl Feed {
    fn new(source: Option<Source>) -> Self {
        match source {
            None => Feed { source: None, pending: Vec::new(), complete: true },
            Some(Source::Bytes(bytes)) => Feed { source: None, pending: bytes, complete: true },
            Some(Source::Stream(stream)) => {
                Feed { source: Some(stream), pending: Vec::new(), complete: false }
            }
        }
    }

    fn wants_read(&self) -> bool {
        !self.complete && self.pending.len() < CHUNK_SIZE
    }

    fn exhausted(&self) -> bool {
        self.complete && self.pending.is_empty()
    }

    fn fill(&mut self, name: &str) {
        if !self.wants_read() {
            return;
        }
        let Some(source) = self.source.as_mut() else {
            self.complete = true;
            return;
        };
        let mut chunk = [0u8; CHUNK_SIZE];
        match source.read(&mut chunk) {
            Ok(0) => {
                trace!("{} source complete", name);
                self.finish();
            }
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("Reading {} source failed: {}", name, e);
                self.finish();
            }
        }
    }

    fn finish(&mut self) {
        self.complete = true;
        self.source = None;
    }

    /// Pipe went away, nothing queued will ever be delivered.
    fn discard(&mut self) {
        self.pending.clear();
        self.finish();
    }
}

enum WriteOutcome {
    Written(usize),
    Blocked,
    Broken,
}

fn write_chunk(pipe: &mut PipeWriter, data: &[u8]) -> WriteOutcome {
    match pipe.write(byte_substr(data, 0, CHUNK_SIZE)) {
        Ok(0) => WriteOutcome::Broken,
        Ok(n) => WriteOutcome::Written(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => WriteOutcome::Blocked,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => WriteOutcome::Blocked,
        Err(e) => {
            debug!("Write failed: {}", e);
            WriteOutcome::Broken
        }
    }
}

enum ReadOutcome {
    Data,
    Blocked,
    Closed,
}

fn read_chunk(pipe: &mut PipeReader, buffer: &mut Vec<u8>) -> ReadOutcome {
    let mut chunk = [0u8; CHUNK_SIZE];
    match pipe.read(&mut chunk) {
        Ok(0) => ReadOutcome::Closed,
        Ok(n) => {
            buffer.extend_from_slice(&chunk[..n]);
            ReadOutcome::Data
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Blocked,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => ReadOutcome::Blocked,
        Err(e) => {
            debug!("Read failed: {}", e);
            ReadOutcome::Closed
        }
    }
}

fn dispatch_line(
    handlers: &mut [LineHandler],
    line: &str,
    state: &mut ErrorState,
    command: Option<&mut Vec<u8>>,
) {
    let mut ctx = LineContext::new(state, command);
    for handler in handlers.iter_mut() {
        handler(line, &mut ctx);
    }
}

/// Which pipes a pass waits on. Indices into the poll set, `None` when the
/// pipe is not a candidate.
#[derive(Default)]
struct Interest {
    input: Option<usize>,
    message: Option<usize>,
    command: Option<usize>,
    output: Option<usize>,
    error: Option<usize>,
    status: Option<usize>,
}

const READABLE: PollFlags = PollFlags::POLLIN.union(PollFlags::POLLHUP).union(PollFlags::POLLERR);
const WRITABLE: PollFlags = PollFlags::POLLOUT.union(PollFlags::POLLHUP).union(PollFlags::POLLERR);

/// Readiness of each candidate pipe after one multiplexing call.
#[derive(Default)]
struct Ready {
    input: bool,
    message: bool,
    command: bool,
    output: bool,
    error: bool,
    status: bool,
}

pub(crate) fn run_loop(
    pipes: &mut Pipes,
    input: Option<Source>,
    message: Option<Source>,
    output: &mut Sink,
    dispatch: Dispatch<'_>,
) -> Result<()> {
    let Dispatch { status_handlers, error_handlers, state } = dispatch;

    let mut input = Feed::new(input);
    let mut message = Feed::new(message);
    let mut output_buffer = Vec::new();
    let mut error_buffer = Vec::new();
    let mut status_buffer = Vec::new();
    let mut command_buffer = Vec::new();
    let mut delay: u64 = 0;

    loop {
        // nothing more will ever be written to these
        if pipes.input.is_some() && input.exhausted() {
            trace!("Closing input pipe");
            pipes.input = None;
        }
        if pipes.message.is_some() && message.exhausted() {
            trace!("Closing message pipe");
            pipes.message = None;
        }

        let sink_pending = !output_buffer.is_empty();
        let input_pending = pipes.input.is_some() && !input.pending.is_empty();
        let message_pending = pipes.message.is_some() && !message.pending.is_empty();
        let command_pending = pipes.command.is_some() && !command_buffer.is_empty();

        let write_candidates = [input_pending, message_pending, command_pending, sink_pending];
        let read_candidates = [
            pipes.input.is_some() && input.wants_read(),
            pipes.message.is_some() && message.wants_read(),
            pipes.output.is_some(),
            pipes.error.is_some(),
            pipes.status.is_some(),
        ];
        let writers = write_candidates.iter().filter(|c| **c).count();
        let readers = read_candidates.iter().filter(|c| **c).count();
        if writers == 0 && readers == 0 {
            break;
        }

        // caller side sources and sinks never block
        let local_progress = sink_pending || read_candidates[0] || read_candidates[1];

        let ready = {
            let mut interest = Interest::default();
            let mut fds = Vec::with_capacity(6);
            if input_pending {
                if let Some(pipe) = pipes.input.as_ref() {
                    interest.input = Some(fds.len());
                    fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLOUT));
                }
            }
            if message_pending {
                if let Some(pipe) = pipes.message.as_ref() {
                    interest.message = Some(fds.len());
                    fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLOUT));
                }
            }
            if command_pending {
                if let Some(pipe) = pipes.command.as_ref() {
                    interest.command = Some(fds.len());
                    fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLOUT));
                }
            }
            if let Some(pipe) = pipes.output.as_ref() {
                interest.output = Some(fds.len());
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
            }
            if let Some(pipe) = pipes.error.as_ref() {
                interest.error = Some(fds.len());
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
            }
            if let Some(pipe) = pipes.status.as_ref() {
                interest.status = Some(fds.len());
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
            }

            if fds.is_empty() {
                Ready::default()
            } else {
                let timeout = if local_progress { PollTimeout::ZERO } else { PollTimeout::NONE };
                let count = loop {
                    match poll(&mut fds, timeout) {
                        Ok(count) => break count,
                        Err(Errno::EINTR) => continue,
                        Err(errno) => return Err(EngineErr::Multiplex(errno).into()),
                    }
                };
                if count == 0 && !local_progress {
                    return Err(EngineErr::ZeroReady.into());
                }
                let has = |idx: Option<usize>, flags: PollFlags| {
                    idx.and_then(|i| fds[i].revents())
                        .is_some_and(|revents| revents.intersects(flags))
                };
                Ready {
                    input: has(interest.input, WRITABLE),
                    message: has(interest.message, WRITABLE),
                    command: has(interest.command, WRITABLE),
                    output: has(interest.output, READABLE),
                    error: has(interest.error, READABLE),
                    status: has(interest.status, READABLE),
                }
            }
        };

        // input: pending bytes into the pipe, then top up from the source
        if ready.input {
            if let Some(pipe) = pipes.input.as_mut() {
                match write_chunk(pipe, &input.pending) {
                    WriteOutcome::Written(n) => {
                        trace!("Wrote {} bytes to input", n);
                        consume(&mut input.pending, n);
                    }
                    WriteOutcome::Blocked => {}
                    WriteOutcome::Broken => {
                        debug!("Input pipe broken, discarding {} bytes", input.pending.len());
                        pipes.input = None;
                        input.discard();
                    }
                }
            }
        }
        if pipes.input.is_some() {
            input.fill("input");
        }

        if ready.message {
            if let Some(pipe) = pipes.message.as_mut() {
                match write_chunk(pipe, &message.pending) {
                    WriteOutcome::Written(n) => {
                        trace!("Wrote {} bytes to message", n);
                        consume(&mut message.pending, n);
                    }
                    WriteOutcome::Blocked => {}
                    WriteOutcome::Broken => {
                        debug!("Message pipe broken, discarding {} bytes", message.pending.len());
                        pipes.message = None;
                        message.discard();
                    }
                }
            }
        }
        if pipes.message.is_some() {
            message.fill("message");
        }

        if ready.output {
            if let Some(pipe) = pipes.output.as_mut() {
                if let ReadOutcome::Closed = read_chunk(pipe, &mut output_buffer) {
                    trace!("Output pipe closed");
                    pipes.output = None;
                }
            }
        }
        if !output_buffer.is_empty() {
            output.write_all(&output_buffer).context("Failed to write output")?;
            output_buffer.clear();
            if pipes.output.is_none() {
                output.flush().context("Failed to flush output")?;
            }
        }

        if ready.error {
            if let Some(pipe) = pipes.error.as_mut() {
                if let ReadOutcome::Closed = read_chunk(pipe, &mut error_buffer) {
                    trace!("Error pipe closed");
                    pipes.error = None;
                }
            }
            while let Some(line) = take_line(&mut error_buffer) {
                let line = String::from_utf8_lossy(&line);
                let command = pipes.command.is_some().then_some(&mut command_buffer);
                dispatch_line(error_handlers, &line, state, command);
            }
        }

        if ready.status {
            if let Some(pipe) = pipes.status.as_mut() {
                if let ReadOutcome::Closed = read_chunk(pipe, &mut status_buffer) {
                    trace!("Status pipe closed");
                    pipes.status = None;
                }
            }
            while let Some(line) = take_line(&mut status_buffer) {
                let Some(rest) = line.strip_prefix(STATUS_PREFIX) else {
                    continue;
                };
                let line = String::from_utf8_lossy(rest);
                let command = pipes.command.is_some().then_some(&mut command_buffer);
                dispatch_line(status_handlers, &line, state, command);
            }
        }

        if ready.command {
            if let Some(pipe) = pipes.command.as_mut() {
                match write_chunk(pipe, &command_buffer) {
                    WriteOutcome::Written(n) => consume(&mut command_buffer, n),
                    WriteOutcome::Blocked => {}
                    WriteOutcome::Broken => {
                        debug!("Command pipe broken");
                        pipes.command = None;
                        command_buffer.clear();
                    }
                }
            }
        }

        if writers == 0 || readers == 0 {
            delay += 10;
        } else {
            delay = delay.saturating_sub(8);
        }
        if delay > 0 {
            thread::sleep(Duration::from_micros(delay));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::process::Command;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::channel::RunContext;
    use crate::error::ErrorCode;
    use crate::status::classifier;

    /// Reader handing out at most `step` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    struct Run {
        output: Vec<u8>,
        status_lines: Vec<String>,
        error_lines: Vec<String>,
        state: ErrorState,
    }

    fn run_script(script: &str, input: Option<Source>, message: Option<Source>) -> Run {
        run_with_handlers(script, input, message, Vec::new())
    }

    fn run_with_handlers(
        script: &str,
        input: Option<Source>,
        message: Option<Source>,
        extra_status: Vec<LineHandler>,
    ) -> Run {
        let mut command = Command::new("sh");
        command.args(["-c", script]);
        let mut ctx = RunContext::spawn(command).unwrap();

        let status_lines = Arc::new(Mutex::new(Vec::new()));
        let error_lines = Arc::new(Mutex::new(Vec::new()));
        let status_clone = Arc::clone(&status_lines);
        let error_clone = Arc::clone(&error_lines);
        let mut status_handlers: Vec<LineHandler> = vec![
            Box::new(classifier::handle_status),
            Box::new(move |line: &str, _: &mut LineContext<'_>| {
                status_clone.lock().push(line.to_string())
            }),
        ];
        status_handlers.extend(extra_status);
        let mut error_handlers: Vec<LineHandler> = vec![
            Box::new(classifier::handle_error),
            Box::new(move |line: &str, _: &mut LineContext<'_>| {
                error_clone.lock().push(line.to_string())
            }),
        ];

        let mut state = ErrorState::default();
        let mut sink = Sink::buffer();
        run_loop(&mut ctx.pipes, input, message, &mut sink, Dispatch {
            status_handlers: &mut status_handlers,
            error_handlers: &mut error_handlers,
            state: &mut state,
        })
        .unwrap();
        ctx.finish().unwrap();

        let status_lines = status_lines.lock().clone();
        let error_lines = error_lines.lock().clone();
        Run { output: sink.into_bytes().unwrap(), status_lines, error_lines, state }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn copies_input_to_output() {
        let run = run_script("cat", Some(Source::from("hello world")), None);
        assert_eq!(run.output, b"hello world".to_vec());
        assert_eq!(run.state.code, ErrorCode::None);
    }

    #[test]
    fn chunking_of_the_source_does_not_change_the_bytes() {
        let data = payload(CHUNK_SIZE * 3 + 17);
        for step in [1, 7, 4096, CHUNK_SIZE, CHUNK_SIZE + 1, data.len()] {
            let source = Trickle { data: Cursor::new(data.clone()), step };
            let run = run_script("cat", Some(Source::Stream(Box::new(source))), None);
            assert_eq!(run.output.len(), data.len(), "step {}", step);
            assert!(run.output == data, "step {}", step);
        }
    }

    #[test]
    fn large_input_and_output_do_not_deadlock() {
        let data = payload(1 << 20);
        let run = run_script("cat", Some(Source::Bytes(data.clone())), None);
        assert!(run.output == data);
    }

    #[test]
    fn message_channel_is_descriptor_five() {
        let run = run_script("cat <&5", Some(Source::from("ignored")), Some(Source::from("message")));
        assert_eq!(run.output, b"message".to_vec());
    }

    #[test]
    fn no_source_closes_input() {
        let run = run_script("cat; echo done", None, None);
        assert_eq!(run.output, b"done\n".to_vec());
    }

    #[test]
    fn only_prefixed_status_lines_are_dispatched() {
        let script = r#"
            echo '[GNUPG:] NODATA 1' >&3
            echo 'garbage line' >&3
            echo 'GNUPG: NODATA' >&3
            printf '[GNUPG:] PLAINTEXT 62 0\n' >&3
        "#;
        let run = run_script(script, None, None);
        assert_eq!(run.status_lines, vec!["NODATA 1".to_string(), "PLAINTEXT 62 0".to_string()]);
        assert_eq!(run.state.code, ErrorCode::NoData);
    }

    #[test]
    fn unterminated_status_line_is_dropped() {
        let run = run_script("printf '[GNUPG:] NODATA 1' >&3", None, None);
        assert!(run.status_lines.is_empty());
    }

    #[test]
    fn error_lines_are_classified() {
        let script = "echo 'gpg: some warning' >&2; echo \"gpg: can't open 'x.gpg': No such file\" >&2";
        let run = run_script(script, None, None);
        assert_eq!(run.error_lines.len(), 2);
        assert_eq!(run.state.code, ErrorCode::FilePermissions);
        assert_eq!(run.state.filename.as_deref(), Some("x.gpg"));
    }

    #[test]
    fn handlers_answer_on_the_command_channel() {
        let script = r#"
            echo '[GNUPG:] NEED_PASSPHRASE ABCD ABCD 1 0' >&3
            read pass <&4
            echo "got $pass"
        "#;
        let answer: LineHandler = Box::new(|line: &str, ctx: &mut LineContext<'_>| {
            if line.starts_with("NEED_PASSPHRASE") {
                ctx.send_command("secret");
            }
        });
        let run = run_with_handlers(script, None, None, vec![answer]);
        assert_eq!(run.output, b"got secret\n".to_vec());
        assert_eq!(run.state.need_passphrase, 1);
    }

    #[test]
    fn early_exit_discards_pending_input() {
        let data = payload(1 << 20);
        let run = run_script("head -c 10", Some(Source::Bytes(data.clone())), None);
        assert_eq!(run.output, data[..10].to_vec());
    }
}
