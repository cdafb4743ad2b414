//! Line handlers for the status and error channels.
//!
//! Every complete line received on either channel is passed, in registration
//! order, to each handler together with a [`LineContext`]. The context gives
//! access to the run's error state and lets a handler queue bytes on the
//! command channel.

pub mod classifier;
pub mod decrypt;
pub mod verify;

use crate::error::ErrorCode;

/// Error bookkeeping of one run, filled by the default classifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    pub code: ErrorCode,
    pub filename: Option<String>,
    pub key_id: Option<String>,
    /// Passphrase prompts that have not been answered with a good passphrase.
    pub need_passphrase: i32,
}

pub struct LineContext<'a> {
    state: &'a mut ErrorState,
    command: Option<&'a mut Vec<u8>>,
}

impl<'a> LineContext<'a> {
    pub fn new(state: &'a mut ErrorState, command: Option<&'a mut Vec<u8>>) -> Self {
        LineContext { state, command }
    }

    /// Queues `command` plus a newline on the command channel. Dropped if the
    /// channel is already closed. The bytes reach the subprocess on a later
    /// loop pass.
    pub fn send_command(&mut self, command: &str) {
        if let Some(buffer) = self.command.as_deref_mut() {
            buffer.extend_from_slice(command.as_bytes());
            buffer.push(b'\n');
        }
    }

    pub fn state(&self) -> &ErrorState {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut ErrorState {
        &mut *self.state
    }
}

pub type LineHandler = Box<dyn FnMut(&str, &mut LineContext<'_>) + Send>;

/// Status lines are space separated, the first token names the event.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split(' ').collect()
}
