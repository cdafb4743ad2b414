//! Scripted pinentry. The agent daemon spawns it for every passphrase prompt
//! and talks to it over standard input and output; passphrases come from
//! `PINENTRY_USER_DATA` instead of a human.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::io::{BufRead, Read, Write};

use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, error, trace};
use regex::Regex;
use zeroize::Zeroizing;

use crate::constants::default_constants::CHUNK_SIZE;
use crate::constants::env_variables::PINENTRY_USER_DATA;
use crate::key::key_id_matches;
use crate::util::escape::{percent_decode, percent_encode, wrap_lines};

lazy_static! {
    static ref DESCRIPTION: Regex = Regex::new(r#"\n"(.+)"\n.*\sID ([A-Z0-9]+),\n"#).unwrap();
}

/// The key the agent is currently asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTarget {
    pub key_id: String,
    pub user_id: String,
}

pub struct PinEntry<R, W> {
    reader: R,
    writer: W,
    pins: BTreeMap<String, Zeroizing<String>>,
    target: Option<PromptTarget>,
    tried: HashSet<String>,
    closing: bool,
}

/// Decodes the JSON key id to passphrase map. Malformed data is logged and
/// treated as no passphrases at all.
pub fn parse_pins(data: &str) -> BTreeMap<String, Zeroizing<String>> {
    if data.trim().is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_str::<BTreeMap<String, String>>(data) {
        Ok(pins) => pins.into_iter().map(|(id, pin)| (id, Zeroizing::new(pin))).collect(),
        Err(e) => {
            error!("Unable to parse {}: {}", PINENTRY_USER_DATA, e);
            BTreeMap::new()
        }
    }
}

impl<R: BufRead, W: Write> PinEntry<R, W> {
    pub fn new(reader: R, writer: W, pins: BTreeMap<String, Zeroizing<String>>) -> Self {
        PinEntry { reader, writer, pins, target: None, tried: HashSet::new(), closing: false }
    }

    pub fn from_env(reader: R, writer: W) -> Self {
        let data = Zeroizing::new(env::var(PINENTRY_USER_DATA).unwrap_or_default());
        PinEntry::new(reader, writer, parse_pins(&data))
    }

    pub fn target(&self) -> Option<&PromptTarget> {
        self.target.as_ref()
    }

    /// Greets the peer, then answers commands until `BYE` or end of input.
    pub fn run(&mut self) -> Result<()> {
        debug!("Relay started with {} passphrase(s)", self.pins.len());
        self.send("OK Your orders please\n")?;
        let mut buffer = Vec::new();
        while !self.closing {
            buffer.clear();
            let read = (&mut self.reader).take(CHUNK_SIZE as u64).read_until(b'\n', &mut buffer)?;
            if read == 0 {
                debug!("Input closed");
                break;
            }
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim_end_matches(['\n', '\r']);
            trace!("<<< {}", line);
            self.handle_line(line)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command.to_ascii_uppercase().as_str() {
            "SETDESC" => self.set_description(rest),
            "MESSAGE" | "CONFIRM" => self.send("OK\n"),
            "GETINFO" => self.get_info(rest),
            "GETPIN" => self.get_pin(),
            "RESET" => {
                self.target = None;
                self.tried.clear();
                self.send("OK\n")
            }
            "BYE" => {
                self.closing = true;
                self.send("OK closing connection\n")
            }
            _ => self.send("OK\n"),
        }
    }

    fn set_description(&mut self, description: &str) -> Result<()> {
        let description = percent_decode(description);
        if let Some(caps) = DESCRIPTION.captures(&description) {
            let target = PromptTarget { key_id: caps[2].to_string(), user_id: caps[1].to_string() };
            if self.target.as_ref().map(|t| t.key_id.as_str()) != Some(target.key_id.as_str()) {
                self.tried.clear();
            }
            debug!("Prompted for {} ({})", target.key_id, target.user_id);
            self.target = Some(target);
        }
        self.send("OK\n")
    }

    fn get_info(&mut self, what: &str) -> Result<()> {
        if what.trim() == "pid" {
            self.send(&format!("D {}\n", std::process::id()))?;
        }
        self.send("OK\n")
    }

    fn get_pin(&mut self) -> Result<()> {
        let found = self.target.as_ref().and_then(|target| {
            self.pins
                .iter()
                .find(|(id, _)| !self.tried.contains(*id) && key_id_matches(id, &target.key_id))
                .map(|(id, pin)| (id.clone(), pin.clone()))
        });

        let data = match found {
            Some((id, pin)) => {
                debug!("Answering with the passphrase of {}", id);
                self.tried.insert(id);
                Zeroizing::new(wrap_lines("D", &percent_encode(pin.as_bytes())))
            }
            None => {
                debug!("No untried passphrase for {:?}", self.target);
                Zeroizing::new(wrap_lines("D", ""))
            }
        };
        self.writer.write_all(data.as_bytes())?;
        trace!(">>> D [redacted]");
        self.send("OK\n")
    }

    fn send(&mut self, data: &str) -> Result<()> {
        trace!(">>> {}", data.trim_end());
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}
