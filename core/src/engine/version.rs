use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::default_constants::{AGENT_VERSION, MIN_VERSION, STANDARD_SOCKET_VERSION};

lazy_static! {
    static ref VERSION_LINE: Regex = Regex::new(r"gpg \(GnuPG[A-Za-z0-9/]*?\) (\S+)").unwrap();
}

/// Dotted version number compared component-wise, missing components count
/// as zero.
#[derive(Debug, Clone, Eq)]
pub struct Version(Vec<u32>);

impl Version {
    /// Parses `2.2.27` style strings. Trailing non-digit suffixes of a
    /// component (`2.4.0-beta`) are ignored.
    pub fn parse(value: &str) -> Option<Version> {
        let mut parts = Vec::new();
        for component in value.split('.') {
            let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            parts.push(digits.parse().ok()?);
        }
        if parts.is_empty() {
            None
        } else {
            Some(Version(parts))
        }
    }

    /// Extracts the version from `gpg --version` output.
    pub fn from_version_output(output: &str) -> Option<Version> {
        VERSION_LINE.captures(output).and_then(|caps| Version::parse(&caps[1]))
    }

    pub fn minimum() -> Version {
        Version::from_const(MIN_VERSION)
    }

    pub fn is_supported(&self) -> bool {
        *self >= Version::minimum()
    }

    pub fn requires_agent(&self) -> bool {
        *self >= Version::from_const(AGENT_VERSION)
    }

    pub fn has_standard_socket_only(&self) -> bool {
        *self >= Version::from_const(STANDARD_SOCKET_VERSION)
    }

    pub fn at_least(&self, other: &str) -> bool {
        Version::parse(other).is_some_and(|other| *self >= other)
    }

    fn from_const(value: &str) -> Version {
        Version::parse(value).unwrap_or(Version(vec![0]))
    }

    fn component(&self, idx: usize) -> u32 {
        self.0.get(idx).copied().unwrap_or(0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_and_compare() {
        let v = Version::parse("2.2.27").unwrap();
        assert!(v > Version::parse("2.2.9").unwrap());
        assert!(v < Version::parse("2.10").unwrap());
        assert_eq!(Version::parse("2.0").unwrap(), Version::parse("2.0.0").unwrap());
        assert_eq!(Version::parse("2.4.0-beta").unwrap().to_string(), "2.4.0");
        assert_eq!(Version::parse("beta"), None);
    }

    #[test]
    fn version_output() {
        let output = "gpg (GnuPG) 2.2.40\nlibgcrypt 1.10.1\nCopyright (C) 2022 g10 Code GmbH\n";
        assert_eq!(Version::from_version_output(output).unwrap().to_string(), "2.2.40");

        let output = "gpg (GnuPG/MacGPG2) 2.2.24\n";
        assert_eq!(Version::from_version_output(output).unwrap().to_string(), "2.2.24");

        assert!(Version::from_version_output("sh: gpg: not found").is_none());
    }

    #[test]
    fn feature_thresholds() {
        let old = Version::parse("1.4.23").unwrap();
        assert!(old.is_supported());
        assert!(!old.requires_agent());
        assert!(old.at_least("1.4.2"));

        let modern = Version::parse("2.2.40").unwrap();
        assert!(modern.requires_agent());
        assert!(modern.has_standard_socket_only());
        assert!(!Version::parse("2.0.30").unwrap().has_standard_socket_only());

        assert!(!Version::parse("1.0.1").unwrap().is_supported());
    }
}
