//! Ordering for Jupytext version strings.
//!
//! Jupytext reports versions as `major.minor.patch` with an optional release
//! candidate suffix (`1.17.3rc1`, `1.17.3rc`). Anything else is treated as
//! unparseable and sorts after every parseable version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Oldest Jupytext release that is fully supported.
///
/// Older releases apply the project-level default pairing to every matching
/// file during `--sync`, even when the file was never explicitly paired.
pub const MIN_SUPPORTED_VERSION: &str = "1.17.3";

/// A parsed `major.minor.patch[rcN]` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Release candidate number. `Some(0)` for a bare `rc` suffix.
    pub rc: Option<u64>,
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid version: {:?}", s);

        let mut parts = s.splitn(3, '.');
        let major = parse_digits(parts.next().ok_or_else(invalid)?).ok_or_else(invalid)?;
        let minor = parse_digits(parts.next().ok_or_else(invalid)?).ok_or_else(invalid)?;
        let tail = parts.next().ok_or_else(invalid)?;

        let (patch_str, rc) = match tail.find("rc") {
            Some(idx) => {
                let suffix = &tail[idx + 2..];
                let rc = if suffix.is_empty() {
                    0
                } else {
                    parse_digits(suffix).ok_or_else(invalid)?
                };
                (&tail[..idx], Some(rc))
            }
            None => (tail, None),
        };
        let patch = parse_digits(patch_str).ok_or_else(invalid)?;

        Ok(Version {
            major,
            minor,
            patch,
            rc,
        })
    }
}

/// Parse a non-empty run of ASCII digits.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.rc, other.rc) {
                (None, None) => Ordering::Equal,
                // A release candidate comes before the final release
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(&b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(rc) = self.rc {
            write!(f, "rc{}", rc)?;
        }
        Ok(())
    }
}

/// Compare two version strings.
///
/// Unparseable strings sort after parseable ones and compare equal to each
/// other, so the result is a total order over all strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<Version>(), b.trim().parse::<Version>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => Ordering::Equal,
    }
}

/// Whether `version` is at least [`MIN_SUPPORTED_VERSION`].
///
/// Unparseable versions are not supported.
pub fn is_supported(version: &str) -> bool {
    version.trim().parse::<Version>().is_ok()
        && compare_versions(version, MIN_SUPPORTED_VERSION) != Ordering::Less
}
