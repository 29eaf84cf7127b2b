// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Firmware version strings.
//
// A valid version is exactly `MAJOR.MINOR.PATCH` with decimal components.
// Comparison is more forgiving: missing components count as zero and a
// component that is not a number compares equal to anything.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use hbox_core::error::TrustError;

/// A strictly parsed `MAJOR.MINOR.PATCH` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for Version {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TrustError::InvalidRequest(format!("invalid version: {s:?}"));

        let mut parts = s.split('.');
        let mut next = || -> Result<u64, TrustError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let version = Version {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub fn is_valid_version(s: &str) -> bool {
    s.parse::<Version>().is_ok()
}

/// Three-way comparison of two version strings.
///
/// Only the first three components are considered. Absent components are
/// zero; a component that does not parse as a number is treated as equal
/// to its counterpart.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (lenient_components(a), lenient_components(b));
    a.iter()
        .zip(b.iter())
        .find_map(|pair| match pair {
            (Some(x), Some(y)) if x != y => Some(x.cmp(y)),
            _ => None,
        })
        .unwrap_or(Ordering::Equal)
}

fn lenient_components(s: &str) -> [Option<u64>; 3] {
    let mut out = [Some(0); 3];
    for (slot, part) in out.iter_mut().zip(s.split('.')) {
        *slot = part.trim().parse().ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse() {
        assert_eq!(
            "1.10.3".parse::<Version>().expect("parse"),
            Version {
                major: 1,
                minor: 10,
                patch: 3
            }
        );
        for bad in ["", "1", "1.2", "1.2.3.4", "v1.2.3", "1.2.x", "1..3", "1.2.3 ", "-1.2.3", "+1.2.3"] {
            assert!(!is_valid_version(bad), "{bad:?} should be invalid");
        }
        assert!(is_valid_version("0.0.0"));
    }

    #[test]
    fn numeric_not_lexical_ordering() {
        assert_eq!(compare_versions("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "1.99.99"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
    }

    #[test]
    fn short_versions_are_padded() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn unparseable_components_compare_equal() {
        assert_eq!(compare_versions("1.x.5", "1.3.5"), Ordering::Equal);
        assert_eq!(compare_versions("1.x.6", "1.3.5"), Ordering::Greater);
    }

    #[test]
    fn strict_ordering_agrees_with_lenient_for_valid_input() {
        let pairs = [("1.9.0", "1.10.0"), ("3.0.0", "2.9.9"), ("0.0.1", "0.0.1")];
        for (a, b) in pairs {
            let strict = a.parse::<Version>().expect("a").cmp(&b.parse().expect("b"));
            assert_eq!(strict, compare_versions(a, b), "{a} vs {b}");
        }
    }
}
