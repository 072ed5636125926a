use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionTuple(pub u32, pub u32, pub u32);

impl VersionTuple {
    pub const ZERO: VersionTuple = VersionTuple(0, 0, 0);

    pub fn is_unknown(self) -> bool {
        self == Self::ZERO
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

fn leading_number(s: &str) -> (Option<u32>, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if end == 0 {
        return (None, s);
    }
    (s[..end].parse::<u32>().ok(), &s[end..])
}

pub fn parse_version(version_str: &str) -> VersionTuple {
    let s = version_str.trim();
    let s = s.strip_prefix('v').unwrap_or(s);

    let (Some(major), rest) = leading_number(s) else {
        return VersionTuple::ZERO;
    };
    let Some(rest) = rest.strip_prefix('.') else {
        return VersionTuple::ZERO;
    };
    let (Some(minor), rest) = leading_number(rest) else {
        return VersionTuple::ZERO;
    };
    let patch = rest
        .strip_prefix('.')
        .and_then(|r| leading_number(r).0)
        .unwrap_or(0);

    VersionTuple(major, minor, patch)
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_version(a).cmp(&parse_version(b))
}

pub fn versions_compatible(a: &str, b: &str, strict: bool) -> bool {
    let pa = parse_version(a);
    let pb = parse_version(b);

    if strict {
        return pa == pb;
    }

    pa.0 == pb.0 && pa.1 == pb.1
}
