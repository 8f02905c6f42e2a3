//! App version: four numeric components plus an optional update marker.
//!
//! Stored form is `1.2.3.4`, `1.2.3.4-f` (forced) or `1.2.3.4-s` (silent).
//! Shorter inputs (`1.2`) are zero-padded to four components.

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::error::PipelineError;

/// Target versions supplied on the command line
static TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+){0,3}$").expect("static regex"));

/// Stored versions, marker allowed
static STORED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+){0,3})(?:-([fs]))?$").expect("static regex"));

/// Client update behavior carried in the version string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    /// Browser runtime reloads without asking
    Forced,
    /// Browser runtime suppresses the update notice
    Silent,
}

impl Marker {
    fn suffix(self) -> &'static str {
        match self {
            Marker::Forced => "-f",
            Marker::Silent => "-s",
        }
    }

    /// From the `--forced` / `--silent` flags; forced wins if both are set
    pub fn from_flags(forced: bool, silent: bool) -> Option<Self> {
        if forced {
            Some(Marker::Forced)
        } else if silent {
            Some(Marker::Silent)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    parts: [u64; 4],
    marker: Option<Marker>,
}

impl Version {
    /// Parse a stored version (marker allowed).
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let s = s.trim();
        let caps = STORED_RE
            .captures(s)
            .ok_or_else(|| PipelineError::InvalidVersion(s.to_string()))?;

        let parts = parse_parts(&caps[1]).ok_or_else(|| PipelineError::InvalidVersion(s.to_string()))?;
        let marker = match caps.get(2).map(|m| m.as_str()) {
            Some("f") => Some(Marker::Forced),
            Some("s") => Some(Marker::Silent),
            _ => None,
        };
        Ok(Self { parts, marker })
    }

    /// Compute the next version.
    ///
    /// Without a target the 4th component of `current` is incremented.
    /// A target must be plain numeric-dot (no marker) and is used as-is,
    /// zero-padded. The marker of `current` never carries over.
    pub fn resolve(
        current: &Version,
        target: Option<&str>,
        marker: Option<Marker>,
    ) -> Result<Self, PipelineError> {
        let parts = match target {
            Some(t) => {
                let t = t.trim();
                if !TARGET_RE.is_match(t) {
                    return Err(PipelineError::InvalidVersion(t.to_string()));
                }
                parse_parts(t).ok_or_else(|| PipelineError::InvalidVersion(t.to_string()))?
            }
            None => {
                let mut p = current.parts;
                p[3] = p[3]
                    .checked_add(1)
                    .ok_or_else(|| PipelineError::InvalidVersion(current.to_string()))?;
                p
            }
        };
        Ok(Self { parts, marker })
    }

    pub fn parts(&self) -> [u64; 4] {
        self.parts
    }

    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Version without the marker, e.g. for cache names
    pub fn numeric(&self) -> String {
        let [a, b, c, d] = self.parts;
        format!("{a}.{b}.{c}.{d}")
    }
}

fn parse_parts(s: &str) -> Option<[u64; 4]> {
    let mut parts = [0u64; 4];
    for (i, piece) in s.split('.').enumerate() {
        if i >= 4 {
            return None;
        }
        parts[i] = piece.parse().ok()?;
    }
    Some(parts)
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.numeric())?;
        if let Some(m) = self.marker {
            f.write_str(m.suffix())?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}
