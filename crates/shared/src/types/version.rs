//! Migration version identifiers.
//!
//! A version is a totally ordered 64-bit integer. Generated versions read as
//! UTC timestamps (`YYYYMMDDHHMMSS`), but any positive integer is accepted when
//! parsing existing migration files.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a single migration, ordered ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub i64);

impl Version {
    /// Creates a version from a raw integer.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Derives a version from a wall-clock instant, e.g. `2026-10-16 09:30:05`
    /// becomes `20261016093005`.
    #[must_use]
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        let date = i64::from(at.year()) * 10_000_000_000
            + i64::from(at.month()) * 100_000_000
            + i64::from(at.day()) * 1_000_000;
        let time = i64::from(at.hour()) * 10_000 + i64::from(at.minute()) * 100 + i64::from(at.second());
        Self(date + time)
    }

    /// Generates the version for a new migration.
    ///
    /// The result is strictly greater than `latest` even when the clock has not
    /// advanced past it (two migrations created within the same second, or a
    /// clock that went backwards). Returns `None` when `latest` is already
    /// `i64::MAX`.
    #[must_use]
    pub fn next_after(latest: Option<Self>, now: DateTime<Utc>) -> Option<Self> {
        let candidate = Self::from_timestamp(now);
        match latest {
            Some(latest) if candidate <= latest => latest.0.checked_add(1).map(Self),
            _ => Some(candidate),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}
