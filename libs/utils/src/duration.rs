// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Go-style duration strings.
//!
//! The GSLB configuration zone encodes check and poll intervals as Go
//! duration strings (`"5s"`, `"1m30s"`, `"500ms"`). [GoDuration] parses and
//! formats that representation and derives serde support for it.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A [Duration] that round-trips through the Go string representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoDuration(pub Duration);

/// Errors that can occur when parsing a duration string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseDurationError {
    /// The input is empty.
    #[error("empty duration string")]
    Empty,
    /// A numeric segment is malformed.
    #[error("invalid number in duration: {0:?}")]
    InvalidNumber(String),
    /// A unit suffix is missing or unknown.
    #[error("unknown unit in duration: {0:?}")]
    UnknownUnit(String),
}

impl GoDuration {
    /// Returns the wrapped [Duration].
    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for GoDuration {
    fn from(value: Duration) -> Self {
        GoDuration(value)
    }
}

impl From<GoDuration> for Duration {
    fn from(value: GoDuration) -> Self {
        value.0
    }
}

impl FromStr for GoDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseDurationError::Empty);
        }
        if s == "0" {
            return Ok(GoDuration(Duration::ZERO));
        }

        let mut total = Duration::ZERO;
        let mut rest = s;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or_else(|| ParseDurationError::UnknownUnit(rest.to_string()))?;
            if digits_end == 0 {
                return Err(ParseDurationError::InvalidNumber(rest.to_string()));
            }

            let (number, tail) = rest.split_at(digits_end);
            let value: f64 = number
                .parse()
                .map_err(|_| ParseDurationError::InvalidNumber(number.to_string()))?;

            let unit_end = tail
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);

            let unit_duration = match unit {
                "h" => Duration::from_secs(3600),
                "m" => Duration::from_secs(60),
                "s" => Duration::from_secs(1),
                "ms" => Duration::from_millis(1),
                "us" | "µs" => Duration::from_micros(1),
                "ns" => Duration::from_nanos(1),
                _ => return Err(ParseDurationError::UnknownUnit(unit.to_string())),
            };

            total += Duration::from_secs_f64(unit_duration.as_secs_f64() * value);
            rest = tail;
        }

        Ok(GoDuration(total))
    }
}

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d.is_zero() {
            return write!(f, "0s");
        }

        if d < Duration::from_secs(1) {
            let ms = d.as_millis();
            if ms > 0 {
                return write!(f, "{ms}ms");
            }
            return write!(f, "{}ns", d.as_nanos());
        }

        let mut secs = d.as_secs();
        let subsec_ms = d.subsec_millis();

        let hours = secs / 3600;
        secs %= 3600;
        let minutes = secs / 60;
        secs %= 60;

        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        if secs > 0 || subsec_ms > 0 || (hours == 0 && minutes == 0) {
            if subsec_ms > 0 {
                write!(f, "{secs}.{subsec_ms:03}s")?;
            } else {
                write!(f, "{secs}s")?;
            }
        }
        Ok(())
    }
}

impl Serialize for GoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
