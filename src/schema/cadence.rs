//! Bar cadences and the table family they name.

use crate::schema::SchemaError;
use std::fmt;
use std::str::FromStr;

/// Sampling interval of a price-bar table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    /// One bar per minute (`stock1m`)
    Minute,
    /// One bar per hour (`stock1h`)
    Hour,
    /// One bar per trading day (`stock1d`)
    Day,
}

impl Cadence {
    /// Every cadence, in declaration order
    pub const ALL: [Cadence; 3] = [Cadence::Minute, Cadence::Hour, Cadence::Day];

    /// Short interval code used in table and partition names
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Cadence::Minute => "1m",
            Cadence::Hour => "1h",
            Cadence::Day => "1d",
        }
    }

    /// Name of the bar table holding this cadence
    #[must_use]
    pub fn table_name(self) -> String {
        format!("stock{}", self.code())
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Cadence {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "minute" => Ok(Cadence::Minute),
            "1h" | "hour" => Ok(Cadence::Hour),
            "1d" | "day" => Ok(Cadence::Day),
            _ => Err(SchemaError::UnknownCadence(s.to_string())),
        }
    }
}
