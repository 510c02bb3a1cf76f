//! Custom serde module for parsing time-of-day strings like "09:25".

use chrono::NaiveTime;
use serde::{self, Deserialize, Deserializer};

pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_time_of_day(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_time_of_day(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();

    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| format!("invalid time of day (expected HH:MM): {}", s))
}
