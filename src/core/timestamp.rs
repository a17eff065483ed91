use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

pub fn utc_ns_now() -> u64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_secs() * 1_000_000_000 + d.subsec_nanos() as u64
}

/// RFC 3339 with millisecond precision, e.g. `2024-05-01T12:00:00.250Z`.
pub fn format_utc_ns(utc_ns: u64) -> String {
    let seconds = (utc_ns / 1_000_000_000) as i64;
    let nanos = (utc_ns % 1_000_000_000) as u32;
    match DateTime::<Utc>::from_timestamp(seconds, nanos) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{}.{:09}", seconds, nanos),
    }
}
