//! Conversions between the engine's UTC `timeval` and local wall-clock time.

use std::time::SystemTime;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::Error;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Converts seconds and microseconds since the Unix epoch to local time.
///
/// Microseconds outside `0..1_000_000` carry into the seconds. Values chrono cannot
/// represent map to the epoch.
pub fn to_local(seconds: i64, micros: i64) -> DateTime<Local> {
    let seconds = seconds.saturating_add(micros.div_euclid(MICROS_PER_SECOND));
    let nanos = (micros.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
    let utc = Utc
        .timestamp_opt(seconds, nanos)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH));
    utc.with_timezone(&Local)
}

/// Converts local time to the engine's UTC `timeval`, truncating to microseconds.
pub fn to_timeval(timestamp: &DateTime<Local>) -> Result<libc::timeval, Error> {
    let seconds = timestamp.timestamp();
    if seconds < 0 {
        return Err(Error::InvalidArgument(format!(
            "timestamp {} is before 1970",
            timestamp
        )));
    }
    Ok(libc::timeval {
        tv_sec: seconds as _,
        tv_usec: timestamp.timestamp_subsec_micros() as _,
    })
}
