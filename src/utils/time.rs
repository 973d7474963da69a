//! Wall-clock helpers.

use crate::error::{constants, ProtocolError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as carried in `local_time` fields
pub fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ProtocolError::Custom(constants::ERR_SYSTEM_TIME.into()))
}

/// Like [`unix_timestamp`], but falls back to zero on a broken clock
pub fn unix_timestamp_or_zero() -> u64 {
    unix_timestamp().unwrap_or(0)
}
