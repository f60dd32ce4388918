//! The 32-bit timestamps in the database header.
//!
//! Two conventions coexist in the wild. The device writes unsigned seconds
//! from the 1904 epoch; some desktop tools write signed seconds from the
//! 1970 epoch instead. A raw value with the top bit set (or zero) can only
//! be the former, anything else is read as the latter. Both conventions are
//! preserved across a parse/emit round-trip.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, SyncError};

/// Seconds between 1904-01-01 and 1970-01-01, both UTC.
pub const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbTimestamp {
    /// Unsigned seconds since 1904-01-01 UTC (the device's native form).
    Mac(u32),
    /// Signed seconds since 1970-01-01 UTC.
    Unix(i32),
}

impl DbTimestamp {
    /// The canonical zero value: the 1904 epoch itself.
    pub const EPOCH: DbTimestamp = DbTimestamp::Mac(0);

    pub fn from_raw(raw: u32) -> Self {
        if raw == 0 || raw & 0x8000_0000 != 0 {
            DbTimestamp::Mac(raw)
        } else {
            DbTimestamp::Unix(raw as i32)
        }
    }

    /// Emit the raw field. A Unix-convention value must be non-negative:
    /// a negative one would set the top bit and read back as Mac-convention.
    pub fn to_raw(self) -> Result<u32> {
        match self {
            DbTimestamp::Mac(secs) => Ok(secs),
            DbTimestamp::Unix(secs) => {
                if secs < 0 {
                    return Err(SyncError::Validation(format!(
                        "unix-convention timestamp {secs} is not representable"
                    )));
                }
                Ok(secs as u32)
            }
        }
    }

    pub fn unix_seconds(self) -> i64 {
        match self {
            DbTimestamp::Mac(secs) => i64::from(secs) - MAC_EPOCH_OFFSET,
            DbTimestamp::Unix(secs) => i64::from(secs),
        }
    }

    /// Build a Mac-convention timestamp, the device's native form.
    pub fn from_unix_seconds(secs: i64) -> Self {
        let mac = secs + MAC_EPOCH_OFFSET;
        DbTimestamp::Mac(mac.clamp(0, i64::from(u32::MAX)) as u32)
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        DbTimestamp::from_unix_seconds(secs)
    }
}

impl Default for DbTimestamp {
    fn default() -> Self {
        DbTimestamp::EPOCH
    }
}
