//! Adapters for the domain ports.

pub mod channel;
pub mod in_memory;
pub mod lock;
pub mod notify;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod snowflake;

use crate::error::{BizError, ErrorCode, Result};

/// Optimistic concurrency check shared by the repositories.
pub(crate) fn next_version(record: &str, stored: u32, incoming: u32) -> Result<u32> {
    if stored != incoming {
        return Err(BizError::from(ErrorCode::VersionConflict)
            .with_message(format!(
                "{record} was updated concurrently (stored version {stored}, got {incoming})"
            ))
            .into());
    }
    Ok(stored + 1)
}
