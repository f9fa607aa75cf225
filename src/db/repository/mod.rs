//! Repository layer — entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, so callers can run several of
//! them inside one `Transaction`.

mod block;
mod blueprint;
mod generated;
mod meta;
mod paper;
mod question;
mod session;
mod taxonomy;

use chrono::{DateTime, SecondsFormat, Utc};

pub use block::*;
pub use blueprint::*;
pub use generated::*;
pub use meta::*;
pub use paper::*;
pub use question::*;
pub use session::*;
pub use taxonomy::*;

/// Timestamps are stored as RFC 3339 with microseconds so ordering survives a round trip.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

pub(crate) fn parse_uuid(raw: &str, entity_type: &str) -> Result<uuid::Uuid, super::DatabaseError> {
    uuid::Uuid::parse_str(raw).map_err(|_| super::DatabaseError::ConstraintViolation(format!(
        "{entity_type} row has malformed id '{raw}'"
    )))
}
