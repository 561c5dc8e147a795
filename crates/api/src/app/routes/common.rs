use core::str::FromStr;

use forgecrm_core::AggregateId;

use crate::app::errors;

/// Parse a path segment into an aggregate id or produce the standard 400.
pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    AggregateId::from_str(raw).map_err(|_| errors::bad_id(what))
}
