//! The single ownership decision used before every read or delete of a file.

use crate::{
    errors::{GatewayError, GatewayResult},
    models::{identity::Identity, record::FileRecord},
};

/// Allow `identity` to act on `record` only if it owns it.
///
/// An absent record is `NotFound` for every caller.
pub fn authorize(identity: &Identity, record: Option<&FileRecord>) -> GatewayResult<()> {
    match record {
        None => Err(GatewayError::NotFound),
        Some(record) if record.owner_id != identity.sub => Err(GatewayError::AccessDenied),
        Some(_) => Ok(()),
    }
}
