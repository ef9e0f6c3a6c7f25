//! Request-independent operations on top of the stores.

use crate::{
    errors::{GatewayError, GatewayResult},
    stores::StoreResult,
};
use std::{future::Future, time::Duration};
use tracing::warn;

pub mod file_service;
pub mod ownership;
pub mod text_service;

/// Run one store call under `limit`.
///
/// Store failures and timeouts both surface as the retryable
/// [`GatewayError::StoreUnavailable`]; the cause is logged, not returned.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &'static str, call: F) -> GatewayResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(op, error = %err, "store call failed");
            Err(GatewayError::StoreUnavailable)
        }
        Err(_) => {
            warn!(op, ?limit, "store call timed out");
            Err(GatewayError::StoreUnavailable)
        }
    }
}
