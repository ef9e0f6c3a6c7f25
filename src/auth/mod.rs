//! Request authentication: verification keys, token verification, and the
//! extractor that turns a request header into an [`Identity`].
//!
//! [`Identity`]: crate::models::identity::Identity

pub mod extractor;
pub mod key_cache;
pub mod verifier;
