//! Verification of load-balancer-issued identity tokens.
//!
//! A token is `header.payload.signature`, each segment base64url. The load
//! balancer pads its segments, which generic JWT decoders reject, so the
//! segments are decoded here and only the signature check is delegated to
//! `jsonwebtoken`. The signature always covers the literal
//! `header.payload` text as received.
//!
//! The algorithm is pinned to ES256. The header only selects *which* key to
//! use, never *how* to verify.

use super::key_cache::KeyCache;
use crate::{
    errors::{GatewayError, GatewayResult},
    models::identity::Identity,
};
use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, crypto};
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, warn};

/// The only algorithm tokens may declare.
pub const PINNED_ALGORITHM: &str = "ES256";

/// base64url that accepts both padded and unpadded input.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
struct AssertionHeader {
    alg: Option<String>,
    kid: Option<String>,
    signer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    sub: Option<String>,
    exp: Option<i64>,
    email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Issuer scope used to locate keys.
    pub region: String,
    /// When set, the header's `signer` must equal this (the load balancer ARN).
    pub expected_signer: Option<String>,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

pub struct TokenVerifier {
    keys: Arc<KeyCache>,
    config: VerifierConfig,
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> GatewayResult<T> {
    let bytes = SEGMENT_ENGINE
        .decode(segment)
        .map_err(|_| GatewayError::TokenInvalid)?;
    serde_json::from_slice(&bytes).map_err(|_| GatewayError::TokenInvalid)
}

/// Signature in the form `jsonwebtoken` expects: unpadded base64url.
fn normalize_signature(signature: &str) -> String {
    signature
        .trim_end_matches('=')
        .replace('+', "-")
        .replace('/', "_")
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyCache>, config: VerifierConfig) -> Self {
        Self { keys, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify `raw_token` against the current time.
    pub async fn verify(&self, raw_token: Option<&str>) -> GatewayResult<Identity> {
        self.verify_at(raw_token, Utc::now().timestamp()).await
    }

    /// Verify `raw_token` as of `now` (unix seconds).
    pub async fn verify_at(&self, raw_token: Option<&str>, now: i64) -> GatewayResult<Identity> {
        let token = match raw_token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(GatewayError::Unauthenticated),
        };

        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            debug!("token does not have three segments");
            return Err(GatewayError::TokenInvalid);
        };

        let header: AssertionHeader = decode_segment(header_b64)?;
        let (Some(alg), Some(kid)) = (header.alg.as_deref(), header.kid.as_deref()) else {
            debug!("token header lacks alg or kid");
            return Err(GatewayError::TokenInvalid);
        };
        if alg != PINNED_ALGORITHM {
            debug!(alg, "token declares a non-pinned algorithm");
            return Err(GatewayError::TokenInvalid);
        }
        if let Some(expected) = &self.config.expected_signer {
            if header.signer.as_deref() != Some(expected.as_str()) {
                debug!(signer = ?header.signer, "token signed by an unexpected signer");
                return Err(GatewayError::TokenInvalid);
            }
        }

        let key = self
            .keys
            .get(kid, &self.config.region)
            .await
            .map_err(|err| {
                warn!(kid, error = %err, "cannot verify token without its key");
                GatewayError::TokenInvalid
            })?;

        let signing_input_len = header_b64.len() + 1 + payload_b64.len();
        let message = &token.as_bytes()[..signing_input_len];
        let valid = crypto::verify(
            &normalize_signature(signature),
            message,
            &key,
            Algorithm::ES256,
        )
        .unwrap_or(false);
        if !valid {
            debug!(kid, "token signature mismatch");
            return Err(GatewayError::TokenInvalid);
        }

        let claims: AssertionClaims = decode_segment(payload_b64)?;
        let exp = claims.exp.ok_or(GatewayError::TokenInvalid)?;
        let leeway = i64::try_from(self.config.leeway_secs).unwrap_or(i64::MAX);
        if exp.saturating_add(leeway) <= now {
            return Err(GatewayError::TokenExpired);
        }

        match claims.sub {
            Some(sub) if !sub.is_empty() => Ok(Identity::new(sub).with_email(claims.email)),
            _ => Err(GatewayError::TokenInvalid),
        }
    }
}
