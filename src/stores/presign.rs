//! Time-bounded capability links for blobs served by this process.
//!
//! A link is `{base}/blobs/{key}?expires={unix}&signature={hex}` where the
//! signature is HMAC-SHA256 over `key` and `expires`. Holding a valid,
//! unexpired link is the only authorization the blob route checks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Path prefix the blob download route is mounted under.
pub const BLOB_ROUTE_PREFIX: &str = "/blobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Expired,
    Invalid,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            secret: secret.into(),
            base_url,
        }
    }

    fn mac(&self, key: &str, expires_at: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Build a link for `key` valid until `expires_at` (unix seconds).
    pub fn sign(&self, key: &str, expires_at: i64) -> String {
        let signature = hex::encode(self.mac(key, expires_at).finalize().into_bytes());
        format!(
            "{}{}/{}?expires={}&signature={}",
            self.base_url, BLOB_ROUTE_PREFIX, key, expires_at, signature
        )
    }

    /// Check a presented link. The comparison is constant time.
    pub fn verify(
        &self,
        key: &str,
        expires_at: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), LinkError> {
        let presented = hex::decode(signature).map_err(|_| LinkError::Invalid)?;
        self.mac(key, expires_at)
            .verify_slice(&presented)
            .map_err(|_| LinkError::Invalid)?;
        if now >= expires_at {
            return Err(LinkError::Expired);
        }
        Ok(())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(url: &str) -> (String, i64, String) {
        let (path, query) = url.split_once('?').unwrap();
        let key = path.split_once("/blobs/").unwrap().1.to_string();
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v.to_string(),
                _ => {}
            }
        }
        (key, expires, signature)
    }

    #[test]
    fn signed_link_verifies_until_expiry() {
        let signer = UrlSigner::new(b"secret".to_vec(), "http://localhost:3000/");
        let url = signer.sign("uploads/alice/1/a.txt", 1_000);
        assert!(url.starts_with("http://localhost:3000/blobs/uploads/alice/1/a.txt?"));

        let (key, expires, signature) = parts(&url);
        assert_eq!(signer.verify(&key, expires, &signature, 999), Ok(()));
        assert_eq!(
            signer.verify(&key, expires, &signature, 1_000),
            Err(LinkError::Expired)
        );
    }

    #[test]
    fn tampered_links_are_rejected() {
        let signer = UrlSigner::new(b"secret".to_vec(), "http://localhost");
        let (key, expires, signature) = parts(&signer.sign("uploads/alice/1/a.txt", 1_000));

        assert_eq!(
            signer.verify("uploads/bob/1/a.txt", expires, &signature, 0),
            Err(LinkError::Invalid)
        );
        assert_eq!(
            signer.verify(&key, expires + 3600, &signature, 0),
            Err(LinkError::Invalid)
        );
        assert_eq!(
            signer.verify(&key, expires, "not-hex", 0),
            Err(LinkError::Invalid)
        );

        let other = UrlSigner::new(b"other".to_vec(), "http://localhost");
        assert_eq!(
            other.verify(&key, expires, &signature, 0),
            Err(LinkError::Invalid)
        );
    }
}
