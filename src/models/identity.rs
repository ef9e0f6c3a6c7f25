//! The authenticated caller.

use serde::Serialize;
use std::fmt;

/// Subject of a successfully verified identity token.
///
/// Only [`crate::auth::verifier::TokenVerifier`] constructs this from request
/// data, so holding one means verification succeeded for this request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Identity-provider-assigned subject.
    pub sub: String,

    /// Email claim, when the provider includes one.
    pub email: Option<String>,
}

impl Identity {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.sub
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sub)
    }
}
