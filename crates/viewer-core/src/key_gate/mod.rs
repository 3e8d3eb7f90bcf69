//! Key exchange with the content service.
//!
//! A [`KeyGate`] turns a user-supplied key into decrypted document bytes plus the
//! [`Grant`] the service attached to them. Nothing downstream exists until it succeeds.

mod http;

pub use http::{parse_grant_header, HttpKeyGate, GRANT_HEADER};

use crate::document::{DocumentId, Grant};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyGateError {
    #[error("invalid decryption key: {0}")]
    InvalidKey(String),
    #[error("access forbidden: {0}")]
    Forbidden(String),
    #[error("network error: {0}")]
    Network(String),
}

/// How a caller should react to a [`KeyGateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAdvice {
    /// Ask the user for a different key
    NewKey,
    /// Try again with the same input
    Unchanged,
    /// Give up on this document
    Abort,
}

impl KeyGateError {
    pub fn retry_advice(&self) -> RetryAdvice {
        match self {
            Self::InvalidKey(_) => RetryAdvice::NewKey,
            Self::Network(_) => RetryAdvice::Unchanged,
            Self::Forbidden(_) => RetryAdvice::Abort,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_advice() != RetryAdvice::Abort
    }
}

/// Decrypted content and the capabilities that travel with it.
pub struct Authorization {
    bytes: Vec<u8>,
    grant: Grant,
}

impl Authorization {
    pub fn new(bytes: Vec<u8>, grant: Grant) -> Self {
        Self { bytes, grant }
    }

    pub fn grant(&self) -> Grant {
        self.grant
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_parts(self) -> (Vec<u8>, Grant) {
        (self.bytes, self.grant)
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("grant", &self.grant)
            .finish()
    }
}

/// Exchanges a key for document content.
///
/// The key is taken by value and dropped when the call resolves, so no copy outlives
/// the exchange.
#[async_trait]
pub trait KeyGate: Send + Sync {
    async fn authorize(
        &self,
        document_id: &DocumentId,
        key: SecretString,
    ) -> Result<Authorization, KeyGateError>;
}

/// Trims the key and rejects empty input before any I/O happens.
pub fn normalized_key(key: &SecretString) -> Result<&str, KeyGateError> {
    let trimmed = key.expose_secret().trim();
    if trimmed.is_empty() {
        return Err(KeyGateError::InvalidKey("a decryption key is required".to_string()));
    }
    Ok(trimmed)
}


#[cfg(test)]
mod tests {
    use super::mock::MockKeyGate;
    use super::*;

    #[test]
    fn retry_advice_per_variant() {
        assert_eq!(KeyGateError::InvalidKey("x".into()).retry_advice(), RetryAdvice::NewKey);
        assert_eq!(KeyGateError::Network("x".into()).retry_advice(), RetryAdvice::Unchanged);
        assert_eq!(KeyGateError::Forbidden("x".into()).retry_advice(), RetryAdvice::Abort);
        assert!(!KeyGateError::Forbidden("x".into()).is_retryable());
    }

    #[test]
    fn blank_keys_are_rejected_and_others_trimmed() {
        let blank = SecretString::from("   ");
        assert!(matches!(normalized_key(&blank), Err(KeyGateError::InvalidKey(_))));

        let padded = SecretString::from("  RIGHT \n");
        assert_eq!(normalized_key(&padded).expect("key should be accepted"), "RIGHT");
    }

    #[test]
    fn authorization_debug_hides_content() {
        let auth = Authorization::new(b"secret body".to_vec(), Grant::view_only());
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("<11 bytes>"));
        assert!(!rendered.contains("secret"));
    }

    #[tokio::test]
    async fn wrong_key_never_yields_bytes() {
        let gate = MockKeyGate::new("RIGHT", b"%PDF".to_vec(), Grant::view_only());
        let id = DocumentId::new("7");

        let err = gate
            .authorize(&id, SecretString::from("WRONG"))
            .await
            .expect_err("wrong key should fail");
        assert!(matches!(err, KeyGateError::InvalidKey(_)));

        let auth =
            gate.authorize(&id, SecretString::from("RIGHT")).await.expect("right key works");
        assert!(auth.grant().can_view);
        assert_eq!(auth.into_parts().0, b"%PDF".to_vec());
        assert_eq!(gate.calls.lock().len(), 2);
    }
}
