use crate::config::ConfigError;
use crate::document::DocumentState;
use crate::key_gate::KeyGateError;
use doc_decoder::DecoderError;

/// Errors surfaced by [`DocumentViewer`](crate::DocumentViewer).
///
/// Per-page render failures are not here: they stay on the page as a placeholder.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    KeyGate(#[from] KeyGateError),
    #[error("document could not be decoded: {0}")]
    Decode(#[from] DecoderError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("viewer is {actual}; this needs a {expected} document")]
    InvalidState { expected: DocumentState, actual: DocumentState },
}

impl ViewerError {
    /// True when the same viewer can try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::KeyGate(err) => err.is_retryable(),
            _ => false,
        }
    }
}
