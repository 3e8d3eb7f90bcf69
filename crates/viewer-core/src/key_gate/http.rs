use super::{normalized_key, Authorization, KeyGate, KeyGateError};
use crate::config::KeyGateConfig;
use crate::document::{DocumentId, Grant};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Response header carrying the caller's capabilities, e.g. `view,download`.
pub const GRANT_HEADER: &str = "x-document-grant";

const INVALID_KEY_CODE: &str = "INVALID_KEY";

#[derive(Serialize)]
struct ViewRequest<'a> {
    #[serde(rename = "userKey")]
    user_key: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// [`KeyGate`] backed by the content service's `viewblock` endpoint.
pub struct HttpKeyGate {
    client: Client,
    base_url: String,
    timeout: Duration,
    session_token: Option<SecretString>,
}

impl HttpKeyGate {
    pub fn new(config: &KeyGateConfig) -> Result<Self, KeyGateError> {
        let client = Client::builder()
            .build()
            .map_err(|err| KeyGateError::Network(format!("cannot build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            session_token: None,
        })
    }

    /// Attaches the host's authenticated session as a bearer token.
    pub fn with_session_token(mut self, token: SecretString) -> Self {
        self.session_token = Some(token);
        self
    }

    fn endpoint(&self, document_id: &DocumentId) -> String {
        format!("{}/api/pdfs/{}/viewblock", self.base_url, document_id)
    }

    async fn exchange(
        &self,
        document_id: &DocumentId,
        key: &str,
    ) -> Result<Authorization, KeyGateError> {
        let mut request =
            self.client.post(self.endpoint(document_id)).json(&ViewRequest { user_key: key });
        if let Some(token) = &self.session_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let parsed = serde_json::from_slice::<ErrorBody>(&body).unwrap_or_default();
            let err = classify_failure(status, parsed);
            warn!(document_id = %document_id, status = status.as_u16(), error = %err, "key exchange refused");
            return Err(err);
        }

        let grant = parse_grant_header(
            response.headers().get(GRANT_HEADER).and_then(|value| value.to_str().ok()),
        );
        if !grant.can_view {
            return Err(KeyGateError::Forbidden("grant does not include view access".to_string()));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        info!(document_id = %document_id, bytes = bytes.len(), ?grant, "key exchange succeeded");
        Ok(Authorization::new(bytes.to_vec(), grant))
    }
}

#[async_trait]
impl KeyGate for HttpKeyGate {
    async fn authorize(
        &self,
        document_id: &DocumentId,
        key: SecretString,
    ) -> Result<Authorization, KeyGateError> {
        let key = normalized_key(&key)?;
        debug!(document_id = %document_id, timeout_ms = self.timeout.as_millis() as u64, "exchanging key");

        match tokio::time::timeout(self.timeout, self.exchange(document_id, key)).await {
            Ok(result) => result,
            Err(_) => Err(KeyGateError::Network(format!(
                "no response from content service within {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }
}

/// Parses a comma-separated capability list. Unknown entries are ignored.
pub fn parse_grant_header(value: Option<&str>) -> Grant {
    let mut grant = Grant::none();
    for capability in value.unwrap_or_default().split(',') {
        match capability.trim().to_ascii_lowercase().as_str() {
            "view" => grant.can_view = true,
            "download" => grant.can_download = true,
            _ => {}
        }
    }
    grant
}

fn classify_failure(status: StatusCode, body: ErrorBody) -> KeyGateError {
    let message = body
        .message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    if body.code.as_deref() == Some(INVALID_KEY_CODE) {
        return KeyGateError::InvalidKey(message);
    }

    match status.as_u16() {
        400 | 422 => KeyGateError::InvalidKey(message),
        401 | 403 | 404 => KeyGateError::Forbidden(message),
        code => KeyGateError::Network(format!("content service returned {code}: {message}")),
    }
}

fn transport_error(err: reqwest::Error) -> KeyGateError {
    if err.is_timeout() {
        KeyGateError::Network("request timed out".to_string())
    } else if err.is_connect() {
        KeyGateError::Network(format!("cannot reach content service: {err}"))
    } else {
        KeyGateError::Network(err.to_string())
    }
}
