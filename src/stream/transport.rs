use async_trait::async_trait;
use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, error, info };
use reqwest::{ Client as HttpClient, StatusCode, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION, ACCEPT } };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;

use crate::error::ChatError;
use crate::models::chat::ChatRequest;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

const GENERIC_ERROR: &str = "Une erreur est survenue lors de la communication avec le tuteur.";
const NETWORK_ERROR: &str = "Impossible de joindre le tuteur. Vérifiez votre connexion.";
const CREDITS_ERROR: &str =
    "Vos crédits sont épuisés. Rechargez votre compte pour continuer à discuter avec le tuteur.";
const RATE_LIMIT_ERROR: &str = "Trop de requêtes. Veuillez patienter quelques instants avant de réessayer.";

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Connection-level failure with no HTTP status to report.
pub fn network_failure() -> ChatError {
    ChatError::Transport { status: None, message: NETWORK_ERROR.to_string() }
}

/// Opens the reply body for one outbound conversation.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

pub struct HttpTransport {
    http: HttpClient,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    format!("Invalid API key format: {}", e)
                )?
            );
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).map_err(|e| format!("Invalid API key format: {}", e))?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, ChatError> {
        info!(
            "POST {} ({} turns, subject '{}')",
            self.endpoint,
            request.messages.len(),
            request.subject
        );

        let resp = self.http
            .post(&self.endpoint)
            .json(request)
            .send().await
            .map_err(|e| {
                error!("Chat request failed before any response: {}", e);
                network_failure()
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            let message = error_message(status, &body);
            error!("Chat endpoint returned {}: {}", status, message);
            return Err(ChatError::Transport { status: Some(status.as_u16()), message });
        }
        debug!("Chat endpoint answered {}, streaming body", status);

        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ChatError::StreamRead(e.to_string())));
        Ok(Box::pin(body))
    }
}

/// Best-effort user message for a failed response.
pub fn error_message(status: StatusCode, body: &[u8]) -> String {
    match status {
        StatusCode::PAYMENT_REQUIRED => {
            return CREDITS_ERROR.to_string();
        }
        StatusCode::TOO_MANY_REQUESTS => {
            return RATE_LIMIT_ERROR.to_string();
        }
        _ => {}
    }

    let server_message = serde_json
        ::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    match server_message {
        Some(message) => friendly_message(&message).unwrap_or(message),
        None => GENERIC_ERROR.to_string(),
    }
}

fn friendly_message(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if lower.contains("credit") || lower.contains("crédit") || lower.contains("quota") {
        Some(CREDITS_ERROR.to_string())
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        Some(RATE_LIMIT_ERROR.to_string())
    } else {
        None
    }
}
