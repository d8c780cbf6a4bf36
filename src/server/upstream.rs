use bytes::Bytes;
use futures::{ Stream, StreamExt };
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::pin::Pin;
use thiserror::Error;

use crate::models::chat::{ ContentPart, ConversationTurn, MessageContent, Role };

pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
    },

    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: Vec<UpstreamMessage>,
    stream: bool,
}

#[derive(Serialize)]
struct UpstreamMessage {
    role: &'static str,
    content: UpstreamContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum UpstreamContent {
    Text(String),
    Parts(Vec<UpstreamPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UpstreamPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    File {
        file: FileData,
    },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: Option<UpstreamErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamErrorDetail {
    Text(String),
    Object {
        message: String,
    },
}

/// OpenAI-compatible chat completion gateway.
pub struct UpstreamClient {
    http: HttpClient,
    url: String,
    model: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e|
                    format!("Invalid API key format: {}", e)
                )?
            );
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Returns the raw SSE body of a streamed completion.
    pub async fn stream(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn]
    ) -> Result<UpstreamBody, UpstreamError> {
        let resp = self.post(system_prompt, turns, true).await?;
        Ok(Box::pin(resp.bytes_stream()))
    }

    /// Non-streamed completion, used when streaming is simulated.
    pub async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn]
    ) -> Result<String, UpstreamError> {
        let resp = self.post(system_prompt, turns, false).await?;
        let body = resp.json::<CompletionResponse>().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(UpstreamError::EmptyResponse)
    }

    async fn post(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
        stream: bool
    ) -> Result<reqwest::Response, UpstreamError> {
        let req = UpstreamRequest {
            model: &self.model,
            messages: to_upstream_messages(system_prompt, turns),
            stream,
        };
        info!("Forwarding {} turns to {} (model {}, stream={})", turns.len(), self.url, self.model, stream);

        let resp = self.http.post(&self.url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.bytes().await.unwrap_or_default();
            let message = serde_json
                ::from_slice::<UpstreamErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .map(|detail| match detail {
                    UpstreamErrorDetail::Text(text) => text,
                    UpstreamErrorDetail::Object { message } => message,
                })
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(UpstreamError::Status { status: status.as_u16(), message });
        }
        debug!("Upstream answered {}", status);
        Ok(resp)
    }
}

fn to_upstream_messages(system_prompt: &str, turns: &[ConversationTurn]) -> Vec<UpstreamMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(UpstreamMessage {
        role: "system",
        content: UpstreamContent::Text(system_prompt.to_string()),
    });
    messages.extend(
        turns.iter().map(|turn| UpstreamMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: to_upstream_content(&turn.content),
        })
    );
    messages
}

fn to_upstream_content(content: &MessageContent) -> UpstreamContent {
    match content {
        MessageContent::Text(text) => UpstreamContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            let mut attachment_index = 0;
            let converted = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => UpstreamPart::Text { text: text.clone() },
                    ContentPart::InlineAttachment { mime_type, data } => {
                        attachment_index += 1;
                        let data_url = format!("data:{};base64,{}", mime_type, data);
                        if mime_type == "application/pdf" {
                            UpstreamPart::File {
                                file: FileData {
                                    filename: format!("document-{}.pdf", attachment_index),
                                    file_data: data_url,
                                },
                            }
                        } else {
                            UpstreamPart::ImageUrl { image_url: ImageUrl { url: data_url } }
                        }
                    }
                })
                .collect();
            UpstreamContent::Parts(converted)
        }
    }
}

/// Splits a complete answer into SSE delta frames followed by the sentinel.
pub fn simulated_frames(text: &str) -> Vec<String> {
    let mut frames: Vec<String> = text
        .split_inclusive(char::is_whitespace)
        .map(|piece| {
            let chunk = serde_json::json!({ "choices": [{ "delta": { "content": piece } }] });
            format!("data: {}\n\n", chunk)
        })
        .collect();
    frames.push("data: [DONE]\n\n".to_string());
    frames
}

/// Replays `frames` as a byte stream, pausing between frames.
pub fn replay_frames(
    frames: Vec<String>,
    pause: std::time::Duration
) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> + Send {
    futures::stream::iter(frames).then(move |frame| async move {
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        Ok(Bytes::from(frame))
    })
}
