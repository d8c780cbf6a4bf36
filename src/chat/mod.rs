pub mod composer;

use futures::StreamExt;
use log::{ debug, error, info, warn };
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use self::composer::{ build_request, compose_turn };
use crate::attachment::PendingAttachments;
use crate::error::ChatError;
use crate::models::chat::{ ChatRequest, ConversationTurn, MessageContent };
use crate::stream::session::StreamSession;
use crate::stream::transport::{ network_failure, ChatTransport };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

/// Rendering side of the widget. Both hooks default to no-ops.
pub trait ChatObserver {
    fn on_state(&mut self, _state: ChatState) {}

    /// Called with the whole conversation after every visible change.
    fn on_update(&mut self, _conversation: &[ConversationTurn]) {}
}

/// Observer that renders nothing.
pub struct NoopObserver;

impl ChatObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub subject: String,
    pub idle_timeout: Option<Duration>,
    pub total_timeout: Option<Duration>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            subject: "general".to_string(),
            idle_timeout: Some(Duration::from_secs(60)),
            total_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// In-memory conversation plus the single in-flight reply, if any.
///
/// `send` takes `&mut self`, so a widget can never run two streams at once.
pub struct ChatWidget {
    transport: Arc<dyn ChatTransport>,
    config: ChatConfig,
    conversation_id: String,
    conversation: Vec<ConversationTurn>,
    pending: PendingAttachments,
    state: ChatState,
}

impl ChatWidget {
    pub fn new(transport: Arc<dyn ChatTransport>, config: ChatConfig) -> Self {
        Self {
            transport,
            config,
            conversation_id: Uuid::new_v4().to_string(),
            conversation: Vec::new(),
            pending: PendingAttachments::new(),
            state: ChatState::Idle,
        }
    }

    pub fn conversation(&self) -> &[ConversationTurn] {
        &self.conversation
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn pending(&self) -> &PendingAttachments {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingAttachments {
        &mut self.pending
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, ChatState::Sending | ChatState::Streaming)
    }

    pub fn subject(&self) -> &str {
        &self.config.subject
    }

    /// Starts a fresh conversation. Pending attachments are kept.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.conversation_id = Uuid::new_v4().to_string();
        self.state = ChatState::Idle;
        info!("Conversation reset, new ID {}", self.conversation_id);
    }

    /// Appends the user turn and streams the assistant reply into the conversation.
    ///
    /// On any failure after the request went out, the partial assistant turn is
    /// removed and the user turn stays so the caller can resubmit.
    pub async fn send(
        &mut self,
        text: &str,
        observer: &mut dyn ChatObserver,
        cancel: &CancellationToken
    ) -> Result<String, ChatError> {
        let turn = compose_turn(text, &mut self.pending).ok_or(ChatError::EmptyMessage)?;
        let attachments = turn.content.attachment_count();
        self.conversation.push(turn);
        self.set_state(ChatState::Sending, observer);
        observer.on_update(&self.conversation);
        info!(
            "[{}] Sending turn {} ({} attachments)",
            self.conversation_id,
            self.conversation.len(),
            attachments
        );

        let request = build_request(&self.conversation, &self.config.subject);
        let total_timeout = self.config.total_timeout;
        let total_expired = ChatError::TotalTimeout(total_timeout.unwrap_or_default());

        // Dropping the reply future drops the response body, which aborts the request.
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            r = with_limit(total_timeout, total_expired, self.stream_reply(&request, observer)) => {
                r.and_then(|inner| inner)
            }
        };

        match result {
            Ok(text) => {
                info!("[{}] Reply complete ({} chars)", self.conversation_id, text.chars().count());
                self.set_state(ChatState::Completed, observer);
                Ok(text)
            }
            Err(e) => {
                if self.state == ChatState::Streaming {
                    self.conversation.pop();
                }
                match e {
                    ChatError::Cancelled => warn!("[{}] Send cancelled", self.conversation_id),
                    _ => error!("[{}] Send failed: {}", self.conversation_id, e),
                }
                self.set_state(ChatState::Failed, observer);
                observer.on_update(&self.conversation);
                Err(e)
            }
        }
    }

    async fn stream_reply(
        &mut self,
        request: &ChatRequest,
        observer: &mut dyn ChatObserver
    ) -> Result<String, ChatError> {
        let idle = self.config.idle_timeout;
        let idle_expired = || ChatError::IdleTimeout(idle.unwrap_or_default());

        let mut body = with_limit(idle, idle_expired(), self.transport.open(request)).await??;
        let mut session = StreamSession::new();

        loop {
            let next = with_limit(idle, idle_expired(), body.next()).await?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                // Nothing arrived yet, so this is a failed connection rather than a cut reply.
                Err(e) if self.state != ChatState::Streaming => {
                    warn!("[{}] Body failed before first byte: {}", self.conversation_id, e);
                    return Err(network_failure());
                }
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                continue;
            }
            debug!("[{}] Received chunk of {} bytes", self.conversation_id, chunk.len());

            if self.state != ChatState::Streaming {
                self.begin_assistant_turn(observer);
            }
            let conversation = &mut self.conversation;
            session.feed(&chunk, |text| publish(&mut *conversation, &mut *observer, text));
        }

        if self.state != ChatState::Streaming {
            self.begin_assistant_turn(observer);
        }
        let conversation = &mut self.conversation;
        session.finish(|text| publish(&mut *conversation, &mut *observer, text));

        if session.malformed_frames() > 0 {
            warn!(
                "[{}] Ignored {} malformed frames in reply",
                self.conversation_id,
                session.malformed_frames()
            );
        }
        Ok(session.assistant_text().to_string())
    }

    fn begin_assistant_turn(&mut self, observer: &mut dyn ChatObserver) {
        self.conversation.push(ConversationTurn::assistant(""));
        self.set_state(ChatState::Streaming, observer);
        observer.on_update(&self.conversation);
    }

    fn set_state(&mut self, state: ChatState, observer: &mut dyn ChatObserver) {
        debug!("[{}] {:?} -> {:?}", self.conversation_id, self.state, state);
        self.state = state;
        observer.on_state(state);
    }
}

/// Replaces the in-flight assistant turn in place.
fn publish(conversation: &mut Vec<ConversationTurn>, observer: &mut dyn ChatObserver, text: &str) {
    if let Some(last) = conversation.last_mut() {
        last.content = MessageContent::Text(text.to_string());
    }
    observer.on_update(conversation.as_slice());
}

async fn with_limit<F: Future>(
    limit: Option<Duration>,
    on_expiry: ChatError,
    fut: F
) -> Result<F::Output, ChatError> {
    match limit {
        Some(duration) => tokio::time::timeout(duration, fut).await.map_err(|_| on_expiry),
        None => Ok(fut.await),
    }
}
