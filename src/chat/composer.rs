use crate::attachment::PendingAttachments;
use crate::models::chat::{ ChatRequest, ContentPart, ConversationTurn, MessageContent };

/// Sent in place of user text when only files are attached.
pub const ATTACHMENT_FALLBACK_PROMPT: &str =
    "Analyse le ou les fichiers joints et explique-moi leur contenu.";

/// Builds the next user turn, draining `pending` only when a turn is produced.
pub fn compose_turn(text: &str, pending: &mut PendingAttachments) -> Option<ConversationTurn> {
    let text = text.trim();

    if pending.is_empty() {
        if text.is_empty() {
            return None;
        }
        return Some(ConversationTurn::user(MessageContent::Text(text.to_string())));
    }

    let lead = if text.is_empty() { ATTACHMENT_FALLBACK_PROMPT } else { text };
    let attachments = pending.take();
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(ContentPart::Text { text: lead.to_string() });
    parts.extend(attachments.iter().map(ContentPart::from));

    Some(ConversationTurn::user(MessageContent::Parts(parts)))
}

pub fn build_request(conversation: &[ConversationTurn], subject: &str) -> ChatRequest {
    ChatRequest {
        messages: conversation.to_vec(),
        subject: subject.to_string(),
    }
}
