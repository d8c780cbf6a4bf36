use std::time::Duration;
use thiserror::Error;

/// Why an attachment never made it into the pending set.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("File '{name}' is too large ({size} bytes, max {max})")]
    FileTooLarge {
        name: String,
        size: u64,
        max: u64,
    },

    #[error("File '{name}' has unsupported type '{mime}'")]
    UnsupportedType {
        name: String,
        mime: String,
    },

    #[error("Failed to read '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ValidationError {
    /// Stable reason code surfaced to the UI.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::FileTooLarge { .. } => "file_too_large",
            ValidationError::UnsupportedType { .. } => "unsupported_type",
            ValidationError::Io { .. } => "unreadable",
        }
    }

    /// French notification text for the chat UI.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::FileTooLarge { name, .. } =>
                format!("Le fichier « {} » dépasse la taille maximale de 20 Mo.", name),
            ValidationError::UnsupportedType { name, .. } =>
                format!(
                    "Le fichier « {} » n'est pas pris en charge (images JPEG, PNG, GIF, WebP ou PDF uniquement).",
                    name
                ),
            ValidationError::Io { name, .. } =>
                format!("Impossible de lire le fichier « {} ».", name),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Stream read error: {0}")]
    StreamRead(String),

    #[error("Nothing to send")]
    EmptyMessage,

    #[error("Send cancelled")]
    Cancelled,

    #[error("No data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("Reply took longer than {0:?}")]
    TotalTimeout(Duration),
}

impl ChatError {
    /// Text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Validation(e) => e.user_message(),
            ChatError::Transport { message, .. } => message.clone(),
            ChatError::StreamRead(_) =>
                "La réponse a été interrompue. Veuillez réessayer.".to_string(),
            ChatError::EmptyMessage => "Écrivez un message ou joignez un fichier.".to_string(),
            ChatError::Cancelled => "Envoi annulé.".to_string(),
            ChatError::IdleTimeout(_) | ChatError::TotalTimeout(_) =>
                "Le tuteur met trop de temps à répondre. Veuillez réessayer.".to_string(),
        }
    }
}
