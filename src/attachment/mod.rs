use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use log::{ debug, info };
use std::path::Path;

use crate::error::ValidationError;
use crate::models::attachment::Attachment;

pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];

const FALLBACK_MIME: &str = "application/octet-stream";

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// Guess the MIME type from the file extension.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => FALLBACK_MIME,
    }
}

/// Size is checked first so an oversized file is never read.
pub fn validate(name: &str, size: u64, mime: &str) -> Result<(), ValidationError> {
    if size > MAX_ATTACHMENT_BYTES {
        return Err(ValidationError::FileTooLarge {
            name: name.to_string(),
            size,
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    if !is_allowed_mime(mime) {
        return Err(ValidationError::UnsupportedType {
            name: name.to_string(),
            mime: mime.to_string(),
        });
    }
    Ok(())
}

pub fn encode_bytes(name: &str, mime: &str, bytes: &[u8]) -> Result<Attachment, ValidationError> {
    validate(name, bytes.len() as u64, mime)?;
    Ok(Attachment {
        name: name.to_string(),
        mime_type: mime.to_string(),
        data: STANDARD.encode(bytes),
    })
}

pub async fn encode_file(path: impl AsRef<Path>) -> Result<Attachment, ValidationError> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_from_path(path);

    let metadata = tokio::fs::metadata(path).await.map_err(|source| ValidationError::Io {
        name: name.clone(),
        source,
    })?;
    validate(&name, metadata.len(), mime)?;

    let bytes = tokio::fs::read(path).await.map_err(|source| ValidationError::Io {
        name: name.clone(),
        source,
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    // The file may have grown between stat and read.
    encode_bytes(&name, mime, &bytes)
}

/// Attachments selected by the user and not yet sent.
#[derive(Debug, Default, Clone)]
pub struct PendingAttachments {
    items: Vec<Attachment>,
}

impl PendingAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes and appends the file. Nothing changes on rejection.
    pub async fn add_file(&mut self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let attachment = encode_file(path).await?;
        info!("Attachment queued: {} ({})", attachment.name, attachment.mime_type);
        self.items.push(attachment);
        Ok(())
    }

    pub fn push(&mut self, attachment: Attachment) {
        self.items.push(attachment);
    }

    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn remove_named(&mut self, name: &str) -> Option<Attachment> {
        let index = self.items.iter().position(|a| a.name == name)?;
        self.remove(index)
    }

    /// Most recently queued attachment.
    pub fn last(&self) -> Option<&Attachment> {
        self.items.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consumes the whole set, leaving it empty.
    pub fn take(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn size_boundary_is_inclusive() {
        assert!(validate("a.png", MAX_ATTACHMENT_BYTES, "image/png").is_ok());
        let err = validate("a.png", MAX_ATTACHMENT_BYTES + 1, "image/png").unwrap_err();
        assert_eq!(err.reason(), "file_too_large");
    }

    #[test]
    fn only_allow_listed_types_pass() {
        for mime in ALLOWED_MIME_TYPES {
            assert!(validate("f", 10, mime).is_ok(), "{} should be accepted", mime);
        }
        for mime in ["text/plain", "image/svg+xml", "application/zip", ""] {
            let err = validate("f", 10, mime).unwrap_err();
            assert_eq!(err.reason(), "unsupported_type");
        }
    }

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_from_path(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("cours.pdf")), "application/pdf");
        assert_eq!(mime_from_path(Path::new("notes.txt")), FALLBACK_MIME);
        assert_eq!(mime_from_path(Path::new("noext")), FALLBACK_MIME);
    }

    #[test]
    fn encode_bytes_produces_standard_base64() {
        let attachment = encode_bytes("x.gif", "image/gif", b"hello").unwrap();
        assert_eq!(attachment.data, "aGVsbG8=");
        assert_eq!(attachment.mime_type, "image/gif");
        assert_eq!(attachment.name, "x.gif");
    }

    #[tokio::test]
    async fn add_file_appends_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();

        let mut pending = PendingAttachments::new();
        pending.add_file(&path).await.unwrap();
        let added = pending.last().unwrap();
        assert_eq!(added.name, "schema.png");
        assert_eq!(added.data, STANDARD.encode([0x89, b'P', b'N', b'G']));
        assert_eq!(pending.len(), 1);

        let second = dir.path().join("cours.pdf");
        std::fs::write(&second, b"%PDF").unwrap();
        pending.add_file(&second).await.unwrap();
        assert_eq!(pending.last().map(|a| a.name.as_str()), Some("cours.pdf"));
        assert_eq!(pending.iter().next().map(|a| a.name.as_str()), Some("schema.png"));
    }

    #[tokio::test]
    async fn rejected_files_leave_pending_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.pdf");
        let file = std::fs::File::create(&big).unwrap();
        file.set_len(MAX_ATTACHMENT_BYTES + 1).unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"bonjour").unwrap();

        let mut pending = PendingAttachments::new();
        let err = pending.add_file(&big).await.unwrap_err();
        assert_eq!(err.reason(), "file_too_large");
        let err = pending.add_file(&text).await.unwrap_err();
        assert_eq!(err.reason(), "unsupported_type");
        let err = pending.add_file(dir.path().join("missing.png")).await.unwrap_err();
        assert_eq!(err.reason(), "unreadable");
        assert!(pending.is_empty());
    }

    #[test]
    fn remove_and_take() {
        let mut pending = PendingAttachments::new();
        pending.push(encode_bytes("a.png", "image/png", b"a").unwrap());
        pending.push(encode_bytes("b.png", "image/png", b"b").unwrap());
        pending.push(encode_bytes("c.png", "image/png", b"c").unwrap());

        assert_eq!(pending.remove_named("b.png").map(|a| a.name), Some("b.png".to_string()));
        assert!(pending.remove(5).is_none());
        let names: Vec<_> = pending.take().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["a.png", "c.png"]);
        assert!(pending.is_empty());
    }
}
