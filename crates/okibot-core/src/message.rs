use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming chat message from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    /// Platform-specific sender identifier (e.g. `22912345678@c.us`).
    pub sender: String,
    /// Message text, already trimmed. Image captions land here too.
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl InboundMessage {
    /// Build a text message. The body is trimmed.
    pub fn new(sender: impl Into<String>, body: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            body: body.trim().to_string(),
            timestamp: Utc::now(),
            attachment: None,
        }
    }

    /// True when an image with downloaded bytes is attached.
    pub fn has_image(&self) -> bool {
        matches!(
            &self.attachment,
            Some(Attachment { file_type: AttachmentType::Image, data: Some(_), .. })
        )
    }

    /// Attach a media payload.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// A media file attached to an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_type: AttachmentType,
    /// MIME type reported by the transport (e.g. `image/jpeg`).
    pub mimetype: Option<String>,
    pub data: Option<Vec<u8>>,
    pub url: Option<String>,
}

/// Supported attachment types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentType {
    Image,
    Document,
    Audio,
    Video,
    Other,
}

impl AttachmentType {
    /// Classify a MIME type.
    pub fn from_mimetype(mimetype: &str) -> Self {
        match mimetype.split('/').next().unwrap_or_default() {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "application" | "text" => Self::Document,
            _ => Self::Other,
        }
    }
}

/// Something the bot sends back through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundPayload {
    Text(String),
    /// A media reference (URL) with an optional caption.
    Media { url: String, caption: Option<String> },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Text content of the payload (the caption for media).
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::Media { caption, .. } => caption.as_deref().unwrap_or_default(),
        }
    }
}

/// Events emitted by a transport, in delivery order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A new pairing QR payload was issued.
    PairingIssued(String),
    /// Credentials accepted; the session is not usable yet.
    Authenticated,
    /// Pairing or stored credentials were rejected.
    AuthFailed(String),
    /// Session is open and messages can flow.
    Ready,
    /// The session dropped.
    Disconnected(String),
    MessageReceived(InboundMessage),
}

impl TransportEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PairingIssued(_) => "pairing_issued",
            Self::Authenticated => "authenticated",
            Self::AuthFailed(_) => "auth_failed",
            Self::Ready => "ready",
            Self::Disconnected(_) => "disconnected",
            Self::MessageReceived(_) => "message",
        }
    }
}
