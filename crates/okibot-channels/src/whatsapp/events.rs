//! Client events to transport events: lifecycle mapping and inbound message
//! filtering, unwrapping and media download.

use okibot_core::message::{Attachment, AttachmentType, InboundMessage, TransportEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use wacore::types::message::MessageInfo;
use waproto::whatsapp::Message;
use whatsapp_rust::client::Client;

/// The connected client, present only between `Connected` and a drop.
pub(super) type ClientSlot = Arc<Mutex<Option<Arc<Client>>>>;

pub(super) const CONNECTION_LOST: &str = "connection lost";
pub(super) const LOGGED_OUT: &str = "logged out from the phone";

/// Translate one client event and push it to the gateway.
pub(super) async fn forward(
    event: Event,
    client: Arc<Client>,
    tx: &mpsc::Sender<TransportEvent>,
    slot: &ClientSlot,
) {
    let mapped = match event {
        Event::PairingQrCode { code, .. } => {
            info!("whatsapp: pairing QR issued");
            Some(TransportEvent::PairingIssued(code))
        }
        Event::PairSuccess(_) => {
            info!("whatsapp: pairing accepted");
            Some(TransportEvent::Authenticated)
        }
        Event::Connected(_) => {
            *slot.lock().await = Some(client);
            Some(TransportEvent::Ready)
        }
        Event::Disconnected(_) => {
            *slot.lock().await = None;
            Some(TransportEvent::Disconnected(CONNECTION_LOST.to_string()))
        }
        Event::LoggedOut(_) => {
            warn!("whatsapp: session invalidated, re-pairing needs an empty auth dir");
            *slot.lock().await = None;
            Some(TransportEvent::AuthFailed(LOGGED_OUT.to_string()))
        }
        Event::Message(msg, info) => inbound(*msg, info, &client)
            .await
            .map(TransportEvent::MessageReceived),
        other => {
            debug!("whatsapp: unhandled event {other:?}");
            None
        }
    };

    if let Some(event) = mapped {
        if tx.send(event).await.is_err() {
            debug!("whatsapp: event receiver dropped");
        }
    }
}

/// Turn a raw message into an [`InboundMessage`], or `None` when it should be
/// ignored (groups, our own sends, nothing usable).
async fn inbound(msg: Message, info: MessageInfo, client: &Client) -> Option<InboundMessage> {
    if info.source.is_group {
        debug!("whatsapp: ignoring group message {}", info.id);
        return None;
    }
    if info.source.is_from_me {
        return None;
    }

    let inner = unwrap_message(&msg);
    let attachment = match &inner.image_message {
        Some(img) => {
            let data = match client.download(img.as_ref()).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("whatsapp: image download failed for {}: {e}", info.id);
                    None
                }
            };
            Some(Attachment {
                file_type: AttachmentType::Image,
                mimetype: img.mimetype.clone(),
                data,
                url: None,
            })
        }
        None => other_media(inner),
    };

    let body = message_text(inner).unwrap_or_default();
    if body.trim().is_empty() && attachment.is_none() {
        debug!("whatsapp: nothing usable in {}", info.id);
        return None;
    }

    let message = InboundMessage::new(info.source.chat.to_string(), &body);
    Some(match attachment {
        Some(attachment) => message.with_attachment(attachment),
        None => message,
    })
}

/// Strip device-sent, ephemeral and view-once wrappers.
pub(super) fn unwrap_message(msg: &Message) -> &Message {
    msg.device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg)
}

/// Plain text, extended text, or a media caption.
pub(super) fn message_text(msg: &Message) -> Option<String> {
    msg.conversation
        .clone()
        .or_else(|| {
            msg.extended_text_message
                .as_ref()
                .and_then(|e| e.text.clone())
        })
        .or_else(|| msg.image_message.as_ref().and_then(|m| m.caption.clone()))
        .or_else(|| msg.video_message.as_ref().and_then(|m| m.caption.clone()))
        .or_else(|| msg.document_message.as_ref().and_then(|m| m.caption.clone()))
}

/// Non-image media. Only described, never downloaded.
pub(super) fn other_media(msg: &Message) -> Option<Attachment> {
    let (file_type, mimetype) = if let Some(m) = &msg.document_message {
        (AttachmentType::Document, m.mimetype.clone())
    } else if let Some(m) = &msg.video_message {
        (AttachmentType::Video, m.mimetype.clone())
    } else if let Some(m) = &msg.audio_message {
        (AttachmentType::Audio, m.mimetype.clone())
    } else {
        return None;
    };
    Some(Attachment {
        file_type,
        mimetype,
        data: None,
        url: None,
    })
}
