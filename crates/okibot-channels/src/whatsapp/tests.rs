use super::events::{message_text, other_media, unwrap_message};
use super::send::{parse_jid, render, RETRY_DELAYS_MS};
use super::*;
use okibot_core::message::AttachmentType;
use wacore_binary::jid::JidExt;
use waproto::whatsapp::{message::ImageMessage, Message};

fn text(body: &str) -> Message {
    Message {
        conversation: Some(body.to_string()),
        ..Default::default()
    }
}

#[test]
fn test_message_text_sources() {
    assert_eq!(message_text(&text("ping")).as_deref(), Some("ping"));

    let captioned = Message {
        image_message: Some(Box::new(ImageMessage {
            caption: Some("analyze: what is this?".into()),
            mimetype: Some("image/jpeg".into()),
            ..Default::default()
        })),
        ..Default::default()
    };
    assert_eq!(
        message_text(&captioned).as_deref(),
        Some("analyze: what is this?")
    );
    assert!(message_text(&Message::default()).is_none());
}

#[test]
fn test_plain_message_is_not_unwrapped() {
    let msg = text("help");
    assert!(std::ptr::eq(unwrap_message(&msg), &msg));
}

#[test]
fn test_other_media_is_described_not_downloaded() {
    let doc = Message {
        document_message: Some(Box::new(
            waproto::whatsapp::message::DocumentMessage {
                mimetype: Some("application/pdf".into()),
                caption: Some("contrat".into()),
                ..Default::default()
            },
        )),
        ..Default::default()
    };
    let att = other_media(&doc).unwrap();
    assert_eq!(att.file_type, AttachmentType::Document);
    assert_eq!(att.mimetype.as_deref(), Some("application/pdf"));
    assert!(att.data.is_none());
    assert_eq!(message_text(&doc).as_deref(), Some("contrat"));

    assert!(other_media(&text("hi")).is_none());
}

#[test]
fn test_parse_jid_forms() {
    let jid = parse_jid("22912345678@s.whatsapp.net").unwrap();
    assert_eq!(jid.user, "22912345678");
    assert!(!jid.is_group());

    let legacy = parse_jid("22912345678@c.us").unwrap();
    assert_eq!(legacy.to_string(), "22912345678@s.whatsapp.net");

    let bare = parse_jid(" +229 12 34 56 78 ").unwrap();
    assert_eq!(bare.user, "22912345678");

    assert!(matches!(parse_jid("   "), Err(OkibotError::Transport(_))));
    assert!(parse_jid("nobody").is_err());
}

#[test]
fn test_render_payloads() {
    assert_eq!(render(OutboundPayload::text("pong ✅")), "pong ✅");
    assert_eq!(
        render(OutboundPayload::Media {
            url: "https://img/1.png".into(),
            caption: Some("Voici votre image".into()),
        }),
        "Voici votre image\nhttps://img/1.png"
    );
    assert_eq!(
        render(OutboundPayload::Media {
            url: "https://img/1.png".into(),
            caption: None,
        }),
        "https://img/1.png"
    );
}

#[test]
fn test_retry_delays_double() {
    assert_eq!(RETRY_DELAYS_MS, [500, 1000, 2000]);
}

#[test]
fn test_session_db_lives_in_auth_dir() {
    let config = WhatsAppConfig {
        device_name: "OkitakoyBot".into(),
        auth_dir: PathBuf::from("/srv/okibot/auth"),
    };
    assert_eq!(
        config.session_db_path(),
        PathBuf::from("/srv/okibot/auth/session.db")
    );
}

#[tokio::test]
async fn test_send_before_start_fails() {
    let transport = WhatsAppTransportFactory::new(WhatsAppConfig {
        device_name: "OkitakoyBot".into(),
        auth_dir: std::env::temp_dir(),
    })
    .create();
    let err = transport
        .send("22912345678@c.us", OutboundPayload::text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, OkibotError::Transport(_)));
    assert!(transport.keep_alive().await.is_err());
    transport.stop().await.unwrap();
}

#[test]
fn test_qr_terminal_rendering() {
    let text = generate_qr_terminal("2@pairing-payload").unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(!lines.is_empty());
    let width = lines[0].chars().count();
    assert!(lines.iter().all(|l| l.chars().count() == width));
    // Two module rows per line.
    assert_eq!(lines.len(), width.div_ceil(2));
}

#[test]
fn test_qr_png_and_data_url() {
    let png = generate_qr_image("hello").unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    let url = generate_qr_data_url("hello").unwrap();
    assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
}
