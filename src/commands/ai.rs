//! Provider-backed handlers: summarize, image, analyze, fallback.

use okibot_core::{
    completion::{CompletionMode, CompletionRequest, ImageInput},
    message::{AttachmentType, InboundMessage},
};
use tracing::{debug, warn};

use super::{replies, validate_image_url, CommandContext};

pub(super) async fn handle_summarize(text: &str, ctx: &CommandContext<'_>) {
    if text.is_empty() {
        ctx.reply.text(replies::SUMMARIZE_USAGE).await;
        return;
    }
    let Some(provider) = &ctx.providers.completion else {
        ctx.reply.text(replies::SUMMARIZE_DISABLED).await;
        return;
    };

    ctx.reply.text(replies::SUMMARIZE_WORKING).await;
    let request = CompletionRequest::new(CompletionMode::Summarize, text)
        .with_instruction(ctx.prompts.summarize.clone());
    match provider.complete(&request).await {
        Ok(summary) if summary.trim().is_empty() => {
            ctx.reply.text(replies::SUMMARIZE_EMPTY).await
        }
        Ok(summary) => ctx.reply.text(summary).await,
        Err(e) => {
            warn!("summarize for {} failed: {e}", ctx.reply.recipient());
            ctx.reply.text(replies::SUMMARIZE_FAILED).await;
        }
    }
}

pub(super) async fn handle_image(prompt: &str, ctx: &CommandContext<'_>) {
    if prompt.is_empty() {
        ctx.reply.text(replies::IMAGE_USAGE).await;
        return;
    }
    let Some(provider) = &ctx.providers.image else {
        ctx.reply.text(replies::IMAGE_DISABLED).await;
        return;
    };

    ctx.reply.text(replies::IMAGE_WORKING).await;
    match provider.generate(prompt).await {
        Ok(url) => ctx.reply.text(replies::image_ready(&url)).await,
        Err(e) => {
            warn!("image generation for {} failed: {e}", ctx.reply.recipient());
            ctx.reply.text(replies::IMAGE_FAILED).await;
        }
    }
}

/// Describe an attached image, or the image at the URL argument.
pub(super) async fn handle_analyze(arg: &str, msg: &InboundMessage, ctx: &CommandContext<'_>) {
    let inline = msg.attachment.as_ref().and_then(|a| {
        if a.file_type != AttachmentType::Image {
            return None;
        }
        let data = a.data.clone()?;
        Some(ImageInput::Inline {
            mimetype: a.mimetype.clone().unwrap_or_else(|| "image/jpeg".to_string()),
            data,
        })
    });

    let (image, question) = match inline {
        Some(image) => (image, arg.to_string()),
        None => match validate_image_url(arg) {
            Ok(url) => (ImageInput::Url(url.to_string()), String::new()),
            Err(e) => {
                debug!("analyze from {}: {e}", ctx.reply.recipient());
                ctx.reply.text(replies::ANALYZE_USAGE).await;
                return;
            }
        },
    };

    let Some(provider) = &ctx.providers.completion else {
        ctx.reply.text(replies::ANALYZE_DISABLED).await;
        return;
    };

    ctx.reply.text(replies::ANALYZE_WORKING).await;
    let request = CompletionRequest::new(CompletionMode::Vision, question)
        .with_instruction(ctx.prompts.vision.clone())
        .with_image(image);
    match provider.complete(&request).await {
        Ok(description) if !description.trim().is_empty() => ctx.reply.text(description).await,
        Ok(_) => {
            warn!("vision for {} returned nothing", ctx.reply.recipient());
            ctx.reply.text(replies::ANALYZE_FAILED).await;
        }
        Err(e) => {
            warn!("vision for {} failed: {e}", ctx.reply.recipient());
            ctx.reply.text(replies::ANALYZE_FAILED).await;
        }
    }
}

/// Free-form reply. Empty model output sends nothing.
pub(super) async fn handle_fallback(body: &str, ctx: &CommandContext<'_>) {
    let Some(provider) = &ctx.providers.completion else {
        ctx.reply.text(replies::FALLBACK_DISABLED).await;
        return;
    };

    let request = CompletionRequest::new(CompletionMode::Reply, body)
        .with_instruction(ctx.prompts.persona.clone());
    match provider.complete(&request).await {
        Ok(text) if text.trim().is_empty() => {
            debug!("empty completion for {}, not replying", ctx.reply.recipient())
        }
        Ok(text) => ctx.reply.text(text).await,
        Err(e) => {
            warn!("reply for {} failed: {e}", ctx.reply.recipient());
            ctx.reply.text(replies::FALLBACK_FAILED).await;
        }
    }
}
