//! Chat commands: parsing, fixed replies, and the handlers behind them.

mod ai;
pub mod replies;


use okibot_core::{
    config::{CommandsConfig, Prompts},
    error::OkibotError,
    message::{InboundMessage, OutboundPayload},
    traits::{CompletionProvider, ImageProvider, Transport},
};
use std::sync::Arc;
use tracing::warn;

/// Which handler a message resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    Ping,
    Help,
    Summarize,
    Image,
    Analyze,
    Fallback,
}

/// A parsed message: the handler tag plus its raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub tag: CommandTag,
    /// Text after the first `:` (trimmed, later colons kept), or the whole body for
    /// fallback and captioned media.
    pub argument: String,
}

impl CommandInvocation {
    fn new(tag: CommandTag, argument: impl Into<String>) -> Self {
        Self {
            tag,
            argument: argument.into(),
        }
    }
}

/// The configured command keywords, normalized for matching.
#[derive(Debug, Clone)]
pub struct CommandSet {
    help_aliases: Vec<String>,
    summarize: Vec<String>,
    image: Vec<String>,
    analyze: Vec<String>,
}

/// Lowercase and make sure the prefix ends with `:`.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let p = prefix.trim().to_lowercase();
    if p.is_empty() || p == ":" {
        return None;
    }
    Some(if p.ends_with(':') { p } else { format!("{p}:") })
}

fn normalize_prefixes(prefixes: &[String]) -> Vec<String> {
    prefixes.iter().filter_map(|p| normalize_prefix(p)).collect()
}

/// Argument after the first colon of the original body.
fn argument_of(body: &str) -> &str {
    body.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or_default()
}

impl CommandSet {
    pub fn from_config(config: &CommandsConfig) -> Self {
        Self {
            help_aliases: config
                .help_aliases
                .iter()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
            summarize: normalize_prefixes(&config.summarize_prefixes),
            image: normalize_prefixes(&config.image_prefixes),
            analyze: normalize_prefixes(&config.analyze_prefixes),
        }
    }

    /// Resolve a message body. First match wins.
    ///
    /// An attached image with no matching prefix is analyzed. Other attachments
    /// only contribute their caption. Returns `None` when there is nothing to answer.
    pub fn parse(&self, body: &str, has_image: bool) -> Option<CommandInvocation> {
        let body = body.trim();
        let lower = body.to_lowercase();
        let starts = |prefixes: &[String]| prefixes.iter().any(|p| lower.starts_with(p.as_str()));

        if lower == "ping" {
            return Some(CommandInvocation::new(CommandTag::Ping, ""));
        }
        if self.help_aliases.iter().any(|a| *a == lower) {
            return Some(CommandInvocation::new(CommandTag::Help, ""));
        }
        if starts(&self.summarize) {
            return Some(CommandInvocation::new(
                CommandTag::Summarize,
                argument_of(body),
            ));
        }
        if starts(&self.image) {
            return Some(CommandInvocation::new(CommandTag::Image, argument_of(body)));
        }
        if starts(&self.analyze) {
            return Some(CommandInvocation::new(
                CommandTag::Analyze,
                argument_of(body),
            ));
        }
        if has_image {
            return Some(CommandInvocation::new(CommandTag::Analyze, body));
        }
        if body.is_empty() {
            return None;
        }
        Some(CommandInvocation::new(CommandTag::Fallback, body))
    }

    /// The command list sent for `help`.
    pub fn help_text(&self, bot_name: &str, sponsor_mode: bool) -> String {
        let first = |list: &[String], fallback: &str| {
            list.first()
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };
        let mut out = format!("🤖 *{bot_name} - Commandes*\n\n");
        if sponsor_mode {
            out.push_str(
                "🔐 *CONNEXION*\n\
                 • Obtenez votre code sur notre site web\n\
                 • Envoyez le code de 6 caractères ici\n\n",
            );
        }
        out.push_str("📋 *FONCTIONNALITÉS*\n");
        out.push_str("• *ping* → test du bot\n");
        if !self.help_aliases.is_empty() {
            out.push_str(&format!("• *{}* → cette aide\n", self.help_aliases.join("* / *")));
        }
        out.push_str(&format!(
            "• *{} texte* → résume un texte\n",
            first(&self.summarize, "summarize:")
        ));
        out.push_str(&format!(
            "• *{} prompt* → génère une image\n",
            first(&self.image, "image:")
        ));
        out.push_str(&format!(
            "• *{} URL* ou une image envoyée → décrit l'image\n",
            first(&self.analyze, "analyze:")
        ));
        out.push_str("• Toute autre phrase → réponse intelligente IA.");
        out
    }
}

/// Providers available to handlers. `None` = not configured (no API key).
#[derive(Clone, Default)]
pub struct Providers {
    pub completion: Option<Arc<dyn CompletionProvider>>,
    pub image: Option<Arc<dyn ImageProvider>>,
}

/// Sends replies to one sender through the transport captured at dispatch time.
#[derive(Clone)]
pub struct Reply {
    transport: Arc<dyn Transport>,
    recipient: String,
}

impl Reply {
    pub fn new(transport: Arc<dyn Transport>, recipient: impl Into<String>) -> Self {
        Self {
            transport,
            recipient: recipient.into(),
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Send a text reply. Failures are logged, never propagated.
    pub async fn text(&self, text: impl Into<String>) {
        let payload = OutboundPayload::text(text);
        if let Err(e) = self.transport.send(&self.recipient, payload).await {
            warn!("reply to {} failed: {e}", self.recipient);
        }
    }
}

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub commands: &'a CommandSet,
    pub providers: &'a Providers,
    pub prompts: &'a Prompts,
    pub bot_name: &'a str,
    pub sponsor_mode: bool,
    pub reply: &'a Reply,
}

/// Check that an analyze argument is an http(s) URL.
pub fn validate_image_url(arg: &str) -> Result<&str, OkibotError> {
    let arg = arg.trim();
    let lower = arg.to_ascii_lowercase();
    if (lower.starts_with("http://") || lower.starts_with("https://"))
        && !arg.contains(char::is_whitespace)
        && arg.len() > "https://".len()
    {
        Ok(arg)
    } else {
        Err(OkibotError::Validation(format!("not an image URL: '{arg}'")))
    }
}

/// Run the handler for one invocation.
pub async fn handle(invocation: CommandInvocation, msg: &InboundMessage, ctx: &CommandContext<'_>) {
    match invocation.tag {
        CommandTag::Ping => ctx.reply.text(replies::PONG).await,
        CommandTag::Help => {
            ctx.reply
                .text(ctx.commands.help_text(ctx.bot_name, ctx.sponsor_mode))
                .await
        }
        CommandTag::Summarize => ai::handle_summarize(&invocation.argument, ctx).await,
        CommandTag::Image => ai::handle_image(&invocation.argument, ctx).await,
        CommandTag::Analyze => ai::handle_analyze(&invocation.argument, msg, ctx).await,
        CommandTag::Fallback => ai::handle_fallback(&invocation.argument, ctx).await,
    }
}
