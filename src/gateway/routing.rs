//! Per-message routing: sponsor codes, one-time welcome, then command dispatch.

use okibot_core::{config::Prompts, message::InboundMessage, traits::Transport};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    sponsor::{looks_like_code, Redemption},
    Shared,
};
use crate::commands::{self, replies, CommandContext, CommandSet, Providers, Reply};

pub struct Router {
    shared: Arc<Shared>,
    commands: CommandSet,
    providers: Providers,
    prompts: Prompts,
    welcome_text: String,
}

impl Router {
    pub fn new(
        shared: Arc<Shared>,
        commands: CommandSet,
        providers: Providers,
        prompts: Prompts,
        welcome_text: String,
    ) -> Self {
        Self {
            shared,
            commands,
            providers,
            prompts,
            welcome_text,
        }
    }

    /// Handle one inbound message, replying through `transport`.
    ///
    /// Never fails: provider and send errors end up as fixed replies or log lines.
    pub async fn dispatch(&self, transport: Arc<dyn Transport>, msg: InboundMessage) {
        let reply = Reply::new(transport, msg.sender.clone());

        if let Some(sponsors) = &self.shared.sponsors {
            if looks_like_code(&msg.body) {
                match sponsors.redeem(&msg.body).await {
                    Redemption::Accepted(code) => {
                        info!("sponsor code redeemed by {} for {}", msg.sender, code.phone);
                        self.shared.seen.mark_seen(&msg.sender).await;
                        reply.text(replies::sponsor_welcome(&code.phone)).await;
                    }
                    Redemption::Rejected => reply.text(replies::SPONSOR_INVALID).await,
                }
                return;
            }
        }

        if self.shared.seen.mark_seen(&msg.sender).await {
            info!("new sender {}, sending welcome", msg.sender);
            reply.text(self.welcome_text.clone()).await;
        }

        let Some(invocation) = self.commands.parse(&msg.body, msg.has_image()) else {
            debug!("empty message from {}, nothing to do", msg.sender);
            return;
        };
        debug!("{} -> {:?}", msg.sender, invocation.tag);

        let ctx = CommandContext {
            commands: &self.commands,
            providers: &self.providers,
            prompts: &self.prompts,
            bot_name: &self.shared.bot_name,
            sponsor_mode: self.shared.sponsors.is_some(),
            reply: &reply,
        };
        commands::handle(invocation, &msg, &ctx).await;
    }
}
