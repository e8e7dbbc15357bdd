//! The chat-side seam: everything the supervisor needs from the transport.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, MessageId, ReactionType};

use crate::session::ChannelId;

/// Visual state attached to the message that started an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Working,
    Succeeded,
    Failed,
}

/// The message an invocation originated from, for reaction markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message_id: i32,
}

/// Outbound chat operations. Marker and typing signals are fire-and-forget;
/// only `send_text` surfaces failure, so response delivery can be logged.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, channel: &ChannelId, text: &str) -> anyhow::Result<()>;
    async fn set_marker(&self, origin: &MessageRef, marker: Marker);
    async fn clear_marker(&self, origin: &MessageRef);
    async fn typing(&self, channel: &ChannelId);
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn chat_id(channel: &ChannelId) -> Option<ChatId> {
        channel.as_str().parse::<i64>().ok().map(ChatId)
    }

    // Telegram only accepts reactions from its fixed emoji set, so the
    // hourglass/checkmark trio maps to eyes / thumbs up / thumbs down.
    fn emoji(marker: Marker) -> &'static str {
        match marker {
            Marker::Working => "\u{1f440}",
            Marker::Succeeded => "\u{1f44d}",
            Marker::Failed => "\u{1f44e}",
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, channel: &ChannelId, text: &str) -> anyhow::Result<()> {
        let Some(chat_id) = Self::chat_id(channel) else {
            anyhow::bail!("channel key is not a telegram chat id: {channel}");
        };
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }

    async fn set_marker(&self, origin: &MessageRef, marker: Marker) {
        let Some(chat_id) = Self::chat_id(&origin.channel) else {
            return;
        };
        let reaction = vec![ReactionType::Emoji {
            emoji: Self::emoji(marker).to_owned(),
        }];
        if let Err(err) = self
            .bot
            .set_message_reaction(chat_id, MessageId(origin.message_id))
            .reaction(reaction)
            .await
        {
            tracing::debug!(error = %err, "set reaction failed");
        }
    }

    async fn clear_marker(&self, origin: &MessageRef) {
        let Some(chat_id) = Self::chat_id(&origin.channel) else {
            return;
        };
        if let Err(err) = self
            .bot
            .set_message_reaction(chat_id, MessageId(origin.message_id))
            .reaction(Vec::<ReactionType>::new())
            .await
        {
            tracing::debug!(error = %err, "clear reaction failed");
        }
    }

    async fn typing(&self, channel: &ChannelId) {
        let Some(chat_id) = Self::chat_id(channel) else {
            return;
        };
        if let Err(err) = self.bot.send_chat_action(chat_id, ChatAction::Typing).await {
            tracing::debug!(error = %err, "typing signal failed");
        }
    }
}
