//! Channel abstraction — inbound message stream plus outbound send surface.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// An inbound text message from a participant.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel name ("telegram", "cli").
    pub channel: String,
    /// Stable participant id (Telegram numeric id as a string).
    pub sender_id: String,
    /// Chat to reply into. Equals `sender_id` for private chats.
    pub chat_id: String,
    /// Message text.
    pub text: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl IncomingMessage {
    pub fn new(channel: &str, sender_id: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: sender_id.to_string(),
            text: text.to_string(),
            username: None,
            first_name: None,
            last_name: None,
            language_code: None,
        }
    }

    pub fn with_chat_id(mut self, chat_id: &str) -> Self {
        self.chat_id = chat_id.to_string();
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_first_name(mut self, first_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self
    }

    pub fn with_last_name(mut self, last_name: &str) -> Self {
        self.last_name = Some(last_name.to_string());
        self
    }

    pub fn with_language_code(mut self, code: &str) -> Self {
        self.language_code = Some(code.to_string());
        self
    }
}

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Outbound send surface.
///
/// `keyboard` carries quick-reply option labels; channels that cannot render
/// a keyboard print the labels instead.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&[String]>,
    ) -> Result<(), ChannelError>;
}

/// A full channel: message source plus transport.
#[async_trait]
pub trait Channel: Transport {
    fn name(&self) -> &str;

    /// Start consuming inbound messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Verify the channel can reach its backing service.
    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
