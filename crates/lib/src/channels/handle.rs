//! Reply side of a chat channel: the seam the dispatcher talks to.

use crate::channels::event::ReplyMessage;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
    #[error("channel access token not configured")]
    MissingToken,
}

/// Sends replies to the conversation identified by a reply token.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Channel id (e.g. "line").
    fn id(&self) -> &str;

    /// Deliver messages using a single-use reply token. Returns the platform's response body.
    async fn reply(&self, reply_token: &str, messages: &[ReplyMessage])
        -> Result<Value, ChannelError>;
}
