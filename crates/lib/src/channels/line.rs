//! LINE channel: reply to webhook events via the Messaging API.

use crate::channels::event::ReplyMessage;
use crate::channels::handle::{ChannelError, ReplyChannel};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

const LINE_API_BASE: &str = "https://api.line.me";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [ReplyMessage],
}

/// LINE Messaging API connector. Stateless apart from the HTTP client; safe to share across tasks.
pub struct LineChannel {
    id: String,
    access_token: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(access_token: Option<String>, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| LINE_API_BASE.to_string());
        Self {
            id: "line".to_string(),
            access_token,
            api_base,
            client: reqwest::Client::new(),
        }
    }

    /// POST /v2/bot/message/reply. An empty success body is returned as `{}`.
    pub async fn reply_message(
        &self,
        reply_token: &str,
        messages: &[ReplyMessage],
    ) -> Result<Value, ChannelError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(ChannelError::MissingToken)?;
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = ReplyRequest {
            reply_token,
            messages,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("reply failed: {} {}", status, body)));
        }
        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&text)
            .map_err(|e| ChannelError::Api(format!("reply returned invalid json: {}", e)))
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn reply(
        &self,
        reply_token: &str,
        messages: &[ReplyMessage],
    ) -> Result<Value, ChannelError> {
        log::debug!("line: replying with {} message(s)", messages.len());
        self.reply_message(reply_token, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_request_wire_shape() {
        let messages = [ReplyMessage::text("hi")];
        let v = serde_json::to_value(ReplyRequest {
            reply_token: "T1",
            messages: &messages,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "replyToken": "T1", "messages": [{ "type": "text", "text": "hi" }] })
        );
    }

    #[test]
    fn api_base_trailing_slash_trimmed() {
        let ch = LineChannel::new(None, Some("http://127.0.0.1:9/".to_string()));
        assert_eq!(ch.api_base, "http://127.0.0.1:9");
        assert_eq!(ch.id(), "line");
    }

    #[tokio::test]
    async fn missing_token_fails_without_network() {
        let ch = LineChannel::new(None, Some("http://127.0.0.1:9".to_string()));
        let err = ch
            .reply("T1", &[ReplyMessage::text("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::MissingToken));
    }
}
