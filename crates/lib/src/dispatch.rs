//! Event dispatch: turn one webhook batch into one outcome per event.
//! Text messages are answered with a completion; every other event is skipped as `None`.
//! The batch is all-or-nothing: once every event has settled, any failure fails the whole dispatch.

use crate::channels::{ChannelError, DispatchResult, InboundEvent, ReplyChannel, ReplyMessage};
use crate::config::CompletionConfig;
use crate::llm::{CompletionBackend, CompletionError};
use futures_util::future::join_all;
use std::sync::Arc;

const TEXT_PLACEHOLDER: &str = "{text}";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Reply(#[from] ChannelError),
    #[error("text message event has no reply token")]
    MissingReplyToken,
}

/// How a user message becomes a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPolicy {
    pub template: String,
    pub max_tokens: u32,
}

impl Default for PromptPolicy {
    fn default() -> Self {
        PromptPolicy::from(&CompletionConfig::default())
    }
}

impl From<&CompletionConfig> for PromptPolicy {
    fn from(c: &CompletionConfig) -> Self {
        Self {
            template: c.prompt_template.clone(),
            max_tokens: c.max_tokens,
        }
    }
}

impl PromptPolicy {
    /// Substitute `{text}` in the template; a template without the placeholder is used as a prefix.
    pub fn build_prompt(&self, text: &str) -> String {
        if self.template.contains(TEXT_PLACEHOLDER) {
            self.template.replace(TEXT_PLACEHOLDER, text)
        } else {
            format!("{}{}", self.template, text)
        }
    }
}

/// Stateless across calls; cheap to clone and share between requests.
#[derive(Clone)]
pub struct Dispatcher {
    completion: Arc<dyn CompletionBackend>,
    channel: Arc<dyn ReplyChannel>,
    policy: PromptPolicy,
}

impl Dispatcher {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        channel: Arc<dyn ReplyChannel>,
        policy: PromptPolicy,
    ) -> Self {
        Self {
            completion,
            channel,
            policy,
        }
    }

    pub fn policy(&self) -> &PromptPolicy {
        &self.policy
    }

    /// Process every event concurrently. Results are positionally aligned with `events`.
    /// Every event settles before this returns; the first error by position is surfaced.
    pub async fn dispatch(
        &self,
        events: &[InboundEvent],
    ) -> Result<Vec<DispatchResult>, DispatchError> {
        join_all(events.iter().map(|event| self.handle_event(event)))
            .await
            .into_iter()
            .collect()
    }

    /// Per-event policy: skip non-text events, otherwise complete and reply.
    pub async fn handle_event(&self, event: &InboundEvent) -> Result<DispatchResult, DispatchError> {
        let Some(text) = event.text() else {
            log::debug!("dispatch: skipping {:?} event", event.kind);
            return Ok(None);
        };
        let reply_token = event
            .reply_token
            .as_deref()
            .ok_or(DispatchError::MissingReplyToken)?;

        let prompt = self.policy.build_prompt(text);
        let completion = self
            .completion
            .complete(&prompt, self.policy.max_tokens)
            .await?;
        let reply = completion
            .first_text()
            .ok_or(CompletionError::NoChoices)?
            .trim()
            .to_string();

        let message = ReplyMessage::text(reply);
        let sent = self
            .channel
            .reply(reply_token, std::slice::from_ref(&message))
            .await?;
        log::info!("dispatch: replied via {}", self.channel.id());
        Ok(Some(sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, CompletionChoice};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every prompt with `reply`, or fails when the prompt contains `fail_on`.
    /// Prompts containing "slow" are delayed so completion order differs from batch order.
    struct MockCompletion {
        reply: String,
        fail_on: Option<String>,
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl MockCompletion {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(reply: &str, needle: &str) -> Self {
            Self {
                fail_on: Some(needle.to_string()),
                ..Self::new(reply)
            }
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for MockCompletion {
        async fn complete(
            &self,
            prompt: &str,
            max_tokens: u32,
        ) -> Result<Completion, CompletionError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), max_tokens));
            if prompt.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if let Some(ref needle) = self.fail_on {
                if prompt.contains(needle.as_str()) {
                    return Err(CompletionError::Api("429 quota exceeded".to_string()));
                }
            }
            Ok(Completion {
                choices: vec![CompletionChoice {
                    text: self.reply.clone(),
                    ..Default::default()
                }],
            })
        }
    }

    struct EmptyCompletion;

    #[async_trait]
    impl CompletionBackend for EmptyCompletion {
        async fn complete(&self, _: &str, _: u32) -> Result<Completion, CompletionError> {
            Ok(Completion::default())
        }
    }

    /// Records replies and echoes the token back as the "sent" value.
    #[derive(Default)]
    struct MockChannel {
        reject_token: Option<String>,
        calls: Mutex<Vec<(String, Vec<ReplyMessage>)>>,
    }

    impl MockChannel {
        fn calls(&self) -> Vec<(String, Vec<ReplyMessage>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyChannel for MockChannel {
        fn id(&self) -> &str {
            "mock"
        }

        async fn reply(
            &self,
            reply_token: &str,
            messages: &[ReplyMessage],
        ) -> Result<Value, ChannelError> {
            self.calls
                .lock()
                .unwrap()
                .push((reply_token.to_string(), messages.to_vec()));
            if self.reject_token.as_deref() == Some(reply_token) {
                return Err(ChannelError::Api("400 Invalid reply token".to_string()));
            }
            Ok(json!({ "sentMessages": [{ "id": reply_token }] }))
        }
    }

    fn events(v: Value) -> Vec<InboundEvent> {
        serde_json::from_value(v).unwrap()
    }

    fn text_event(text: &str, token: &str) -> Value {
        json!({ "type": "message", "message": { "type": "text", "text": text }, "replyToken": token })
    }

    fn dispatcher(
        completion: &Arc<MockCompletion>,
        channel: &Arc<MockChannel>,
    ) -> Dispatcher {
        Dispatcher::new(completion.clone(), channel.clone(), PromptPolicy::default())
    }

    #[test]
    fn prompt_template_substitution() {
        let policy = PromptPolicy::default();
        assert_eq!(policy.build_prompt("Hello"), "Q: Hello");

        let prefix_only = PromptPolicy {
            template: "Answer briefly: ".to_string(),
            max_tokens: 10,
        };
        assert_eq!(prefix_only.build_prompt("why?"), "Answer briefly: why?");

        let wrapped = PromptPolicy {
            template: "Q: {text}\nA:".to_string(),
            max_tokens: 10,
        };
        assert_eq!(wrapped.build_prompt("2+2"), "Q: 2+2\nA:");
    }

    #[tokio::test]
    async fn text_message_is_completed_and_replied() {
        let completion = Arc::new(MockCompletion::new(" Hi there! "));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let out = d
            .dispatch(&events(json!([text_event("Hello", "T1")])))
            .await
            .unwrap();

        assert_eq!(out, vec![Some(json!({ "sentMessages": [{ "id": "T1" }] }))]);
        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("Hello"));
        assert_eq!(calls[0].1, 150);
        assert_eq!(
            channel.calls(),
            vec![("T1".to_string(), vec![ReplyMessage::text("Hi there!")])]
        );
    }

    #[tokio::test]
    async fn follow_event_is_skipped_without_calls() {
        let completion = Arc::new(MockCompletion::new("x"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let out = d
            .dispatch(&events(json!([{ "type": "follow", "replyToken": "T9" }])))
            .await
            .unwrap();

        assert_eq!(out, vec![None]);
        assert!(completion.calls().is_empty());
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn mixed_batch_keeps_positions() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let out = d
            .dispatch(&events(json!([
                text_event("A", "T1"),
                { "type": "message", "message": { "type": "image", "id": "1" }, "replyToken": "T2" }
            ])))
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Some(json!({ "sentMessages": [{ "id": "T1" }] })));
        assert_eq!(out[1], None);
        assert_eq!(completion.calls().len(), 1);
        assert_eq!(channel.calls().len(), 1);
    }

    #[tokio::test]
    async fn results_align_with_input_when_completion_order_differs() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let out = d
            .dispatch(&events(json!([
                text_event("slow one", "T1"),
                { "type": "unfollow" },
                text_event("fast one", "T3")
            ])))
            .await
            .unwrap();

        assert_eq!(
            out,
            vec![
                Some(json!({ "sentMessages": [{ "id": "T1" }] })),
                None,
                Some(json!({ "sentMessages": [{ "id": "T3" }] })),
            ]
        );
        // The fast event's reply went out before the slow one finished.
        let tokens: Vec<String> = channel.calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["T3".to_string(), "T1".to_string()]);
    }

    #[tokio::test]
    async fn one_failed_completion_fails_the_batch() {
        let completion = Arc::new(MockCompletion::failing_on("ok", "boom"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let err = d
            .dispatch(&events(json!([
                text_event("fine", "T1"),
                text_event("boom", "T2")
            ])))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Completion(CompletionError::Api(_))));
        let tokens: Vec<String> = channel.calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["T1".to_string()]);
    }

    #[tokio::test]
    async fn slow_success_still_replies_when_another_event_fails_first() {
        let completion = Arc::new(MockCompletion::failing_on("ok", "boom"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let err = d
            .dispatch(&events(json!([
                text_event("slow ok", "T1"),
                text_event("boom", "T2")
            ])))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Completion(_)));
        // Dispatch returned only after the slow event finished its reply.
        let tokens: Vec<String> = channel.calls().into_iter().map(|(t, _)| t).collect();
        assert_eq!(tokens, vec!["T1".to_string()]);
        assert_eq!(completion.calls().len(), 2);
    }

    #[tokio::test]
    async fn first_error_by_position_is_reported() {
        let completion = Arc::new(MockCompletion::failing_on("ok", "slow boom"));
        let channel = Arc::new(MockChannel {
            reject_token: Some("T2".to_string()),
            ..Default::default()
        });
        let d = dispatcher(&completion, &channel);

        let err = d
            .dispatch(&events(json!([
                text_event("slow boom", "T1"),
                text_event("fast", "T2")
            ])))
            .await
            .unwrap_err();

        // T2's rejection happens first in time, but T1 comes first in the batch.
        assert!(matches!(err, DispatchError::Completion(_)));
    }

    #[tokio::test]
    async fn rejected_reply_fails_the_batch() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel {
            reject_token: Some("expired".to_string()),
            ..Default::default()
        });
        let d = dispatcher(&completion, &channel);

        let err = d
            .dispatch(&events(json!([text_event("hi", "expired")])))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Reply(ChannelError::Api(_))));
    }

    #[tokio::test]
    async fn empty_choices_fail_without_reply() {
        let channel = Arc::new(MockChannel::default());
        let d = Dispatcher::new(Arc::new(EmptyCompletion), channel.clone(), PromptPolicy::default());

        let err = d
            .dispatch(&events(json!([text_event("hi", "T1")])))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Completion(CompletionError::NoChoices)));
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn text_without_reply_token_fails_before_any_call() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let err = d
            .dispatch(&events(json!([{ "type": "message", "message": { "type": "text", "text": "hi" } }])))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MissingReplyToken));
        assert!(completion.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_batches_are_not_deduplicated() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);
        let batch = events(json!([text_event("same", "T1")]));

        d.dispatch(&batch).await.unwrap();
        d.dispatch(&batch).await.unwrap();

        assert_eq!(completion.calls().len(), 2);
        assert_eq!(channel.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_results() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let d = dispatcher(&completion, &channel);

        let out = d.dispatch(&[]).await.unwrap();

        assert!(out.is_empty());
        assert!(completion.calls().is_empty());
    }

    #[tokio::test]
    async fn configured_policy_reaches_completion_backend() {
        let completion = Arc::new(MockCompletion::new("ok"));
        let channel = Arc::new(MockChannel::default());
        let policy = PromptPolicy {
            template: "User says: {text}".to_string(),
            max_tokens: 32,
        };
        let d = Dispatcher::new(completion.clone(), channel, policy);

        d.dispatch(&events(json!([text_event("hey", "T1")])))
            .await
            .unwrap();

        assert_eq!(completion.calls(), vec![("User says: hey".to_string(), 32)]);
    }
}
