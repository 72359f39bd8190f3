//! Slack notification sink.
//!
//! Posts the rendered digest to a channel via `chat.postMessage`. Slack
//! reports API-level failures inside a 200 response (`ok: false` plus an
//! error code), so both the transport and the envelope are checked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::dispatch::{NotificationSink, SinkError};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    mrkdwn: bool,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackSink {
    client: reqwest::Client,
    bot_token: String,
    channel_id: String,
}

impl SlackSink {
    pub fn new(client: reqwest::Client, bot_token: String, channel_id: String) -> Self {
        Self {
            client,
            bot_token,
            channel_id,
        }
    }
}

#[async_trait]
impl NotificationSink for SlackSink {
    async fn send(&self, rendered: &str) -> Result<(), SinkError> {
        let request = PostMessageRequest {
            channel: &self.channel_id,
            text: rendered,
            mrkdwn: true,
        };

        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.bot_token)
            .json(&request)
            .send()
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))?;

        let envelope: PostMessageResponse = response
            .json()
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))?;

        if envelope.ok {
            debug!(target = "infra::slack", channel = %self.channel_id, "message posted");
            Ok(())
        } else {
            Err(SinkError::Rejected(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}
