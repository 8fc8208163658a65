use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thought_common::{Error, Result};
use thought_config::NotifierConfig;
use tracing::{info, warn};

const SEND_PATH: &str = "/api/v1/message/send";
const CRON_ADD_PATH: &str = "/api/v1/cron/add";

/// What happened to an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The gateway accepted the request and returned this body.
    Sent(serde_json::Value),
    /// No token is configured, so nothing was sent.
    Skipped,
}

/// Destination override for a single message.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub channel: Option<String>,
    pub target: Option<String>,
}

/// Outbound side of the digest pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, message: &str, options: SendOptions) -> Result<Delivery>;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    message: &'a str,
}

#[derive(Serialize)]
struct CronAddBody<'a> {
    job: &'a serde_json::Value,
}

/// HTTP client for the OpenClaw gateway.
pub struct OpenClawClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    default_channel: String,
    default_target: Option<String>,
}

impl OpenClawClient {
    pub fn new(config: &NotifierConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: &NotifierConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            default_channel: config.channel.clone(),
            default_target: config.target.clone(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Register a periodic job with the gateway's scheduler.
    pub async fn register_cron_job(&self, job: &serde_json::Value) -> Result<Delivery> {
        let Some(token) = self.token.as_deref() else {
            warn!("OPENCLAW_TOKEN not set, cannot register cron job");
            return Ok(Delivery::Skipped);
        };

        self.post(CRON_ADD_PATH, token, &CronAddBody { job }).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, token: &str, body: &B) -> Result<Delivery> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("request to {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("openclaw {path} error {status}: {body}");
            return Err(Error::Notify(format!("HTTP {status}: {body}")));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::Notify(format!("failed to read response: {e}")))?;
        let value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| Error::Notify(format!("invalid JSON response: {e}")))?
        };

        Ok(Delivery::Sent(value))
    }
}

#[async_trait]
impl Notifier for OpenClawClient {
    async fn send_message(&self, message: &str, options: SendOptions) -> Result<Delivery> {
        let Some(token) = self.token.as_deref() else {
            warn!("OPENCLAW_TOKEN not set, skipping message send");
            return Ok(Delivery::Skipped);
        };

        let channel = options.channel.as_deref().unwrap_or(&self.default_channel);
        let target = options
            .target
            .as_deref()
            .or(self.default_target.as_deref());

        let delivery = self
            .post(
                SEND_PATH,
                token,
                &SendMessageBody {
                    channel,
                    target,
                    message,
                },
            )
            .await?;
        info!("message sent via openclaw channel {channel}");
        Ok(delivery)
    }
}
