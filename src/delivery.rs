use std::{error::Error, fmt::Display, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::config::DeliveryConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum DeliveryError {
    Transport(reqwest::Error),
    Rejected { status: StatusCode, body: String },
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => true,
            DeliveryError::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Transport(err) => write!(f, "delivery request failed: {err}"),
            DeliveryError::Rejected { status, body } => {
                write!(f, "provider rejected message ({status}): {body}")
            }
        }
    }
}

impl Error for DeliveryError {}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError>;
}

pub struct TwilioSink {
    client: Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSink {
    pub fn new(config: &DeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            messages_url: format!(
                "{}/Accounts/{}/Messages.json",
                config.api_base.trim_end_matches('/'),
                config.account_sid
            ),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl MessageSink for TwilioSink {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from.as_str()), ("To", to), ("Body", body)])
            .send()
            .await
            .map_err(DeliveryError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected { status, body })
    }
}

pub struct RetryingSink<S> {
    inner: S,
    max_attempts: u32,
    backoff: Duration,
}

impl<S: MessageSink> RetryingSink<S> {
    pub fn new(inner: S, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff: backoff.min(MAX_BACKOFF),
        }
    }
}

fn next_pause(pause: Duration) -> Duration {
    pause.saturating_mul(2).min(MAX_BACKOFF)
}

#[async_trait]
impl<S: MessageSink> MessageSink for RetryingSink<S> {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        let mut pause = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.send(to, body).await {
                Ok(()) => {
                    info!("Reply delivered to {to} on attempt {attempt}");
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    warn!("Delivery attempt {attempt} to {to} failed: {err}");
                    tokio::time::sleep(pause).await;
                    pause = next_pause(pause);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
