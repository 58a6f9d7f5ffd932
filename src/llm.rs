use std::{error::Error, fmt::Display, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{CredentialHeader, LlmConfig};

const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug)]
pub enum AiRequestError {
    Transport(reqwest::Error),
    Timeout { after: Duration },
    Status { status: StatusCode, body: String },
    MalformedResponse { msg: String },
    EmptyCompletion,
}

impl Display for AiRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiRequestError::Transport(err) => write!(f, "request failed: {err}"),
            AiRequestError::Timeout { after } => {
                write!(f, "no completion after {}s", after.as_secs())
            }
            AiRequestError::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            AiRequestError::MalformedResponse { msg } => {
                write!(f, "malformed completion response: {msg}")
            }
            AiRequestError::EmptyCompletion => write!(f, "completion contained no text"),
        }
    }
}

impl Error for AiRequestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AiRequestError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AiRequestError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct AzureOpenAiClient {
    client: Client,
    url: String,
    deployment: String,
    api_key: String,
    credential_header: CredentialHeader,
    timeout: Duration,
}

impl AzureOpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: completions_url(&config.endpoint, &config.deployment, &config.api_version),
            deployment: config.deployment.clone(),
            api_key: config.api_key.clone(),
            credential_header: config.credential_header,
            timeout: config.timeout,
        })
    }
}

pub fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.ends_with("/chat/completions") {
        return endpoint.to_string();
    }
    format!("{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}")
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AiRequestError> {
        let request = ChatRequest {
            model: &self.deployment,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens,
        };
        let response = self
            .client
            .post(&self.url)
            .header(
                self.credential_header.header_name(),
                self.credential_header.header_value(&self.api_key),
            )
            .json(&request)
            .send()
            .await
            .map_err(|err| match err.is_timeout() {
                true => AiRequestError::Timeout {
                    after: self.timeout,
                },
                false => AiRequestError::Transport(err),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(AiRequestError::Status { status, body });
        }

        let response: ChatResponse =
            response
                .json()
                .await
                .map_err(|err| AiRequestError::MalformedResponse {
                    msg: err.to_string(),
                })?;
        first_completion(response)
    }
}

fn first_completion(response: ChatResponse) -> Result<String, AiRequestError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(AiRequestError::MalformedResponse {
            msg: "no choices returned".into(),
        });
    };
    Ok(choice.message.content)
}
