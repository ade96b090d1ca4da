use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::response::AnswerResponse;
use crate::batch::QuestionRecord;
use crate::config::Config;

const CHAT_ENDPOINT: &str = "/rest/api/v1/chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACT_AS_HEADER: &str = "X-Scio-Actas";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Request to chat endpoint timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Exception when posting to chat endpoint: {0}")]
    Network(#[source] reqwest::Error),

    #[error("API error - status_code: {status}, response: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    /// Whether the failure happened after a request was put on the wire.
    pub fn reached_network(&self) -> bool {
        !matches!(self, Self::MissingFields(_) | Self::Build(_))
    }

    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e)
        } else {
            Self::Network(e)
        }
    }
}

/// Anything that can answer a question record. The batch driver only sees
/// this, so it can run against a fake in tests.
pub trait AnswerSource {
    async fn answer(&self, question: &QuestionRecord) -> Result<AnswerResponse, ClientError>;
}

#[derive(Debug, Clone, Serialize)]
struct Fragment {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    author: &'static str,
    message_type: &'static str,
    fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_id: Option<String>,
}

impl ChatRequest {
    fn for_question(question: &str, application_id: Option<&str>) -> Self {
        Self {
            messages: vec![ChatMessage {
                author: "USER",
                message_type: "CONTENT",
                fragments: vec![Fragment {
                    text: question.to_string(),
                }],
            }],
            stream: false,
            application_id: application_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GleanClient {
    client: reqwest::Client,
    host: String,
    url: String,
    api_token: String,
    app_id: Option<String>,
    act_as: Option<String>,
    dry_run: bool,
    verbose: bool,
}

impl GleanClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        let host = config.api_host();
        Ok(Self {
            client,
            url: format!("https://{}{}", host, CHAT_ENDPOINT),
            host,
            api_token: config.api_token.clone(),
            app_id: config.app_id.clone(),
            act_as: config.act_as.clone(),
            dry_run: config.debug,
            verbose: config.verbose,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Points the client at another server, keeping the chat endpoint path.
    /// Proxies are bypassed so local servers are reached directly.
    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap();
        self.url = format!("{}{}", base_url.trim_end_matches('/'), CHAT_ENDPOINT);
        self
    }

    fn validate(question: &QuestionRecord) -> Result<(), ClientError> {
        let mut missing = Vec::new();
        if question.qid.is_empty() {
            missing.push("qid");
        }
        if question.question.is_empty() {
            missing.push("question");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ClientError::MissingFields(missing))
        }
    }

    fn log_request(&self, question: &str, request: &ChatRequest) {
        debug!("Making API request:");
        debug!("Host: {}", self.host);
        debug!("Endpoint: {}", CHAT_ENDPOINT);
        debug!("Question: {}", question);
        debug!(
            "Headers: Authorization=Bearer <redacted>{}",
            self.act_as
                .as_deref()
                .map(|user| format!(", {}={}", ACT_AS_HEADER, user))
                .unwrap_or_default()
        );
        match serde_json::to_string_pretty(request) {
            Ok(payload) => debug!("Payload: {}", payload),
            Err(e) => debug!("Payload could not be rendered: {}", e),
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<String, ClientError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", &self.api_token))
            .header("content-type", "application/json")
            .json(request);
        if let Some(user) = &self.act_as {
            builder = builder.header(ACT_AS_HEADER, user);
        }

        if self.verbose {
            info!("Making chat API call");
        }

        let response = builder.send().await.map_err(ClientError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(ClientError::from_transport)?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if self.verbose {
            debug!("API Response:");
            debug!("Status code: {}", status.as_u16());
            let pretty = serde_json::from_str::<serde_json::Value>(&body)
                .and_then(|value| serde_json::to_string_pretty(&value))
                .unwrap_or_else(|_| body.clone());
            debug!("Response body: {}", pretty);
        }

        Ok(body)
    }
}

impl AnswerSource for GleanClient {
    async fn answer(&self, question: &QuestionRecord) -> Result<AnswerResponse, ClientError> {
        Self::validate(question)?;

        let request = ChatRequest::for_question(&question.question, self.app_id.as_deref());

        if self.dry_run || self.verbose {
            self.log_request(&question.question, &request);
        }

        if self.dry_run {
            return Ok(AnswerResponse::default());
        }

        let body = self.post(&request).await?;
        let response = AnswerResponse::from_body(&body);

        if self.verbose {
            debug!("Parsed answer: {:?}", response.answer);
            debug!("Parsed research: {:?}", response.research);
            debug!("Parsed citations: {:?}", response.citations);
        }

        Ok(response)
    }
}
