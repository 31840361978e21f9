use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, warn};

use crate::error::GateError;
use crate::metrics::{MetricsRecorder, UPSTREAM_ATTEMPTS, UPSTREAM_FAILURES};
use crate::models::{GenerateContentRequest, GenerateContentResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("AI API request timed out")]
    Timeout,

    #[error("AI API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format from AI API: {0}")]
    Parse(String),

    #[error("AI API request failed after {attempts} attempts: exhausted retries")]
    Exhausted { attempts: u32 },

    #[error("AI API transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    Success(String),
    RateLimited,
    RetryableServerError { status: u16, body: String },
    FatalError(UpstreamError),
}

impl UpstreamOutcome {
    pub fn into_result(self) -> Result<String, UpstreamError> {
        match self {
            UpstreamOutcome::Success(text) => Ok(text),
            UpstreamOutcome::RateLimited => Err(UpstreamError::Status {
                status: 429,
                body: String::new(),
            }),
            UpstreamOutcome::RetryableServerError { status, body } => {
                Err(UpstreamError::Status { status, body })
            }
            UpstreamOutcome::FatalError(err) => Err(err),
        }
    }
}

/// Maps one HTTP response onto an outcome.
pub fn classify(status: u16, body: &str) -> UpstreamOutcome {
    match status {
        200 => match serde_json::from_str::<GenerateContentResponse>(body) {
            Ok(envelope) => match envelope.first_text() {
                Some(text) => UpstreamOutcome::Success(text.to_string()),
                None => UpstreamOutcome::FatalError(UpstreamError::Parse(
                    "no candidates in response".into(),
                )),
            },
            Err(err) => UpstreamOutcome::FatalError(UpstreamError::Parse(err.to_string())),
        },
        429 => UpstreamOutcome::RateLimited,
        500..=599 => UpstreamOutcome::RetryableServerError {
            status,
            body: body.to_string(),
        },
        _ => UpstreamOutcome::FatalError(UpstreamError::Status {
            status,
            body: body.to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for UpstreamError {
    fn from(err: TransportError) -> Self {
        match err {
            // an unreachable upstream reads the same as one that never answered
            TransportError::Timeout | TransportError::Connect(_) => UpstreamError::Timeout,
            other => UpstreamError::Transport(other.to_string()),
        }
    }
}

// one POST per call; retrying is the caller's job
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &GenerateContentRequest,
    ) -> Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(policy: &RetryPolicy) -> Result<Self, GateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.total_timeout)
            .build()
            .map_err(|e| GateError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &GenerateContentRequest,
    ) -> Result<RawResponse, TransportError> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = res.status().as_u16();
        let body = res.text().await.map_err(transport_error)?;
        Ok(RawResponse { status, body })
    }
}

pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    base_url: String,
    api_key: String,
    recorder: Option<Arc<MetricsRecorder>>,
}

impl RetryingClient {
    // a missing or blank key is fatal
    pub fn from_env_key(
        api_key: Option<String>,
        base_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, GateError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(GateError::ConfigurationMissing("GEMINI_API_KEY"))?;
        let transport = ReqwestTransport::new(&policy)?;
        Ok(Self::with_transport(Arc::new(transport), api_key, base_url, policy))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            policy,
            base_url: base_url.into(),
            api_key: api_key.into(),
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn url(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }

    /// Performs one logical call. Only `Success` or `FatalError` come back.
    pub async fn call(&self, model: &str, prompt: &str) -> UpstreamOutcome {
        let url = self.url(model);
        let body = GenerateContentRequest::from_prompt(prompt);
        let label = format!("upstream:{model}");
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            let last = attempt == max_attempts;
            UPSTREAM_ATTEMPTS.inc();

            let started = Instant::now();
            let result = match timeout(
                self.policy.total_timeout,
                self.transport.post(&url, &self.api_key, &body),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };
            if let Some(recorder) = &self.recorder {
                let code = result.as_ref().map(|raw| raw.status).unwrap_or(0);
                recorder.record(&label, started.elapsed(), code);
            }

            match result {
                Err(err) => {
                    warn!(model, attempt, error = %err, "AI API transport failure");
                    if last {
                        return fatal(err.into());
                    }
                    sleep(self.policy.base_delay).await;
                }
                Ok(raw) => match classify(raw.status, &raw.body) {
                    UpstreamOutcome::Success(text) => {
                        debug!(model, attempt, "AI API call succeeded");
                        return UpstreamOutcome::Success(text);
                    }
                    UpstreamOutcome::RateLimited => {
                        warn!(model, attempt, "AI API rate limited the request");
                        if !last {
                            sleep(self.policy.base_delay * attempt).await;
                        }
                    }
                    UpstreamOutcome::RetryableServerError { status, body } => {
                        warn!(model, attempt, status, "AI API server error");
                        if last {
                            return fatal(UpstreamError::Status { status, body });
                        }
                        sleep(self.policy.base_delay).await;
                    }
                    UpstreamOutcome::FatalError(err) => return fatal(err),
                },
            }
        }

        fatal(UpstreamError::Exhausted {
            attempts: max_attempts,
        })
    }
}

fn fatal(err: UpstreamError) -> UpstreamOutcome {
    UPSTREAM_FAILURES.inc();
    error!(error = %err, "AI API call failed");
    UpstreamOutcome::FatalError(err)
}
