//! OpenAI provider implementation
//!
//! Chat completions plus the endpoints needed to run a fine-tuning job:
//! training file upload, job creation, job retrieval and model listing.
//! See: https://platform.openai.com/docs/api-reference
//!
//! # Example
//!
//! ```no_run
//! use agent_llm::{CompletionRequest, LLMProvider, Message};
//! use agent_llm::providers::OpenAIProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = OpenAIProvider::from_env()?;
//!
//!     let request = CompletionRequest::builder("gpt-4o-mini")
//!         .add_message(Message::system("You are an expert financial analyst."))
//!         .add_message(Message::user("Incoming CPI PREDICTION AND FINANCIAL ADVICE?"))
//!         .build();
//!
//!     let response = provider.complete(request).await?;
//!     println!("{}", response.content().unwrap_or_default());
//!     Ok(())
//! }
//! ```

use crate::{
    CompletionRequest, CompletionResponse, LLMError, LLMProvider, Message, Result, Role,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for OpenAI provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL for the OpenAI API (default: "https://api.openai.com/v1")
    pub api_base: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create config from environment variable
    ///
    /// Reads the API key from `OPENAI_API_KEY` and, if set, the base URL from
    /// `OPENAI_API_BASE`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| DEFAULT_OPENAI_API_BASE.to_string());

        Ok(Self::new(api_key).with_api_base(api_base))
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Fine-tuning job as reported by the API
#[derive(Debug, Clone, Deserialize)]
pub struct FineTuningJob {
    /// Job id, e.g. `ftjob-abc123`
    pub id: String,

    /// Remote status: `validating_files`, `queued`, `running`, `succeeded`,
    /// `failed` or `cancelled`
    pub status: String,

    /// Name of the trained model once the job succeeded
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
}

/// Entry of the model list
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    /// Model id; fine-tuned models start with `ft:`
    pub id: String,
}

impl ModelInfo {
    /// Whether this is a fine-tuned model
    pub fn is_fine_tuned(&self) -> bool {
        self.id.starts_with("ft:")
    }
}

/// OpenAI provider
///
/// Also works with OpenAI-compatible APIs through `api_base`.
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with custom configuration
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LLMError::ConfigurationError(
                "OpenAI API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a new OpenAI provider with API key and default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    /// Create a provider from environment variable
    pub fn from_env() -> Result<Self> {
        Self::with_config(OpenAIConfig::from_env()?)
    }

    /// Get the current configuration
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Upload a JSONL training file, returning its file id
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn upload_training_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "training.jsonl".to_string(), |n| n.to_string_lossy().into_owned());

        debug!(bytes = bytes.len(), "Uploading training file");

        let form = Form::new()
            .text("purpose", "fine-tune")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let uploaded: FileObject = parse_json(check_status(response, "file").await?).await?;
        debug!(file_id = %uploaded.id, "Training file uploaded");
        Ok(uploaded.id)
    }

    /// Start a fine-tuning job of `model` on an uploaded training file
    #[instrument(skip(self))]
    pub async fn create_fine_tuning_job(
        &self,
        model: &str,
        training_file: &str,
    ) -> Result<FineTuningJob> {
        let response = self
            .client
            .post(self.url("fine_tuning/jobs"))
            .bearer_auth(&self.config.api_key)
            .json(&CreateJobRequest {
                model,
                training_file,
            })
            .send()
            .await?;

        let job: FineTuningJob = parse_json(check_status(response, model).await?).await?;
        debug!(job_id = %job.id, status = %job.status, "Fine-tuning job created");
        Ok(job)
    }

    /// Fetch the current state of a fine-tuning job
    #[instrument(skip(self))]
    pub async fn retrieve_fine_tuning_job(&self, job_id: &str) -> Result<FineTuningJob> {
        let response = self
            .client
            .get(self.url(&format!("fine_tuning/jobs/{job_id}")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        parse_json(check_status(response, job_id).await?).await
    }

    /// List models visible to the account
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let list: ModelList = parse_json(check_status(response, "models").await?).await?;
        Ok(list.data)
    }

    /// First fine-tuned model available to the account, if any
    pub async fn find_fine_tuned_model(&self) -> Result<Option<String>> {
        let model = self
            .list_models()
            .await?
            .into_iter()
            .find(ModelInfo::is_fine_tuned)
            .map(|m| m.id);
        debug!(?model, "Looked up existing fine-tuned model");
        Ok(model)
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to OpenAI API at {}", self.config.api_base);

        let openai_request = OpenAIRequest {
            model: &request.model,
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&openai_request)
            .send()
            .await?;

        let response = match check_status(response, &request.model).await {
            Err(LLMError::NotFound(_)) => return Err(LLMError::ModelNotFound(request.model)),
            other => other?,
        };

        let openai_response: OpenAIResponse = parse_json(response).await?;

        // Extract first choice (OpenAI can return multiple but we use first)
        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("No choices in response".to_string()))?;

        let usage = openai_response.usage.unwrap_or_default();
        debug!(
            "Received response - stop_reason: {}, tokens: {}/{}",
            choice.finish_reason.as_deref().unwrap_or("none"),
            usage.prompt_tokens,
            usage.completion_tokens
        );

        Ok(CompletionResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            stop_reason: map_stop_reason(choice.finish_reason.as_deref()),
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Map a non-success HTTP status to an [`LLMError`]
async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await?;
    Err(match status.as_u16() {
        401 => LLMError::AuthenticationFailed,
        429 => LLMError::RateLimitExceeded(error_text),
        400 => LLMError::InvalidRequest(error_text),
        404 => LLMError::NotFound(subject.to_string()),
        code if status.is_server_error() => LLMError::ServerError {
            status: code,
            body: error_text,
        },
        _ => LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| LLMError::UnexpectedResponse(format!("Failed to parse response: {e}")))
}

/// Map OpenAI stop reason to our format
fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => {
            debug!("Content filtered by OpenAI safety systems");
            StopReason::ContentFilter
        }
        _ => StopReason::EndTurn,
    }
}

// ============================================================================
// OpenAI-specific wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for OpenAIMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: &msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    model: &'a str,
    training_file: &'a str,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

// ============================================================================
// Tests
// ============================================================================
