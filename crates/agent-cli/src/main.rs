//! Command-line interface for agent-rs
//!
//! Picks a model (given on the command line, an existing fine-tuned model, or
//! one trained on demand from a JSONL file), asks it one question and prints
//! the answer. Exits non-zero on any unrecoverable failure.

use agent_core::{
    Artifact, BackoffInvoker, CancellationToken, Error, FileHandleStore, JobOrchestrator,
    OrchestratorConfig, RetryPolicy,
};
use agent_llm::providers::{DEFAULT_BASE_MODEL, FineTuneJobService, OpenAIConfig, OpenAIProvider};
use agent_llm::{CompletionRequest, Message, complete_with_backoff};
use agent_utils::{ApiKeys, LogFormat};
use anyhow::Context as _;
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(about = "Fine-tune a model when needed and ask it for financial analysis", long_about = None)]
struct Args {
    /// JSONL training file submitted when a fine-tuning job is needed
    #[arg(long, default_value = "fine-tuning.jsonl")]
    training_file: PathBuf,

    /// Base model to fine-tune
    #[arg(long, default_value = DEFAULT_BASE_MODEL)]
    base_model: String,

    /// Use this model directly and skip fine-tuning
    #[arg(long)]
    model: Option<String>,

    /// Do not look for an existing fine-tuned model first
    #[arg(long)]
    no_reuse: bool,

    /// Directory holding persisted job handles
    #[arg(long, default_value = ".fine_tune_jobs")]
    handle_dir: PathBuf,

    /// Key of the persisted job handle [default: training file name]
    #[arg(long)]
    job_key: Option<String>,

    /// Seconds between job status checks
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Stop polling after this many seconds; the job can be resumed later
    #[arg(long)]
    poll_timeout: Option<u64>,

    /// Attempts per remote call
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Delay before the first retry, in seconds
    #[arg(long, default_value_t = 1.0)]
    initial_delay: f64,

    /// Upper bound for a retry delay, in seconds
    #[arg(long, default_value_t = 10.0)]
    max_delay: f64,

    /// TOML file with an [api_keys] table
    #[arg(long, default_value = agent_utils::DEFAULT_KEY_FILE)]
    key_file: PathBuf,

    /// Environment variable checked for the API key before the key file
    #[arg(long, default_value = "OPENAI_API_KEY")]
    api_key_env: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// System message
    #[arg(long, default_value = "You are an expert financial analyst.")]
    system: String,

    /// Question for the model
    #[arg(long, default_value = "Incoming CPI PREDICTION AND FINANCIAL ADVICE?")]
    prompt: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        let policy = RetryPolicy::new(
            self.max_attempts,
            Duration::try_from_secs_f64(self.initial_delay)
                .context("--initial-delay must be a non-negative number of seconds")?,
            Duration::try_from_secs_f64(self.max_delay)
                .context("--max-delay must be a non-negative number of seconds")?,
        );
        policy.validate()?;
        Ok(policy)
    }

    fn orchestrator_config(&self, retry: RetryPolicy) -> OrchestratorConfig {
        let config = OrchestratorConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_retry(retry);
        match self.poll_timeout {
            Some(secs) => config.with_poll_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    agent_utils::init_tracing_with(if args.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            on_interrupt.cancel();
        }
    });

    match run(args, &cancel).await {
        Ok(content) => {
            println!("{content}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, cancel: &CancellationToken) -> anyhow::Result<String> {
    // Everything that can be checked locally is checked before any request
    let policy = args.retry_policy()?;
    let api_key = ApiKeys::from_file(&args.key_file)
        .and_then(|keys| keys.resolve("openAI", &args.api_key_env))
        .map_err(|e| Error::Configuration(e.to_string()))?;

    let mut config = OpenAIConfig::new(api_key);
    if let Some(api_base) = &args.api_base {
        config = config.with_api_base(api_base);
    }
    let provider = Arc::new(OpenAIProvider::with_config(config)?);

    let model = resolve_model(&args, &provider, &policy, cancel).await?;
    info!(model = %model, "Using model");

    let request = CompletionRequest::builder(model)
        .add_message(Message::system(&args.system))
        .add_message(Message::user(&args.prompt))
        .build();
    let response = interruptible(cancel, async {
        complete_with_backoff(provider.as_ref(), &request, &policy)
            .await
            .map_err(anyhow::Error::from)
    })
    .await?;

    Ok(response
        .content()
        .map_or_else(|| "No response from the model.".to_string(), ToString::to_string))
}

/// Model given on the command line, an existing fine-tuned one, or a new one
async fn resolve_model(
    args: &Args,
    provider: &Arc<OpenAIProvider>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    if let Some(model) = &args.model {
        return Ok(model.clone());
    }

    if !args.no_reuse {
        let lookup = interruptible(cancel, async {
            Ok::<_, anyhow::Error>(
                BackoffInvoker::new()
                    .invoke("list models", policy, || provider.find_fine_tuned_model())
                    .await,
            )
        })
        .await?;
        match lookup {
            Ok(Some(model)) => {
                info!(model = %model, "Found existing fine-tuned model");
                return Ok(model);
            }
            Ok(None) => info!("No fine-tuned model found"),
            Err(e) => warn!(error = %e, "Could not list models, falling back to fine-tuning"),
        }
    }

    let artifact = Artifact::from_path(&args.training_file);
    let key = args
        .job_key
        .clone()
        .unwrap_or_else(|| artifact.name().to_string());

    let service = FineTuneJobService::new(Arc::clone(provider)).with_base_model(&args.base_model);
    let orchestrator = JobOrchestrator::new(
        Arc::new(service),
        Arc::new(FileHandleStore::new(&args.handle_dir)),
        key,
    )
    .with_config(args.orchestrator_config(policy.clone()));

    let model = orchestrator
        .ensure_result_with_cancel(&artifact, cancel)
        .await?;
    Ok(model.into_string())
}

/// Run `work` unless the user interrupts first
async fn interruptible<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(anyhow::anyhow!("interrupted")),
        result = work => result,
    }
}
