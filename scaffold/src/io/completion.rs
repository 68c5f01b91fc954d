//! Completion service abstraction and its backends.
//!
//! The [`CompletionService`] trait decouples the turn loop from the backend that
//! produces assistant text. Tests use scripted services that return
//! predetermined replies without touching the network.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::history::{History, Message, Role};
use crate::io::config::{Backend, CompletionConfig};
use crate::io::process::run_command_with_timeout;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Base delay between retries (doubled per attempt).
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Limit on the reply captured from the `command` backend.
const COMMAND_REPLY_LIMIT_BYTES: usize = 1_000_000;

/// Turns the conversation so far into the next assistant message.
///
/// Calls are synchronous. Transport and timeout failures are returned as
/// errors; the loop does not retry them.
pub trait CompletionService {
    fn query(&self, history: &History) -> Result<String>;
}

impl<T: CompletionService + ?Sized> CompletionService for Box<T> {
    fn query(&self, history: &History) -> Result<String> {
        (**self).query(history)
    }
}

/// Build the backend selected in configuration.
pub fn build_completion(cfg: &CompletionConfig) -> Result<Box<dyn CompletionService>> {
    let service: Box<dyn CompletionService> = match cfg.backend {
        Backend::Command => Box::new(CommandCompletion::new(cfg)?),
        Backend::Openai => Box::new(OpenAiCompletion::new(cfg)?),
        Backend::Anthropic => Box::new(AnthropicCompletion::new(cfg)?),
    };
    info!(backend = ?cfg.backend, model = %cfg.model, "completion backend ready");
    Ok(service)
}

/// Backend that spawns an external program per turn.
///
/// The program receives the history as a JSON array of `{role, content}` on
/// stdin and must print the assistant reply on stdout. Output is used verbatim.
pub struct CommandCompletion {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandCompletion {
    pub fn new(cfg: &CompletionConfig) -> Result<Self> {
        if cfg.command.is_empty() {
            bail!("command backend requires completion.command");
        }
        Ok(Self {
            argv: cfg.command.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

impl CompletionService for CommandCompletion {
    #[instrument(skip_all, fields(program = %self.argv[0], messages = history.len()))]
    fn query(&self, history: &History) -> Result<String> {
        let payload = history.to_json().context("serialize history")?;
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let output = run_command_with_timeout(
            cmd,
            Some(payload.as_bytes()),
            self.timeout,
            COMMAND_REPLY_LIMIT_BYTES,
        )
        .context("run completion command")?;

        if output.timed_out {
            return Err(anyhow!("completion command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }
        debug!(bytes = output.stdout.len(), "completion command replied");
        Ok(output.stdout_lossy())
    }
}

/// HTTP client and request settings shared by the chat backends.
#[derive(Debug, Clone)]
struct HttpBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl HttpBackend {
    fn new(cfg: &CompletionConfig, default_endpoint: &str, default_key_env: &str) -> Result<Self> {
        let key_env = cfg.api_key_env.as_deref().unwrap_or(default_key_env);
        let api_key = std::env::var(key_env)
            .with_context(|| format!("missing API key: set {key_env}"))?;
        Self::with_api_key(cfg, default_endpoint, api_key)
    }

    fn with_api_key(
        cfg: &CompletionConfig,
        default_endpoint: &str,
        api_key: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: cfg
                .endpoint
                .clone()
                .unwrap_or_else(|| default_endpoint.to_string()),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            max_retries: cfg.max_retries,
        })
    }

    /// POST `payload`, retrying transport errors, 429 and 5xx. Returns the body.
    fn post(
        &self,
        payload: &Value,
        authorize: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            let request = authorize(self.client.post(&self.endpoint)).json(payload);
            let error = match request.send() {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().context("read response body")?;
                    if status.is_success() {
                        return Ok(body);
                    }
                    let error = anyhow!("completion request failed with {status}: {}", body.trim());
                    if !should_retry_status(status) {
                        return Err(error);
                    }
                    error
                }
                Err(err) => anyhow::Error::new(err).context("send completion request"),
            };

            if attempt >= self.max_retries {
                return Err(error);
            }
            let delay = RETRY_BASE * 2u32.saturating_pow(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                err = %format!("{error:#}"),
                "retrying completion request"
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// OpenAI-compatible chat completions (also Together, Fireworks and similar
/// through `endpoint` + `api_key_env`).
pub struct OpenAiCompletion {
    http: HttpBackend,
}

impl OpenAiCompletion {
    /// Reads the API key from `api_key_env` (default `OPENAI_API_KEY`).
    pub fn new(cfg: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            http: HttpBackend::new(cfg, OPENAI_ENDPOINT, OPENAI_KEY_ENV)?,
        })
    }

    pub fn with_api_key(cfg: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpBackend::with_api_key(cfg, OPENAI_ENDPOINT, api_key.into())?,
        })
    }
}

impl CompletionService for OpenAiCompletion {
    #[instrument(skip_all, fields(model = %self.http.model, messages = history.len()))]
    fn query(&self, history: &History) -> Result<String> {
        let payload = json!({
            "model": self.http.model,
            "messages": history.messages(),
            "temperature": self.http.temperature,
            "top_p": self.http.top_p,
            "max_tokens": self.http.max_tokens,
        });
        let body = self
            .http
            .post(&payload, |request| request.bearer_auth(&self.http.api_key))?;
        parse_openai_reply(&body)
    }
}

/// Anthropic messages API. The leading system message travels in the
/// top-level `system` field.
pub struct AnthropicCompletion {
    http: HttpBackend,
}

impl AnthropicCompletion {
    /// Reads the API key from `api_key_env` (default `ANTHROPIC_API_KEY`).
    pub fn new(cfg: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            http: HttpBackend::new(cfg, ANTHROPIC_ENDPOINT, ANTHROPIC_KEY_ENV)?,
        })
    }

    pub fn with_api_key(cfg: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpBackend::with_api_key(cfg, ANTHROPIC_ENDPOINT, api_key.into())?,
        })
    }
}

impl CompletionService for AnthropicCompletion {
    #[instrument(skip_all, fields(model = %self.http.model, messages = history.len()))]
    fn query(&self, history: &History) -> Result<String> {
        let (system, messages) = split_system(history.messages());
        let mut payload = json!({
            "model": self.http.model,
            "messages": messages,
            "temperature": self.http.temperature,
            "top_p": self.http.top_p,
            "max_tokens": self.http.max_tokens,
        });
        if let Some(system) = system {
            payload["system"] = Value::String(system.to_string());
        }
        let body = self.http.post(&payload, |request| {
            request
                .header("x-api-key", &self.http.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
        })?;
        parse_anthropic_reply(&body)
    }
}

fn split_system(messages: &[Message]) -> (Option<&str>, &[Message]) {
    match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first.content.as_str()), rest),
        _ => (None, messages),
    }
}

/// Extract `choices[0].message.content` from a chat completions body.
pub fn parse_openai_reply(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).context("parse completion response")?;
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("completion response has no choices[0].message.content"))
}

/// Concatenate the text blocks of an Anthropic messages body.
pub fn parse_anthropic_reply(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).context("parse completion response")?;
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("completion response has no content array"))?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        bail!("completion response has no text content");
    }
    Ok(text.concat())
}
