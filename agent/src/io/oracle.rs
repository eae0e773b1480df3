//! Blocking completion client behind the inference and synthesis oracles.
//!
//! Speaks three wire formats (OpenAI chat, Anthropic messages, plain
//! completion) and retries transient failures a bounded number of times.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::{ApiFormat, OracleConfig};

/// One request to an oracle.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
}

/// A text-in, text-out model endpoint.
///
/// Errors mean the oracle could not be reached; a malformed answer is still
/// `Ok` and left to the caller to interpret.
pub trait Oracle {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

impl<T: Oracle + ?Sized> Oracle for &T {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        (**self).complete(request)
    }
}

/// HTTP oracle configured from `[oracle]`.
pub struct HttpOracle {
    client: Client,
    config: OracleConfig,
    api_key: Option<String>,
    last_request: Cell<Option<Instant>>,
}

impl HttpOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let api_key = config
            .api_key_env
            .as_deref()
            .map(|var| std::env::var(var).with_context(|| format!("read api key from ${var}")))
            .transpose()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build oracle http client")?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            last_request: Cell::new(None),
        })
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_url.trim_end_matches('/');
        match self.config.api_format {
            ApiFormat::Openai => format!("{base}/chat/completions"),
            ApiFormat::Anthropic => format!("{base}/messages"),
            ApiFormat::Completion => format!("{base}/completion"),
        }
    }

    /// Sleep until `min_interval_ms` has passed since the previous request.
    fn throttle(&self) {
        let interval = Duration::from_millis(self.config.min_interval_ms);
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn send_once(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let body = request_body(&self.config, request);
        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = match self.config.api_format {
                ApiFormat::Anthropic => builder
                    .header("x-api-key", key)
                    .header("anthropic-version", "2023-06-01"),
                ApiFormat::Openai | ApiFormat::Completion => builder.bearer_auth(key),
            };
        }

        let response = builder.send().context("send oracle request")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("oracle returned {status}: {text}");
        }
        let text = response.text().context("read oracle response")?;
        parse_response(self.config.api_format, &text)
    }
}

impl Oracle for HttpOracle {
    #[instrument(skip_all, fields(format = ?self.config.api_format, temperature = request.temperature))]
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        let attempts = self.config.max_attempts.max(1);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut last_error = None;
        for attempt in 1..=attempts {
            self.throttle();
            match self.send_once(request) {
                Ok(text) => {
                    debug!(attempt, bytes = text.len(), "oracle responded");
                    return Ok(text);
                }
                Err(err) => {
                    warn!(attempt, attempts, error = %format!("{err:#}"), "oracle request failed");
                    last_error = Some(err);
                    if attempt < attempts {
                        thread::sleep(backoff);
                    }
                }
            }
        }
        let err = last_error.unwrap_or_else(|| anyhow!("oracle made no attempts"));
        Err(err.context(format!("oracle failed after {attempts} attempts")))
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestBody<'a> {
    Chat {
        model: &'a str,
        max_tokens: u32,
        temperature: f32,
        messages: Vec<Message<'a>>,
    },
    Messages {
        model: &'a str,
        max_tokens: u32,
        temperature: f32,
        system: &'a str,
        messages: Vec<Message<'a>>,
    },
    Prompt {
        prompt: String,
        max_tokens: u32,
        temperature: f32,
    },
}

fn request_body<'a>(config: &'a OracleConfig, request: &CompletionRequest<'a>) -> RequestBody<'a> {
    match config.api_format {
        ApiFormat::Openai => RequestBody::Chat {
            model: &config.model,
            max_tokens: config.max_tokens,
            temperature: request.temperature,
            messages: vec![
                Message {
                    role: "system",
                    content: request.system,
                },
                Message {
                    role: "user",
                    content: request.user,
                },
            ],
        },
        ApiFormat::Anthropic => RequestBody::Messages {
            model: &config.model,
            max_tokens: config.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: vec![Message {
                role: "user",
                content: request.user,
            }],
        },
        ApiFormat::Completion => RequestBody::Prompt {
            prompt: format!("{}\n\n{}", request.system.trim(), request.user.trim()),
            max_tokens: config.max_tokens,
            temperature: request.temperature,
        },
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Plain completion servers answer either OpenAI-style `choices[].text` or a
/// top-level `content` string.
#[derive(Deserialize)]
struct PromptResponse {
    #[serde(default)]
    choices: Vec<TextChoice>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TextChoice {
    text: String,
}

/// Extract the answer text from a raw response body.
pub fn parse_response(format: ApiFormat, body: &str) -> Result<String> {
    match format {
        ApiFormat::Openai => {
            let parsed: ChatResponse =
                serde_json::from_str(body).context("parse chat completion response")?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .context("chat completion response has no choices")
        }
        ApiFormat::Anthropic => {
            let parsed: MessagesResponse =
                serde_json::from_str(body).context("parse messages response")?;
            let text: String = parsed.content.into_iter().map(|block| block.text).collect();
            if text.is_empty() {
                bail!("messages response has no text content");
            }
            Ok(text)
        }
        ApiFormat::Completion => {
            let parsed: PromptResponse =
                serde_json::from_str(body).context("parse completion response")?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.text)
                .or(parsed.content)
                .context("completion response has no text")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(parse_response(ApiFormat::Openai, body).expect("parse"), "hello");
    }

    #[test]
    fn parses_messages_response() {
        let body = r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}"#;
        assert_eq!(parse_response(ApiFormat::Anthropic, body).expect("parse"), "ab");
    }

    #[test]
    fn parses_both_completion_shapes() {
        let choices = r#"{"choices":[{"text":"from choices"}]}"#;
        let content = r#"{"content":"from content"}"#;
        assert_eq!(
            parse_response(ApiFormat::Completion, choices).expect("choices"),
            "from choices"
        );
        assert_eq!(
            parse_response(ApiFormat::Completion, content).expect("content"),
            "from content"
        );
    }

    #[test]
    fn empty_responses_are_errors() {
        assert!(parse_response(ApiFormat::Openai, r#"{"choices":[]}"#).is_err());
        assert!(parse_response(ApiFormat::Completion, "{}").is_err());
        assert!(parse_response(ApiFormat::Anthropic, "not json").is_err());
    }

    #[test]
    fn request_bodies_follow_format() {
        let mut config = OracleConfig::default();
        let request = CompletionRequest {
            system: "sys",
            user: "usr",
            temperature: 0.5,
        };

        let chat = serde_json::to_value(request_body(&config, &request)).expect("chat");
        assert_eq!(chat["messages"][0]["role"], "system");
        assert_eq!(chat["messages"][1]["content"], "usr");

        config.api_format = ApiFormat::Anthropic;
        let messages = serde_json::to_value(request_body(&config, &request)).expect("messages");
        assert_eq!(messages["system"], "sys");
        assert_eq!(messages["messages"].as_array().map(Vec::len), Some(1));

        config.api_format = ApiFormat::Completion;
        let prompt = serde_json::to_value(request_body(&config, &request)).expect("prompt");
        assert_eq!(prompt["prompt"], "sys\n\nusr");
        assert!(prompt.get("model").is_none());
    }

    #[test]
    fn endpoints_follow_format() {
        let mut config = OracleConfig {
            api_url: "http://host/v1/".to_string(),
            ..OracleConfig::default()
        };
        let oracle = HttpOracle::from_config(&config).expect("oracle");
        assert_eq!(oracle.endpoint(), "http://host/v1/chat/completions");

        config.api_format = ApiFormat::Completion;
        let oracle = HttpOracle::from_config(&config).expect("oracle");
        assert_eq!(oracle.endpoint(), "http://host/v1/completion");
    }

    /// Verifies connection failures are retried up to the attempt limit.
    #[test]
    fn unreachable_endpoint_fails_after_retries() {
        let config = OracleConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            max_attempts: 2,
            retry_backoff_ms: 0,
            timeout_secs: 2,
            ..OracleConfig::default()
        };
        let oracle = HttpOracle::from_config(&config).expect("oracle");
        let err = oracle
            .complete(&CompletionRequest {
                system: "",
                user: "ping",
                temperature: 0.0,
            })
            .expect_err("unreachable");
        assert!(format!("{err:#}").contains("after 2 attempts"));
    }
}
