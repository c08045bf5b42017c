//! Answer generation for `tctx ask`.
//!
//! - **[`OpenAiAnswerer`]** posts the rendered task context to any
//!   OpenAI-compatible `/chat/completions` endpoint and asks for a JSON
//!   object `{"answer": ..., "suggested_next_steps": [...]}`.
//! - **[`DisabledAnswerer`]** fails every request, so `ask` reports a clear
//!   error instead of silently answering nothing.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//!
//! Delays double from 1s up to 32s.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use task_context_core::qa::{AnswerGenerator, GeneratedAnswer};

use crate::config::{AnswerConfig, Config};

const SYSTEM_PROMPT: &str = "You are a project assistant. Answer the user's question using only \
the task context provided. Be specific and cite task codes where relevant. Respond with a JSON \
object of the form {\"answer\": string, \"suggested_next_steps\": [string]}.";

/// Build the answerer selected by `[answer] provider`.
pub fn create_answerer(config: &Config) -> Result<Arc<dyn AnswerGenerator>> {
    match config.answer.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAnswerer)),
        "openai" => Ok(Arc::new(OpenAiAnswerer::new(&config.answer)?)),
        other => bail!("Unknown answer provider: {}", other),
    }
}

/// Answerer that always errors.
pub struct DisabledAnswerer;

#[async_trait]
impl AnswerGenerator for DisabledAnswerer {
    async fn answer(&self, _question: &str, _context: &str) -> Result<GeneratedAnswer> {
        bail!("Answer provider is disabled. Set [answer] provider = \"openai\" in config.")
    }
}

pub struct OpenAiAnswerer {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiAnswerer {
    /// # Errors
    ///
    /// Fails if `model` is unset or the API key variable is missing.
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("answer.model required for OpenAI provider"))?;

        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiAnswerer {
    async fn answer(&self, question: &str, context: &str) -> Result<GeneratedAnswer> {
        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Task context:\n{}\n\nQuestion: {}", context, question),
                },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "Retrying answer request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        debug!(model = %self.model, "Answer received");
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Answer API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Answer API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Answer failed after retries")))
    }
}

/// Extract the answer from a chat completion.
///
/// The message content should be the requested JSON object. Models that
/// ignore the format get their plain text returned as the answer.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<GeneratedAnswer> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))?;

    match serde_json::from_str::<GeneratedAnswer>(content) {
        Ok(answer) => Ok(answer),
        Err(_) => Ok(GeneratedAnswer {
            answer: content.trim().to_string(),
            suggested_next_steps: Vec::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn test_parse_json_answer() {
        let json = completion(
            r#"{"answer": "Finish AUTH-1 first.", "suggested_next_steps": ["Review AUTH-2"]}"#,
        );
        let answer = parse_chat_response(&json).unwrap();
        assert_eq!(answer.answer, "Finish AUTH-1 first.");
        assert_eq!(answer.suggested_next_steps, vec!["Review AUTH-2"]);
    }

    #[test]
    fn test_parse_json_without_steps() {
        let answer = parse_chat_response(&completion(r#"{"answer": "Done."}"#)).unwrap();
        assert_eq!(answer.answer, "Done.");
        assert!(answer.suggested_next_steps.is_empty());
    }

    #[test]
    fn test_parse_plain_text_falls_back() {
        let answer = parse_chat_response(&completion("  Just text.  ")).unwrap();
        assert_eq!(answer.answer, "Just text.");
    }

    #[test]
    fn test_parse_missing_content_errors() {
        assert!(parse_chat_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn test_disabled_answerer_errors() {
        let err = DisabledAnswerer.answer("q", "ctx").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
