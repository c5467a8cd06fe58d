use async_trait::async_trait;
use med_kgqa::{KgqaError, LlmClient};
use rig::{agent::Agent, client::CompletionClient, completion::Prompt, providers::openrouter};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

fn api_key(override_key: Option<&str>) -> anyhow::Result<String> {
    if let Some(key) = override_key {
        if !key.trim().is_empty() {
            return Ok(key.to_string());
        }
    }
    std::env::var("OPENROUTER_API_KEY").map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))
}

pub fn get_llm_agent(model: &str, preamble: &str) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let key = api_key(None)?;
    let client = openrouter::Client::new(&key);
    Ok(client.agent(model).preamble(preamble).build())
}

/// Non-streaming completion collaborator for the fallback intent
/// classification, backed by an OpenRouter agent.
pub struct RigIntentClassifier {
    model: String,
}

impl RigIntentClassifier {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for RigIntentClassifier {
    async fn complete(&self, prompt: &str) -> med_kgqa::Result<String> {
        let agent = get_llm_agent(&self.model, "")
            .map_err(|e| KgqaError::LlmClient(e.to_string()))?;
        agent
            .prompt(prompt)
            .await
            .map_err(|e| KgqaError::LlmClient(e.to_string()))
    }
}

/// One parsed server-sent-events line of a chat completion stream.
#[derive(Debug, PartialEq, Eq)]
enum SsePayload {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SsePayload {
    let Some(data) = line.strip_prefix("data: ") else {
        return SsePayload::Skip;
    };
    if data.trim() == "[DONE]" {
        return SsePayload::Done;
    }
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return SsePayload::Skip;
    };
    let delta = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if delta.is_empty() {
        SsePayload::Skip
    } else {
        SsePayload::Delta(delta.to_string())
    }
}

/// Streaming generation collaborator over the OpenRouter
/// chat-completions SSE endpoint.
pub struct StreamingGenerator {
    http: reqwest::Client,
    default_model: String,
}

impl StreamingGenerator {
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            default_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Stream content deltas into `tx`. Returns once the stream ends,
    /// errors, or the receiver is dropped (client disconnect) — the
    /// last case stops consuming the upstream stream early.
    pub async fn stream_completion(
        &self,
        model: Option<&str>,
        api_key_override: Option<&str>,
        prompt: &str,
        tx: mpsc::Sender<String>,
    ) -> anyhow::Result<()> {
        let key = api_key(api_key_override)?;
        let model = model.unwrap_or(&self.default_model);
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": true,
            "max_tokens": 2048,
            "temperature": 0.7,
        });

        let mut response = self
            .http
            .post(OPENROUTER_CHAT_URL)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        // SSE frames can split multi-byte characters across chunks;
        // buffer bytes and only decode complete lines.
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                match parse_sse_line(line.trim_end()) {
                    SsePayload::Delta(content) => {
                        if tx.send(content).await.is_err() {
                            debug!("delta receiver dropped, stopping generation stream");
                            return Ok(());
                        }
                    }
                    SsePayload::Done => return Ok(()),
                    SsePayload::Skip => {}
                }
            }
        }
        warn!("generation stream ended without [DONE]");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"感冒"}}]}"#;
        assert_eq!(parse_sse_line(line), SsePayload::Delta("感冒".to_string()));
    }

    #[test]
    fn done_marker_terminates() {
        assert_eq!(parse_sse_line("data: [DONE]"), SsePayload::Done);
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert_eq!(parse_sse_line(": keep-alive"), SsePayload::Skip);
        assert_eq!(parse_sse_line(""), SsePayload::Skip);
    }

    #[test]
    fn empty_delta_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{}}]}"#;
        assert_eq!(parse_sse_line(line), SsePayload::Skip);
    }

    #[test]
    fn malformed_json_is_skipped() {
        assert_eq!(parse_sse_line("data: {not json"), SsePayload::Skip);
    }
}
