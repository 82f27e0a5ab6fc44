use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Message, SamplingParams};
use crate::providers::http_errors::chat_api_request_error;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a str>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        })
        .collect()
}

/// Non-2xx bodies carry `{"error": {"message": ...}}`; fall back to the raw
/// body when that shape does not parse.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Sends one chat-completion request and returns every generated choice.
/// Does not retry; a failure here is reported and the prompt is skipped.
pub async fn complete(
    client: &Client,
    cfg: &Config,
    params: &SamplingParams,
    messages: &[Message],
) -> Result<Vec<String>> {
    let body = ChatCompletionRequest {
        model: &params.model,
        messages: to_wire_messages(messages),
        max_tokens: params.max_tokens,
        n: params.choices,
        stop: params.stop.as_deref(),
        temperature: params.temperature,
    };
    debug!(
        api_url = %cfg.api_url,
        model = %params.model,
        message_count = messages.len(),
        choices = params.choices,
        "sending chat completion request"
    );

    let response = client
        .post(&cfg.api_url)
        .bearer_auth(&cfg.api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %cfg.api_url,
                model = %params.model,
                error = %err,
                "chat completion request failed"
            );
            chat_api_request_error(err, &cfg.api_url, cfg.request_timeout_secs)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        let detail = extract_error_message(&response_body);
        warn!(
            api_url = %cfg.api_url,
            model = %params.model,
            status = %status,
            "chat API returned non-success status"
        );
        return Err(anyhow!(
            "Chat request failed with status {}: {}",
            status,
            detail
        ));
    }

    let parsed: ChatCompletionResponse = response
        .json()
        .await
        .context("Failed to parse chat completion response")?;
    debug!(
        model = %params.model,
        choice_count = parsed.choices.len(),
        "received chat completion response"
    );
    Ok(parsed
        .choices
        .into_iter()
        .map(|choice| choice.message.content)
        .collect())
}
