//! LLM-backed planner over an OpenAI-compatible chat completions API.
//!
//! The transcript is rendered into a chat message history with tool
//! definitions; the model's tool call becomes the next
//! [`PlannerAction`]. Tools the catalog marks terminal map to
//! [`PlannerAction::Finish`].

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::planner::{Planner, PlannerAction, Transcript};
use crate::error::AgentError;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Planner that asks a chat-completions model for the next step.
pub struct ChatPlanner {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    temperature: Option<f32>,
}

impl ChatPlanner {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            temperature: None,
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Render the transcript as a chat message history.
    ///
    /// Each executed step becomes an assistant tool-call message paired
    /// with its tool result, so the model sees its own prior choices.
    fn messages(transcript: &Transcript) -> Vec<Value> {
        let mut messages = vec![
            json!({ "role": "system", "content": transcript.system }),
            json!({ "role": "user", "content": transcript.task }),
        ];

        for (index, step) in transcript.steps.iter().enumerate() {
            let call_id = format!("step-{index}");
            messages.push(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {
                        "name": step.tool,
                        "arguments": step.args.to_string(),
                    }
                }]
            }));
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": step.observation.to_string(),
            }));
        }

        messages
    }

    fn tool_definitions(transcript: &Transcript) -> Vec<Value> {
        transcript
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl Planner for ChatPlanner {
    async fn plan(&self, transcript: &Transcript) -> Result<PlannerAction, AgentError> {
        let mut request = json!({
            "model": self.model,
            "messages": Self::messages(transcript),
            "tools": Self::tool_definitions(transcript),
            "tool_choice": "required",
        });
        if let Some(temperature) = self.temperature {
            request["temperature"] = json!(temperature);
        }

        debug!(
            model = %self.model,
            steps = transcript.len(),
            "Requesting next action from the model"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Planner(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Model API returned an error");
            return Err(AgentError::Planner(format!(
                "model API returned HTTP {status}: {body}"
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Planner(format!("unparseable response: {e}")))?;

        let message = parsed
            .pointer("/choices/0/message")
            .ok_or_else(|| AgentError::Planner("response carried no message".into()))?;

        let Some(call) = message
            .pointer("/tool_calls/0/function")
            .filter(|f| f.get("name").is_some())
        else {
            return Err(AgentError::Planner(
                "model returned text instead of a tool call".into(),
            ));
        };

        let name = call
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args: Value = call
            .get("arguments")
            .and_then(Value::as_str)
            .map(|raw| serde_json::from_str(raw).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);

        if transcript.is_terminal(&name) {
            Ok(PlannerAction::Finish { payload: args })
        } else {
            Ok(PlannerAction::Tool { name, args })
        }
    }
}
