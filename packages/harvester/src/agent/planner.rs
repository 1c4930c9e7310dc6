//! The planner interface: one step of model-driven control flow.
//!
//! A planner sees the transcript so far (system goal, task, tool
//! catalog, executed steps) and returns either a tool invocation or a
//! terminal action. Production uses an LLM-backed planner; tests use a
//! scripted one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// What the planner decided to do next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlannerAction {
    /// Invoke a tool with JSON arguments.
    Tool { name: String, args: Value },
    /// Invoke the loop's terminal action with its payload.
    Finish { payload: Value },
}

impl PlannerAction {
    pub fn tool(name: impl Into<String>, args: Value) -> Self {
        Self::Tool {
            name: name.into(),
            args,
        }
    }

    pub fn finish(payload: Value) -> Self {
        Self::Finish { payload }
    }
}

/// One tool the planner may invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
    /// Invoking this tool ends the loop.
    pub terminal: bool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            terminal: false,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// One completed step of an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool: String,
    pub args: Value,
    pub observation: Value,
}

/// Conversation state handed to the planner on every step.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Fixed system instruction describing the goal.
    pub system: String,
    /// The concrete task (homepage, skill body, ...).
    pub task: String,
    /// Tools available to the planner.
    pub tools: Vec<ToolSpec>,
    /// Steps executed so far, oldest first.
    pub steps: Vec<AgentStep>,
}

impl Transcript {
    pub fn new(system: impl Into<String>, task: impl Into<String>, tools: Vec<ToolSpec>) -> Self {
        Self {
            system: system.into(),
            task: task.into(),
            tools,
            steps: Vec::new(),
        }
    }

    /// Record an executed step and its observation.
    pub fn record(&mut self, tool: impl Into<String>, args: Value, observation: Value) {
        self.steps.push(AgentStep {
            tool: tool.into(),
            args,
            observation,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the named tool is declared terminal in the catalog.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name && t.terminal)
    }
}

/// Chooses the next action for an agent loop.
///
/// Implementations must be deterministic given the same transcript only
/// in tests; production planners call a language model.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, transcript: &Transcript) -> Result<PlannerAction, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transcript_records_steps() {
        let mut transcript = Transcript::new("goal", "task", Vec::new());
        assert!(transcript.is_empty());

        transcript.record("fetch_page", json!({"url": "/"}), json!({"status": 200}));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.steps[0].tool, "fetch_page");
    }

    #[test]
    fn test_terminal_lookup() {
        let tools = vec![
            ToolSpec::new("fetch_page", "fetch", json!({})),
            ToolSpec::new("finish", "done", json!({})).terminal(),
        ];
        let transcript = Transcript::new("goal", "task", tools);

        assert!(transcript.is_terminal("finish"));
        assert!(!transcript.is_terminal("fetch_page"));
        assert!(!transcript.is_terminal("missing"));
    }
}
