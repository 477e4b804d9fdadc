//! A tool-calling agent loop over a guarded provider.
//!
//! Every step is one guarded generation: the agent's request passes the
//! input guardrails, the model answers, and the output guardrails (with
//! retries, fallback, the works) vet the answer before the agent acts on
//! it. A step that returns tool calls has them executed concurrently and
//! their results appended to the conversation; a step that returns plain
//! text ends the run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::{Generation, GenerationRequest, Message, ToolCall, ToolSpec, Usage};
use crate::error::{Error, Result};
use crate::guarded::GuardedProvider;

/// Default step budget for an agent run.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Errors a tool may return. They never abort the run; the failure text
/// is fed back to the model instead.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Executes one tool on the agent's behalf.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the model-supplied arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when the tool cannot complete; the agent reports
    /// the failure text to the model and keeps going.
    async fn call(&self, arguments: Value) -> std::result::Result<Value, ToolError>;
}

/// Adapter turning a synchronous closure into a [`ToolHandler`].
struct FnTool<F>(F);

#[async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> std::result::Result<Value, ToolError> + Send + Sync,
{
    async fn call(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
        (self.0)(arguments)
    }
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    /// Call id assigned by the model.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments the model supplied.
    pub arguments: Value,
    /// Rendered result (or failure text) fed back to the model.
    pub result: String,
    /// Whether the tool ran and returned `Ok`.
    pub success: bool,
}

/// One step of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Step number, starting at 1.
    pub step: usize,
    /// What the model produced this step.
    pub generation: Generation,
    /// Tool calls executed this step, in call order.
    pub tool_results: Vec<ToolCallRecord>,
}

/// A finished agent run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRun {
    /// The final, guardrail-approved generation.
    pub output: Generation,
    /// Every step taken, in order.
    pub steps: Vec<StepRecord>,
    /// Token usage accumulated across all steps.
    pub usage: Usage,
}

/// A tool-calling agent.
pub struct Agent {
    name: String,
    instructions: Option<String>,
    provider: GuardedProvider,
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
    tool_specs: BTreeMap<String, ToolSpec>,
    max_steps: usize,
}

impl Agent {
    /// Create an agent over a guarded provider.
    #[must_use]
    pub fn new(name: impl Into<String>, provider: GuardedProvider) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            provider,
            tools: BTreeMap::new(),
            tool_specs: BTreeMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Set the system instructions sent with every step.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        spec: ToolSpec,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        let name = name.into();
        self.tool_specs.insert(name.clone(), spec);
        self.tools.insert(name, Arc::new(handler));
        self
    }

    /// Register a tool backed by a synchronous closure.
    #[must_use]
    pub fn with_tool_fn<F>(self, name: impl Into<String>, spec: ToolSpec, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.with_tool(name, spec, FnTool(f))
    }

    /// Set the step budget.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// The agent's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the agent to completion on the given input.
    ///
    /// # Errors
    ///
    /// Any error from a guarded step (blocked input or output, provider
    /// failure), or [`Error::MaxSteps`] when the model keeps requesting
    /// tools past the step budget.
    pub async fn run(&self, input: impl Into<String> + Send) -> Result<AgentRun> {
        let mut messages = vec![Message::user(input.into())];
        let mut steps = Vec::new();
        let mut usage = Usage::default();

        for step in 1..=self.max_steps {
            debug!(agent = %self.name, step, "Starting step");
            let request = self.build_request(&messages);
            let generation = self.provider.generate(&request).await?;
            if let Some(step_usage) = generation.usage {
                usage += step_usage;
            }

            if generation.tool_calls.is_empty() {
                debug!(agent = %self.name, step, "Agent finished");
                steps.push(StepRecord {
                    step,
                    generation: generation.clone(),
                    tool_results: Vec::new(),
                });
                return Ok(AgentRun {
                    output: generation,
                    steps,
                    usage,
                });
            }

            messages.push(Message::assistant_with_tools(
                generation.text.clone().unwrap_or_default(),
                generation.tool_calls.clone(),
            ));
            let records = self.execute_tool_calls(&generation.tool_calls).await;
            for record in &records {
                messages.push(Message::tool(record.id.clone(), record.result.clone()));
            }
            steps.push(StepRecord {
                step,
                generation,
                tool_results: records,
            });
        }

        Err(Error::max_steps(self.max_steps))
    }

    fn build_request(&self, messages: &[Message]) -> GenerationRequest {
        let mut request = GenerationRequest::with_messages(messages.to_vec())
            .tools(self.tool_specs.clone());
        if let Some(instructions) = &self.instructions {
            request = request.system(instructions.clone());
        }
        request
    }

    /// Execute a batch of tool calls concurrently, preserving call order
    /// in the returned records.
    async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Vec<ToolCallRecord> {
        join_all(calls.iter().map(|call| self.execute_single_tool(call))).await
    }

    async fn execute_single_tool(&self, call: &ToolCall) -> ToolCallRecord {
        let (result, success) = match self.tools.get(&call.name) {
            Some(handler) => match handler.call(call.arguments.clone()).await {
                Ok(value) => (render_value(&value), true),
                Err(err) => (format!("Tool '{}' failed: {err}", call.name), false),
            },
            None => (format!("Tool '{}' not found", call.name), false),
        };
        if !success {
            warn!(agent = %self.name, tool = %call.name, %result, "Tool call failed");
        }
        ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            result,
            success,
        }
    }
}

/// Render a tool result for the conversation: bare strings stay bare,
/// everything else is serialized JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("tools", &self.tool_specs.keys().collect::<Vec<_>>())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}
