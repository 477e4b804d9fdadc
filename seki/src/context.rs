//! Invocation context types.
//!
//! These types describe what guardrails get to see: the request heading to
//! the model and, once the model has answered, the generation that came
//! back. The execution engine never interprets any of these fields;
//! individual checks do.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool messages, the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message answering `call_id`.
    #[must_use]
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id assigned by the model.
    #[serde(default)]
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON value.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A tool advertised to the model: what it does and what arguments it takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// What the tool does, for the model's benefit.
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolSpec {
    /// Create a tool spec.
    #[must_use]
    pub fn new(description: impl Into<String>, parameters: Value) -> Self {
        Self {
            description: description.into(),
            parameters,
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the request.
    pub input_tokens: u64,
    /// Tokens produced by the generation.
    pub output_tokens: u64,
    /// Total tokens for the call.
    pub total_tokens: u64,
}

impl Usage {
    /// Create a usage record; the total is derived.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// Parameters for one model invocation.
///
/// Either `prompt` or `messages` (or both) carries the input; `system`,
/// `tools`, and `schema` are optional extras the provider may honor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Plain-text prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Structured conversation messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// System instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Tools advertised to the model, by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolSpec>,
    /// Expected output schema, when generating structured objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Output-token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a request from a plain-text prompt.
    #[must_use]
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Create a request from conversation messages.
    #[must_use]
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Set the system instructions.
    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Advertise one tool.
    #[must_use]
    pub fn tool(mut self, name: impl Into<String>, spec: ToolSpec) -> Self {
        self.tools.insert(name.into(), spec);
        self
    }

    /// Replace the advertised tool set.
    #[must_use]
    pub fn tools(mut self, tools: BTreeMap<String, ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the expected output schema.
    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the output-token budget.
    #[must_use]
    pub const fn max_output_tokens(mut self, budget: u32) -> Self {
        self.max_output_tokens = Some(budget);
        self
    }

    /// Append a message to the conversation.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All user-facing input text: the prompt plus every user message,
    /// newline-joined. This is what input checks typically scan.
    #[must_use]
    pub fn input_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(prompt) = &self.prompt {
            parts.push(prompt);
        }
        parts.extend(
            self.messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str()),
        );
        parts.join("\n")
    }
}

/// One model generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Generated structured object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
    /// Tool calls the model wants executed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Why generation stopped (e.g. "stop", "length").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Wall-clock generation time, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<Duration>,
}

impl Generation {
    /// Create a text-only generation.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Attach token usage.
    #[must_use]
    pub const fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Append a tool call.
    #[must_use]
    pub fn tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Set the finish reason.
    #[must_use]
    pub fn finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Set the generation time.
    #[must_use]
    pub const fn generation_time(mut self, elapsed: Duration) -> Self {
        self.generation_time = Some(elapsed);
        self
    }
}

/// What a guardrail gets to inspect.
///
/// Input guardrails see only the request (`generation` is `None`); output
/// guardrails additionally see the model's generation. Streaming wrappers
/// materialize the accumulated text as the generation's `text` before
/// evaluation, so one check signature serves every path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailContext {
    /// The request sent (or about to be sent) to the model.
    pub request: GenerationRequest,
    /// The model's generation; `None` while input guardrails run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
}

impl GuardrailContext {
    /// Context for input guardrails: the request alone.
    #[must_use]
    pub const fn from_request(request: GenerationRequest) -> Self {
        Self {
            request,
            generation: None,
        }
    }

    /// Context for output guardrails: request plus generation.
    #[must_use]
    pub const fn with_generation(request: GenerationRequest, generation: Generation) -> Self {
        Self {
            request,
            generation: Some(generation),
        }
    }

    /// Text under input-guardrail scrutiny.
    #[must_use]
    pub fn input_text(&self) -> String {
        self.request.input_text()
    }

    /// Text under output-guardrail scrutiny, when a generation is present.
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        self.generation.as_ref().and_then(|g| g.text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_text_joins_prompt_and_user_messages() {
        let request = GenerationRequest {
            prompt: Some("first".into()),
            messages: vec![
                Message::system("ignored"),
                Message::user("second"),
                Message::assistant("also ignored"),
            ],
            ..GenerationRequest::default()
        };
        assert_eq!(request.input_text(), "first\nsecond");
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage::new(100, 50);
        total += Usage::new(10, 5);
        assert_eq!(total.input_tokens, 110);
        assert_eq!(total.output_tokens, 55);
        assert_eq!(total.total_tokens, 165);
    }

    #[test]
    fn context_exposes_output_text() {
        let ctx = GuardrailContext::with_generation(
            GenerationRequest::from_prompt("hi"),
            Generation::from_text("hello"),
        );
        assert_eq!(ctx.output_text(), Some("hello"));

        let input_only = GuardrailContext::from_request(GenerationRequest::from_prompt("hi"));
        assert_eq!(input_only.output_text(), None);
    }

    #[test]
    fn request_serde_round_trip() {
        let request = GenerationRequest::from_prompt("hello")
            .system("be terse")
            .max_output_tokens(256);
        let json = serde_json::to_string(&request).unwrap();
        let back: GenerationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
