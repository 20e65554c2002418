use serde::Deserialize;
use serde_json::{json, Value};

use super::message::ChatMessage;
use crate::errors::{ChatError, ChatResult};

/// How a chat request is laid out in the invocation body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    /// `{"inputs": "<text>"}`
    Inputs,
    /// `{"inputs": {"messages": [...], "max_tokens": .., ...}}`
    NestedMessages,
    /// `{"messages": [...], "max_tokens": .., ...}`
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl SamplingParams {
    pub fn new(max_tokens: u32, temperature: f64, top_p: f64) -> ChatResult<Self> {
        if max_tokens == 0 {
            return Err(ChatError::InvalidParameter(
                "max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ChatError::InvalidParameter(format!(
                "temperature must be within [0, 1], got {}",
                temperature
            )));
        }
        if !(top_p > 0.0 && top_p <= 1.0) {
            return Err(ChatError::InvalidParameter(format!(
                "top_p must be within (0, 1], got {}",
                top_p
            )));
        }
        Ok(Self {
            max_tokens,
            temperature,
            top_p,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceRequest {
    Prompt(String),
    Chat {
        messages: Vec<ChatMessage>,
        params: SamplingParams,
    },
}

impl InferenceRequest {
    /// Invocation body for the given backend shape. Bare prompts are always
    /// sent as `inputs`.
    pub fn to_payload(&self, shape: RequestShape) -> Value {
        match self {
            InferenceRequest::Prompt(prompt) => json!({ "inputs": prompt }),
            InferenceRequest::Chat { messages, params } => {
                let chat = json!({
                    "messages": messages,
                    "max_tokens": params.max_tokens,
                    "temperature": params.temperature,
                    "top_p": params.top_p,
                });
                match shape {
                    RequestShape::Inputs => json!({ "inputs": transcript(messages) }),
                    RequestShape::NestedMessages => json!({ "inputs": chat }),
                    RequestShape::Messages => chat,
                }
            }
        }
    }
}

/// Flattens messages to `role: content` lines for prompt-only backends.
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat() -> InferenceRequest {
        InferenceRequest::Chat {
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("ping")],
            params: SamplingParams::new(256, 0.5, 0.25).unwrap(),
        }
    }

    #[test]
    fn test_sampling_bounds() {
        assert!(SamplingParams::new(1, 0.0, 1.0).is_ok());
        assert!(SamplingParams::new(1, 1.0, 0.01).is_ok());
        assert!(SamplingParams::new(0, 0.5, 0.5).is_err());
        assert!(SamplingParams::new(1, 1.5, 0.5).is_err());
        assert!(SamplingParams::new(1, -0.1, 0.5).is_err());
        assert!(SamplingParams::new(1, 0.5, 0.0).is_err());
        assert!(SamplingParams::new(1, 0.5, 1.2).is_err());
    }

    #[test]
    fn test_prompt_payload_ignores_shape() {
        let request = InferenceRequest::Prompt("hello".to_string());
        for shape in [RequestShape::Inputs, RequestShape::NestedMessages, RequestShape::Messages] {
            assert_eq!(request.to_payload(shape), json!({"inputs": "hello"}));
        }
    }

    #[test]
    fn test_chat_payload_shapes() {
        let messages = json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "ping"}
        ]);

        assert_eq!(
            chat().to_payload(RequestShape::Messages),
            json!({"messages": messages, "max_tokens": 256, "temperature": 0.5, "top_p": 0.25})
        );
        assert_eq!(
            chat().to_payload(RequestShape::NestedMessages),
            json!({"inputs": {"messages": messages, "max_tokens": 256, "temperature": 0.5, "top_p": 0.25}})
        );
        assert_eq!(
            chat().to_payload(RequestShape::Inputs),
            json!({"inputs": "system: be brief\nuser: ping"})
        );
    }
}
