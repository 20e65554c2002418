use uuid::Uuid;

use crate::errors::ChatResult;
use crate::extract::{extract_text, truncate_context};
use crate::normalize::normalize;
use crate::providers::base::Provider;
use crate::providers::types::message::{ChatMessage, Role};
use crate::providers::types::request::{InferenceRequest, SamplingParams};

pub fn create_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

/// Messages of one interactive session, in the order they were exchanged.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drops the trailing message if it has `role`.
    fn rollback(&mut self, role: Role) {
        if self.messages.last().map(|m| m.role) == Some(role) {
            self.messages.pop();
        }
    }
}

/// Document text offered to the model alongside the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub text: String,
}

/// State of one chat session. Dropping it ends the session.
pub struct ChatSession {
    id: String,
    conversation: Conversation,
    attachment: Option<Attachment>,
    system_prompt: Option<String>,
    params: SamplingParams,
    context_chars: usize,
}

impl ChatSession {
    pub fn new(params: SamplingParams, context_chars: usize) -> Self {
        Self {
            id: create_session_id(),
            conversation: Conversation::new(),
            attachment: None,
            system_prompt: None,
            params,
            context_chars,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Extracts and stores the text of `bytes`, replacing any earlier
    /// attachment. Returns the stored text.
    pub fn attach(&mut self, name: &str, bytes: &[u8]) -> &str {
        let text = truncate_context(&extract_text(bytes), self.context_chars);
        tracing::debug!(session = %self.id, name, chars = text.chars().count(), "attached document");
        let attachment = self.attachment.insert(Attachment {
            name: name.to_string(),
            text,
        });
        &attachment.text
    }

    pub fn detach(&mut self) -> Option<Attachment> {
        self.attachment.take()
    }

    /// Forgets the conversation and the attachment.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.attachment = None;
    }

    /// Request for the current state: an optional system message, then the
    /// conversation in order.
    pub fn build_request(&self) -> InferenceRequest {
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        if let Some(system) = self.system_message() {
            messages.push(system);
        }
        messages.extend_from_slice(self.conversation.messages());

        InferenceRequest::Chat {
            messages,
            params: self.params,
        }
    }

    /// One exchange. On success the reply is appended and returned; on failure
    /// the conversation is left as it was before the call.
    pub fn send(&mut self, provider: &dyn Provider, text: &str) -> ChatResult<String> {
        self.conversation.push(ChatMessage::user(text));

        let response = match provider.complete(&self.build_request()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "inference failed");
                self.conversation.rollback(Role::User);
                return Err(e);
            }
        };

        let reply = normalize(&response);
        self.conversation.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    fn system_message(&self) -> Option<ChatMessage> {
        let context = self.attachment.as_ref().map(|a| {
            format!(
                "Use the following document context when answering.\n[{}]\n{}",
                a.name, a.text
            )
        });

        match (&self.system_prompt, context) {
            (None, None) => None,
            (Some(prompt), None) => Some(ChatMessage::system(prompt.clone())),
            (None, Some(context)) => Some(ChatMessage::system(context)),
            (Some(prompt), Some(context)) => {
                Some(ChatMessage::system(format!("{}\n\n{}", prompt, context)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChatError;
    use crate::providers::mock::MockProvider;
    use serde_json::json;

    fn session() -> ChatSession {
        ChatSession::new(SamplingParams::new(128, 0.5, 0.5).unwrap(), 3000)
    }

    #[test]
    fn test_session_id_format() {
        let id = create_session_id();
        assert!(id.starts_with("session_"));
        assert_eq!(id.len(), "session_".len() + 32);
        assert_ne!(id, create_session_id());
    }

    #[test]
    fn test_send_appends_exchange() {
        let provider = MockProvider::new(vec![Ok(
            json!({"choices": [{"message": {"content": "pong"}}]}),
        )]);
        let mut session = session();
        assert!(session.conversation().is_empty());

        let reply = session.send(&provider, "ping").unwrap();
        assert_eq!(reply, "pong");
        assert_eq!(
            session.conversation().messages(),
            &[ChatMessage::user("ping"), ChatMessage::assistant("pong")]
        );
    }

    #[test]
    fn test_failed_send_rolls_back() {
        let provider = MockProvider::new(vec![
            Ok(json!({"output": "first"})),
            Err(ChatError::InferenceFailed {
                status: 429,
                body: "slow down".to_string(),
            }),
        ]);
        let mut session = session();
        session.send(&provider, "one").unwrap();

        let err = session.send(&provider, "two").unwrap_err();
        assert_eq!(err.status(), Some(429));
        assert_eq!(
            session.conversation().messages(),
            &[ChatMessage::user("one"), ChatMessage::assistant("first")]
        );
    }

    #[test]
    fn test_request_includes_history_and_context() {
        let provider = MockProvider::new(vec![
            Ok(json!({"output": "a1"})),
            Ok(json!({"output": "a2"})),
        ]);
        let mut session = session().with_system_prompt("Be brief.");
        session.attach("notes.txt", b"The budget is 42.");

        session.send(&provider, "q1").unwrap();
        session.send(&provider, "q2").unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        match &requests[1] {
            InferenceRequest::Chat { messages, params } => {
                assert_eq!(params.max_tokens, 128);
                assert_eq!(messages.len(), 4);
                assert_eq!(messages[0].role, Role::System);
                assert!(messages[0].content.starts_with("Be brief."));
                assert!(messages[0].content.contains("[notes.txt]\nThe budget is 42."));
                assert_eq!(messages[1], ChatMessage::user("q1"));
                assert_eq!(messages[2], ChatMessage::assistant("a1"));
                assert_eq!(messages[3], ChatMessage::user("q2"));
            }
            other => panic!("Expected chat request, got {:?}", other),
        }
    }

    #[test]
    fn test_attach_truncates_and_clear_resets() {
        let mut session = ChatSession::new(SamplingParams::new(1, 0.0, 1.0).unwrap(), 5);
        assert_eq!(session.attach("a.txt", b"0123456789"), "01234");

        session.attach("b.txt", b"xyz");
        assert_eq!(session.attachment().unwrap().name, "b.txt");

        let provider = MockProvider::new(vec![Ok(json!({"output": "ok"}))]);
        session.send(&provider, "hi").unwrap();

        session.clear();
        assert!(session.conversation().is_empty());
        assert!(session.attachment().is_none());
        match session.build_request() {
            InferenceRequest::Chat { messages, .. } => assert!(messages.is_empty()),
            other => panic!("Expected chat request, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_system_prompt_ignored() {
        let session = session().with_system_prompt("  ");
        match session.build_request() {
            InferenceRequest::Chat { messages, .. } => assert!(messages.is_empty()),
            other => panic!("Expected chat request, got {:?}", other),
        }
    }
}
