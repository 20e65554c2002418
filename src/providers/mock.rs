use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::base::Provider;
use super::types::request::InferenceRequest;
use crate::errors::{ChatError, ChatResult};

/// A mock provider that returns pre-configured responses and records requests
pub struct MockProvider {
    responses: Arc<Mutex<Vec<ChatResult<Value>>>>,
    requests: Arc<Mutex<Vec<InferenceRequest>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<ChatResult<Value>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Provider for MockProvider {
    fn complete(&self, request: &InferenceRequest) -> ChatResult<Value> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(ChatError::InferenceFailed {
                status: 500,
                body: "no response configured".to_string(),
            })
        } else {
            responses.remove(0)
        }
    }
}
