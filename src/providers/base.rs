use serde_json::Value;

use super::types::request::InferenceRequest;
use crate::errors::ChatResult;

/// Base trait for model backends. Returns the raw response; display text is
/// derived by [`crate::normalize::normalize`].
pub trait Provider: Send + Sync {
    fn complete(&self, request: &InferenceRequest) -> ChatResult<Value>;
}
