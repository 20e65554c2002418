use regex::Regex;
use serde_json::{json, Value};

use super::base::Provider;
use super::types::request::{InferenceRequest, RequestShape};
use crate::client::WorkspaceClient;
use crate::errors::{ChatError, ChatResult};

/// Model serving endpoint reached through `/serving-endpoints/{name}/invocations`.
pub struct ServingEndpointProvider {
    client: WorkspaceClient,
    endpoint: String,
    shape: RequestShape,
}

impl ServingEndpointProvider {
    pub fn new(client: WorkspaceClient, endpoint: &str, shape: RequestShape) -> ChatResult<Self> {
        if !is_valid_endpoint_name(endpoint) {
            return Err(ChatError::config(format!(
                "Invalid serving endpoint name '{}', it must match [a-zA-Z0-9_-]+",
                endpoint
            )));
        }

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            shape,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn invocations_path(&self) -> String {
        format!("/serving-endpoints/{}/invocations", self.endpoint)
    }
}

impl Provider for ServingEndpointProvider {
    fn complete(&self, request: &InferenceRequest) -> ChatResult<Value> {
        let payload = request.to_payload(self.shape);
        tracing::debug!(endpoint = %self.endpoint, shape = ?self.shape, "invoking serving endpoint");

        let builder = self.client.post(&self.invocations_path()).json(&payload);
        let body = self
            .client
            .send(builder)?
            .success_or(|status, body| ChatError::InferenceFailed { status, body })?;

        Ok(parse_body(body))
    }
}

/// Non-JSON bodies are kept as `{"raw_text": body}` for the normalizer.
fn parse_body(body: String) -> Value {
    match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "serving endpoint returned non-JSON body");
            json!({ "raw_text": body })
        }
    }
}

fn is_valid_endpoint_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    re.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_endpoint_name() {
        assert!(is_valid_endpoint_name("databricks-dbrx-instruct"));
        assert!(is_valid_endpoint_name("my_endpoint_2"));
        assert!(!is_valid_endpoint_name("bad/endpoint"));
        assert!(!is_valid_endpoint_name(""));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(r#"{"output": "hi"}"#.to_string()), json!({"output": "hi"}));
        assert_eq!(
            parse_body("plain text reply".to_string()),
            json!({"raw_text": "plain text reply"})
        );
    }
}
