use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::client::WorkspaceClient;
use crate::errors::{ChatError, ChatResult};

pub const RUN_NOW_PATH: &str = "/api/2.1/jobs/run-now";
pub const GET_OUTPUT_PATH: &str = "/api/2.1/jobs/runs/get-output";

/// Life-cycle states after which a run produces no further output.
const TERMINAL_STATES: [&str; 3] = ["TERMINATED", "SKIPPED", "INTERNAL_ERROR"];

/// Opaque identifier of a started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_response(body: &str) -> ChatResult<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ChatError::ParseFailure(format!("run-now response: {}", e)))?;

        match value.get("run_id") {
            Some(Value::Number(n)) => Ok(Self(n.to_string())),
            Some(Value::String(s)) if !s.is_empty() => Ok(Self(s.clone())),
            _ => Err(ChatError::ParseFailure(format!(
                "run-now response has no run_id: {}",
                body
            ))),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded wait for a run's output: first poll after `initial_delay`, then
/// delays grow by `backoff_factor` up to `max_delay` until `timeout` elapses.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(120),
        }
    }
}

impl PollPolicy {
    /// Delay after `current`, never above `max_delay`. Products that do not
    /// fit a `Duration` saturate to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor.max(1.0))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Notebook parameters asking the ingest job to index `file_path`.
pub fn ingest_params(file_path: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("action".to_string(), "ingest".to_string()),
        ("file_path".to_string(), file_path.to_string()),
    ])
}

#[derive(Debug, Default, Deserialize)]
struct RunOutput {
    #[serde(default)]
    notebook_output: Option<NotebookOutput>,
    #[serde(default)]
    metadata: Option<RunMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct NotebookOutput {
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RunMetadata {
    #[serde(default)]
    state: Option<RunState>,
}

#[derive(Debug, Default, Deserialize)]
struct RunState {
    #[serde(default)]
    life_cycle_state: Option<String>,
}

impl RunOutput {
    fn result(&self) -> Option<&str> {
        self.notebook_output.as_ref()?.result.as_deref()
    }

    fn life_cycle_state(&self) -> Option<&str> {
        self.metadata.as_ref()?.state.as_ref()?.life_cycle_state.as_deref()
    }

    /// A response without any state cannot be waited on, so it counts as done.
    fn is_finished(&self) -> bool {
        match self.life_cycle_state() {
            Some(state) => TERMINAL_STATES.contains(&state),
            None => true,
        }
    }
}

pub struct JobTrigger {
    client: WorkspaceClient,
    policy: PollPolicy,
}

impl JobTrigger {
    pub fn new(client: WorkspaceClient) -> Self {
        Self {
            client,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Starts `job_id` with the given notebook parameters.
    pub fn trigger(&self, job_id: &str, params: &BTreeMap<String, String>) -> ChatResult<RunId> {
        let payload = run_now_payload(job_id, params);
        tracing::debug!(job_id, params = params.len(), "triggering job");

        let request = self.client.post(RUN_NOW_PATH).json(&payload);
        let body = self
            .client
            .send(request)?
            .success_or(|status, body| ChatError::JobTriggerFailed { status, body })?;

        let run_id = RunId::from_response(&body)?;
        tracing::info!(job_id, run_id = %run_id, "job triggered");
        Ok(run_id)
    }

    /// Hands an uploaded file to the ingest job.
    pub fn trigger_ingest(&self, job_id: &str, uploaded_path: &str) -> ChatResult<RunId> {
        self.trigger(job_id, &ingest_params(uploaded_path))
    }

    /// Waits for the run per the poll policy and returns its notebook result,
    /// or an empty string when the run produced none in time.
    pub fn fetch_output(&self, run_id: &RunId) -> ChatResult<String> {
        // No deadline when the timeout overflows the clock.
        let deadline = Instant::now().checked_add(self.policy.timeout);
        let mut delay = self.policy.initial_delay;

        loop {
            let remaining = deadline.map_or(delay, |d| d.saturating_duration_since(Instant::now()));
            thread::sleep(delay.min(remaining));

            let output = self.get_output(run_id)?;
            if let Some(result) = output.result() {
                return Ok(result.to_string());
            }
            if output.is_finished() {
                return Ok(String::new());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(
                    run_id = %run_id,
                    state = output.life_cycle_state().unwrap_or("unknown"),
                    "gave up waiting for job output"
                );
                return Ok(String::new());
            }

            delay = self.policy.next_delay(delay);
        }
    }

    fn get_output(&self, run_id: &RunId) -> ChatResult<RunOutput> {
        let request = self
            .client
            .get(GET_OUTPUT_PATH)
            .query(&[("run_id", run_id.as_str())]);
        let body = self
            .client
            .send(request)?
            .success_or(|status, body| ChatError::JobOutputFailed { status, body })?;

        if body.trim().is_empty() {
            return Ok(RunOutput::default());
        }
        serde_json::from_str(&body)
            .map_err(|e| ChatError::ParseFailure(format!("get-output response: {}", e)))
    }
}

/// Numeric job ids are sent as numbers, anything else verbatim.
pub(crate) fn run_now_payload(job_id: &str, params: &BTreeMap<String, String>) -> Value {
    let job_id = match job_id.parse::<u64>() {
        Ok(id) => json!(id),
        Err(_) => json!(job_id),
    };
    json!({
        "job_id": job_id,
        "notebook_params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_now_payload() {
        let mut params = BTreeMap::new();
        params.insert("action".to_string(), "ingest".to_string());
        params.insert("file_path".to_string(), "/Volumes/a/b.pdf".to_string());

        let payload = run_now_payload("615973198764755", &params);
        assert_eq!(
            payload,
            json!({
                "job_id": 615973198764755u64,
                "notebook_params": {"action": "ingest", "file_path": "/Volumes/a/b.pdf"}
            })
        );

        let payload = run_now_payload("nightly-ingest", &BTreeMap::new());
        assert_eq!(payload["job_id"], "nightly-ingest");
        assert_eq!(payload["notebook_params"], json!({}));
    }

    #[test]
    fn test_run_id_from_response() {
        assert_eq!(RunId::from_response(r#"{"run_id": 42}"#).unwrap().as_str(), "42");
        assert_eq!(
            RunId::from_response(r#"{"run_id": "abc", "number_in_job": 1}"#)
                .unwrap()
                .as_str(),
            "abc"
        );
        assert!(matches!(
            RunId::from_response("{}"),
            Err(ChatError::ParseFailure(_))
        ));
        assert!(matches!(
            RunId::from_response("not json"),
            Err(ChatError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_next_delay_is_capped() {
        let policy = PollPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(60),
        };
        assert_eq!(policy.next_delay(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(policy.next_delay(Duration::from_secs(4)), Duration::from_secs(5));
    }

    #[test]
    fn test_next_delay_saturates_on_overflow() {
        let mut policy = PollPolicy {
            backoff_factor: f64::INFINITY,
            ..PollPolicy::default()
        };
        assert_eq!(policy.next_delay(Duration::from_secs(2)), policy.max_delay);

        policy.backoff_factor = f64::MAX;
        policy.max_delay = Duration::MAX;
        assert_eq!(policy.next_delay(Duration::from_secs(u64::MAX)), Duration::MAX);
    }

    #[test]
    fn test_ingest_params() {
        assert_eq!(
            ingest_params("/Volumes/llm/rag/pdf_vol/a.pdf"),
            BTreeMap::from([
                ("action".to_string(), "ingest".to_string()),
                ("file_path".to_string(), "/Volumes/llm/rag/pdf_vol/a.pdf".to_string()),
            ])
        );
    }

    #[test]
    fn test_run_output_states() {
        let running: RunOutput = serde_json::from_value(json!({
            "metadata": {"state": {"life_cycle_state": "RUNNING"}}
        }))
        .unwrap();
        assert!(!running.is_finished());
        assert_eq!(running.result(), None);

        let done: RunOutput = serde_json::from_value(json!({
            "notebook_output": {"result": "42 rows"},
            "metadata": {"state": {"life_cycle_state": "TERMINATED"}}
        }))
        .unwrap();
        assert!(done.is_finished());
        assert_eq!(done.result(), Some("42 rows"));

        let bare: RunOutput = serde_json::from_value(json!({"notebook_output": {}})).unwrap();
        assert!(bare.is_finished());
    }
}
