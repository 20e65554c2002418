use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::base::get_env;
use crate::errors::{ChatError, ChatResult};
use crate::jobs::PollPolicy;
use crate::providers::types::request::{RequestShape, SamplingParams};
use crate::upload::UploadBackend;

pub const HOST_ENV: &str = "DATABRICKS_HOST";
pub const ENV_PREFIX: &str = "LAKECHAT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_secs: 120,
        }
    }
}

impl WorkspaceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub root: String,
    pub backend: UploadBackend,
    pub overwrite: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            root: "/Volumes/llm/rag/pdf_vol".to_string(),
            backend: UploadBackend::VolumesFiles,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Job started by `trigger` and by the post-upload ingest step.
    pub job_id: Option<String>,
    /// Job that writes uploaded content when the `job_relay` backend is used.
    pub relay_job_id: Option<String>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub timeout_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            job_id: None,
            relay_job_id: None,
            initial_delay_ms: 2_000,
            max_delay_ms: 15_000,
            backoff_factor: 2.0,
            timeout_secs: 120,
        }
    }
}

impl JobSettings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServingSettings {
    pub endpoint: String,
    pub shape: RequestShape,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    /// Characters of an attached document embedded into the prompt.
    pub context_chars: usize,
    pub system_prompt: String,
}

impl Default for ServingSettings {
    fn default() -> Self {
        Self {
            endpoint: "databricks-meta-llama-3-3-70b-instruct".to_string(),
            shape: RequestShape::Messages,
            max_tokens: 512,
            temperature: 0.2,
            top_p: 0.9,
            context_chars: 3000,
            system_prompt: "You are a helpful assistant for project documents.".to_string(),
        }
    }
}

impl ServingSettings {
    pub fn sampling(&self) -> ChatResult<SamplingParams> {
        SamplingParams::new(self.max_tokens, self.temperature, self.top_p)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub workspace: WorkspaceSettings,
    pub upload: UploadSettings,
    pub jobs: JobSettings,
    pub serving: ServingSettings,
}

impl Settings {
    /// Defaults, then the optional TOML file, then `LAKECHAT_<SECTION>__<KEY>`
    /// variables, then `DATABRICKS_HOST`.
    pub fn load(path: Option<&Path>) -> ChatResult<Self> {
        let settings = Self::layered(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The same layers as [`Settings::load`] without validation, for commands
    /// that never reach the workspace.
    pub fn layered(path: Option<&Path>) -> ChatResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ChatError::Settings(err)
        })?;

        if let Some(host) = get_env(HOST_ENV, false, None)? {
            settings.workspace.host = host;
        }
        Ok(settings)
    }

    fn validate(&self) -> ChatResult<()> {
        if self.workspace.host.trim().is_empty() {
            return Err(ChatError::config(format!(
                "workspace host is not set: export {} or set workspace.host",
                HOST_ENV
            )));
        }
        if !(self.jobs.backoff_factor.is_finite() && self.jobs.backoff_factor >= 1.0) {
            return Err(ChatError::InvalidParameter(format!(
                "jobs.backoff_factor must be a finite number >= 1.0, got {}",
                self.jobs.backoff_factor
            )));
        }
        self.serving.sampling()?;
        Ok(())
    }
}
