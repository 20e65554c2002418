use std::fmt;

use super::base::FromEnv;
use crate::errors::{ChatError, ChatResult};

pub const TOKEN_ENV: &str = "DATABRICKS_TOKEN";

/// Bearer token for the workspace. Only ever rendered into request headers.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> ChatResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ChatError::config(format!("{} is empty", TOKEN_ENV)));
        }
        Ok(Self(token))
    }

    pub(crate) fn bearer(&self) -> &str {
        &self.0
    }
}

impl FromEnv for Credential {
    fn from_env() -> ChatResult<Self> {
        let token = Self::get_env(TOKEN_ENV, true, None)?
            .ok_or_else(|| ChatError::config(format!("{} missing", TOKEN_ENV)))?;
        Self::new(token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}
