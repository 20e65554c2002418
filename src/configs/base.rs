use std::env;

use crate::errors::{ChatError, ChatResult};

/// Values that are read once from the process environment at startup.
pub trait FromEnv {
    fn from_env() -> ChatResult<Self>
    where
        Self: Sized;

    /// Helper function to get environment variables with error handling
    fn get_env(key: &str, required: bool, default: Option<String>) -> ChatResult<Option<String>> {
        get_env(key, required, default)
    }
}

pub fn get_env(key: &str, required: bool, default: Option<String>) -> ChatResult<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) if !required => Ok(default),
        Err(env::VarError::NotPresent) => Err(ChatError::config(format!(
            "Environment variable '{}' is required but not set.",
            key
        ))),
        Err(e) => Err(ChatError::config(format!("{}: {}", key, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_env_optional_falls_back_to_default() {
        env::remove_var("LAKECHAT_TEST_UNSET");
        let value = get_env("LAKECHAT_TEST_UNSET", false, Some("fallback".to_string())).unwrap();
        assert_eq!(value.as_deref(), Some("fallback"));
    }

    #[test]
    #[serial]
    fn test_get_env_required_missing() {
        env::remove_var("LAKECHAT_TEST_UNSET");
        let err = get_env("LAKECHAT_TEST_UNSET", true, None).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
        assert!(err.to_string().contains("LAKECHAT_TEST_UNSET"));
    }
}
