//! Orchestrator-wide tuning.
//!
//! Values come from [`OrchestratorConfig::default`], a deserialized document
//! supplied by the host, or the `COLLAB_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{OrchestratorError, OrchestratorResult};
use crate::domain::state::DEFAULT_MAX_ERRORS;

pub const MAX_ERRORS_ENV: &str = "COLLAB_MAX_ERRORS";
pub const RETENTION_ENV: &str = "COLLAB_RETENTION_SECS";
pub const INVOKE_TIMEOUT_ENV: &str = "COLLAB_INVOKE_TIMEOUT_SECS";
pub const SWEEP_INTERVAL_ENV: &str = "COLLAB_SWEEP_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Error budget per execution; a task may override it via
    /// `config["max_errors"]`.
    pub max_errors: u32,
    /// How long terminal tasks are kept before the sweep removes them.
    pub retention_secs: u64,
    /// Upper bound on a single agent invocation.
    pub invoke_timeout_secs: u64,
    /// Period of the background cleanup sweep.
    pub sweep_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            retention_secs: 24 * 60 * 60,
            invoke_timeout_secs: 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overlaid with any `COLLAB_*` variables that are set.
    pub fn from_env() -> OrchestratorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a host-supplied JSON document; missing fields keep defaults.
    pub fn from_json(document: &str) -> OrchestratorResult<Self> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OrchestratorResult<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, MAX_ERRORS_ENV)? {
            config.max_errors = v;
        }
        if let Some(v) = parse_var(&lookup, RETENTION_ENV)? {
            config.retention_secs = v;
        }
        if let Some(v) = parse_var(&lookup, INVOKE_TIMEOUT_ENV)? {
            config.invoke_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, SWEEP_INTERVAL_ENV)? {
            config.sweep_interval_secs = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.max_errors == 0 {
            return Err(OrchestratorError::Config(
                "max_errors must be at least 1".to_string(),
            ));
        }
        if self.invoke_timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "invoke_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(OrchestratorError::Config(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> OrchestratorResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OrchestratorError::Config(format!("{key}: cannot parse {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_errors, 5);
        assert_eq!(config.retention(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (MAX_ERRORS_ENV, "3"),
            (RETENTION_ENV, "600"),
        ]))
        .unwrap();
        assert_eq!(config.max_errors, 3);
        assert_eq!(config.retention_secs, 600);
        assert_eq!(config.invoke_timeout_secs, 60);
    }

    #[test]
    fn test_unparsable_env_value_is_config_error() {
        let result = OrchestratorConfig::from_lookup(lookup(&[(INVOKE_TIMEOUT_ENV, "soon")]));
        match result {
            Err(OrchestratorError::Config(msg)) => assert!(msg.contains(INVOKE_TIMEOUT_ENV)),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_error_budget_rejected() {
        let result = OrchestratorConfig::from_lookup(lookup(&[(MAX_ERRORS_ENV, "0")]));
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = OrchestratorConfig::from_json(r#"{"max_errors": 2}"#).unwrap();
        assert_eq!(config.max_errors, 2);
        assert_eq!(config.sweep_interval_secs, 3_600);
    }

    #[test]
    fn test_malformed_document_is_serialization_error() {
        let result = OrchestratorConfig::from_json("{max_errors: 2");
        assert!(matches!(result, Err(OrchestratorError::Serialization(_))));
    }

    #[test]
    fn test_document_is_validated() {
        let result = OrchestratorConfig::from_json(r#"{"sweep_interval_secs": 0}"#);
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }
}
