#![forbid(unsafe_code)]

//! Per-engine configuration.
//!
//! [`EngineConfig`] is passed to [`start`](crate::start) and scoped to that
//! one engine: the error strategy, the toolkit adapter hook and the
//! data-only [`EnginePolicy`]. The policy can be loaded from TOML or JSON
//! behind the `config-file` feature.
//!
//! # Loading
//!
//! ```toml
//! # rebind.toml
//! supersede = "cancel_previous"
//! max_queue_depth = 256
//! worker_name_prefix = "orders-async"
//! ```
//!
//! ```rust,ignore
//! let policy = EnginePolicy::from_toml_file("rebind.toml")?;
//! let config = EngineConfig::default().with_policy(policy);
//! ```

use std::fmt;
#[cfg(feature = "config-file")]
use std::path::Path;

#[cfg(feature = "config-file")]
use serde::{Deserialize, Serialize};

use crate::binding::{BindingDescriptor, ToolkitAdapter};
use crate::handler::HandlerError;

/// What happens to an in-flight async handler when another async event is
/// dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "snake_case"))]
pub enum SupersedePolicy {
    /// Both tasks run to completion; their commits interleave in arrival
    /// order and each diffs against the model current at that moment.
    #[default]
    RunToCompletion,
    /// Cancel every in-flight task before starting the new one. Items the
    /// cancelled task has not yet delivered are never committed.
    CancelPrevious,
}

/// Data-only engine tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config-file", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct EnginePolicy {
    /// Async handler supersede behavior.
    pub supersede: SupersedePolicy,
    /// Inputs allowed to wait behind the one being processed. Exceeding it
    /// means a binding or handler is feeding itself.
    pub max_queue_depth: usize,
    /// Async worker threads are named `{prefix}-{task id}`.
    pub worker_name_prefix: String,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            supersede: SupersedePolicy::RunToCompletion,
            max_queue_depth: 1024,
            worker_name_prefix: "rebind-async".to_owned(),
        }
    }
}

impl EnginePolicy {
    /// Parse from a TOML string and validate.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let policy: Self = toml::from_str(s)?;
        policy.validated()
    }

    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse from a JSON string and validate.
    #[cfg(feature = "config-file")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let policy: Self = serde_json::from_str(s)?;
        policy.validated()
    }

    #[cfg(feature = "config-file")]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Serialize to TOML.
    #[cfg(feature = "config-file")]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Range problems, one message each. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_queue_depth == 0 {
            errors.push("max_queue_depth must be > 0".to_owned());
        }
        if self.worker_name_prefix.trim().is_empty() {
            errors.push("worker_name_prefix must not be blank".to_owned());
        }
        errors
    }

    /// `self` if valid, otherwise [`ConfigError::Validation`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors loading an [`EnginePolicy`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "config-file")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[cfg(feature = "config-file")]
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[cfg(feature = "config-file")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

type ErrorHook = Box<dyn Fn(&HandlerError)>;

/// Everything one engine needs beyond the binder, events and dispatcher.
#[derive(Default)]
pub struct EngineConfig {
    pub policy: EnginePolicy,
    /// Receives handler failures. Without one, a handler failure panics on
    /// the UI thread.
    pub on_error: Option<ErrorHook>,
    /// Toolkit wiring run once per binding at start.
    pub adapter: Option<Box<dyn ToolkitAdapter>>,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("policy", &self.policy)
            .field("on_error", &self.on_error.is_some())
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&HandlerError) + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: impl ToolkitAdapter + 'static) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    #[must_use]
    pub fn supersede(mut self, policy: SupersedePolicy) -> Self {
        self.policy.supersede = policy;
        self
    }

    pub(crate) fn wire(&self, descriptor: &BindingDescriptor) {
        if let Some(adapter) = &self.adapter {
            adapter.wire(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let policy = EnginePolicy::default();
        assert!(policy.validate().is_empty());
        assert_eq!(policy.supersede, SupersedePolicy::RunToCompletion);
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        let policy = EnginePolicy {
            max_queue_depth: 0,
            worker_name_prefix: " ".into(),
            ..EnginePolicy::default()
        };
        let Err(ConfigError::Validation(errors)) = policy.validated() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn builder_sets_hooks() {
        let config = EngineConfig::default()
            .on_error(|_| {})
            .supersede(SupersedePolicy::CancelPrevious);
        assert!(config.on_error.is_some());
        assert!(config.adapter.is_none());
        assert_eq!(config.policy.supersede, SupersedePolicy::CancelPrevious);
    }

    #[cfg(feature = "config-file")]
    mod file {
        use super::*;
        use std::io::Write;

        #[test]
        fn toml_partial_uses_defaults() {
            let policy = EnginePolicy::from_toml_str("supersede = \"cancel_previous\"").unwrap();
            assert_eq!(policy.supersede, SupersedePolicy::CancelPrevious);
            assert_eq!(policy.max_queue_depth, 1024);
        }

        #[test]
        fn json_file_round_trip() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, r#"{{"max_queue_depth": 8, "worker_name_prefix": "w"}}"#).unwrap();
            let policy = EnginePolicy::from_json_file(file.path()).unwrap();
            assert_eq!(policy.max_queue_depth, 8);
            assert_eq!(policy.worker_name_prefix, "w");
        }

        #[test]
        fn toml_round_trips() {
            let policy = EnginePolicy {
                supersede: SupersedePolicy::CancelPrevious,
                ..EnginePolicy::default()
            };
            let text = policy.to_toml_string().unwrap();
            assert_eq!(EnginePolicy::from_toml_str(&text).unwrap(), policy);
        }

        #[test]
        fn invalid_toml_file_reports_validation() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "max_queue_depth = 0").unwrap();
            assert!(matches!(
                EnginePolicy::from_toml_file(file.path()),
                Err(ConfigError::Validation(_))
            ));
        }
    }
}
