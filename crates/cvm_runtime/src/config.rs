use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-execution limits. Protocol constants (tags, chunk size, juice
/// schedule) are fixed and never come from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Juice a fresh context starts with.
    pub juice_limit: u64,
    /// Maximum nesting of op evaluation before `:DEPTH` is raised.
    pub max_depth: usize,
    /// Whether errors leaving a closure record `In function: <name>`.
    pub record_trace: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { juice_limit: 1_000_000, max_depth: 256, record_trace: true }
    }
}

impl RuntimeConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn with_juice(mut self, juice_limit: u64) -> Self {
        self.juice_limit = juice_limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = RuntimeConfig::from_json(r#"{"juice_limit": 500}"#).unwrap();
        assert_eq!(cfg.juice_limit, 500);
        assert_eq!(cfg.max_depth, 256);
        assert!(cfg.record_trace);
        assert_eq!(RuntimeConfig::from_json("{}").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = RuntimeConfig::from_json(r#"{"fuel": 1}"#).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
