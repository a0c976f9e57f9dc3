//! Execution-context configuration.

use serde::{Deserialize, Serialize};

use kiln_core::{ExecError, Result};

/// Default number of compiled programs an execution context can hold.
pub const DEFAULT_PROGRAM_CACHE_CAPACITY: usize = 1024;
/// Default number of extracted kernels an execution context can hold.
pub const DEFAULT_KERNEL_CACHE_CAPACITY: usize = 4096;

/// Configuration for an [`ExecutionContext`](crate::ExecutionContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Fixed capacity of the compiled-program cache.
    pub program_cache_capacity: usize,

    /// Fixed capacity of the compiled-kernel cache.
    pub kernel_cache_capacity: usize,

    /// Allow the interop backend when the device lacks native compilation.
    /// When disabled, every program goes through the native backend without
    /// probing the device.
    pub interop_enabled: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            program_cache_capacity: DEFAULT_PROGRAM_CACHE_CAPACITY,
            kernel_cache_capacity: DEFAULT_KERNEL_CACHE_CAPACITY,
            interop_enabled: true,
        }
    }
}

impl ExecConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ExecConfig = serde_json::from_str(json)
            .map_err(|e| ExecError::InvalidConfig(format!("malformed JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.program_cache_capacity == 0 {
            return Err(ExecError::InvalidConfig("program_cache_capacity must be > 0".into()));
        }
        if self.kernel_cache_capacity == 0 {
            return Err(ExecError::InvalidConfig("kernel_cache_capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.program_cache_capacity, 1024);
        assert_eq!(config.kernel_cache_capacity, 4096);
        assert!(config.interop_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = ExecConfig::from_json(r#"{ "kernel_cache_capacity": 8, "interop_enabled": false }"#).unwrap();
        assert_eq!(config.program_cache_capacity, DEFAULT_PROGRAM_CACHE_CAPACITY);
        assert_eq!(config.kernel_cache_capacity, 8);
        assert!(!config.interop_enabled);
    }

    #[test]
    fn test_from_json_rejects_zero_capacity() {
        let err = ExecConfig::from_json(r#"{ "program_cache_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ExecError::InvalidConfig(msg) if msg.contains("program_cache_capacity")));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            ExecConfig::from_json("{ not json"),
            Err(ExecError::InvalidConfig(_))
        ));
    }
}
