//! Coverage engine configuration
//!
//! Built in code with [`CoverageConfig::builder`] or loaded from YAML:
//!
//! ```yaml
//! strategy: auto
//! instrument_threshold_bytes: 65536
//! max_call_depth: 500
//! ```

use crate::result::{CovError, CovResult};
use crate::script::MAX_CALL_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default `Auto` threshold above which files are instrumented
pub const DEFAULT_INSTRUMENT_THRESHOLD_BYTES: usize = 64 * 1024;

/// How execution is collected for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Interpreter line hook
    #[default]
    Native,
    /// Rewritten source calling `__cov_track`
    Instrument,
    /// Instrument files above the threshold, hook the rest
    Auto,
}

impl std::str::FromStr for StrategyKind {
    type Err = CovError;

    fn from_str(s: &str) -> CovResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::Native),
            "instrument" => Ok(Self::Instrument),
            "auto" => Ok(Self::Auto),
            other => Err(CovError::config(format!(
                "unknown strategy '{other}' (expected native, instrument or auto)"
            ))),
        }
    }
}

/// Coverage collection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Collection strategy
    pub strategy: StrategyKind,
    /// In `Auto`, files larger than this are instrumented
    pub instrument_threshold_bytes: usize,
    /// Files larger than this are never instrumented
    pub max_instrument_bytes: usize,
    /// Cache rewritten sources by content hash
    pub cache_instrumented: bool,
    /// Keep source text in the store
    pub cache_content: bool,
    /// Interpreter recursion bound, at most [`MAX_CALL_DEPTH`]
    pub max_call_depth: usize,
    /// Passing `assert` calls mark their line covered
    pub mark_assertions: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Native,
            instrument_threshold_bytes: DEFAULT_INSTRUMENT_THRESHOLD_BYTES,
            max_instrument_bytes: super::instrument::DEFAULT_MAX_INSTRUMENT_BYTES,
            cache_instrumented: true,
            cache_content: true,
            max_call_depth: 200,
            mark_assertions: true,
        }
    }
}

impl CoverageConfig {
    /// Create a builder for coverage config
    #[must_use]
    pub fn builder() -> CoverageConfigBuilder {
        CoverageConfigBuilder::default()
    }

    /// Parse YAML, filling unspecified fields with defaults
    pub fn from_yaml(yaml: &str) -> CovResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load YAML from a file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> CovResult<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> CovResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> CovResult<()> {
        if self.max_call_depth == 0 {
            return Err(CovError::config("max_call_depth must be at least 1"));
        }
        if self.max_call_depth > MAX_CALL_DEPTH {
            return Err(CovError::config(format!(
                "max_call_depth {} exceeds the limit of {MAX_CALL_DEPTH}",
                self.max_call_depth
            )));
        }
        if self.max_instrument_bytes == 0 {
            return Err(CovError::config("max_instrument_bytes must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for coverage configuration
#[derive(Debug, Default)]
pub struct CoverageConfigBuilder {
    config: CoverageConfig,
}

impl CoverageConfigBuilder {
    /// Set the collection strategy
    #[must_use]
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the `Auto` instrumentation threshold
    #[must_use]
    pub fn instrument_threshold_bytes(mut self, bytes: usize) -> Self {
        self.config.instrument_threshold_bytes = bytes;
        self
    }

    /// Set the hard instrumentation size limit
    #[must_use]
    pub fn max_instrument_bytes(mut self, bytes: usize) -> Self {
        self.config.max_instrument_bytes = bytes;
        self
    }

    /// Enable the instrumentation cache
    #[must_use]
    pub fn cache_instrumented(mut self, enabled: bool) -> Self {
        self.config.cache_instrumented = enabled;
        self
    }

    /// Keep source text in the store
    #[must_use]
    pub fn cache_content(mut self, enabled: bool) -> Self {
        self.config.cache_content = enabled;
        self
    }

    /// Set the interpreter recursion bound; `build` caps it at [`MAX_CALL_DEPTH`]
    #[must_use]
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.config.max_call_depth = depth;
        self
    }

    /// Mark lines of passing `assert` calls covered
    #[must_use]
    pub fn mark_assertions(mut self, enabled: bool) -> Self {
        self.config.mark_assertions = enabled;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> CoverageConfig {
        let mut config = self.config;
        if config.max_call_depth == 0 {
            config.max_call_depth = CoverageConfig::default().max_call_depth;
        }
        config.max_call_depth = config.max_call_depth.min(MAX_CALL_DEPTH);
        if config.max_instrument_bytes == 0 {
            config.max_instrument_bytes = CoverageConfig::default().max_instrument_bytes;
        }
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = CoverageConfig::default();
        assert_eq!(c.strategy, StrategyKind::Native);
        assert_eq!(c.instrument_threshold_bytes, 65_536);
        assert_eq!(c.max_instrument_bytes, 4 * 1024 * 1024);
        assert!(c.cache_instrumented);
        assert!(c.cache_content);
        assert_eq!(c.max_call_depth, 200);
        assert!(c.mark_assertions);
    }

    #[test]
    fn test_builder() {
        let c = CoverageConfig::builder()
            .strategy(StrategyKind::Auto)
            .instrument_threshold_bytes(10)
            .cache_instrumented(false)
            .max_call_depth(0)
            .mark_assertions(false)
            .build();
        assert_eq!(c.strategy, StrategyKind::Auto);
        assert_eq!(c.instrument_threshold_bytes, 10);
        assert!(!c.cache_instrumented);
        assert_eq!(c.max_call_depth, 200);
        assert!(!c.mark_assertions);
    }

    #[test]
    fn test_builder_caps_call_depth() {
        let c = CoverageConfig::builder().max_call_depth(100_000).build();
        assert_eq!(c.max_call_depth, MAX_CALL_DEPTH);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let c = CoverageConfig::from_yaml("strategy: instrument\nmax_call_depth: 50\n").unwrap();
        assert_eq!(c.strategy, StrategyKind::Instrument);
        assert_eq!(c.max_call_depth, 50);
        assert!(c.cache_content);
    }

    #[test]
    fn test_yaml_round_trip() {
        let c = CoverageConfig::builder().strategy(StrategyKind::Auto).build();
        let back = CoverageConfig::from_yaml(&c.to_yaml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_invalid_yaml_values() {
        assert!(CoverageConfig::from_yaml("max_call_depth: 0").is_err());
        let err = CoverageConfig::from_yaml("max_call_depth: 100000").unwrap_err();
        assert!(matches!(err, CovError::Config { .. }));
        let limit = format!("max_call_depth: {MAX_CALL_DEPTH}");
        assert!(CoverageConfig::from_yaml(&limit).is_ok());
        assert!(CoverageConfig::from_yaml("strategy: sometimes").is_err());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("AUTO".parse::<StrategyKind>().unwrap(), StrategyKind::Auto);
        assert!("fast".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covtrack.yaml");
        std::fs::write(&path, "cache_content: false\n").unwrap();
        let c = CoverageConfig::from_yaml_file(&path).unwrap();
        assert!(!c.cache_content);
    }
}
