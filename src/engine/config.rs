//! Configuration for the execution engine.

use crate::analysis::AnalyzerConfig;

/// Configuration for the execution engine.
///
/// Controls the exception-coverage analysis used by virtual cases, the seed of the random
/// helpers on the test context, and how diagnostic output is captured.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settings for the exception-coverage analyzer.
    pub analyzer: AnalyzerConfig,

    /// Seed for the context's random helpers. `None` seeds from the clock (default).
    pub random_seed: Option<u64>,

    /// Also write every leveled message into the trace buffer, so it ends up in the captured
    /// output of the current result (default: true).
    pub mirror_messages_to_trace: bool,

    /// Attach the trace buffer for the run and drain it into each result (default: true).
    pub capture_trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            random_seed: None,
            mirror_messages_to_trace: true,
            capture_trace: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed random seed, everything else default. Useful when results must be reproducible.
    #[must_use]
    pub fn deterministic(seed: u64) -> Self {
        Self {
            random_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Sets the analyzer configuration.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Enables or disables mirroring messages into the trace buffer.
    #[must_use]
    pub fn with_message_mirroring(mut self, enable: bool) -> Self {
        self.mirror_messages_to_trace = enable;
        self
    }

    /// Enables or disables trace capture.
    #[must_use]
    pub fn with_trace_capture(mut self, enable: bool) -> Self {
        self.capture_trace = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FoldMode;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.analyzer.fold, FoldMode::DeclaringType);
        assert!(config.random_seed.is_none());
        assert!(config.mirror_messages_to_trace);
        assert!(config.capture_trace);
    }

    #[test]
    fn presets() {
        let config = EngineConfig::deterministic(9).with_trace_capture(false);
        assert_eq!(config.random_seed, Some(9));
        assert_eq!(config.analyzer, AnalyzerConfig::default());
        assert!(!config.capture_trace);

        let precise = EngineConfig::deterministic(9).with_analyzer(AnalyzerConfig::precise());
        assert_eq!(precise.analyzer.fold, FoldMode::Precise);
        assert_eq!(precise.random_seed, Some(9));
    }
}
