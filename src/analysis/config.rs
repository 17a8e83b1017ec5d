//! Configuration for the exception-flow analyzer.

use crate::metadata::typeref::ROOT_EXCEPTION;

/// How resolved exception types are accumulated within one analyzed scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoldMode {
    /// At most one thrown and one handled entry per declaring type; the first resolved type
    /// wins and later ones are dropped.
    #[default]
    DeclaringType,
    /// Every distinct resolved type is kept.
    Precise,
}

/// Configuration for [`crate::analysis::ExceptionFlowAnalyzer`].
///
/// The default reproduces the coarse accounting the coverage check has always used:
/// per-type folding and exact-type suppression of unhandled entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Accumulation mode (default: [`FoldMode::DeclaringType`]).
    pub fold: FoldMode,

    /// Treat a thrown type as handled when a handler for one of its base types exists
    /// (default: `false`, exact equality only).
    pub subtype_aware_unhandled: bool,

    /// Catch types must derive from this type to count as handled
    /// (default: `System.Exception`).
    pub root_exception: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fold: FoldMode::DeclaringType,
            subtype_aware_unhandled: false,
            root_exception: ROOT_EXCEPTION.to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-method, multi-type accounting with subtype-aware suppression.
    #[must_use]
    pub fn precise() -> Self {
        Self {
            fold: FoldMode::Precise,
            subtype_aware_unhandled: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = AnalyzerConfig::new();
        assert_eq!(default.fold, FoldMode::DeclaringType);
        assert!(!default.subtype_aware_unhandled);
        assert_eq!(default.root_exception, "System.Exception");

        let precise = AnalyzerConfig::precise();
        assert_eq!(precise.fold, FoldMode::Precise);
        assert!(precise.subtype_aware_unhandled);
        assert_eq!(precise.root_exception, default.root_exception);
    }
}
