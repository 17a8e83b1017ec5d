//! # testkitchen Prelude
//!
//! The types needed to describe test assemblies, discover them and run them. Import this
//! module to get everything a typical host or test suite touches.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all testkitchen operations
pub use crate::Error;

/// The result type used throughout testkitchen
pub use crate::Result;

// ================================================================================================
// Describing Tests
// ================================================================================================

/// The reflection model a loader produces
pub use crate::discovery::{
    ConstructorKind, ReturnKind, TestAssembly, TestMethod, TestType, Visibility,
};

/// Loading and code locations
pub use crate::discovery::{AssemblyLoader, NavigationData, NavigationSource, StaticLoader};

// ================================================================================================
// Discovery
// ================================================================================================

/// Catalog, conventions and name lookup
pub use crate::discovery::{MethodTable, SourceFilter, TestCatalog, TestConvention};

// ================================================================================================
// Running Tests
// ================================================================================================

/// What a test body sees
pub use crate::context::{RandomFill, TestContext};

/// Service scopes
pub use crate::fixture::{ServiceCollection, ServiceProvider, ServiceRegistry, TestFixture};

/// The engine and its reporting interfaces
pub use crate::engine::{
    CollectingHandle, EngineConfig, ExecutionEngine, FrameworkHandle, MessageCategory,
    MessageLevel, MessageSink, TestCase, TestOutcome, TestResult,
};

// ================================================================================================
// Exception Coverage
// ================================================================================================

/// Analyzer and its configuration
pub use crate::analysis::{AnalyzerConfig, CoverageVerdict, ExceptionFlowAnalyzer, FoldMode};

/// Decoded method bodies
pub use crate::assembly::{ExceptionHandlerRegion, InstructionStream};

/// Type references and token resolution
pub use crate::metadata::typeref::{MemberRef, TokenResolver, TokenTable, TypeRef};
