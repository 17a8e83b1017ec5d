//! Finding tests.
//!
//! Sources are loaded through an [`AssemblyLoader`] into [`TestAssembly`] descriptions.
//! [`TestCatalog`] applies a [`TestConvention`] to them and yields [`TestCase`]s, plus one
//! virtual exception-coverage case per test class. [`MethodTable`] maps qualified names
//! back to invocable handles for the engine.
//!
//! [`TestCase`]: crate::engine::TestCase

mod catalog;
mod convention;
mod loader;
mod model;
mod table;

pub use catalog::{DiscoveredTest, TestCatalog, Visited};
pub use convention::{
    AssemblyFilterConvention, ClassFilterConvention, DefaultAssemblyFilter, DefaultClassFilter,
    DefaultMethodFilter, MethodFilterConvention, TestConvention,
};
pub use loader::{
    file_name, AssemblyLoader, NavigationData, NavigationSource, NavigationTable, NoNavigation,
    SourceFilter, StaticLoader,
};
pub use model::{
    Constructor, ConstructorKind, MethodHandle, ParameterShape, ReturnKind, TestAssembly,
    TestFuture, TestInstance, TestMethod, TestType, TestTypeBuilder, Visibility,
};
pub use table::{split_qualified_name, MethodTable, ResolvedMethod, TypeEntry};
