//! Enumerating test cases from sources.

use std::{collections::HashSet, fmt, sync::Arc};

use crate::{
    discovery::{
        convention::TestConvention,
        loader::{AssemblyLoader, NavigationSource, NoNavigation, SourceFilter},
        model::{MethodHandle, TestAssembly, TestType},
        table::MethodTable,
    },
    engine::{MessageSink, TestCase},
};

/// A discovered standard test and the handle that runs it.
#[derive(Debug, Clone)]
pub struct DiscoveredTest {
    /// Identity as advertised to the host
    pub case: TestCase,
    /// The body to invoke
    pub handle: MethodHandle,
}

/// What one discovery pass has already emitted.
///
/// Share a single value across every source of a run so that a test, or a test class's
/// coverage case, reached through more than one source is emitted once.
#[derive(Debug, Default)]
pub struct Visited {
    tests: HashSet<(String, String)>,
    containers: HashSet<String>,
}

impl Visited {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Loads sources and applies the conventions to them.
///
/// Every convention registered with [`TestCatalog::with_convention`] is consulted; a
/// `(type, method)` pair is emitted at most once per discovery pass no matter how many
/// conventions or sources reach it. The per-assembly methods take the pass's [`Visited`]
/// record explicitly.
pub struct TestCatalog {
    loader: Arc<dyn AssemblyLoader>,
    conventions: Vec<TestConvention>,
    filter: SourceFilter,
    navigation: Arc<dyn NavigationSource>,
}

impl TestCatalog {
    /// A catalog with the default convention and ignore list.
    #[must_use]
    pub fn new(loader: impl AssemblyLoader + 'static) -> Self {
        TestCatalog {
            loader: Arc::new(loader),
            conventions: vec![TestConvention::default()],
            filter: SourceFilter::default(),
            navigation: Arc::new(NoNavigation),
        }
    }

    /// Replace all conventions with `convention`.
    #[must_use]
    pub fn with_convention(mut self, convention: TestConvention) -> Self {
        self.conventions = vec![convention];
        self
    }

    /// Consult `convention` in addition to the ones already registered.
    #[must_use]
    pub fn add_convention(mut self, convention: TestConvention) -> Self {
        self.conventions.push(convention);
        self
    }

    /// Replace the source ignore list.
    #[must_use]
    pub fn with_source_filter(mut self, filter: SourceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Use `navigation` to fill in code locations.
    #[must_use]
    pub fn with_navigation(mut self, navigation: impl NavigationSource + 'static) -> Self {
        self.navigation = Arc::new(navigation);
        self
    }

    /// Load `source` if it is eligible for discovery.
    ///
    /// Ignored sources are skipped silently. Load failures are reported as errors and the
    /// source is skipped. The adapter's own assembly and dynamic assemblies are skipped after
    /// loading.
    pub fn load_source(&self, source: &str, sink: &dyn MessageSink) -> Option<TestAssembly> {
        if self.filter.is_ignored(source) {
            log::debug!("Ignoring source {source}");
            return None;
        }

        let assembly = match self.loader.load(source) {
            Ok(assembly) => assembly,
            Err(error) => {
                sink.error(&error.to_string());
                return None;
            }
        };

        if assembly.is_adapter || assembly.is_dynamic {
            return None;
        }

        sink.info(&format!("Probing source: {source}"));
        Some(assembly)
    }

    /// Standard test cases in every eligible source.
    pub fn discover<'s>(
        &self,
        sources: impl IntoIterator<Item = &'s str>,
        sink: &dyn MessageSink,
    ) -> Vec<DiscoveredTest> {
        let mut visited = Visited::new();
        let mut tests = Vec::new();

        for source in sources {
            if let Some(assembly) = self.load_source(source, sink) {
                self.collect(&assembly, &mut visited, &mut tests, sink);
            }
        }
        tests
    }

    /// Standard test cases in an already loaded assembly that `visited` has not seen yet.
    pub fn discover_assembly(
        &self,
        assembly: &TestAssembly,
        visited: &mut Visited,
        sink: &dyn MessageSink,
    ) -> Vec<DiscoveredTest> {
        let mut tests = Vec::new();
        self.collect(assembly, visited, &mut tests, sink);
        tests
    }

    /// One exception-coverage case per test class with at least one test, across every
    /// eligible source.
    pub fn discover_virtual<'s>(
        &self,
        sources: impl IntoIterator<Item = &'s str>,
        sink: &dyn MessageSink,
    ) -> Vec<TestCase> {
        let mut visited = Visited::new();
        sources
            .into_iter()
            .filter_map(|source| self.load_source(source, sink))
            .flat_map(|assembly| self.virtual_cases(&assembly, &mut visited))
            .collect()
    }

    /// Exception-coverage cases for an already loaded assembly, skipping test classes
    /// `visited` has already covered.
    pub fn virtual_cases(&self, assembly: &TestAssembly, visited: &mut Visited) -> Vec<TestCase> {
        Self::ordered(assembly)
            .into_iter()
            .filter(|ty| {
                self.conventions.iter().any(|convention| {
                    convention.is_test_assembly(assembly)
                        && convention.is_test_class(ty)
                        && ty
                            .methods
                            .iter()
                            .any(|method| convention.is_test_method(ty, method))
                })
            })
            .filter(|ty| visited.containers.insert(ty.full_name.clone()))
            .map(|ty| TestCase::exception_coverage(&ty.full_name, &assembly.source))
            .collect()
    }

    /// A lookup table over every eligible source.
    pub fn method_table<'s>(
        &self,
        sources: impl IntoIterator<Item = &'s str>,
        sink: &dyn MessageSink,
    ) -> MethodTable {
        let mut table = MethodTable::new();
        for source in sources {
            if let Some(assembly) = self.load_source(source, sink) {
                table.add_assembly(&assembly);
            }
        }
        table
    }

    /// Abstract types first, otherwise definition order.
    fn ordered(assembly: &TestAssembly) -> Vec<&Arc<TestType>> {
        let mut types: Vec<_> = assembly.types.iter().collect();
        types.sort_by_key(|ty| !ty.is_abstract);
        types
    }

    fn collect(
        &self,
        assembly: &TestAssembly,
        visited: &mut Visited,
        tests: &mut Vec<DiscoveredTest>,
        sink: &dyn MessageSink,
    ) {
        for convention in &self.conventions {
            if !convention.is_test_assembly(assembly) {
                continue;
            }

            for ty in Self::ordered(assembly) {
                if !convention.is_test_class(ty) {
                    continue;
                }

                for method in &ty.methods {
                    if !convention.is_test_method(ty, method) {
                        continue;
                    }
                    let Some(handle) = method.handle.clone() else {
                        log::debug!("{}.{} has no invocable body", ty.full_name, method.name);
                        continue;
                    };
                    if !visited.tests.insert((ty.full_name.clone(), method.name.clone())) {
                        continue;
                    }

                    sink.info(&format!("Found test: {}.{}", ty.full_name, method.name));
                    tests.push(DiscoveredTest {
                        case: self.create_case(ty, &method.name, &assembly.source, sink),
                        handle,
                    });
                }
            }
        }
    }

    fn create_case(&self, ty: &TestType, method: &str, source: &str, sink: &dyn MessageSink) -> TestCase {
        let case = TestCase::standard(&ty.full_name, method, source);
        sink.info(&format!("Creating test case for {}", case.fully_qualified_name));

        match self.navigation.navigation_data(source, &ty.full_name, method) {
            Some(data) => case.with_location(data.file_path, data.line),
            None => case,
        }
    }
}

impl fmt::Debug for TestCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCatalog")
            .field("conventions", &self.conventions.len())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
