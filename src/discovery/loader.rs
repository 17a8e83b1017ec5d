//! Seams to the host: loading sources and looking up code locations.

use std::{collections::HashMap, sync::Arc};

use crate::{discovery::model::TestAssembly, Error, Result};

/// Turns a source identifier (usually a file path) into a loaded [`TestAssembly`].
pub trait AssemblyLoader: Send + Sync {
    /// Load `source`.
    ///
    /// # Errors
    /// Returns [`Error::Load`] when the source cannot be read.
    fn load(&self, source: &str) -> Result<TestAssembly>;
}

/// A loader over assemblies that are already in memory, keyed by source.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    assemblies: HashMap<String, TestAssembly>,
}

impl StaticLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `assembly` loadable under its own source.
    #[must_use]
    pub fn with_assembly(mut self, assembly: TestAssembly) -> Self {
        self.assemblies.insert(assembly.source.clone(), assembly);
        self
    }
}

impl AssemblyLoader for StaticLoader {
    fn load(&self, source: &str) -> Result<TestAssembly> {
        self.assemblies.get(source).cloned().ok_or_else(|| Error::Load {
            source_name: source.to_string(),
            message: "no such assembly".to_string(),
        })
    }
}

/// Sources that are never loaded: framework and tooling assemblies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    /// File name prefixes to skip
    pub ignored_prefixes: Vec<String>,
    /// Exact file names to skip
    pub ignored_names: Vec<String>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        SourceFilter {
            ignored_prefixes: ["Microsoft.", "System.", "Newtonsoft.", "NuGet."]
                .map(String::from)
                .to_vec(),
            ignored_names: ["testhost.dll", "testhost.exe", "TestKitchen.dll"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl SourceFilter {
    /// A filter that ignores nothing.
    #[must_use]
    pub fn none() -> Self {
        SourceFilter {
            ignored_prefixes: Vec::new(),
            ignored_names: Vec::new(),
        }
    }

    /// Returns true if `source` should not be loaded. Only the file name is compared.
    #[must_use]
    pub fn is_ignored(&self, source: &str) -> bool {
        let file_name = file_name(source);
        self.ignored_names.iter().any(|name| name == file_name)
            || self
                .ignored_prefixes
                .iter()
                .any(|prefix| file_name.starts_with(prefix.as_str()))
    }
}

/// The last component of `source`, or `source` itself.
///
/// Both `/` and `\` separate components, whatever the host platform.
#[must_use]
pub fn file_name(source: &str) -> &str {
    source
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(source)
}

/// Where a test lives in source code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationData {
    /// Source file
    pub file_path: String,
    /// 1-based line
    pub line: u32,
}

/// Looks up code locations for test methods.
pub trait NavigationSource: Send + Sync {
    /// Location of `method` on `type_name` in `source`, if known.
    fn navigation_data(&self, source: &str, type_name: &str, method: &str) -> Option<NavigationData>;
}

impl<F> NavigationSource for F
where
    F: Fn(&str, &str, &str) -> Option<NavigationData> + Send + Sync,
{
    fn navigation_data(&self, source: &str, type_name: &str, method: &str) -> Option<NavigationData> {
        self(source, type_name, method)
    }
}

/// A navigation source that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNavigation;

impl NavigationSource for NoNavigation {
    fn navigation_data(&self, _: &str, _: &str, _: &str) -> Option<NavigationData> {
        None
    }
}

/// A navigation table keyed by `{type}.{method}`.
#[derive(Debug, Default, Clone)]
pub struct NavigationTable {
    entries: HashMap<String, NavigationData>,
}

impl NavigationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `type_name.method` lives.
    #[must_use]
    pub fn with_entry(mut self, type_name: &str, method: &str, file_path: &str, line: u32) -> Self {
        self.entries.insert(
            format!("{type_name}.{method}"),
            NavigationData {
                file_path: file_path.to_string(),
                line,
            },
        );
        self
    }

    /// Share as a trait object.
    #[must_use]
    pub fn shared(self) -> Arc<dyn NavigationSource> {
        Arc::new(self)
    }
}

impl NavigationSource for NavigationTable {
    fn navigation_data(&self, _source: &str, type_name: &str, method: &str) -> Option<NavigationData> {
        self.entries.get(&format!("{type_name}.{method}")).cloned()
    }
}
