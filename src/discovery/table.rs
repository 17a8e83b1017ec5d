//! Qualified-name lookup, built once per set of loaded sources.
//!
//! The engine receives test cases by name. [`MethodTable`] maps `"{type}.{method}"` to the
//! declaring type and an invocable handle, so the engine never walks assemblies itself.

use std::{collections::HashMap, sync::Arc};

use crate::{
    discovery::model::{MethodHandle, TestAssembly, TestType, Visibility},
    metadata::typeref::TokenResolver,
    Error, Result,
};

/// A type known to a [`MethodTable`].
#[derive(Clone)]
pub struct TypeEntry {
    /// The type
    pub ty: Arc<TestType>,
    /// Resolves tokens in the type's method bodies
    pub resolver: Arc<dyn TokenResolver>,
    /// The source the type was loaded from
    pub source: String,
}

/// A successfully resolved qualified name.
#[derive(Clone, Debug)]
pub struct ResolvedMethod {
    /// Declaring type
    pub ty: Arc<TestType>,
    /// Method name
    pub method: String,
    /// Invocable body
    pub handle: MethodHandle,
}

/// Split `"{type}.{method}"` at the last dot.
///
/// # Errors
/// Returns [`Error::InvalidTestName`] when either part is empty.
pub fn split_qualified_name(name: &str) -> Result<(&str, &str)> {
    match name.rsplit_once('.') {
        Some((type_name, method)) if !type_name.is_empty() && !method.trim().is_empty() => {
            Ok((type_name, method))
        }
        _ => Err(Error::InvalidTestName(name.to_string())),
    }
}

/// Types by full name, across every registered assembly.
#[derive(Default, Clone)]
pub struct MethodTable {
    types: HashMap<String, TypeEntry>,
}

impl MethodTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every type of `assembly`. A type name registered twice keeps the first entry.
    pub fn add_assembly(&mut self, assembly: &TestAssembly) {
        for ty in &assembly.types {
            self.types
                .entry(ty.full_name.clone())
                .or_insert_with(|| TypeEntry {
                    ty: ty.clone(),
                    resolver: assembly.resolver.clone(),
                    source: assembly.source.clone(),
                });
        }
    }

    /// Builder form of [`MethodTable::add_assembly`].
    #[must_use]
    pub fn with_assembly(mut self, assembly: &TestAssembly) -> Self {
        self.add_assembly(assembly);
        self
    }

    /// Look up a type by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeEntry> {
        self.types.get(full_name)
    }

    /// Number of known types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolve a qualified test name to a public instance method declared on its type.
    ///
    /// # Errors
    /// [`Error::InvalidTestName`] if the name does not split, [`Error::TypeNotFound`] if no
    /// such type is registered, [`Error::MethodNotFound`] if the type has no matching
    /// invocable method.
    pub fn resolve(&self, qualified_name: &str) -> Result<ResolvedMethod> {
        let (type_name, method_name) = split_qualified_name(qualified_name)?;

        let entry = self
            .find_type(type_name)
            .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;

        let handle = entry
            .ty
            .methods
            .iter()
            .find(|method| {
                method.name == method_name
                    && method.is_declared_only()
                    && method.visibility == Visibility::Public
                    && !method.is_static
            })
            .and_then(|method| method.handle.clone())
            .ok_or_else(|| Error::MethodNotFound {
                type_name: type_name.to_string(),
                method: method_name.to_string(),
            })?;

        Ok(ResolvedMethod {
            ty: entry.ty.clone(),
            method: method_name.to_string(),
            handle,
        })
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("MethodTable").field("types", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::model::TestMethod;

    struct Sample;

    fn assembly() -> TestAssembly {
        TestAssembly::new("Demo", "Demo.dll").with_type(
            TestType::builder::<Sample>("Demo.Inner.SampleTests")
                .default_constructor(|| Sample)
                .test("Works", |_| Ok(true))
                .method(TestMethod::new("Hidden").with_visibility(Visibility::Private))
                .build(),
        )
    }

    #[test]
    fn splits_at_last_dot() {
        assert_eq!(
            split_qualified_name("Demo.Inner.SampleTests.Works").unwrap(),
            ("Demo.Inner.SampleTests", "Works")
        );
        assert!(matches!(
            split_qualified_name("NoDots"),
            Err(Error::InvalidTestName(_))
        ));
        assert!(matches!(
            split_qualified_name("Demo.SampleTests."),
            Err(Error::InvalidTestName(_))
        ));
    }

    #[test]
    fn resolves_known_methods() {
        let table = MethodTable::new().with_assembly(&assembly());
        let resolved = table.resolve("Demo.Inner.SampleTests.Works").unwrap();
        assert_eq!(resolved.ty.full_name, "Demo.Inner.SampleTests");
        assert_eq!(resolved.method, "Works");
        assert_eq!(table.find_type("Demo.Inner.SampleTests").unwrap().source, "Demo.dll");
    }

    #[test]
    fn diagnoses_failures() {
        let table = MethodTable::new().with_assembly(&assembly());

        assert!(matches!(
            table.resolve("Demo.Missing.Works"),
            Err(Error::TypeNotFound(name)) if name == "Demo.Missing"
        ));
        assert!(matches!(
            table.resolve("Demo.Inner.SampleTests.Nope"),
            Err(Error::MethodNotFound { method, .. }) if method == "Nope"
        ));
        assert!(matches!(
            table.resolve("Demo.Inner.SampleTests.Hidden"),
            Err(Error::MethodNotFound { .. })
        ));
    }
}
