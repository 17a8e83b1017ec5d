//! Replaceable discovery policy.
//!
//! Three independent predicates decide what is a test: which assemblies are searched, which
//! types are test containers, and which of their methods are test cases. [`TestConvention`]
//! composes them with logical AND. Each can be swapped for a closure or another
//! implementation without touching the catalog or the engine.

use std::{fmt, sync::Arc};

use crate::discovery::model::{ReturnKind, TestAssembly, TestMethod, TestType, Visibility};

/// Decides which assemblies are searched for tests.
pub trait AssemblyFilterConvention: Send + Sync {
    /// Returns true if `assembly` should be searched.
    fn include_assembly(&self, assembly: &TestAssembly) -> bool;
}

/// Decides which types are test containers.
pub trait ClassFilterConvention: Send + Sync {
    /// Returns true if `ty` holds tests.
    fn include_class(&self, ty: &TestType) -> bool;
}

/// Decides which methods of a test container are tests.
pub trait MethodFilterConvention: Send + Sync {
    /// Returns true if `method` on `ty` is a test.
    fn include_method(&self, ty: &TestType, method: &TestMethod) -> bool;
}

impl<F> AssemblyFilterConvention for F
where
    F: Fn(&TestAssembly) -> bool + Send + Sync,
{
    fn include_assembly(&self, assembly: &TestAssembly) -> bool {
        self(assembly)
    }
}

impl<F> ClassFilterConvention for F
where
    F: Fn(&TestType) -> bool + Send + Sync,
{
    fn include_class(&self, ty: &TestType) -> bool {
        self(ty)
    }
}

impl<F> MethodFilterConvention for F
where
    F: Fn(&TestType, &TestMethod) -> bool + Send + Sync,
{
    fn include_method(&self, ty: &TestType, method: &TestMethod) -> bool {
        self(ty, method)
    }
}

/// Skips assemblies generated at runtime or by a compiler.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAssemblyFilter;

impl AssemblyFilterConvention for DefaultAssemblyFilter {
    fn include_assembly(&self, assembly: &TestAssembly) -> bool {
        !assembly.is_dynamic && !assembly.is_compiler_generated
    }
}

/// Accepts types whose simple name ends with `Test` or `Tests`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassFilter;

impl ClassFilterConvention for DefaultClassFilter {
    fn include_class(&self, ty: &TestType) -> bool {
        let name = ty.name();
        name.ends_with("Test") || name.ends_with("Tests")
    }
}

/// Accepts public instance methods declared on the type itself that return a verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMethodFilter;

impl MethodFilterConvention for DefaultMethodFilter {
    fn include_method(&self, _ty: &TestType, method: &TestMethod) -> bool {
        method.is_declared_only()
            && method.visibility == Visibility::Public
            && !method.is_static
            && matches!(method.returns, ReturnKind::Bool | ReturnKind::AwaitableBool)
    }
}

/// The three discovery predicates.
///
/// # Examples
///
/// ```rust
/// use testkitchen::discovery::{TestConvention, TestType};
///
/// let convention = TestConvention::default()
///     .with_class_filter(|ty: &TestType| ty.full_name.starts_with("Demo."));
///
/// let ty = TestType::builder::<()>("Demo.Anything").build();
/// assert!(convention.is_test_class(&ty));
/// ```
#[derive(Clone)]
pub struct TestConvention {
    assemblies: Arc<dyn AssemblyFilterConvention>,
    classes: Arc<dyn ClassFilterConvention>,
    methods: Arc<dyn MethodFilterConvention>,
}

impl Default for TestConvention {
    fn default() -> Self {
        TestConvention {
            assemblies: Arc::new(DefaultAssemblyFilter),
            classes: Arc::new(DefaultClassFilter),
            methods: Arc::new(DefaultMethodFilter),
        }
    }
}

impl TestConvention {
    /// Replace the assembly filter.
    #[must_use]
    pub fn with_assembly_filter(mut self, filter: impl AssemblyFilterConvention + 'static) -> Self {
        self.assemblies = Arc::new(filter);
        self
    }

    /// Replace the class filter.
    #[must_use]
    pub fn with_class_filter(mut self, filter: impl ClassFilterConvention + 'static) -> Self {
        self.classes = Arc::new(filter);
        self
    }

    /// Replace the method filter.
    #[must_use]
    pub fn with_method_filter(mut self, filter: impl MethodFilterConvention + 'static) -> Self {
        self.methods = Arc::new(filter);
        self
    }

    /// Assembly filter.
    #[must_use]
    pub fn is_test_assembly(&self, assembly: &TestAssembly) -> bool {
        self.assemblies.include_assembly(assembly)
    }

    /// Class filter.
    #[must_use]
    pub fn is_test_class(&self, ty: &TestType) -> bool {
        self.classes.include_class(ty)
    }

    /// Method filter. Does not re-check the class.
    #[must_use]
    pub fn is_test_method(&self, ty: &TestType, method: &TestMethod) -> bool {
        self.methods.include_method(ty, method)
    }

    /// All three predicates together.
    #[must_use]
    pub fn is_test(&self, assembly: &TestAssembly, ty: &TestType, method: &TestMethod) -> bool {
        self.is_test_assembly(assembly) && self.is_test_class(ty) && self.is_test_method(ty, method)
    }
}

impl fmt::Debug for TestConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConvention").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> TestType {
        TestType::builder::<()>(name).build()
    }

    #[test]
    fn class_names() {
        let convention = TestConvention::default();
        assert!(convention.is_test_class(&ty("Demo.MathTests")));
        assert!(convention.is_test_class(&ty("Demo.ParserTest")));
        assert!(!convention.is_test_class(&ty("Demo.Testing")));
        assert!(!convention.is_test_class(&ty("Demo.Tests.Helper")));
    }

    #[test]
    fn method_shapes() {
        let convention = TestConvention::default();
        let owner = ty("Demo.MathTests");
        let verdict = TestMethod::new("Adds").returning(ReturnKind::Bool);

        assert!(convention.is_test_method(&owner, &verdict));
        assert!(convention.is_test_method(
            &owner,
            &TestMethod::new("Later").returning(ReturnKind::AwaitableBool)
        ));
        assert!(!convention.is_test_method(&owner, &TestMethod::new("Helper")));
        assert!(!convention.is_test_method(
            &owner,
            &verdict.clone().with_visibility(Visibility::Private)
        ));
        assert!(!convention.is_test_method(&owner, &verdict.clone().as_static()));
        assert!(!convention.is_test_method(&owner, &verdict.inherited_from("Demo.BaseTests")));
    }

    #[test]
    fn assemblies() {
        let convention = TestConvention::default();
        let mut assembly = TestAssembly::new("Demo", "Demo.dll");
        assert!(convention.is_test_assembly(&assembly));

        assembly.is_dynamic = true;
        assert!(!convention.is_test_assembly(&assembly));

        assembly.is_dynamic = false;
        assembly.is_compiler_generated = true;
        assert!(!convention.is_test_assembly(&assembly));
    }

    #[test]
    fn filters_are_replaceable() {
        let convention = TestConvention::default()
            .with_assembly_filter(|_: &TestAssembly| true)
            .with_method_filter(|_: &TestType, method: &TestMethod| method.name.starts_with("Check"));

        let owner = ty("Demo.MathTests");
        let mut assembly = TestAssembly::new("Demo", "Demo.dll");
        assembly.is_dynamic = true;

        assert!(convention.is_test(&assembly, &owner, &TestMethod::new("CheckSum")));
        assert!(!convention.is_test(&assembly, &owner, &TestMethod::new("Sum")));
        assert!(!convention.is_test(&assembly, &ty("Demo.Math"), &TestMethod::new("CheckSum")));
    }
}
