//! The reflection model discovery works on.
//!
//! Rust has no runtime reflection, so a test assembly describes itself: a [`TestAssembly`]
//! lists its [`TestType`]s, each with its methods (name, visibility, return shape and an
//! invocable [`MethodHandle`]) and the constructors it offers. [`TestTypeBuilder`] produces
//! this description from ordinary Rust closures.

use std::{
    any::{type_name, Any},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use futures::future::LocalBoxFuture;

use crate::{
    context::TestContext,
    fixture::{ServiceProvider, ServiceRegistry, TestFixture},
    metadata::typeref::{TokenResolver, TokenTable},
};

/// A constructed test container.
pub type TestInstance = Box<dyn Any>;

/// Future returned by an awaitable test body.
pub type TestFuture<'a> = LocalBoxFuture<'a, anyhow::Result<bool>>;

type SyncBody = Arc<dyn Fn(&mut dyn Any, &TestContext<'_>) -> anyhow::Result<bool> + Send + Sync>;

type AsyncBody =
    Arc<dyn for<'a> Fn(&'a mut dyn Any, &'a TestContext<'a>) -> TestFuture<'a> + Send + Sync>;

type ConstructorFn = Arc<dyn Fn(&TestFixture) -> anyhow::Result<TestInstance> + Send + Sync>;

/// An invocable test body, erased over its container type.
#[derive(Clone)]
pub enum MethodHandle {
    /// Returns its verdict directly
    Sync(SyncBody),
    /// Returns a future resolving to the verdict
    Async(AsyncBody),
}

impl MethodHandle {
    /// Invoke against `instance`. Awaitable bodies are driven to completion on this thread.
    ///
    /// # Errors
    /// Whatever the body returns, or an error if `instance` is not the type the body expects.
    pub fn invoke(&self, instance: &mut dyn Any, context: &TestContext<'_>) -> anyhow::Result<bool> {
        match self {
            MethodHandle::Sync(body) => body(instance, context),
            MethodHandle::Async(body) => futures::executor::block_on(body(instance, context)),
        }
    }

    /// Returns true for awaitable bodies.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, MethodHandle::Async(_))
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodHandle::Sync(_) => f.write_str("MethodHandle::Sync"),
            MethodHandle::Async(_) => f.write_str("MethodHandle::Async"),
        }
    }
}

fn erase_async<F>(body: F) -> AsyncBody
where
    F: for<'a> Fn(&'a mut dyn Any, &'a TestContext<'a>) -> TestFuture<'a> + Send + Sync + 'static,
{
    Arc::new(body)
}

fn wrong_instance<T>() -> anyhow::Error {
    anyhow::anyhow!("test instance is not a {}", type_name::<T>())
}

/// Method visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Callable from outside the type
    Public,
    /// Anything narrower than public
    Private,
}

/// What a method returns, as far as the conventions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// `bool`
    Bool,
    /// A future of `bool`
    AwaitableBool,
    /// Anything else
    Other,
}

/// Which arguments a test body takes besides the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterShape {
    /// Only the instance
    Instance,
    /// The instance and the [`TestContext`]
    InstanceAndContext,
}

/// A method on a [`TestType`].
#[derive(Debug, Clone)]
pub struct TestMethod {
    /// Method name
    pub name: String,
    /// Visibility
    pub visibility: Visibility,
    /// True for static methods
    pub is_static: bool,
    /// Full name of the base type that declares this method, `None` when declared on the type
    /// itself
    pub declared_on: Option<String>,
    /// Return shape
    pub returns: ReturnKind,
    /// Parameter shape
    pub parameters: ParameterShape,
    /// Invocable body, absent for methods that are only described
    pub handle: Option<MethodHandle>,
    /// Raw CIL method body (header included), when available for analysis
    pub body: Option<Arc<[u8]>>,
}

impl TestMethod {
    /// A public instance method returning something other than a verdict, without a body.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        TestMethod {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            declared_on: None,
            returns: ReturnKind::Other,
            parameters: ParameterShape::Instance,
            handle: None,
            body: None,
        }
    }

    /// Set the visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark as static.
    #[must_use]
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark as inherited from `base`.
    #[must_use]
    pub fn inherited_from(mut self, base: impl Into<String>) -> Self {
        self.declared_on = Some(base.into());
        self
    }

    /// Set the return shape.
    #[must_use]
    pub fn returning(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    /// Attach a raw method body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Arc<[u8]>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns true if this method is declared directly on its type.
    #[must_use]
    pub fn is_declared_only(&self) -> bool {
        self.declared_on.is_none()
    }
}

/// Constructor shapes, in the order the engine prefers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstructorKind {
    /// Takes the run's [`TestFixture`]
    Fixture,
    /// Takes a service registry
    ServiceCollection,
    /// Takes a service provider
    ServiceProvider,
    /// Takes nothing
    Default,
}

impl ConstructorKind {
    /// The signature logged when this constructor is chosen.
    #[must_use]
    pub fn signature(self, type_name: &str) -> String {
        match self {
            ConstructorKind::Fixture => format!("{type_name}(TestFixture fixture) {{ ... }}"),
            ConstructorKind::ServiceCollection => {
                format!("{type_name}(IServiceCollection services) {{ ... }}")
            }
            ConstructorKind::ServiceProvider => {
                format!("{type_name}(IServiceProvider serviceProvider) {{ ... }}")
            }
            ConstructorKind::Default => format!("{type_name}() {{ ... }}"),
        }
    }
}

/// One constructor of a [`TestType`].
#[derive(Clone)]
pub struct Constructor {
    kind: ConstructorKind,
    factory: ConstructorFn,
}

impl Constructor {
    /// Shape of this constructor.
    #[must_use]
    pub fn kind(&self) -> ConstructorKind {
        self.kind
    }

    /// Run the constructor.
    ///
    /// # Errors
    /// Whatever the constructor reports.
    pub fn construct(&self, fixture: &TestFixture) -> anyhow::Result<TestInstance> {
        (self.factory)(fixture)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A type in a test assembly.
#[derive(Debug, Clone)]
pub struct TestType {
    /// Full name including namespace
    pub full_name: String,
    /// True for abstract types
    pub is_abstract: bool,
    /// Methods in declaration order
    pub methods: Vec<TestMethod>,
    /// Constructors the type offers
    pub constructors: Vec<Constructor>,
}

impl TestType {
    /// Start describing a type whose instances are `T`.
    #[must_use]
    pub fn builder<T: Any>(full_name: impl Into<String>) -> TestTypeBuilder<T> {
        TestTypeBuilder {
            ty: TestType {
                full_name: full_name.into(),
                is_abstract: false,
                methods: Vec::new(),
                constructors: Vec::new(),
            },
            _instance: PhantomData,
        }
    }

    /// Simple name, the segment after the last `.`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(self.full_name.as_str(), |(_, name)| name)
    }

    /// Look up a method by name.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&TestMethod> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// The constructor the engine would choose, by [`ConstructorKind`] priority.
    #[must_use]
    pub fn preferred_constructor(&self) -> Option<&Constructor> {
        self.constructors.iter().min_by_key(|ctor| ctor.kind)
    }
}

/// Typed builder for [`TestType`].
///
/// # Examples
///
/// ```rust
/// use testkitchen::discovery::{ReturnKind, TestType};
///
/// #[derive(Default)]
/// struct MathTests { base: i32 }
///
/// let ty = TestType::builder::<MathTests>("Demo.MathTests")
///     .default_constructor(MathTests::default)
///     .test("Adds_numbers", |tests| Ok(tests.base + 2 == 2))
///     .test_with_context("Skips", |_, context| Ok(context.skip("not today")))
///     .build();
///
/// assert_eq!(ty.name(), "MathTests");
/// assert_eq!(ty.methods.len(), 2);
/// assert_eq!(ty.methods[0].returns, ReturnKind::Bool);
/// ```
pub struct TestTypeBuilder<T> {
    ty: TestType,
    _instance: PhantomData<fn() -> T>,
}

impl<T: Any> TestTypeBuilder<T> {
    /// Mark the type abstract.
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.ty.is_abstract = true;
        self
    }

    fn constructor(mut self, kind: ConstructorKind, factory: ConstructorFn) -> Self {
        self.ty.constructors.push(Constructor { kind, factory });
        self
    }

    /// Add a parameterless constructor.
    #[must_use]
    pub fn default_constructor<F>(self, create: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructor(
            ConstructorKind::Default,
            Arc::new(move |_: &TestFixture| -> anyhow::Result<TestInstance> {
                Ok(Box::new(create()))
            }),
        )
    }

    /// Add a constructor taking the run's fixture.
    #[must_use]
    pub fn fixture_constructor<F>(self, create: F) -> Self
    where
        F: Fn(&TestFixture) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructor(
            ConstructorKind::Fixture,
            Arc::new(move |fixture: &TestFixture| -> anyhow::Result<TestInstance> {
                Ok(Box::new(create(fixture)?))
            }),
        )
    }

    /// Add a constructor taking a service registry.
    #[must_use]
    pub fn services_constructor<F>(self, create: F) -> Self
    where
        F: Fn(&dyn ServiceRegistry) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructor(
            ConstructorKind::ServiceCollection,
            Arc::new(move |fixture: &TestFixture| -> anyhow::Result<TestInstance> {
                Ok(Box::new(create(fixture)?))
            }),
        )
    }

    /// Add a constructor taking a service provider.
    #[must_use]
    pub fn provider_constructor<F>(self, create: F) -> Self
    where
        F: Fn(&dyn ServiceProvider) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructor(
            ConstructorKind::ServiceProvider,
            Arc::new(move |fixture: &TestFixture| -> anyhow::Result<TestInstance> {
                Ok(Box::new(create(fixture)?))
            }),
        )
    }

    /// Add a public instance method returning `bool`.
    #[must_use]
    pub fn test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let handle = MethodHandle::Sync(Arc::new(move |instance: &mut dyn Any, _: &TestContext<'_>| {
            let instance = instance.downcast_mut::<T>().ok_or_else(wrong_instance::<T>)?;
            body(instance)
        }));
        self.verdict_method(name, ReturnKind::Bool, ParameterShape::Instance, handle)
    }

    /// Add a public instance method taking the [`TestContext`] and returning `bool`.
    #[must_use]
    pub fn test_with_context<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut T, &TestContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        let handle = MethodHandle::Sync(Arc::new(
            move |instance: &mut dyn Any, context: &TestContext<'_>| {
                let instance = instance.downcast_mut::<T>().ok_or_else(wrong_instance::<T>)?;
                body(instance, context)
            },
        ));
        self.verdict_method(
            name,
            ReturnKind::Bool,
            ParameterShape::InstanceAndContext,
            handle,
        )
    }

    /// Add a public instance method taking the [`TestContext`] and returning a future of `bool`.
    #[must_use]
    pub fn async_test<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a mut T, &'a TestContext<'a>) -> TestFuture<'a> + Send + Sync + 'static,
    {
        let handle = MethodHandle::Async(erase_async(move |instance, context| {
            match instance.downcast_mut::<T>() {
                Some(instance) => body(instance, context),
                None => Box::pin(futures::future::ready(Err::<bool, _>(wrong_instance::<T>()))),
            }
        }));
        self.verdict_method(
            name,
            ReturnKind::AwaitableBool,
            ParameterShape::InstanceAndContext,
            handle,
        )
    }

    fn verdict_method(
        mut self,
        name: impl Into<String>,
        returns: ReturnKind,
        parameters: ParameterShape,
        handle: MethodHandle,
    ) -> Self {
        let mut method = TestMethod::new(name).returning(returns);
        method.parameters = parameters;
        method.handle = Some(handle);
        self.ty.methods.push(method);
        self
    }

    /// Add a method description as-is.
    #[must_use]
    pub fn method(mut self, method: TestMethod) -> Self {
        self.ty.methods.push(method);
        self
    }

    /// Attach a raw CIL body to the method called `name`, adding a private helper method of
    /// that name if there is none.
    #[must_use]
    pub fn il(mut self, name: &str, body: impl Into<Arc<[u8]>>) -> Self {
        let body = body.into();
        match self.ty.methods.iter_mut().find(|method| method.name == name) {
            Some(method) => method.body = Some(body),
            None => self.ty.methods.push(
                TestMethod::new(name)
                    .with_visibility(Visibility::Private)
                    .with_body(body),
            ),
        }
        self
    }

    /// Finish the description.
    #[must_use]
    pub fn build(self) -> TestType {
        self.ty
    }
}

/// A loaded assembly, as reported by an [`crate::discovery::AssemblyLoader`].
#[derive(Clone)]
pub struct TestAssembly {
    /// Assembly name
    pub name: String,
    /// The source it was loaded from (usually a file path)
    pub source: String,
    /// Generated at runtime
    pub is_dynamic: bool,
    /// Produced by a compiler rather than written by hand
    pub is_compiler_generated: bool,
    /// The test adapter's own assembly
    pub is_adapter: bool,
    /// Types in definition order
    pub types: Vec<Arc<TestType>>,
    /// Resolves tokens in the method bodies of this assembly
    pub resolver: Arc<dyn TokenResolver>,
}

impl TestAssembly {
    /// An ordinary assembly with no types and an empty token table.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        TestAssembly {
            name: name.into(),
            source: source.into(),
            is_dynamic: false,
            is_compiler_generated: false,
            is_adapter: false,
            types: Vec::new(),
            resolver: Arc::new(TokenTable::new()),
        }
    }

    /// Add a type.
    #[must_use]
    pub fn with_type(mut self, ty: TestType) -> Self {
        self.types.push(Arc::new(ty));
        self
    }

    /// Replace the token resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl TokenResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Look up a type by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&Arc<TestType>> {
        self.types.iter().find(|ty| ty.full_name == full_name)
    }
}

impl fmt::Debug for TestAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestAssembly")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("is_dynamic", &self.is_dynamic)
            .field("is_compiler_generated", &self.is_compiler_generated)
            .field("is_adapter", &self.is_adapter)
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LogMessageSink;

    #[derive(Default)]
    struct Counter {
        calls: u32,
    }

    fn counter_type() -> TestType {
        TestType::builder::<Counter>("Demo.CounterTests")
            .default_constructor(Counter::default)
            .fixture_constructor(|_| Ok(Counter { calls: 10 }))
            .test("Counts", |counter| {
                counter.calls += 1;
                Ok(counter.calls > 0)
            })
            .async_test("Counts_later", |counter, _| {
                Box::pin(async move {
                    counter.calls += 1;
                    anyhow::Ok(counter.calls == 12)
                })
            })
            .il("Helper", vec![0x0A_u8, 0x2A])
            .build()
    }

    #[test]
    fn builder_describes_methods() {
        let ty = counter_type();

        assert_eq!(ty.full_name, "Demo.CounterTests");
        assert_eq!(ty.name(), "CounterTests");
        assert_eq!(ty.methods.len(), 3);

        let helper = ty.method("Helper").unwrap();
        assert_eq!(helper.visibility, Visibility::Private);
        assert!(helper.handle.is_none());
        assert_eq!(helper.body.as_deref(), Some(&[0x0A, 0x2A][..]));

        let later = ty.method("Counts_later").unwrap();
        assert_eq!(later.returns, ReturnKind::AwaitableBool);
        assert!(later.handle.as_ref().unwrap().is_async());
    }

    #[test]
    fn preferred_constructor_follows_priority() {
        let ty = counter_type();
        let ctor = ty.preferred_constructor().unwrap();
        assert_eq!(ctor.kind(), ConstructorKind::Fixture);
        assert_eq!(
            ConstructorKind::ServiceProvider.signature("CounterTests"),
            "CounterTests(IServiceProvider serviceProvider) { ... }"
        );
    }

    #[test]
    fn handles_invoke_against_instance() {
        let ty = counter_type();
        let fixture = TestFixture::new();
        let context = TestContext::new(&fixture, &LogMessageSink, Some(1));

        let mut instance = ty.preferred_constructor().unwrap().construct(&fixture).unwrap();
        let sync = ty.method("Counts").unwrap().handle.clone().unwrap();
        let later = ty.method("Counts_later").unwrap().handle.clone().unwrap();

        assert!(sync.invoke(instance.as_mut(), &context).unwrap());
        assert!(later.invoke(instance.as_mut(), &context).unwrap());
        assert_eq!(instance.downcast_ref::<Counter>().unwrap().calls, 12);
    }

    #[test]
    fn wrong_instance_is_an_error() {
        let ty = counter_type();
        let fixture = TestFixture::new();
        let context = TestContext::new(&fixture, &LogMessageSink, Some(1));
        let handle = ty.method("Counts").unwrap().handle.clone().unwrap();

        let mut other: TestInstance = Box::new(5_u8);
        assert!(handle.invoke(other.as_mut(), &context).is_err());
    }

    #[test]
    fn assembly_lookup() {
        let assembly = TestAssembly::new("Demo", "bin/Demo.dll").with_type(counter_type());
        assert!(assembly.find_type("Demo.CounterTests").is_some());
        assert!(assembly.find_type("Demo.Missing").is_none());
    }
}
