//! Two-level service scopes for test containers.
//!
//! A [`TestFixture`] owns two registration sets. Run-wide services are registered while test
//! containers are being constructed and become the run scope when [`TestFixture::begin`] is
//! called. Per-test services are rebuilt into a fresh test scope for every invocation by
//! [`TestFixture::begin_test`]. Lookups try the test scope first and fall back to the run
//! scope; the run scope never sees per-test services.
//!
//! Services are keyed by their concrete type. A registered value is shared as
//! `Arc<T>`; factories receive a [`ServiceProvider`] for the scope they are created in, so a
//! per-test factory can depend on run-wide services.
//!
//! # Examples
//!
//! ```rust
//! use testkitchen::fixture::TestFixture;
//!
//! struct Clock(u64);
//! struct Session { started: u64 }
//!
//! let fixture = TestFixture::new();
//! fixture.add_singleton(Clock(42))?;
//! fixture.add_per_test_singleton(|provider| Session {
//!     started: provider.get::<Clock>().map_or(0, |clock| clock.0),
//! })?;
//!
//! fixture.begin()?;
//! fixture.begin_test()?;
//! assert_eq!(fixture.resolve::<Session>().map(|s| s.started), Some(42));
//! fixture.end_test();
//! assert!(fixture.resolve::<Session>().is_none());
//! fixture.end();
//! # Ok::<(), testkitchen::Error>(())
//! ```

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

use crate::{Error, Result};

/// A type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&dyn ServiceProvider) -> Service + Send + Sync>;

/// Resolves services by type.
pub trait ServiceProvider: Send + Sync {
    /// Look up a service by the [`TypeId`] of its concrete type.
    fn get_service(&self, type_id: TypeId) -> Option<Service>;
}

impl dyn ServiceProvider + '_ {
    /// Typed lookup.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_service(TypeId::of::<T>())?.downcast::<T>().ok()
    }
}

/// Accepts service registrations.
pub trait ServiceRegistry: Send + Sync {
    /// Register a run-wide service.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once the run scope has been built.
    fn register(&self, type_id: TypeId, descriptor: ServiceDescriptor) -> Result<()>;
}

impl dyn ServiceRegistry + '_ {
    /// Register a shared instance.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once the run scope has been built.
    pub fn add_singleton<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        self.register(TypeId::of::<T>(), ServiceDescriptor::instance(value))
    }

    /// Register a service created on first use.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once the run scope has been built.
    pub fn add_singleton_factory<T, F>(&self, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.register(TypeId::of::<T>(), ServiceDescriptor::singleton(factory))
    }

    /// Register a service created on every lookup.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once the run scope has been built.
    pub fn add_transient<T, F>(&self, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.register(TypeId::of::<T>(), ServiceDescriptor::transient(factory))
    }
}

#[derive(Clone)]
enum ServiceSource {
    Instance(Service),
    Singleton(Factory),
    Transient(Factory),
}

/// How one service is produced.
#[derive(Clone)]
pub struct ServiceDescriptor {
    type_name: &'static str,
    source: ServiceSource,
}

impl ServiceDescriptor {
    /// A shared, already created instance.
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        ServiceDescriptor {
            type_name: type_name::<T>(),
            source: ServiceSource::Instance(Arc::new(value)),
        }
    }

    /// Created once per scope on first lookup.
    pub fn singleton<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        ServiceDescriptor {
            type_name: type_name::<T>(),
            source: ServiceSource::Singleton(Arc::new(move |provider: &dyn ServiceProvider| {
                Arc::new(factory(provider)) as Service
            })),
        }
    }

    /// Created on every lookup.
    pub fn transient<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        ServiceDescriptor {
            type_name: type_name::<T>(),
            source: ServiceSource::Transient(Arc::new(move |provider: &dyn ServiceProvider| {
                Arc::new(factory(provider)) as Service
            })),
        }
    }

    /// Name of the registered type, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifetime = match self.source {
            ServiceSource::Instance(_) => "instance",
            ServiceSource::Singleton(_) => "singleton",
            ServiceSource::Transient(_) => "transient",
        };
        write!(f, "{} ({lifetime})", self.type_name)
    }
}

/// A set of service registrations, keyed by service type. A later registration of the same
/// type replaces the earlier one.
#[derive(Clone, Default, Debug)]
pub struct ServiceCollection {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a registration.
    pub fn insert(&mut self, type_id: TypeId, descriptor: ServiceDescriptor) -> &mut Self {
        self.descriptors.insert(type_id, descriptor);
        self
    }

    /// Register a shared instance.
    pub fn add_singleton<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.insert(TypeId::of::<T>(), ServiceDescriptor::instance(value))
    }

    /// Register a service created once per scope on first use.
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.insert(TypeId::of::<T>(), ServiceDescriptor::singleton(factory))
    }

    /// Register a service created on every lookup.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.insert(TypeId::of::<T>(), ServiceDescriptor::transient(factory))
    }

    /// Returns true if `T` is registered.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// A built scope: registrations plus the instances created from them so far.
pub struct ServiceScope {
    label: &'static str,
    descriptors: HashMap<TypeId, ServiceDescriptor>,
    instances: Mutex<HashMap<TypeId, Service>>,
    parent: Option<Arc<ServiceScope>>,
}

impl ServiceScope {
    fn build(
        label: &'static str,
        services: ServiceCollection,
        parent: Option<Arc<ServiceScope>>,
    ) -> Arc<Self> {
        log::debug!(
            "Building {label} scope with {} registration(s)",
            services.len()
        );
        Arc::new(ServiceScope {
            label,
            descriptors: services.descriptors,
            instances: Mutex::new(HashMap::new()),
            parent,
        })
    }
}

impl ServiceProvider for ServiceScope {
    fn get_service(&self, type_id: TypeId) -> Option<Service> {
        let Some(descriptor) = self.descriptors.get(&type_id) else {
            return self
                .parent
                .as_ref()
                .and_then(|parent| parent.get_service(type_id));
        };

        match &descriptor.source {
            ServiceSource::Instance(service) => Some(service.clone()),
            ServiceSource::Transient(factory) => Some(factory(self)),
            ServiceSource::Singleton(factory) => {
                if let Some(existing) = lock!(self.instances).get(&type_id) {
                    return Some(existing.clone());
                }

                // Created outside the lock, factories may resolve other services from this scope
                let created = factory(self);
                Some(
                    lock!(self.instances)
                        .entry(type_id)
                        .or_insert(created)
                        .clone(),
                )
            }
        }
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        log::debug!("Disposing {} scope", self.label);
    }
}

/// Run scope plus per-test scope, with registration sealed once the run starts.
#[derive(Default)]
pub struct TestFixture {
    services: Mutex<ServiceCollection>,
    per_test: Mutex<ServiceCollection>,
    run_scope: RwLock<Option<Arc<ServiceScope>>>,
    test_scope: RwLock<Option<Arc<ServiceScope>>>,
    sealed: AtomicBool,
}

impl TestFixture {
    /// Create a fixture without registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fixture starting from existing run-wide registrations.
    #[must_use]
    pub fn with_services(services: ServiceCollection) -> Self {
        TestFixture {
            services: Mutex::new(services),
            ..Self::default()
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            Err(Error::ScopeSealed)
        } else {
            Ok(())
        }
    }

    /// Register a shared run-wide instance.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once [`TestFixture::begin`] has been called.
    pub fn add_singleton<T: Any + Send + Sync>(&self, value: T) -> Result<&Self> {
        self.register(TypeId::of::<T>(), ServiceDescriptor::instance(value))?;
        Ok(self)
    }

    /// Register a run-wide service created on first use.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once [`TestFixture::begin`] has been called.
    pub fn add_singleton_factory<T, F>(&self, factory: F) -> Result<&Self>
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.register(TypeId::of::<T>(), ServiceDescriptor::singleton(factory))?;
        Ok(self)
    }

    /// Register a service that is created once per test invocation.
    ///
    /// # Errors
    /// Returns [`Error::ScopeSealed`] once [`TestFixture::begin`] has been called.
    pub fn add_per_test_singleton<T, F>(&self, factory: F) -> Result<&Self>
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.ensure_open()?;
        lock!(self.per_test).add_singleton_factory(factory);
        Ok(self)
    }

    /// Returns true once registrations are no longer accepted.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Build the run scope and seal registrations.
    ///
    /// # Errors
    /// Returns [`Error::ScopeState`] if the run scope was already built.
    pub fn begin(&self) -> Result<()> {
        let mut run_scope = write_lock!(self.run_scope);
        if run_scope.is_some() || self.is_sealed() {
            return Err(Error::ScopeState("run scope already built"));
        }

        self.sealed.store(true, Ordering::Release);
        let services = std::mem::take(&mut *lock!(self.services));
        *run_scope = Some(ServiceScope::build("run", services, None));
        Ok(())
    }

    /// Build a fresh test scope from the per-test registrations.
    ///
    /// # Errors
    /// Returns [`Error::ScopeState`] if the run scope has not been built.
    pub fn begin_test(&self) -> Result<()> {
        let parent = read_lock!(self.run_scope)
            .clone()
            .ok_or(Error::ScopeState("run scope not built"))?;

        let services = lock!(self.per_test).clone();
        *write_lock!(self.test_scope) = Some(ServiceScope::build("test", services, Some(parent)));
        Ok(())
    }

    /// Tear down the current test scope.
    pub fn end_test(&self) {
        write_lock!(self.test_scope).take();
    }

    /// Tear down both scopes.
    pub fn end(&self) {
        write_lock!(self.test_scope).take();
        write_lock!(self.run_scope).take();
    }

    /// Typed lookup, test scope first.
    #[must_use]
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_service(TypeId::of::<T>())?.downcast::<T>().ok()
    }
}

impl ServiceProvider for TestFixture {
    fn get_service(&self, type_id: TypeId) -> Option<Service> {
        // The test scope falls back to the run scope on its own
        let scope = read_lock!(self.test_scope)
            .clone()
            .or_else(|| read_lock!(self.run_scope).clone())?;
        scope.get_service(type_id)
    }
}

impl ServiceRegistry for TestFixture {
    fn register(&self, type_id: TypeId, descriptor: ServiceDescriptor) -> Result<()> {
        self.ensure_open()?;
        log::debug!("Registering run-wide service {}", descriptor.type_name());
        lock!(self.services).insert(type_id, descriptor);
        Ok(())
    }
}

impl fmt::Debug for TestFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFixture")
            .field("services", &*lock!(self.services))
            .field("per_test", &*lock!(self.per_test))
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Config(&'static str);

    struct Counter(usize);

    #[test]
    fn run_scope_lookup() {
        let fixture = TestFixture::new();
        fixture.add_singleton(Config("run")).unwrap();

        assert!(fixture.resolve::<Config>().is_none());
        fixture.begin().unwrap();
        assert_eq!(fixture.resolve::<Config>().as_deref(), Some(&Config("run")));

        fixture.end();
        assert!(fixture.resolve::<Config>().is_none());
    }

    #[test]
    fn registration_sealed_after_begin() {
        let fixture = TestFixture::new();
        fixture.begin().unwrap();

        assert!(matches!(
            fixture.add_singleton(Config("late")),
            Err(Error::ScopeSealed)
        ));
        assert!(matches!(
            fixture.add_per_test_singleton(|_| Config("late")),
            Err(Error::ScopeSealed)
        ));
        assert!(matches!(fixture.begin(), Err(Error::ScopeState(_))));
    }

    #[test]
    fn test_scope_requires_run_scope() {
        let fixture = TestFixture::new();
        assert!(matches!(fixture.begin_test(), Err(Error::ScopeState(_))));
    }

    #[test]
    fn per_test_services_are_fresh_per_invocation() {
        let created = Arc::new(AtomicUsize::new(0));
        let fixture = TestFixture::new();
        let counter = created.clone();
        fixture
            .add_per_test_singleton(move |_| Counter(counter.fetch_add(1, Ordering::SeqCst)))
            .unwrap();
        fixture.begin().unwrap();

        fixture.begin_test().unwrap();
        let first = fixture.resolve::<Counter>().unwrap();
        let again = fixture.resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        fixture.end_test();

        fixture.begin_test().unwrap();
        let second = fixture.resolve::<Counter>().unwrap();
        fixture.end_test();

        assert_eq!((first.0, second.0), (0, 1));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scope_shadows_run_scope() {
        let fixture = TestFixture::new();
        fixture.add_singleton(Config("run")).unwrap();
        fixture.add_per_test_singleton(|_| Config("test")).unwrap();
        fixture.begin().unwrap();

        fixture.begin_test().unwrap();
        assert_eq!(fixture.resolve::<Config>().as_deref(), Some(&Config("test")));
        fixture.end_test();

        assert_eq!(fixture.resolve::<Config>().as_deref(), Some(&Config("run")));
    }

    #[test]
    fn per_test_factory_sees_run_services() {
        let fixture = TestFixture::new();
        fixture.add_singleton(Config("shared")).unwrap();
        fixture
            .add_per_test_singleton(|provider| {
                Counter(provider.get::<Config>().map_or(0, |config| config.0.len()))
            })
            .unwrap();
        fixture.begin().unwrap();
        fixture.begin_test().unwrap();

        assert_eq!(fixture.resolve::<Counter>().map(|c| c.0), Some(6));
    }

    #[test]
    fn registry_trait_object() {
        let fixture = TestFixture::new();
        let registry: &dyn ServiceRegistry = &fixture;
        registry.add_transient(|_| Counter(7)).unwrap();
        fixture.begin().unwrap();

        let first = fixture.resolve::<Counter>().unwrap();
        let second = fixture.resolve::<Counter>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.0, 7);
    }

    #[test]
    fn collection_replaces_registrations() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton(Config("first"))
            .add_singleton(Config("second"));
        assert_eq!(services.len(), 1);
        assert!(services.contains::<Config>());

        let fixture = TestFixture::with_services(services);
        fixture.begin().unwrap();
        assert_eq!(fixture.resolve::<Config>().as_deref(), Some(&Config("second")));
    }
}
