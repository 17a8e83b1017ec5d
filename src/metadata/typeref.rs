//! Resolved type and member references, and the seam to external metadata.
//!
//! The decoder only sees raw [`Token`]s. Turning a token into a name, and knowing which base
//! types a name has, is the job of whatever loaded the assembly; that collaborator is modelled
//! by [`TokenResolver`]. [`TokenTable`] is a simple in-memory implementation for callers that
//! already hold the metadata they need.

use std::{collections::HashMap, fmt, hash::Hash, sync::Arc};

use crate::metadata::token::Token;

/// Full name of the root of every exception hierarchy.
pub const ROOT_EXCEPTION: &str = "System.Exception";

/// Name used by compilers for instance constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// A resolved reference to a type, identified by its full name.
///
/// Equality and hashing only consider the full name; the base-type chain is carried along
/// so that subtype questions ("is this a `System.Exception`?") can be answered without
/// another metadata lookup.
///
/// # Examples
///
/// ```rust
/// use testkitchen::metadata::typeref::TypeRef;
///
/// let argument = TypeRef::new("System.ArgumentException")
///     .with_base("System.SystemException")
///     .with_base("System.Exception");
///
/// assert_eq!(argument.name(), "ArgumentException");
/// assert_eq!(argument.namespace(), "System");
/// assert!(argument.is_subclass_of("System.Exception"));
/// assert!(!argument.is_subclass_of("System.ArgumentException"));
/// ```
#[derive(Clone)]
pub struct TypeRef {
    full_name: Arc<str>,
    /// Base types, closest first
    bases: Arc<[Arc<str>]>,
}

impl TypeRef {
    /// Create a reference without any known base types.
    #[must_use]
    pub fn new(full_name: impl Into<Arc<str>>) -> Self {
        TypeRef {
            full_name: full_name.into(),
            bases: Arc::from(Vec::new()),
        }
    }

    /// Append the next base type in the inheritance chain (closest first).
    #[must_use]
    pub fn with_base(self, base: impl Into<Arc<str>>) -> Self {
        let mut bases = self.bases.to_vec();
        bases.push(base.into());
        TypeRef {
            full_name: self.full_name,
            bases: Arc::from(bases),
        }
    }

    /// Full name including namespace and nesting (`Namespace.Outer+Inner`).
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Simple name, the segment after the last `.`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(&*self.full_name, |(_, name)| name)
    }

    /// Namespace, everything before the last `.` (empty for the global namespace).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or("", |(namespace, _)| namespace)
    }

    /// Known base types, closest first.
    pub fn bases(&self) -> impl Iterator<Item = &str> {
        self.bases.iter().map(AsRef::as_ref)
    }

    /// Returns true if `base` appears in the inheritance chain. A type is never a subclass of
    /// itself.
    #[must_use]
    pub fn is_subclass_of(&self, base: &str) -> bool {
        self.bases().any(|candidate| candidate == base)
    }

    /// Returns true if a value of this type can be stored in a location of type `target`.
    #[must_use]
    pub fn is_assignable_to(&self, target: &str) -> bool {
        self.full_name() == target || self.is_subclass_of(target)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.full_name)
    }
}

/// A resolved reference to a method or field on a declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Type that declares the member
    pub declaring_type: TypeRef,
    /// Member name (`.ctor` for instance constructors)
    pub name: String,
}

impl MemberRef {
    /// Create a member reference.
    #[must_use]
    pub fn new(declaring_type: TypeRef, name: impl Into<String>) -> Self {
        MemberRef {
            declaring_type,
            name: name.into(),
        }
    }

    /// Shorthand for an instance constructor of `declaring_type`.
    #[must_use]
    pub fn constructor(declaring_type: TypeRef) -> Self {
        Self::new(declaring_type, CONSTRUCTOR_NAME)
    }

    /// Returns true for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)
    }
}

/// Resolves metadata tokens found in method bodies.
///
/// Implemented by the host that loaded the assembly. Returning `None` is never an error: the
/// instruction keeps its raw token and any analysis depending on it simply does not
/// attribute that site.
pub trait TokenResolver: Send + Sync {
    /// Resolve a `TypeDef`, `TypeRef` or `TypeSpec` token.
    fn resolve_type(&self, token: Token) -> Option<TypeRef>;

    /// Resolve a `MethodDef`, `MemberRef` or `MethodSpec` token.
    fn resolve_member(&self, token: Token) -> Option<MemberRef>;
}

/// An in-memory token map.
///
/// # Examples
///
/// ```rust
/// use testkitchen::metadata::{token::Token, typeref::{MemberRef, TokenResolver, TokenTable, TypeRef}};
///
/// let invalid = TypeRef::new("System.InvalidOperationException").with_base("System.Exception");
/// let table = TokenTable::new()
///     .with_type(Token::new(0x0100_0010), invalid.clone())
///     .with_member(Token::new(0x0A00_0020), MemberRef::constructor(invalid.clone()));
///
/// assert_eq!(table.resolve_type(Token::new(0x0100_0010)), Some(invalid));
/// assert!(table.resolve_member(Token::new(0x0A00_0021)).is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct TokenTable {
    types: HashMap<Token, TypeRef>,
    members: HashMap<Token, MemberRef>,
}

impl TokenTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type token.
    #[must_use]
    pub fn with_type(mut self, token: Token, ty: TypeRef) -> Self {
        self.types.insert(token, ty);
        self
    }

    /// Register a member token.
    #[must_use]
    pub fn with_member(mut self, token: Token, member: MemberRef) -> Self {
        self.members.insert(token, member);
        self
    }
}

impl TokenResolver for TokenTable {
    fn resolve_type(&self, token: Token) -> Option<TypeRef> {
        self.types.get(&token).cloned()
    }

    fn resolve_member(&self, token: Token) -> Option<MemberRef> {
        self.members.get(&token).cloned()
    }
}
