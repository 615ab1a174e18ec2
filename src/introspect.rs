//! Type introspection
//!
//! The engine never inspects Rust types itself. Everything it needs to know
//! about an implementation (constructors, injectable members, injection
//! methods, generic constraints, implemented contracts) comes from a
//! [`TypeIntrospector`]. [`TypeCatalog`] is the in-memory implementation
//! the container uses by default: the host program describes its types
//! once, and the catalog answers queries for plain, closed generic and open
//! generic types alike.

use crate::{Disposable, Disposer, Injectable, Instance, Result, ServiceType, disposer_for};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

// =============================================================================
// Dependency sites
// =============================================================================

/// One constructor parameter, member or method parameter to satisfy.
#[derive(Clone)]
pub struct DependencySite {
    /// The requested service type
    pub requested: ServiceType,
    /// The type declaring this parameter or member
    pub parent: Option<ServiceType>,
    /// Declared parameter or member name
    pub member_name: Option<Arc<str>>,
    /// Explicit binding key
    pub dependency_name: Option<Arc<str>>,
    /// Declarative metadata attached to the site
    pub attributes: Arc<[Arc<str>]>,
    /// Value used when nothing else satisfies the site
    pub default_value: Option<Instance>,
}

impl DependencySite {
    pub fn new(requested: ServiceType) -> Self {
        Self {
            requested,
            parent: None,
            member_name: None,
            dependency_name: None,
            attributes: Arc::new([]),
            default_value: None,
        }
    }

    /// A site carrying its declared parameter or member name.
    pub fn param(name: impl Into<Arc<str>>, requested: ServiceType) -> Self {
        Self::new(requested).with_member_name(name)
    }

    pub fn with_member_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.member_name = Some(name.into());
        self
    }

    pub fn with_dependency_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.dependency_name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent: ServiceType) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<Arc<str>>) -> Self {
        let mut attributes = self.attributes.to_vec();
        attributes.push(attribute.into());
        self.attributes = attributes.into();
        self
    }

    pub fn with_default(mut self, value: Instance) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Same site asking for a different type.
    pub fn with_requested(&self, requested: ServiceType) -> Self {
        Self {
            requested,
            ..self.clone()
        }
    }

    /// Same site with an explicit binding key (or none).
    pub(crate) fn keyed(&self, name: Option<Arc<str>>) -> Self {
        Self {
            dependency_name: name,
            ..self.clone()
        }
    }

    /// Close placeholders in the requested type.
    pub(crate) fn substitute(&self, args: &[ServiceType], parent: &ServiceType) -> Self {
        Self {
            requested: self.requested.substitute(args),
            parent: Some(parent.clone()),
            ..self.clone()
        }
    }

    /// Human readable description for error listings.
    pub(crate) fn describe(&self) -> String {
        match (&self.member_name, &self.dependency_name) {
            (_, Some(key)) => format!("{} (named '{key}')", self.requested),
            (Some(member), None) => format!("{member}: {}", self.requested),
            (None, None) => self.requested.to_string(),
        }
    }
}

impl fmt::Debug for DependencySite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencySite")
            .field("requested", &self.requested)
            .field("parent", &self.parent)
            .field("member_name", &self.member_name)
            .field("dependency_name", &self.dependency_name)
            .field("attributes", &self.attributes)
            .field("has_default", &self.default_value.is_some())
            .finish()
    }
}

// =============================================================================
// Constructors, members, methods
// =============================================================================

/// Builds an instance of the (closed) implementation type from resolved arguments.
pub type Activator = Arc<dyn Fn(&ServiceType, Vec<Instance>) -> Result<Instance> + Send + Sync>;

/// Assigns a resolved value to a member of an existing instance.
pub type MemberSetter = Arc<dyn Fn(&Instance, Instance) -> Result<()> + Send + Sync>;

/// Invokes an injection method on an existing instance.
pub type MethodInvoker = Arc<dyn Fn(&Instance, Vec<Instance>) -> Result<()> + Send + Sync>;

/// A constructor handle.
#[derive(Clone)]
pub struct ConstructorInfo {
    pub parameters: Vec<DependencySite>,
    pub public: bool,
    pub activator: Activator,
}

impl ConstructorInfo {
    pub fn new<F>(parameters: impl IntoIterator<Item = DependencySite>, activator: F) -> Self
    where
        F: Fn(&ServiceType, Vec<Instance>) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            parameters: parameters.into_iter().collect(),
            public: true,
            activator: Arc::new(activator),
        }
    }

    /// Not eligible for constructor selection.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    fn close(&self, args: &[ServiceType], parent: &ServiceType) -> Self {
        Self {
            parameters: self.parameters.iter().map(|p| p.substitute(args, parent)).collect(),
            public: self.public,
            activator: Arc::clone(&self.activator),
        }
    }
}

impl fmt::Debug for ConstructorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorInfo")
            .field("parameters", &self.parameters)
            .field("public", &self.public)
            .finish()
    }
}

/// Visibility class of an injectable member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberVisibility {
    PublicSetter,
    LimitedSetter,
    PrivateField,
}

/// An injectable member.
#[derive(Clone)]
pub struct MemberInfo {
    pub site: DependencySite,
    pub visibility: MemberVisibility,
    /// Explicitly marked for injection; always injected and always required
    pub annotated: bool,
    pub setter: MemberSetter,
}

impl MemberInfo {
    pub fn new<F>(site: DependencySite, visibility: MemberVisibility, setter: F) -> Self
    where
        F: Fn(&Instance, Instance) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            site,
            visibility,
            annotated: false,
            setter: Arc::new(setter),
        }
    }

    pub fn annotated(mut self) -> Self {
        self.annotated = true;
        self
    }
}

/// A method invoked after construction with resolved arguments.
#[derive(Clone)]
pub struct MethodInfo {
    pub name: Arc<str>,
    pub parameters: Vec<DependencySite>,
    pub invoker: MethodInvoker,
}

impl MethodInfo {
    pub fn new<F>(name: impl Into<Arc<str>>, parameters: impl IntoIterator<Item = DependencySite>, invoker: F) -> Self
    where
        F: Fn(&Instance, Vec<Instance>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().collect(),
            invoker: Arc::new(invoker),
        }
    }
}

// =============================================================================
// Generic constraints & member injection rule
// =============================================================================

/// What a generic argument must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Argument must be a reference type
    ReferenceType,
    /// Argument must have a public parameterless constructor
    DefaultConstructor,
    /// Argument must implement the given type (may mention placeholders)
    Implements(ServiceType),
}

/// Constraint on generic parameter `parameter` of a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericConstraint {
    pub parameter: usize,
    pub kind: ConstraintKind,
}

/// Which member visibility classes are auto-injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemberInjectionRule(u8);

impl MemberInjectionRule {
    pub const NONE: Self = Self(0);
    pub const PUBLIC_SETTERS: Self = Self(1);
    pub const LIMITED_SETTERS: Self = Self(1 << 1);
    pub const PRIVATE_FIELDS: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether members of `visibility` are eligible under this rule.
    pub fn allows(self, visibility: MemberVisibility) -> bool {
        let flag = match visibility {
            MemberVisibility::PublicSetter => Self::PUBLIC_SETTERS,
            MemberVisibility::LimitedSetter => Self::LIMITED_SETTERS,
            MemberVisibility::PrivateField => Self::PRIVATE_FIELDS,
        };
        self.0 & flag.0 != 0
    }
}

impl std::ops::BitOr for MemberInjectionRule {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// =============================================================================
// TypeIntrospector
// =============================================================================

/// Supplies construction metadata for types.
///
/// Types are passed closed when the request is closed; definitions are
/// passed as-is and answered with placeholder-bearing descriptions.
pub trait TypeIntrospector: Send + Sync {
    /// Constructors in declaration order.
    fn constructors(&self, ty: &ServiceType) -> Vec<ConstructorInfo>;

    /// Annotated members plus those whose visibility `rule` allows.
    fn injectable_members(&self, ty: &ServiceType, rule: MemberInjectionRule) -> Vec<MemberInfo>;

    fn injection_methods(&self, ty: &ServiceType) -> Vec<MethodInfo>;

    /// Constraints declared by a generic definition.
    fn generic_constraints(&self, definition: &ServiceType) -> Vec<GenericConstraint>;

    /// Every contract `ty` implements, transitively. Excludes `ty` itself.
    fn implemented_types(&self, ty: &ServiceType) -> Vec<ServiceType>;

    /// Can be constructed (not abstract, not open, known).
    fn is_concrete(&self, ty: &ServiceType) -> bool;

    fn is_reference_type(&self, ty: &ServiceType) -> bool;

    /// Disposal hook for instances of `ty`, if any.
    fn disposer(&self, ty: &ServiceType) -> Option<Disposer>;

    /// Whether an instance of `from` satisfies the contract `to`.
    ///
    /// Open definitions on either side compare by definition.
    fn is_assignable(&self, from: &ServiceType, to: &ServiceType) -> bool {
        if from == to {
            return true;
        }

        if to.is_definition() {
            if from.generic_definition().as_ref() == Some(to) {
                return true;
            }
            return self
                .implemented_types(from)
                .iter()
                .any(|implemented| implemented.generic_definition().as_ref() == Some(to));
        }

        self.implemented_types(from).iter().any(|implemented| implemented == to)
    }
}

// =============================================================================
// TypeCatalog
// =============================================================================

/// Description of one type (or generic definition) for a [`TypeCatalog`].
///
/// Sites, contracts and constraints of a generic descriptor refer to its
/// parameters through [`ServiceType::param`].
#[derive(Clone)]
pub struct TypeDescriptor {
    name: Arc<str>,
    arity: usize,
    implements: Vec<ServiceType>,
    constructors: Vec<ConstructorInfo>,
    members: Vec<MemberInfo>,
    methods: Vec<MethodInfo>,
    constraints: Vec<GenericConstraint>,
    is_abstract: bool,
    is_value_type: bool,
    disposer: Option<Disposer>,
}

impl TypeDescriptor {
    /// A plain type.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::generic(name, 0)
    }

    /// A generic definition with `arity` parameters.
    pub fn generic(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            implements: Vec::new(),
            constructors: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
            constraints: Vec::new(),
            is_abstract: false,
            is_value_type: false,
            disposer: None,
        }
    }

    /// A contract type: never constructed directly.
    pub fn interface(name: impl Into<Arc<str>>) -> Self {
        Self::new(name).abstract_type()
    }

    /// A plain type named after a Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    pub fn implements(mut self, contract: ServiceType) -> Self {
        self.implements.push(contract);
        self
    }

    pub fn constructor<F>(mut self, parameters: impl IntoIterator<Item = DependencySite>, activator: F) -> Self
    where
        F: Fn(&ServiceType, Vec<Instance>) -> Result<Instance> + Send + Sync + 'static,
    {
        self.constructors.push(ConstructorInfo::new(parameters, activator));
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constraint(mut self, parameter: usize, kind: ConstraintKind) -> Self {
        self.constraints.push(GenericConstraint { parameter, kind });
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    /// Instances are downcast to `T` and disposed through its [`Disposable`] impl.
    pub fn disposable<T: Disposable + Injectable>(mut self) -> Self {
        self.disposer = Some(disposer_for::<T>());
        self
    }

    /// The service type this descriptor answers for: plain or definition.
    pub fn service_type(&self) -> ServiceType {
        if self.arity == 0 {
            ServiceType::named(Arc::clone(&self.name))
        } else {
            ServiceType::definition(Arc::clone(&self.name), self.arity)
        }
    }
}

type CatalogKey = (Arc<str>, usize);

/// Concurrent in-memory [`TypeIntrospector`].
#[derive(Default)]
pub struct TypeCatalog {
    types: DashMap<CatalogKey, Arc<TypeDescriptor>, ahash::RandomState>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self {
            types: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Add or replace a descriptor.
    pub fn describe(&self, descriptor: TypeDescriptor) -> &Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "ioc_graph",
            ty = %descriptor.service_type(),
            constructors = descriptor.constructors.len(),
            "Describing type"
        );

        self.types
            .insert((Arc::clone(&descriptor.name), descriptor.arity), Arc::new(descriptor));
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Descriptor plus the arguments closing it (empty for plain types and
    /// for definitions, which keep their placeholders).
    fn lookup(&self, ty: &ServiceType) -> Option<(Arc<TypeDescriptor>, Vec<ServiceType>)> {
        let name = ty.name()?;
        let descriptor = self
            .types
            .get(&(Arc::from(name), ty.arity()))
            .map(|entry| Arc::clone(entry.value()))?;
        let args = if ty.is_definition() { Vec::new() } else { ty.args().to_vec() };
        Some((descriptor, args))
    }
}

impl TypeIntrospector for TypeCatalog {
    fn constructors(&self, ty: &ServiceType) -> Vec<ConstructorInfo> {
        match self.lookup(ty) {
            Some((descriptor, args)) if !descriptor.is_abstract => descriptor
                .constructors
                .iter()
                .map(|ctor| ctor.close(&args, ty))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn injectable_members(&self, ty: &ServiceType, rule: MemberInjectionRule) -> Vec<MemberInfo> {
        let Some((descriptor, args)) = self.lookup(ty) else {
            return Vec::new();
        };
        descriptor
            .members
            .iter()
            .filter(|member| member.annotated || rule.allows(member.visibility))
            .map(|member| MemberInfo {
                site: member.site.substitute(&args, ty),
                ..member.clone()
            })
            .collect()
    }

    fn injection_methods(&self, ty: &ServiceType) -> Vec<MethodInfo> {
        let Some((descriptor, args)) = self.lookup(ty) else {
            return Vec::new();
        };
        descriptor
            .methods
            .iter()
            .map(|method| MethodInfo {
                parameters: method.parameters.iter().map(|p| p.substitute(&args, ty)).collect(),
                ..method.clone()
            })
            .collect()
    }

    fn generic_constraints(&self, definition: &ServiceType) -> Vec<GenericConstraint> {
        self.lookup(definition)
            .map(|(descriptor, _)| descriptor.constraints.clone())
            .unwrap_or_default()
    }

    fn implemented_types(&self, ty: &ServiceType) -> Vec<ServiceType> {
        let mut found: Vec<ServiceType> = Vec::new();
        let mut queue = VecDeque::from([ty.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some((descriptor, args)) = self.lookup(&current) else {
                continue;
            };
            for contract in &descriptor.implements {
                let contract = contract.substitute(&args);
                if contract != *ty && !found.contains(&contract) {
                    found.push(contract.clone());
                    queue.push_back(contract);
                }
            }
        }

        found
    }

    fn is_concrete(&self, ty: &ServiceType) -> bool {
        !ty.is_open_generic()
            && self
                .lookup(ty)
                .is_some_and(|(descriptor, _)| !descriptor.is_abstract && !descriptor.constructors.is_empty())
    }

    fn is_reference_type(&self, ty: &ServiceType) -> bool {
        self.lookup(ty).is_some_and(|(descriptor, _)| !descriptor.is_value_type)
    }

    fn disposer(&self, ty: &ServiceType) -> Option<Disposer> {
        self.lookup(ty).and_then(|(descriptor, _)| descriptor.disposer.clone())
    }
}
