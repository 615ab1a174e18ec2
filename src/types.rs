//! Service identities
//!
//! Rust has no runtime reflection, so the engine works over a small
//! structural description of types: plain named types, closed generics,
//! open generic definitions and the generic parameter placeholders used
//! inside open descriptors.

use std::fmt;
use std::sync::Arc;

/// Reserved names of the generic shapes the built-in resolvers understand.
pub mod well_known {
    /// `Enumerable<T>`: every eligible binding of `T`
    pub const ENUMERABLE: &str = "Enumerable";
    /// `Lazy<T>`: construction deferred to first access
    pub const LAZY: &str = "Lazy";
    /// `Func<P1.., R>`: a callable producing `R` from the given arguments
    pub const FUNC: &str = "Func";
    /// `Tuple<T1..>`: every slot resolved independently
    pub const TUPLE: &str = "Tuple";
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Shape {
    /// Plain type (no args) or closed generic
    Named {
        name: Arc<str>,
        args: Box<[ServiceType]>,
    },
    /// Open generic definition such as `Repository<>`
    Definition { name: Arc<str>, arity: usize },
    /// Generic parameter placeholder, positional
    Parameter(usize),
}

/// Identity of a service or implementation type.
///
/// Cheap to clone; equality, ordering and hashing are structural.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceType(Arc<Shape>);

impl ServiceType {
    /// A plain, non-generic type.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self(Arc::new(Shape::Named {
            name: name.into(),
            args: Box::new([]),
        }))
    }

    /// A plain type identified by a Rust type's name.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// A generic type with the given arguments (closed unless an argument
    /// contains placeholders).
    pub fn generic(name: impl Into<Arc<str>>, args: impl IntoIterator<Item = ServiceType>) -> Self {
        Self(Arc::new(Shape::Named {
            name: name.into(),
            args: args.into_iter().collect(),
        }))
    }

    /// An open generic definition with `arity` parameters.
    pub fn definition(name: impl Into<Arc<str>>, arity: usize) -> Self {
        Self(Arc::new(Shape::Definition {
            name: name.into(),
            arity,
        }))
    }

    /// Generic parameter placeholder number `index`.
    pub fn param(index: usize) -> Self {
        Self(Arc::new(Shape::Parameter(index)))
    }

    /// `Enumerable<item>`
    pub fn enumerable(item: ServiceType) -> Self {
        Self::generic(well_known::ENUMERABLE, [item])
    }

    /// `Lazy<inner>`
    pub fn lazy(inner: ServiceType) -> Self {
        Self::generic(well_known::LAZY, [inner])
    }

    /// `Func<parameters.., output>`
    pub fn func(parameters: impl IntoIterator<Item = ServiceType>, output: ServiceType) -> Self {
        let mut args: Vec<_> = parameters.into_iter().collect();
        args.push(output);
        Self::generic(well_known::FUNC, args)
    }

    /// `Tuple<items..>`
    pub fn tuple(items: impl IntoIterator<Item = ServiceType>) -> Self {
        Self::generic(well_known::TUPLE, items)
    }

    /// The bare type name, without arguments. Placeholders have none.
    pub fn name(&self) -> Option<&str> {
        match &*self.0 {
            Shape::Named { name, .. } | Shape::Definition { name, .. } => Some(&**name),
            Shape::Parameter(_) => None,
        }
    }

    /// Generic arguments of a constructed generic type.
    pub fn args(&self) -> &[ServiceType] {
        match &*self.0 {
            Shape::Named { args, .. } => &args[..],
            _ => &[],
        }
    }

    /// Number of generic parameters (definitions) or arguments (constructed).
    pub fn arity(&self) -> usize {
        match &*self.0 {
            Shape::Named { args, .. } => args.len(),
            Shape::Definition { arity, .. } => *arity,
            Shape::Parameter(_) => 0,
        }
    }

    /// Placeholder index, if this is a generic parameter.
    pub fn parameter_index(&self) -> Option<usize> {
        match &*self.0 {
            Shape::Parameter(index) => Some(*index),
            _ => None,
        }
    }

    /// `true` for an open generic definition like `Repository<>`.
    pub fn is_definition(&self) -> bool {
        matches!(&*self.0, Shape::Definition { .. })
    }

    /// `true` for a generic type whose arguments contain no placeholders.
    pub fn is_closed_generic(&self) -> bool {
        match &*self.0 {
            Shape::Named { args, .. } => !args.is_empty() && !self.contains_parameters(),
            _ => false,
        }
    }

    /// `true` when this type cannot be constructed without further
    /// generic arguments.
    pub fn is_open_generic(&self) -> bool {
        self.is_definition() || self.contains_parameters()
    }

    /// Whether a placeholder occurs anywhere inside this type.
    pub fn contains_parameters(&self) -> bool {
        match &*self.0 {
            Shape::Parameter(_) => true,
            Shape::Named { args, .. } => args.iter().any(ServiceType::contains_parameters),
            Shape::Definition { .. } => false,
        }
    }

    /// The open definition of a constructed generic (`Repo<User>` -> `Repo<>`).
    /// A definition is its own definition.
    pub fn generic_definition(&self) -> Option<ServiceType> {
        match &*self.0 {
            Shape::Named { name, args } if !args.is_empty() => {
                Some(Self::definition(Arc::clone(name), args.len()))
            }
            Shape::Definition { .. } => Some(self.clone()),
            _ => None,
        }
    }

    /// Whether this constructed type is an instance of the given definition.
    pub fn is_instance_of(&self, definition: &ServiceType) -> bool {
        self.generic_definition().as_ref() == Some(definition)
    }

    /// Close a definition with concrete arguments.
    pub fn close(&self, args: &[ServiceType]) -> Option<ServiceType> {
        match &*self.0 {
            Shape::Definition { name, arity } if *arity == args.len() => {
                Some(Self::generic(Arc::clone(name), args.iter().cloned()))
            }
            _ => None,
        }
    }

    /// Replace every placeholder `Tn` by `args[n]`. Placeholders without a
    /// matching argument are left in place.
    pub fn substitute(&self, args: &[ServiceType]) -> ServiceType {
        match &*self.0 {
            Shape::Parameter(index) => args.get(*index).cloned().unwrap_or_else(|| self.clone()),
            Shape::Named { name, args: own } if !own.is_empty() && self.contains_parameters() => {
                Self::generic(Arc::clone(name), own.iter().map(|a| a.substitute(args)))
            }
            _ => self.clone(),
        }
    }

    /// Match `self` (a pattern that may contain placeholders) against a
    /// concrete type, recording placeholder bindings.
    ///
    /// Returns `false` on a structural mismatch or when a placeholder would
    /// be bound to two different types.
    pub fn unify(&self, concrete: &ServiceType, bindings: &mut [Option<ServiceType>]) -> bool {
        match (&*self.0, &*concrete.0) {
            (Shape::Parameter(index), _) => match bindings.get_mut(*index) {
                Some(Some(bound)) => bound == concrete,
                Some(slot) => {
                    *slot = Some(concrete.clone());
                    true
                }
                None => false,
            },
            (
                Shape::Named { name, args },
                Shape::Named {
                    name: other_name,
                    args: other_args,
                },
            ) => {
                name == other_name
                    && args.len() == other_args.len()
                    && args
                        .iter()
                        .zip(other_args.iter())
                        .all(|(pattern, arg)| pattern.unify(arg, bindings))
            }
            _ => self == concrete,
        }
    }

    /// `true` for `Name<..>` where `Name` is the given well-known shape.
    pub(crate) fn is_shape(&self, shape: &str) -> bool {
        matches!(&*self.0, Shape::Named { name, args } if !args.is_empty() && &**name == shape)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Shape::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Shape::Definition { name, arity } => {
                write!(f, "{name}<{}>", ",".repeat(arity.saturating_sub(1)))
            }
            Shape::Parameter(index) => write!(f, "T{index}"),
        }
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({self})")
    }
}

impl From<&str> for ServiceType {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}
