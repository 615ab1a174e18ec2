//! Container configuration
//!
//! A [`ContainerConfiguration`] is an immutable value; `Container::configure`
//! publishes a modified copy and bumps the container version so cached
//! factories are replanned under the new rules.

use crate::introspect::{ConstructorInfo, MemberInjectionRule};
use crate::lifetime::Lifetime;
use crate::planner::DependencyResolver;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// What happens when a registration with an existing identity arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegistrationBehavior {
    /// Fail with `AlreadyRegistered`
    Throw,
    /// Keep the existing registration
    #[default]
    Skip,
    /// Replace the existing registration, or add when there is none
    ReplaceExisting,
    /// Replace the existing registration; add nothing when there is none
    ReplaceIfExists,
    /// Keep both
    PreserveAll,
}

/// Comparator over constructors; the first usable one in sorted order wins.
pub type ConstructorComparator = Arc<dyn Fn(&ConstructorInfo, &ConstructorInfo) -> Ordering + Send + Sync>;

/// Order in which constructors are tried.
#[derive(Clone, Default)]
pub enum ConstructorSelectionRule {
    #[default]
    MostParameters,
    FewestParameters,
    Custom(ConstructorComparator),
}

impl ConstructorSelectionRule {
    /// Stable sort, so declaration order breaks ties.
    pub(crate) fn sort(&self, constructors: &mut [ConstructorInfo]) {
        match self {
            Self::MostParameters => constructors.sort_by(|a, b| b.parameters.len().cmp(&a.parameters.len())),
            Self::FewestParameters => constructors.sort_by(|a, b| a.parameters.len().cmp(&b.parameters.len())),
            Self::Custom(compare) => constructors.sort_by(|a, b| compare(a, b)),
        }
    }
}

impl fmt::Debug for ConstructorSelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MostParameters => f.write_str("MostParameters"),
            Self::FewestParameters => f.write_str("FewestParameters"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Rules consumed by the planner and the lifetime model.
///
/// ```rust
/// use ioc_graph::{ContainerConfiguration, Lifetime, RegistrationBehavior};
///
/// let config = ContainerConfiguration::new()
///     .with_unknown_type_resolution(Lifetime::Transient)
///     .with_registration_behavior(RegistrationBehavior::Throw);
/// assert!(config.unknown_type_resolution().is_some());
/// ```
#[derive(Clone, Default)]
pub struct ContainerConfiguration {
    unknown_type_resolution: Option<Lifetime>,
    member_injection: MemberInjectionRule,
    registration_behavior: RegistrationBehavior,
    rebuild_singletons_in_child: bool,
    constructor_selection: ConstructorSelectionRule,
    member_name_as_dependency_name: bool,
    resolvers: Vec<Arc<dyn DependencyResolver>>,
}

impl ContainerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat unregistered concrete types as self-registered with `lifetime`.
    pub fn with_unknown_type_resolution(mut self, lifetime: Lifetime) -> Self {
        self.unknown_type_resolution = Some(lifetime);
        self
    }

    pub fn without_unknown_type_resolution(mut self) -> Self {
        self.unknown_type_resolution = None;
        self
    }

    pub fn with_member_injection(mut self, rule: MemberInjectionRule) -> Self {
        self.member_injection = rule;
        self
    }

    pub fn with_registration_behavior(mut self, behavior: RegistrationBehavior) -> Self {
        self.registration_behavior = behavior;
        self
    }

    /// Singletons resolved through this child container live in its own
    /// storage instead of the root's.
    pub fn with_rebuild_singletons_in_child(mut self, enabled: bool) -> Self {
        self.rebuild_singletons_in_child = enabled;
        self
    }

    pub fn with_constructor_selection(mut self, rule: ConstructorSelectionRule) -> Self {
        self.constructor_selection = rule;
        self
    }

    /// Use a site's declared parameter/member name as an implicit binding key.
    pub fn with_member_name_as_dependency_name(mut self, enabled: bool) -> Self {
        self.member_name_as_dependency_name = enabled;
        self
    }

    /// Append an external resolver; tried after the built-in ones.
    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn unknown_type_resolution(&self) -> Option<&Lifetime> {
        self.unknown_type_resolution.as_ref()
    }

    pub fn member_injection(&self) -> MemberInjectionRule {
        self.member_injection
    }

    pub fn registration_behavior(&self) -> RegistrationBehavior {
        self.registration_behavior
    }

    pub fn rebuild_singletons_in_child(&self) -> bool {
        self.rebuild_singletons_in_child
    }

    pub fn constructor_selection(&self) -> &ConstructorSelectionRule {
        &self.constructor_selection
    }

    pub fn member_name_as_dependency_name(&self) -> bool {
        self.member_name_as_dependency_name
    }

    pub fn resolvers(&self) -> &[Arc<dyn DependencyResolver>] {
        &self.resolvers
    }
}

impl fmt::Debug for ContainerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfiguration")
            .field("unknown_type_resolution", &self.unknown_type_resolution)
            .field("member_injection", &self.member_injection)
            .field("registration_behavior", &self.registration_behavior)
            .field("rebuild_singletons_in_child", &self.rebuild_singletons_in_child)
            .field("constructor_selection", &self.constructor_selection)
            .field("member_name_as_dependency_name", &self.member_name_as_dependency_name)
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::DependencySite;
    use crate::{ServiceType, instance};

    fn ctor(arity: usize) -> ConstructorInfo {
        let params = (0..arity).map(|i| DependencySite::new(ServiceType::named(format!("P{i}"))));
        ConstructorInfo::new(params, |_, _| Ok(instance(())))
    }

    #[test]
    fn test_constructor_ordering() {
        let mut ctors = vec![ctor(1), ctor(3), ctor(0)];
        ConstructorSelectionRule::MostParameters.sort(&mut ctors);
        assert_eq!(ctors.iter().map(|c| c.parameters.len()).collect::<Vec<_>>(), vec![3, 1, 0]);

        ConstructorSelectionRule::FewestParameters.sort(&mut ctors);
        assert_eq!(ctors[0].parameters.len(), 0);

        let custom = ConstructorSelectionRule::Custom(Arc::new(|a: &ConstructorInfo, b: &ConstructorInfo| {
            (a.parameters.len() == 1).cmp(&(b.parameters.len() == 1)).reverse()
        }));
        custom.sort(&mut ctors);
        assert_eq!(ctors[0].parameters.len(), 1);
    }

    #[test]
    fn test_builder_defaults() {
        let config = ContainerConfiguration::new();
        assert_eq!(config.registration_behavior(), RegistrationBehavior::Skip);
        assert!(config.unknown_type_resolution().is_none());
        assert!(!config.rebuild_singletons_in_child());
        assert_eq!(config.member_injection(), MemberInjectionRule::NONE);

        let config = config
            .with_member_injection(MemberInjectionRule::PUBLIC_SETTERS | MemberInjectionRule::LIMITED_SETTERS)
            .with_rebuild_singletons_in_child(true);
        assert!(config.member_injection().contains(MemberInjectionRule::LIMITED_SETTERS));
        assert!(config.rebuild_singletons_in_child());
    }
}
