//! Error types for object-graph resolution

use crate::ServiceType;
use thiserror::Error;

/// Errors that can occur while registering, planning or constructing services
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No registration or built-in resolver satisfies a required dependency
    #[error("Unable to resolve service: {service_type}{}", name_suffix(.name))]
    ResolutionFailed {
        service_type: String,
        name: Option<String>,
    },

    /// A type/name identity re-entered its own planning chain
    #[error("Circular dependency detected while resolving: {service_type}")]
    CircularDependency { service_type: String },

    /// Every constructor has an unresolvable parameter, or none is accessible
    #[error("No usable constructor found for {implementation}{}", unresolved_suffix(.unresolved))]
    NoUsableConstructor {
        implementation: String,
        unresolved: Vec<String>,
    },

    /// The implementation does not satisfy the declared service contract
    #[error("Invalid registration of {implementation} as {service_type}: {reason}")]
    InvalidRegistration {
        service_type: String,
        implementation: String,
        reason: String,
    },

    /// Duplicate binding under the throw-on-duplicate policy
    #[error("Service already registered: {implementation} as {service_type}")]
    AlreadyRegistered {
        service_type: String,
        implementation: String,
    },

    /// Operation attempted on a disposed container or scope
    #[error("The container or scope has been disposed")]
    Disposed,

    /// An activator, factory, setter or initializer failed
    #[error("Failed to create service {service_type}: {reason}")]
    CreationFailed {
        service_type: String,
        reason: String,
    },

    /// A parameterized factory was invoked with the wrong arguments
    #[error("Factory for {service_type} expects {expected} argument(s), got {actual}")]
    InvalidArguments {
        service_type: String,
        expected: usize,
        actual: usize,
    },
}

/// Discriminant of a [`DiError`], convenient for assertions and aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ResolutionFailed,
    CircularDependency,
    NoUsableConstructor,
    InvalidRegistration,
    AlreadyRegistered,
    Disposed,
    CreationFailed,
    InvalidArguments,
}

fn name_suffix(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" (named '{name}')"),
        None => String::new(),
    }
}

fn unresolved_suffix(unresolved: &[String]) -> String {
    if unresolved.is_empty() {
        " (no accessible constructor)".to_string()
    } else {
        format!(" (unresolved: {})", unresolved.join(", "))
    }
}

impl DiError {
    /// Create a ResolutionFailed error for a service type
    #[inline]
    pub fn resolution_failed(service_type: &ServiceType, name: Option<&str>) -> Self {
        Self::ResolutionFailed {
            service_type: service_type.to_string(),
            name: name.map(str::to_string),
        }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(service_type: &ServiceType) -> Self {
        Self::CircularDependency {
            service_type: service_type.to_string(),
        }
    }

    /// Create a NoUsableConstructor error
    #[inline]
    pub fn no_usable_constructor(implementation: &ServiceType, unresolved: Vec<String>) -> Self {
        Self::NoUsableConstructor {
            implementation: implementation.to_string(),
            unresolved,
        }
    }

    /// Create an InvalidRegistration error
    #[inline]
    pub fn invalid_registration(
        service_type: &ServiceType,
        implementation: &ServiceType,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRegistration {
            service_type: service_type.to_string(),
            implementation: implementation.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an AlreadyRegistered error
    #[inline]
    pub fn already_registered(service_type: &ServiceType, implementation: &ServiceType) -> Self {
        Self::AlreadyRegistered {
            service_type: service_type.to_string(),
            implementation: implementation.to_string(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(service_type: &ServiceType, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            service_type: service_type.to_string(),
            reason: reason.into(),
        }
    }

    /// The discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Self::CircularDependency { .. } => ErrorKind::CircularDependency,
            Self::NoUsableConstructor { .. } => ErrorKind::NoUsableConstructor,
            Self::InvalidRegistration { .. } => ErrorKind::InvalidRegistration,
            Self::AlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
            Self::Disposed => ErrorKind::Disposed,
            Self::CreationFailed { .. } => ErrorKind::CreationFailed,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
        }
    }

    /// Whether a consumer may treat this failure as "dependency absent".
    ///
    /// Only these kinds let constructor selection move on to the next
    /// candidate; everything else aborts the whole request.
    #[inline]
    pub(crate) fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            Self::ResolutionFailed { .. } | Self::NoUsableConstructor { .. }
        )
    }

    /// Short description used in NoUsableConstructor listings
    pub(crate) fn describe_unresolved(&self) -> String {
        match self {
            Self::ResolutionFailed { service_type, name } => {
                format!("{service_type}{}", name_suffix(name))
            }
            Self::NoUsableConstructor { implementation, .. } => {
                format!("{implementation} (no usable constructor)")
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let ty = ServiceType::named("ILogger");
        assert_eq!(
            DiError::resolution_failed(&ty, None).kind(),
            ErrorKind::ResolutionFailed
        );
        assert_eq!(DiError::circular(&ty).kind(), ErrorKind::CircularDependency);
        assert_eq!(DiError::Disposed.kind(), ErrorKind::Disposed);
    }

    #[test]
    fn test_messages_include_names() {
        let ty = ServiceType::named("ILogger");
        let err = DiError::resolution_failed(&ty, Some("audit"));
        assert_eq!(
            err.to_string(),
            "Unable to resolve service: ILogger (named 'audit')"
        );

        let err = DiError::no_usable_constructor(&ty, vec![]);
        assert!(err.to_string().contains("no accessible constructor"));

        let err = DiError::no_usable_constructor(&ty, vec!["IClock".into()]);
        assert!(err.to_string().ends_with("(unresolved: IClock)"));
    }

    #[test]
    fn test_unresolvable_classification() {
        let ty = ServiceType::named("IClock");
        assert!(DiError::resolution_failed(&ty, None).is_unresolvable());
        assert!(DiError::no_usable_constructor(&ty, vec![]).is_unresolvable());
        assert!(!DiError::circular(&ty).is_unresolvable());
        assert!(!DiError::Disposed.is_unresolvable());
    }
}
