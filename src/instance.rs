//! Type-erased instances
//!
//! Everything the engine constructs travels as an [`Instance`]; typed access
//! is a checked downcast at the edge.

use crate::{DiError, Result, ServiceType};
use std::any::Any;
use std::sync::Arc;

/// A constructed, shareable service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker trait for values that can live in the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Wrap a value into an [`Instance`].
#[inline]
pub fn instance<T: Injectable>(value: T) -> Instance {
    Arc::new(value)
}

/// Downcast an [`Instance`] to a concrete type.
///
/// `service_type` is only used to build the error message.
#[inline]
pub fn downcast<T: Injectable>(instance: Instance, service_type: &ServiceType) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        DiError::creation_failed(
            service_type,
            format!("instance is not a {}", std::any::type_name::<T>()),
        )
    })
}

/// Services that release resources when their owning scope is disposed.
pub trait Disposable: Send + Sync {
    /// Release resources. Called at most once per tracked instance.
    fn dispose(&self);
}

/// Type-erased disposal hook for an instance.
pub type Disposer = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Build a [`Disposer`] that forwards to `T`'s [`Disposable`] impl.
pub fn disposer_for<T: Disposable + Injectable>() -> Disposer {
    Arc::new(|instance: &Instance| {
        if let Some(value) = instance.downcast_ref::<T>() {
            value.dispose();
        }
    })
}

/// Result of resolving a `Tuple<..>` shape: one instance per slot.
#[derive(Clone)]
pub struct ServiceTuple(pub Vec<Instance>);

impl ServiceTuple {
    /// Slot `index` of the tuple
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Instance> {
        self.0.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ServiceTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTuple")
            .field("slots", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Handle {
        closed: AtomicU32,
    }

    impl Disposable for Handle {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_downcast() {
        let ty = ServiceType::named("Number");
        let value = instance(42u32);
        assert_eq!(*downcast::<u32>(value.clone(), &ty).unwrap(), 42);

        let err = downcast::<String>(value, &ty).unwrap_err();
        assert!(err.to_string().contains("Number"));
    }

    #[test]
    fn test_disposer_for() {
        let handle = instance(Handle {
            closed: AtomicU32::new(0),
        });
        let disposer = disposer_for::<Handle>();
        disposer(&handle);

        let handle = handle.downcast::<Handle>().unwrap();
        assert_eq!(handle.closed.load(Ordering::SeqCst), 1);

        // foreign instances are ignored
        disposer(&instance(1u8));
    }
}
