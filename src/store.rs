//! Registration and decorator stores
//!
//! A store is a versioned persistent tree from service type to a bucket of
//! registrations. Every update builds a new tree and publishes it with a
//! compare-and-swap, so a reader always sees one complete version.

use crate::ServiceType;
use crate::registration::ServiceRegistration;
use crate::tree::{ImmutableTree, Swap};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Registrations bound to one service type, ascending by registration number.
pub(crate) type Bucket = Arc<[Arc<ServiceRegistration>]>;

#[derive(Clone, Default)]
struct StoreSnapshot {
    version: u64,
    tree: ImmutableTree<ServiceType, Bucket>,
}

/// Candidates for a requested type: exact matches and, for a closed
/// generic request, the bucket of its open definition.
#[derive(Clone, Default)]
pub(crate) struct Candidates {
    pub closed: Option<Bucket>,
    pub open: Option<Bucket>,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.closed.is_none() && self.open.is_none()
    }

    /// Every candidate, exact first, each part in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceRegistration>> {
        self.closed
            .iter()
            .chain(self.open.iter())
            .flat_map(|bucket| bucket.iter())
    }
}

/// Outcome of [`RegistrationStore::add_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreUpdate {
    Added,
    Replaced,
    Unchanged,
    /// A registration with the same identity exists under [`Duplicates::Reject`]
    Rejected,
}

impl StoreUpdate {
    #[inline]
    pub fn changed(self) -> bool {
        matches!(self, StoreUpdate::Added | StoreUpdate::Replaced)
    }
}

/// How a registration with an identity already in the bucket is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Duplicates {
    /// Leave the existing registration in place
    Skip,
    /// Swap it out; the replacement takes the newest position
    Replace,
    /// Bind both
    Keep,
    /// Leave it in place and report [`StoreUpdate::Rejected`]
    Reject,
    /// Replace it; publish nothing when there is none
    ReplaceOnly,
}

/// Service registrations, or decorators keyed by the service they decorate.
pub(crate) struct RegistrationStore {
    snapshot: Swap<StoreSnapshot>,
}

/// Decorators live in a store of the same shape.
pub(crate) type DecoratorStore = RegistrationStore;

impl RegistrationStore {
    pub fn new() -> Self {
        Self {
            snapshot: Swap::new(StoreSnapshot::default()),
        }
    }

    /// Publish `registration` under `service_type`.
    ///
    /// `remap` swaps the whole bucket for a single-element one. Otherwise a
    /// registration with the same identity is handled per `duplicates`;
    /// anything else is appended.
    pub fn add_or_update(
        &self,
        service_type: &ServiceType,
        registration: Arc<ServiceRegistration>,
        remap: bool,
        duplicates: Duplicates,
    ) -> StoreUpdate {
        let mut rejected = false;
        let outcome = self.snapshot.update(|snapshot| {
            rejected = false;
            let existing = snapshot.tree.get(service_type);
            let (bucket, outcome): (Bucket, StoreUpdate) = match existing {
                Some(_) if remap => (Arc::from([Arc::clone(&registration)]), StoreUpdate::Replaced),
                None if duplicates == Duplicates::ReplaceOnly => return None,
                None => (Arc::from([Arc::clone(&registration)]), StoreUpdate::Added),
                Some(bucket) => match bucket.iter().position(|r| r.same_identity(&registration)) {
                    None if duplicates == Duplicates::ReplaceOnly => return None,
                    Some(_) if duplicates == Duplicates::Skip => return None,
                    Some(_) if duplicates == Duplicates::Reject => {
                        rejected = true;
                        return None;
                    }
                    Some(index) if matches!(duplicates, Duplicates::Replace | Duplicates::ReplaceOnly) => {
                        // the replacement takes the newest position
                        let mut items: Vec<_> = bucket.iter().cloned().collect();
                        items.remove(index);
                        items.push(Arc::clone(&registration));
                        (items.into(), StoreUpdate::Replaced)
                    }
                    _ => {
                        let mut items: Vec<_> = bucket.iter().cloned().collect();
                        items.push(Arc::clone(&registration));
                        items.sort_by_key(|r| r.number());
                        (items.into(), StoreUpdate::Added)
                    }
                },
            };

            let next = StoreSnapshot {
                version: snapshot.version + 1,
                tree: snapshot.tree.insert(service_type.clone(), bucket),
            };
            Some((next, outcome))
        });

        let outcome = match outcome {
            Some(outcome) => outcome,
            None if rejected => StoreUpdate::Rejected,
            None => StoreUpdate::Unchanged,
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "ioc_graph",
            service = %service_type,
            registration = %registration.id(),
            ?outcome,
            "Store update"
        );

        outcome
    }


    /// Exact matches plus the open definition's bucket for closed generics.
    pub fn candidates(&self, service_type: &ServiceType) -> Candidates {
        let snapshot = self.snapshot.load();
        let closed = snapshot.tree.get(service_type).cloned();
        let open = if service_type.is_closed_generic() {
            service_type
                .generic_definition()
                .and_then(|definition| snapshot.tree.get(&definition).cloned())
        } else {
            None
        };
        Candidates { closed, open }
    }

    /// Exact bucket only.
    pub fn bucket(&self, service_type: &ServiceType) -> Option<Bucket> {
        self.snapshot.load().tree.get(service_type).cloned()
    }

    /// Every `(service type, registration)` pair in one consistent version.
    pub fn mappings(&self) -> Vec<(ServiceType, Arc<ServiceRegistration>)> {
        let snapshot = self.snapshot.load();
        snapshot
            .tree
            .iter()
            .flat_map(|(ty, bucket)| bucket.iter().map(move |r| (ty.clone(), Arc::clone(r))))
            .collect()
    }

    /// Bumped on every published change.
    #[inline]
    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }
}
