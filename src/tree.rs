//! Persistent data structures and atomic publication
//!
//! Every shared structure in the engine is an immutable snapshot: a mutation
//! builds a new version that shares all untouched nodes with the old one, and
//! the new version is published with a compare-and-swap. Readers never take
//! a lock and never observe a partially applied update.

use arc_swap::{ArcSwap, Guard};
use std::cmp::Ordering;
use std::sync::Arc;

// =============================================================================
// Immutable AVL tree
// =============================================================================

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    height: u8,
    left: Link<K, V>,
    right: Link<K, V>,
}

/// Immutable balanced binary search tree.
///
/// `add_or_update` returns a new tree; `self` is never modified. Once a node
/// is shared it is never mutated again.
pub(crate) struct ImmutableTree<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Clone for ImmutableTree<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for ImmutableTree<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

#[inline]
fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

impl<K: Ord + Clone, V: Clone> ImmutableTree<K, V> {
    /// Look up a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(&node.key) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// New tree with `key` added, or with its value replaced by
    /// `update(old, value)` when the key already exists.
    pub fn add_or_update<F>(&self, key: K, value: V, update: F) -> Self
    where
        F: FnOnce(&V, V) -> V,
    {
        let mut added = false;
        let root = Self::insert_node(&self.root, key, value, update, &mut added);
        Self {
            root: Some(root),
            len: self.len + usize::from(added),
        }
    }

    /// New tree with `key` bound to `value`, replacing any previous value.
    #[inline]
    pub fn insert(&self, key: K, value: V) -> Self {
        self.add_or_update(key, value, |_, new| new)
    }

    fn insert_node<F>(link: &Link<K, V>, key: K, value: V, update: F, added: &mut bool) -> Arc<Node<K, V>>
    where
        F: FnOnce(&V, V) -> V,
    {
        let Some(node) = link else {
            *added = true;
            return Self::make(key, value, None, None);
        };

        match key.cmp(&node.key) {
            Ordering::Less => {
                let left = Self::insert_node(&node.left, key, value, update, added);
                Self::balance(node.key.clone(), node.value.clone(), Some(left), node.right.clone())
            }
            Ordering::Greater => {
                let right = Self::insert_node(&node.right, key, value, update, added);
                Self::balance(node.key.clone(), node.value.clone(), node.left.clone(), Some(right))
            }
            Ordering::Equal => Arc::new(Node {
                key,
                value: update(&node.value, value),
                height: node.height,
                left: node.left.clone(),
                right: node.right.clone(),
            }),
        }
    }

    fn make(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
        let height = 1 + height(&left).max(height(&right));
        Arc::new(Node {
            key,
            value,
            height,
            left,
            right,
        })
    }

    fn balance(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
        let (hl, hr) = (height(&left), height(&right));

        if hl > hr + 1 {
            if let Some(l) = &left {
                if height(&l.left) >= height(&l.right) {
                    let new_right = Self::make(key, value, l.right.clone(), right);
                    return Self::make(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right));
                }
                if let Some(lr) = &l.right {
                    let new_left = Self::make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
                    let new_right = Self::make(key, value, lr.right.clone(), right);
                    return Self::make(lr.key.clone(), lr.value.clone(), Some(new_left), Some(new_right));
                }
            }
        } else if hr > hl + 1 {
            if let Some(r) = &right {
                if height(&r.right) >= height(&r.left) {
                    let new_left = Self::make(key, value, left, r.left.clone());
                    return Self::make(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone());
                }
                if let Some(rl) = &r.left {
                    let new_left = Self::make(key, value, left, rl.left.clone());
                    let new_right = Self::make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
                    return Self::make(rl.key.clone(), rl.value.clone(), Some(new_left), Some(new_right));
                }
            }
        }

        Self::make(key, value, left, right)
    }
}

impl<K, V> ImmutableTree<K, V> {
    /// The empty tree.
    #[inline]
    pub const fn empty() -> Self {
        Self { root: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// In-order walk over the entries.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }
}

/// In-order iterator over an [`ImmutableTree`].
pub(crate) struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut current: Option<&'a Node<K, V>>) {
        while let Some(node) = current {
            self.stack.push(node);
            current = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}

// =============================================================================
// Immutable stack
// =============================================================================

struct StackNode<T> {
    item: T,
    next: Option<Arc<StackNode<T>>>,
}

/// Persistent singly-linked stack; iteration yields the most recent push first.
pub(crate) struct ImmutableStack<T> {
    head: Option<Arc<StackNode<T>>>,
    len: usize,
}

impl<T> ImmutableStack<T> {
    #[inline]
    pub const fn empty() -> Self {
        Self { head: None, len: 0 }
    }

    /// New stack with `item` on top.
    pub fn push(&self, item: T) -> Self {
        Self {
            head: Some(Arc::new(StackNode {
                item,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        std::iter::successors(self.head.as_deref(), |node| node.next.as_deref()).map(|node| &node.item)
    }
}

impl<T> Default for ImmutableStack<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Atomic publication
// =============================================================================

/// A published snapshot that is replaced, never mutated.
///
/// Writers run a compare-and-swap loop: read the current snapshot, compute
/// its successor, publish only if the snapshot is still current, otherwise
/// recompute against the latest one. No writer can lose another's update.
pub(crate) struct Swap<T> {
    cell: ArcSwap<T>,
}

impl<T> Swap<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            cell: ArcSwap::from_pointee(value),
        }
    }

    /// Current snapshot.
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.cell.load_full()
    }

    /// Publish the successor computed by `f`.
    ///
    /// `f` may run several times under contention and must be pure; it
    /// returns `None` to leave the snapshot untouched. The value returned is
    /// the `R` of the attempt that won.
    pub fn update<R, F>(&self, mut f: F) -> Option<R>
    where
        F: FnMut(&T) -> Option<(T, R)>,
    {
        let mut current = self.cell.load_full();
        loop {
            let (next, result) = f(&current)?;
            let previous = self.cell.compare_and_swap(&current, Arc::new(next));
            if Arc::ptr_eq(&*previous, &current) {
                return Some(result);
            }
            current = Guard::into_inner(previous);
        }
    }

    /// Unconditionally publish `value`, returning the snapshot it replaced.
    #[inline]
    pub fn replace(&self, value: T) -> Arc<T> {
        self.cell.swap(Arc::new(value))
    }
}
