//! Entity references: typed indices into per-function dense arenas.
//!
//! Every IR handle in this crate (a basic block, a node, a virtual register,
//! ...) is a newtype wrapping a `u32` index rather than a pointer or an
//! `Rc`/`Arc`. This keeps graphs acyclic-by-construction (back edges are just
//! indices) and keeps `Clone` cheap and total. `PrimaryMap` owns the dense
//! storage for a given entity kind; `SecondaryMap` attaches auxiliary,
//! densely-indexed data (e.g. liveness sets) to entities defined elsewhere.

use std::marker::PhantomData;

/// A type that can be used as a dense arena key.
pub trait EntityRef: Copy + Eq + std::hash::Hash {
    /// Create a new entity reference from a linear index.
    fn new(index: usize) -> Self;
    /// Get the index of this reference.
    fn index(self) -> usize;
}

/// Declare a newtype wrapping `u32` and implement `EntityRef` plus `Display`
/// as `"<prefix><n>"` for it (e.g. `Block` displays as `block3`).
macro_rules! entity_impl {
    ($name:ident, $prefix:expr) => {
        impl $crate::entity::EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $name(index as u32)
            }
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                (self as &dyn ::std::fmt::Display).fmt(f)
            }
        }
    };
}

pub(crate) use entity_impl;

/// Dense, append-only storage owning one `V` per allocated `K`.
#[derive(Clone, Debug)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    _marker: PhantomData<K>,
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append `value`, returning the key that was allocated for it.
    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len());
        self.elems.push(value);
        key
    }

    /// Number of entities stored.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// True if no entities have been allocated.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Remove every entity. Previously issued keys become invalid.
    pub fn clear(&mut self) {
        self.elems.clear();
    }

    /// Iterate over `(key, &value)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }

    /// Iterate over keys in allocation order.
    pub fn keys(&self) -> impl Iterator<Item = K> {
        (0..self.elems.len()).map(K::new)
    }

    /// Iterate over `(key, &mut value)` pairs in allocation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.elems
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }

    /// Iterate over values in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.elems.iter()
    }
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> std::ops::Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, key: K) -> &V {
        &self.elems[key.index()]
    }
}

impl<K: EntityRef, V> std::ops::IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.elems[key.index()]
    }
}

/// Densely-indexed storage where every entity has a value, defaulting to
/// `V::default()` for keys beyond the current high-water mark. Used for
/// auxiliary per-entity data (liveness sets, spill locations, ...) computed
/// after the primary arena for the entity already exists.
#[derive(Clone, Debug)]
pub struct SecondaryMap<K: EntityRef, V: Clone + Default> {
    elems: Vec<V>,
    default: V,
    _marker: PhantomData<K>,
}

impl<K: EntityRef, V: Clone + Default> SecondaryMap<K, V> {
    /// Create an empty secondary map.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: V::default(),
            _marker: PhantomData,
        }
    }

    /// Ensure storage for at least `n` entities exists.
    pub fn resize(&mut self, n: usize) {
        if self.elems.len() < n {
            self.elems.resize(n, self.default.clone());
        }
    }

    /// Remove every stored value.
    pub fn clear(&mut self) {
        self.elems.clear();
    }

    /// True if nothing has been stored (and thus every lookup would return
    /// the default value).
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    fn ensure(&mut self, index: usize) {
        if index >= self.elems.len() {
            self.elems.resize(index + 1, self.default.clone());
        }
    }
}

impl<K: EntityRef, V: Clone + Default> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V: Clone + Default> std::ops::Index<K> for SecondaryMap<K, V> {
    type Output = V;
    fn index(&self, key: K) -> &V {
        self.elems.get(key.index()).unwrap_or(&self.default)
    }
}

impl<K: EntityRef, V: Clone + Default> std::ops::IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        self.ensure(key.index());
        &mut self.elems[key.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Hash)]
    struct Thing(u32);
    entity_impl!(Thing, "thing");

    #[test]
    fn primary_map_round_trips() {
        let mut m: PrimaryMap<Thing, &'static str> = PrimaryMap::new();
        let a = m.push("a");
        let b = m.push("b");
        assert_eq!(m[a], "a");
        assert_eq!(m[b], "b");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn secondary_map_defaults() {
        let mut m: PrimaryMap<Thing, ()> = PrimaryMap::new();
        let a = m.push(());
        let mut sec: SecondaryMap<Thing, u32> = SecondaryMap::new();
        assert_eq!(sec[a], 0);
        sec[a] = 7;
        assert_eq!(sec[a], 7);
    }
}
