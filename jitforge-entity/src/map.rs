//! Densely numbered entity references as mapping keys.

use crate::keys::Keys;
use crate::EntityRef;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use core::slice;

/// A mapping `K -> V` that also allocates the dense keys `K` itself.
///
/// A `PrimaryMap` is used to store the first-class data for a kind of entity, and to hand out
/// fresh keys for new entities (`push` returns the key it assigned). Unlike `SecondaryMap`, the key
/// space is owned by this map, not just indexed by it.
#[derive(Debug, Clone)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    /// Create a new empty map.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            unused: PhantomData,
        }
    }

    /// Create a new empty map with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elems: Vec::with_capacity(capacity),
            unused: PhantomData,
        }
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Is this map empty?
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Is `k` a valid key, i.e. was it handed out by a previous `push`?
    pub fn is_valid(&self, k: K) -> bool {
        k.index() < self.elems.len()
    }

    /// Get the element at `k`, if it exists.
    pub fn get(&self, k: K) -> Option<&V> {
        self.elems.get(k.index())
    }

    /// Get a mutable reference to the element at `k`, if it exists.
    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        self.elems.get_mut(k.index())
    }

    /// Append `v` to the map, allocating a fresh key for it.
    pub fn push(&mut self, v: V) -> K {
        let k = K::new(self.elems.len());
        self.elems.push(v);
        k
    }

    /// Remove all entries and keys from this map.
    pub fn clear(&mut self) {
        self.elems.clear()
    }

    /// Iterate over all the keys and values in this map.
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(self.elems.iter())
    }

    /// Iterate over all the keys and values in this map, mutably.
    pub fn iter_mut(&mut self) -> IterMut<K, V> {
        IterMut::new(self.elems.iter_mut())
    }

    /// Iterate over all the keys in this map.
    pub fn keys(&self) -> Keys<K> {
        Keys::with_len(self.elems.len())
    }

    /// Iterate over all the values in this map.
    pub fn values(&self) -> slice::Iter<V> {
        self.elems.iter()
    }

    /// The next key that `push` would hand out.
    pub fn next_key(&self) -> K {
        K::new(self.elems.len())
    }
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> Index<K> for PrimaryMap<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &V {
        &self.elems[k.index()]
    }
}

impl<K: EntityRef, V> IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        &mut self.elems[k.index()]
    }
}

/// A mapping `K -> V` for densely indexed entity references, without the ability to allocate new
/// keys.
///
/// `SecondaryMap` is used to associate secondary information with entities whose keys were
/// allocated by a `PrimaryMap` elsewhere (e.g. per-`VirtReg` liveness intervals). The map does not
/// track which entries have actually been inserted; it behaves as if every key has a default entry
/// from the start.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K, V> SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone + Default,
{
    /// Create a new empty map.
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            default: Default::default(),
            unused: PhantomData,
        }
    }
}

impl<K, V> SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    /// Create a new empty map with a specified default value.
    ///
    /// This constructor does not require `V: Default`.
    pub fn with_default(default: V) -> Self {
        Self {
            elems: Vec::new(),
            default,
            unused: PhantomData,
        }
    }

    /// Number of elements in the underlying vector. Not necessarily the number of live keys.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Is this map empty?
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Get the element at `k`, if it has been grown to cover it.
    pub fn get(&self, k: K) -> Option<&V> {
        self.elems.get(k.index())
    }

    /// Remove all entries from this map, keeping the default.
    pub fn clear(&mut self) {
        self.elems.clear()
    }

    /// Resize the map to hold `n` entries, filling new slots with the default value.
    pub fn resize(&mut self, n: usize) {
        self.elems.resize(n, self.default.clone());
    }

    fn ensure(&mut self, index: usize) {
        if index >= self.elems.len() {
            self.elems.resize(index + 1, self.default.clone());
        }
    }
}

impl<K, V> Index<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    type Output = V;

    fn index(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }
}

impl<K, V> IndexMut<K> for SecondaryMap<K, V>
where
    K: EntityRef,
    V: Clone,
{
    fn index_mut(&mut self, k: K) -> &mut V {
        self.ensure(k.index());
        &mut self.elems[k.index()]
    }
}

/// Iterator over the keys and values of an entity map, in key order.
pub struct Iter<'a, K: EntityRef, V> {
    iter: core::iter::Enumerate<slice::Iter<'a, V>>,
    unused: PhantomData<K>,
}

impl<'a, K: EntityRef, V> Iter<'a, K, V> {
    fn new(iter: slice::Iter<'a, V>) -> Self {
        Self {
            iter: iter.enumerate(),
            unused: PhantomData,
        }
    }
}

impl<'a, K: EntityRef, V> Iterator for Iter<'a, K, V> {
    type Item = (K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(i, v)| (K::new(i), v))
    }
}

/// Iterator over the keys and values of an entity map, mutably, in key order.
pub struct IterMut<'a, K: EntityRef, V> {
    iter: core::iter::Enumerate<slice::IterMut<'a, V>>,
    unused: PhantomData<K>,
}

impl<'a, K: EntityRef, V> IterMut<'a, K, V> {
    fn new(iter: slice::IterMut<'a, V>) -> Self {
        Self {
            iter: iter.enumerate(),
            unused: PhantomData,
        }
    }
}

impl<'a, K: EntityRef, V> Iterator for IterMut<'a, K, V> {
    type Item = (K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(i, v)| (K::new(i), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    struct E(u32);
    crate::entity_impl!(E, "e");

    #[test]
    fn primary_map_assigns_keys_in_order() {
        let mut m: PrimaryMap<E, &str> = PrimaryMap::new();
        let a = m.push("a");
        let b = m.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(m[a], "a");
        assert_eq!(m[b], "b");
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn secondary_map_defaults_unset_entries() {
        let mut m: SecondaryMap<E, u32> = SecondaryMap::new();
        let k = E::new(5);
        assert_eq!(m[k], 0);
        m[k] = 42;
        assert_eq!(m[k], 42);
        assert_eq!(m[E::new(0)], 0);
    }

    #[test]
    fn iter_yields_keys_in_order() {
        let mut m: PrimaryMap<E, i32> = PrimaryMap::new();
        m.push(10);
        m.push(20);
        let collected: Vec<(E, i32)> = m.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(collected, vec![(E::new(0), 10), (E::new(1), 20)]);
    }
}
