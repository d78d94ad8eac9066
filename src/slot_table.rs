use crate::error::{Error, Result};

/// Fixed-capacity table keyed by a stable, unique `u32` (e.g. a player slot).
///
/// Keys outside `0..N` are rejected instead of being wrapped, and an
/// occupied key is never silently overwritten.
pub struct BoundedTable<V, const N: usize> {
    entries: [Option<V>; N],
}

impl<V, const N: usize> BoundedTable<V, N> {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn index(key: u32) -> Result<usize> {
        let index = key as usize;
        if index < N {
            Ok(index)
        } else {
            Err(Error::KeyNotRepresentable { key, capacity: N })
        }
    }

    /// Associates `value` with `key`. Fails if `key` already holds a different value.
    pub fn insert(&mut self, key: u32, value: V) -> Result<()>
    where
        V: PartialEq,
    {
        let entry = &mut self.entries[Self::index(key)?];
        if entry.as_ref().is_some_and(|existing| *existing != value) {
            return Err(Error::SlotOccupied(key));
        }
        *entry = Some(value);
        Ok(())
    }

    /// Associates `value` with `key`, returning whatever was there.
    pub fn replace(&mut self, key: u32, value: V) -> Result<Option<V>> {
        let index = Self::index(key)?;
        Ok(self.entries[index].replace(value))
    }

    pub fn get(&self, key: u32) -> Result<Option<&V>> {
        Ok(self.entries[Self::index(key)?].as_ref())
    }

    pub fn remove(&mut self, key: u32) -> Result<Option<V>> {
        let index = Self::index(key)?;
        Ok(self.entries[index].take())
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &V)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|v| (i as u32, v)))
    }
}

impl<V, const N: usize> Default for BoundedTable<V, N> {
    fn default() -> Self {
        Self::new()
    }
}
