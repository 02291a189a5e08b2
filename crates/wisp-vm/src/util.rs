//! A small insertion-ordered string-keyed map.
//!
//! The source runtime's `Map` value and every attribute table
//! (`StructDef.attr_defaults`, `Struct.attrs`, `Fn.default_params`) need
//! to preserve declaration/insertion order while still supporting O(1)
//! lookup by name. `ahash::AHashMap` alone loses order; a plain `Vec` of
//! pairs alone is O(n) to look up. This pairs them the way the source's
//! `std::map`-backed attribute tables behave observably (stable iteration
//! order matching insertion), without pulling in a new ordered-map crate.

use ahash::AHashMap;

#[derive(Debug, Clone, Default)]
pub struct OrderedMap<V> {
    index: AHashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self { index: AHashMap::new(), entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let i = *self.index.get(key)?;
        Some(&mut self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts, preserving the original position if `key` already existed
    /// (matches the source's attribute tables, where re-assignment doesn't
    /// reorder).
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        if let Some(&i) = self.index.get(&key) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let i = self.index.remove(key)?;
        let (_, v) = self.entries.remove(i);
        for (_, idx) in self.index.iter_mut() {
            if *idx > i {
                *idx -= 1;
            }
        }
        Some(v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn at_index(&self, i: usize) -> Option<(&str, &V)> {
        self.entries.get(i).map(|(k, v)| (k.as_str(), v))
    }
}

impl<V: Clone> OrderedMap<V> {
    pub fn to_vec(&self) -> Vec<(String, V)> {
        self.entries.clone()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut m = Self::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut m = OrderedMap::new();
        m.insert("b", 2);
        m.insert("a", 1);
        m.insert("b", 20);
        let keys: Vec<_> = m.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(*m.get("b").unwrap(), 20);
    }

    #[test]
    fn remove_reindexes() {
        let mut m = OrderedMap::new();
        m.insert("a", 1);
        m.insert("b", 2);
        m.insert("c", 3);
        m.remove("a");
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(*m.get("c").unwrap(), 3);
    }
}
