//! Union-Find with Values
//!
//! Disjoint-set structure whose representatives carry a value slot. Merging
//! two components combines their values through a caller-supplied function.
//! The decomposition validator uses it to collapse all bags containing a
//! given attribute into one component; the check passes iff a single
//! component remains per attribute.

use std::collections::HashMap;
use std::hash::Hash;

/// Disjoint sets over keys of type `K`, with a value of type `V` attached to
/// each representative.
#[derive(Debug, Clone, Default)]
pub struct UnionFindMap<K, V> {
    parent: HashMap<K, K>,
    rank: HashMap<K, u32>,
    values: HashMap<K, V>,
}

impl<K: Clone + Eq + Hash, V> UnionFindMap<K, V> {
    pub fn new() -> Self {
        UnionFindMap {
            parent: HashMap::new(),
            rank: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Add a singleton component. Re-inserting an existing key replaces its
    /// component's value.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(root) = self.find(&key) {
            self.values.insert(root, value);
            return;
        }
        self.parent.insert(key.clone(), key.clone());
        self.rank.insert(key.clone(), 0);
        self.values.insert(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.parent.contains_key(key)
    }

    /// Representative of the key's component, or `None` for unknown keys.
    /// Applies path compression.
    pub fn find(&mut self, key: &K) -> Option<K> {
        if !self.parent.contains_key(key) {
            return None;
        }
        let mut root = key.clone();
        while self.parent[&root] != root {
            root = self.parent[&root].clone();
        }
        let mut current = key.clone();
        while current != root {
            let next = self.parent[&current].clone();
            self.parent.insert(current, root.clone());
            current = next;
        }
        Some(root)
    }

    /// Merge the components of `a` and `b`, combining their values with
    /// `merge`. Returns `false` when either key is unknown.
    pub fn union<F>(&mut self, a: &K, b: &K, merge: F) -> bool
    where
        F: FnOnce(V, V) -> V,
    {
        let (Some(ra), Some(rb)) = (self.find(a), self.find(b)) else {
            return false;
        };
        if ra == rb {
            return true;
        }

        let va = self.values.remove(&ra).expect("representative has a value");
        let vb = self.values.remove(&rb).expect("representative has a value");
        let merged = merge(va, vb);

        let rank_a = self.rank[&ra];
        let rank_b = self.rank[&rb];
        let (winner, loser) = if rank_a >= rank_b { (ra, rb) } else { (rb, ra) };
        if rank_a == rank_b {
            *self.rank.get_mut(&winner).expect("rank present") += 1;
        }
        self.parent.insert(loser, winner.clone());
        self.values.insert(winner, merged);
        true
    }

    /// Value attached to the key's component.
    pub fn value_of(&mut self, key: &K) -> Option<&V> {
        let root = self.find(key)?;
        self.values.get(&root)
    }

    /// All current representatives, one per component.
    pub fn representatives(&mut self) -> Vec<K> {
        let keys: Vec<K> = self.parent.keys().cloned().collect();
        let mut roots = Vec::new();
        for key in keys {
            let root = self.find(&key).expect("known key has a root");
            if root == key {
                roots.push(key);
            }
        }
        roots
    }

    /// Number of distinct components.
    pub fn component_count(&mut self) -> usize {
        self.representatives().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut uf: UnionFindMap<i32, i32> = UnionFindMap::new();
        uf.insert(1, 10);
        uf.insert(2, 20);
        assert_eq!(uf.component_count(), 2);
        assert_eq!(uf.value_of(&1), Some(&10));
    }

    #[test]
    fn test_union_merges_values() {
        let mut uf: UnionFindMap<i32, i32> = UnionFindMap::new();
        uf.insert(1, 10);
        uf.insert(2, 20);
        uf.insert(3, 99);

        assert!(uf.union(&1, &2, |a, b| a + b));
        assert_eq!(uf.component_count(), 2);
        assert_eq!(uf.value_of(&1), Some(&30));
        assert_eq!(uf.value_of(&2), Some(&30));
        assert_eq!(uf.value_of(&3), Some(&99));
    }

    #[test]
    fn test_union_unknown_key() {
        let mut uf: UnionFindMap<i32, ()> = UnionFindMap::new();
        uf.insert(1, ());
        assert!(!uf.union(&1, &9, |a, _| a));
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut uf: UnionFindMap<i32, i32> = UnionFindMap::new();
        uf.insert(1, 1);
        uf.insert(2, 2);
        assert!(uf.union(&1, &2, |a, b| a + b));
        assert!(uf.union(&2, &1, |a, b| a + b));
        assert_eq!(uf.component_count(), 1);
        assert_eq!(uf.value_of(&1), Some(&3));
    }

    #[test]
    fn test_chain_collapses_to_one_component() {
        let mut uf: UnionFindMap<u32, u32> = UnionFindMap::new();
        for i in 0..6 {
            uf.insert(i, 1);
        }
        for i in 0..5 {
            assert!(uf.union(&i, &(i + 1), |a, b| a + b));
        }
        assert_eq!(uf.component_count(), 1);
        assert_eq!(uf.value_of(&3), Some(&6));
    }
}
