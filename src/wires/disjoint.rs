//! Disjoint-set forest with path compression and union by rank.

/// A disjoint-set forest over the indices `0..len`.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    /// Create a forest of `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether the forest has no elements.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Append a new singleton set and return its index.
    pub fn push(&mut self) -> usize {
        let idx = self.parent.len();
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    /// Detach `x` back into a singleton.
    ///
    /// Only sound when every member of `x`'s class is reset together,
    /// otherwise other members could still point through `x`.
    pub fn reset(&mut self, x: usize) {
        self.parent[x] = x;
        self.rank[x] = 0;
    }

    /// Root of the class containing `x`, compressing the path on the way.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Second pass: point everything on the path straight at the root
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the classes of `a` and `b`. Returns the new root, or `None` if
    /// they were already in the same class.
    pub fn unite(&mut self, a: usize, b: usize) -> Option<usize> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return None;
        }
        let root = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
                ra
            }
        };
        Some(root)
    }

    /// Whether `a` and `b` are in the same class.
    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unite_and_find() {
        let mut ds = DisjointSet::new(6);
        assert!(!ds.same(0, 1));
        assert!(ds.unite(0, 1).is_some());
        assert!(ds.unite(2, 3).is_some());
        assert!(ds.unite(1, 3).is_some());
        assert!(ds.unite(0, 2).is_none());
        assert!(ds.same(0, 3));
        assert!(!ds.same(0, 4));
        assert_eq!(ds.find(5), 5);
    }

    #[test]
    fn test_reset_class() {
        let mut ds = DisjointSet::new(4);
        ds.unite(0, 1);
        ds.unite(1, 2);
        for x in 0..3 {
            ds.reset(x);
        }
        assert!(!ds.same(0, 1));
        assert!(!ds.same(1, 2));
        ds.unite(0, 2);
        assert!(ds.same(0, 2));
        assert!(!ds.same(0, 1));
    }

    #[test]
    fn test_push_grows() {
        let mut ds = DisjointSet::new(0);
        assert!(ds.is_empty());
        let a = ds.push();
        let b = ds.push();
        assert_eq!(ds.len(), 2);
        ds.unite(a, b);
        assert!(ds.same(a, b));
    }
}
