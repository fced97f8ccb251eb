use serde::{Deserialize, Serialize};

use crate::types::ElemId;

/// Merge-history tree of an aggregate.
///
/// Records the order in which monomers were merged. It carries provenance
/// only and never influences geometry. The default leaf type is the
/// monomer identifier; [`CrystalTree`] records crystal types instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeTree<T = ElemId> {
    Leaf(T),
    Merge(Box<MergeTree<T>>, Box<MergeTree<T>>),
}

/// Crystal type of every merged monomer, `None` where it is unknown.
pub type CrystalTree = MergeTree<Option<String>>;

impl<T> MergeTree<T> {
    pub fn leaf(id: T) -> Self {
        MergeTree::Leaf(id)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        match self {
            MergeTree::Leaf(_) => 1,
            MergeTree::Merge(l, r) => l.leaf_count() + r.leaf_count(),
        }
    }

    /// Longest root-to-leaf path, counting merges.
    pub fn depth(&self) -> usize {
        match self {
            MergeTree::Leaf(_) => 0,
            MergeTree::Merge(l, r) => 1 + l.depth().max(r.depth()),
        }
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::with_capacity(self.leaf_count());
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<T>)
    where
        T: Clone,
    {
        match self {
            MergeTree::Leaf(id) => out.push(id.clone()),
            MergeTree::Merge(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
        }
    }
}

impl<T: Default> MergeTree<T> {
    /// Replaces `self` with `Merge(self, branch)`.
    pub fn push_branch(&mut self, branch: MergeTree<T>) {
        let left = std::mem::take(self);
        *self = MergeTree::Merge(Box::new(left), Box::new(branch));
    }
}

impl<T: Default> Default for MergeTree<T> {
    fn default() -> Self {
        MergeTree::Leaf(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_branch_nests_left() {
        let mut t = MergeTree::leaf(1);
        t.push_branch(MergeTree::leaf(2));
        t.push_branch(MergeTree::leaf(3));

        assert_eq!(
            t,
            MergeTree::Merge(
                Box::new(MergeTree::Merge(
                    Box::new(MergeTree::Leaf(1)),
                    Box::new(MergeTree::Leaf(2))
                )),
                Box::new(MergeTree::Leaf(3))
            )
        );
        assert_eq!(t.leaf_count(), 3);
        assert_eq!(t.depth(), 2);
        assert_eq!(t.leaves(), vec![1, 2, 3]);
    }

    #[test]
    fn merging_subtrees_keeps_all_leaves() {
        let mut a = MergeTree::leaf(0);
        a.push_branch(MergeTree::leaf(1));
        let mut b = MergeTree::leaf(2);
        b.push_branch(MergeTree::leaf(3));

        a.push_branch(b);
        assert_eq!(a.leaves(), vec![0, 1, 2, 3]);
        assert_eq!(a.depth(), 2);
    }

    #[test]
    fn crystal_tree_records_unknown_types() {
        let mut t = CrystalTree::leaf(Some("plate".into()));
        t.push_branch(CrystalTree::default());
        assert_eq!(t.leaves(), vec![Some("plate".to_string()), None]);
    }
}
