//! Step tree reconstruction
//!
//! The values of a run are stored flat; each one optionally points at the
//! step value it was logged under. [`StepTree::build`] turns that list back
//! into the hierarchy:
//!
//! ```text
//! (root)
//!  ├── lr = 0.01
//!  └── epoch = 1
//!       ├── acc = 0.9
//!       └── batch = 12
//!            └── loss = 0.42
//! ```
//!
//! [`select`] projects a tree into flat records and [`matcher`] compares the
//! parameter trees of runs.

pub mod matcher;
pub mod select;

pub use matcher::{matching_runs, ParamTree};
pub use select::{select, select_strict, Record};

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::experiment::{RawValue, ValueId};
use crate::value::LogValue;

/// Deepest root-to-leaf path, in values, that can be logged or rebuilt.
///
/// Trees are walked recursively, so the bound keeps every walk within a
/// default thread stack.
pub const MAX_STEP_DEPTH: usize = 128;

/// One value in the reconstructed hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Value that introduced this node
    pub value_id: ValueId,
    /// Variable key
    pub key: String,
    /// Observed value
    pub value: LogValue,
    /// Values logged with this one as their step, in insertion order
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// True when nothing was logged under this value.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }

    fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }
}

/// Step hierarchy of one run, rooted at "no step".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepTree {
    roots: Vec<TreeNode>,
}

impl StepTree {
    /// Rebuild the hierarchy from a run's flat value list.
    ///
    /// Values whose step is not in `values` are unreachable and dropped, as
    /// are values deeper than [`MAX_STEP_DEPTH`]. Acyclicity is guaranteed
    /// at write time (a step must already exist), so every reachable value
    /// is visited exactly once.
    #[must_use]
    pub fn build(values: &[RawValue]) -> Self {
        let mut adjacency: FxHashMap<Option<ValueId>, Vec<usize>> = FxHashMap::default();
        for (index, value) in values.iter().enumerate() {
            adjacency.entry(value.step_id).or_default().push(index);
        }
        Self {
            roots: Self::build_level(values, &adjacency, None, 1),
        }
    }

    fn build_level(
        values: &[RawValue],
        adjacency: &FxHashMap<Option<ValueId>, Vec<usize>>,
        parent: Option<ValueId>,
        level: usize,
    ) -> Vec<TreeNode> {
        let Some(indexes) = adjacency.get(&parent) else {
            return Vec::new();
        };
        indexes
            .iter()
            .map(|&index| {
                let raw = &values[index];
                let children = if raw.is_step && level < MAX_STEP_DEPTH {
                    Self::build_level(values, adjacency, Some(raw.value_id), level + 1)
                } else {
                    Vec::new()
                };
                TreeNode {
                    value_id: raw.value_id,
                    key: raw.key.clone(),
                    value: raw.value.clone(),
                    children,
                }
            })
            .collect()
    }

    /// Top-level nodes (values logged without a step).
    #[must_use]
    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    /// True if the run has no reachable values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.iter().map(TreeNode::count).sum()
    }

    /// Longest root-to-leaf path, in nodes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.roots.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Every distinct key in the tree.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<String> {
        fn walk(nodes: &[TreeNode], out: &mut BTreeSet<String>) {
            for node in nodes {
                out.insert(node.key.clone());
                walk(&node.children, out);
            }
        }
        let mut keys = BTreeSet::new();
        walk(&self.roots, &mut keys);
        keys
    }
}
