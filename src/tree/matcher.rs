//! Run matching on parameter trees
//!
//! Two runs "match" when their parameter hierarchies are equal once storage
//! identity (value ids) is stripped. Trees are normalized into
//! [`ParamTree`]s keyed by `(key, value)` before comparison.
//!
//! Partial matching is deliberately asymmetric: `a` partially matches `b`
//! when everything `a` logged is also in `b`; whatever else `b` logged is
//! ignored. It is not an equivalence relation.

use std::collections::BTreeMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::{StepTree, TreeNode};
use crate::experiment::{RawValue, RunId};
use crate::value::LogValue;
use crate::{Error, Result};

/// Parameter hierarchy keyed by `(key, value)`; leaves map to empty trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTree {
    entries: FxHashMap<(String, LogValue), ParamTree>,
}

impl ParamTree {
    /// Normalize a step tree.
    ///
    /// Identical `(key, value)` pairs at the same level are merged, so two
    /// independently logged copies of a step compare like one.
    #[must_use]
    pub fn from_tree(tree: &StepTree) -> Self {
        Self::from_nodes(tree.roots())
    }

    fn from_nodes(nodes: &[TreeNode]) -> Self {
        let mut tree = Self::default();
        for node in nodes {
            let sub = Self::from_nodes(&node.children);
            tree.entries
                .entry((node.key.clone(), node.value.clone()))
                .or_default()
                .merge(sub);
        }
        tree
    }

    fn merge(&mut self, other: Self) {
        for (pair, sub) in other.entries {
            self.entries.entry(pair).or_default().merge(sub);
        }
    }

    /// Number of `(key, value)` pairs at the top level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no parameters were logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subtree under `(key, value)`, if present.
    #[must_use]
    pub fn get(&self, key: &str, value: &LogValue) -> Option<&Self> {
        self.entries.get(&(key.to_string(), value.clone()))
    }

    /// Compare with `other`.
    ///
    /// With `partial`, every pair of `self` must exist in `other` with a
    /// partially equal subtree; extra pairs in `other` are ignored. Without
    /// it, both trees need the same pairs at every level.
    #[must_use]
    pub fn equals(&self, other: &Self, partial: bool) -> bool {
        if !partial && self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|(pair, left)| {
            other
                .entries
                .get(pair)
                .is_some_and(|right| left.equals(right, partial))
        })
    }
}

/// Ids of the runs in `runs` whose parameter tree matches `target`'s.
///
/// `runs` maps every run of one experiment to its parameter values. The
/// target itself is never part of the result. Output is ascending by id.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when `target` has no parameter values.
pub fn matching_runs(
    target: RunId,
    runs: &BTreeMap<RunId, Vec<RawValue>>,
    partial: bool,
) -> Result<Vec<RunId>> {
    let normalize = |(id, values): (&RunId, &Vec<RawValue>)| {
        (*id, ParamTree::from_tree(&StepTree::build(values)))
    };

    #[cfg(feature = "rayon")]
    let trees: BTreeMap<RunId, ParamTree> = runs.par_iter().map(normalize).collect();
    #[cfg(not(feature = "rayon"))]
    let trees: BTreeMap<RunId, ParamTree> = runs.iter().map(normalize).collect();

    let reference = trees
        .get(&target)
        .ok_or_else(|| Error::not_found(format!("run {target} has no parameter values")))?;

    Ok(trees
        .iter()
        .filter(|(id, _)| **id != target)
        .filter(|(_, tree)| reference.equals(tree, partial))
        .map(|(id, _)| *id)
        .collect())
}
