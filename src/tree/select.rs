//! Tree selection
//!
//! Projects a [`StepTree`] into one flat [`Record`] per leaf path, keeping
//! only the requested keys. Values logged at a level are copied into every
//! row produced beneath that level; each step branch yields its own rows.

use std::collections::{BTreeMap, BTreeSet};

use super::{StepTree, TreeNode};
use crate::value::LogValue;
use crate::{Error, Result};

/// One selected row: requested key -> value.
pub type Record = BTreeMap<String, LogValue>;

/// Select `keys` from `tree`.
///
/// A key logged under a step whose own key is not requested is still
/// reachable: the step branches are descended transparently and their rows
/// aggregated. An absent key yields no rows. Row order follows insertion
/// order of the tree and is stable for a fixed input.
///
/// # Errors
///
/// Currently infallible in this mode; the `Result` matches [`select_strict`].
pub fn select<S: AsRef<str>>(tree: &StepTree, keys: &[S]) -> Result<Vec<Record>> {
    let keys: BTreeSet<&str> = keys.iter().map(AsRef::as_ref).collect();
    select_level(tree.roots(), &keys, false)
}

/// Like [`select`], but every step branch that contributes rows must have
/// its own key requested.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the missing governing step key.
pub fn select_strict<S: AsRef<str>>(tree: &StepTree, keys: &[S]) -> Result<Vec<Record>> {
    let keys: BTreeSet<&str> = keys.iter().map(AsRef::as_ref).collect();
    select_level(tree.roots(), &keys, true)
}

fn merged(base: &Record, sub: Record) -> Record {
    let mut row = base.clone();
    row.extend(sub);
    row
}

fn select_level(nodes: &[TreeNode], keys: &BTreeSet<&str>, strict: bool) -> Result<Vec<Record>> {
    if nodes.is_empty() || keys.is_empty() {
        return Ok(Vec::new());
    }

    // A childless value of a key that roots branches here is an empty branch,
    // not a column value shared by its siblings.
    let step_keys: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| !n.is_leaf())
        .map(|n| n.key.as_str())
        .collect();

    let mut record = Record::new();
    let mut consumed: BTreeSet<&str> = BTreeSet::new();
    let mut branches: Vec<&TreeNode> = Vec::new();
    for node in nodes {
        if step_keys.contains(node.key.as_str()) {
            branches.push(node);
        } else if keys.contains(node.key.as_str()) {
            record.insert(node.key.clone(), node.value.clone());
            consumed.insert(node.key.as_str());
        }
    }

    let remaining: BTreeSet<&str> = keys.difference(&consumed).copied().collect();
    if remaining.is_empty() {
        return Ok(vec![record]);
    }

    let mut rows = Vec::new();
    for branch in branches {
        if remaining.contains(branch.key.as_str()) {
            let mut base = record.clone();
            base.insert(branch.key.clone(), branch.value.clone());
            let mut sub_keys = remaining.clone();
            sub_keys.remove(branch.key.as_str());

            let sub = select_level(&branch.children, &sub_keys, strict)?;
            if sub.is_empty() {
                rows.push(base);
            } else {
                rows.extend(sub.into_iter().map(|row| merged(&base, row)));
            }
        } else {
            let sub = select_level(&branch.children, &remaining, strict)?;
            if sub.is_empty() {
                continue;
            }
            if strict {
                return Err(Error::validation(format!(
                    "missing governing step key '{}'",
                    branch.key
                )));
            }
            rows.extend(sub.into_iter().map(|row| merged(&record, row)));
        }
    }

    if rows.is_empty() && !record.is_empty() {
        rows.push(record);
    }
    Ok(rows)
}
