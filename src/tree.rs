//! Parent/subtask forest assembly.
//!
//! Items arrive as a flat list with optional parent references. The
//! assembler indexes them once, then builds nodes from the roots down.
//! An item whose parent is absent from the input is treated as a root.
//! Items caught in a parent cycle are never reachable from a root; each
//! such cycle is broken by promoting its oldest unvisited member to a root.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::types::{ClientTask, Task};

/// What the assembler needs to know about an item.
pub trait TreeItem {
    fn node_id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
    fn created_at(&self) -> i64;
    fn is_completed(&self) -> bool;
}

impl TreeItem for Task {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_task_id.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn is_completed(&self) -> bool {
        self.is_completed
    }
}

impl TreeItem for ClientTask {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_task_id.as_deref()
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn is_completed(&self) -> bool {
        self.is_completed
    }
}

/// An item with its nested subtasks.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub subtasks: Vec<TreeNode<T>>,
}

/// Completion counts over a node's descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rollup {
    pub total: usize,
    pub completed: usize,
}

impl<T: TreeItem> TreeNode<T> {
    /// Count all descendants (not the node itself) and how many are done.
    pub fn rollup(&self) -> Rollup {
        let mut acc = Rollup::default();
        let mut stack: Vec<&TreeNode<T>> = self.subtasks.iter().collect();
        while let Some(node) = stack.pop() {
            acc.total += 1;
            if node.item.is_completed() {
                acc.completed += 1;
            }
            stack.extend(node.subtasks.iter());
        }
        acc
    }

    /// Fraction of completed descendants; a leaf reports its own state.
    pub fn completion_ratio(&self) -> f64 {
        let rollup = self.rollup();
        if rollup.total == 0 {
            return if self.item.is_completed() { 1.0 } else { 0.0 };
        }
        rollup.completed as f64 / rollup.total as f64
    }

    /// Number of nodes in this subtree, including the node itself.
    pub fn size(&self) -> usize {
        1 + self.subtasks.iter().map(TreeNode::size).sum::<usize>()
    }
}

fn order_key<T: TreeItem>(items: &[T], idx: usize) -> (i64, &str) {
    (items[idx].created_at(), items[idx].node_id())
}

/// Assemble `items` into a forest ordered by `created_at` (ties by id) at every level.
pub fn assemble_forest<T: TreeItem>(items: Vec<T>) -> Vec<TreeNode<T>> {
    let by_id: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.node_id(), i))
        .collect();

    // Parent index -> child indices. Self-parented items are roots.
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item.parent_id().and_then(|p| by_id.get(p).copied()) {
            Some(parent) if parent != i => children.entry(parent).or_default().push(i),
            _ => roots.push(i),
        }
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| order_key(&items, *a).cmp(&order_key(&items, *b)));
    }
    roots.sort_by(|a, b| order_key(&items, *a).cmp(&order_key(&items, *b)));

    // Mark everything reachable from the roots; what is left sits on a cycle
    // or hangs below one.
    let mut reached: HashSet<usize> = HashSet::new();
    let mut stack = roots.clone();
    while let Some(i) = stack.pop() {
        if reached.insert(i) {
            stack.extend(children.get(&i).into_iter().flatten().copied());
        }
    }
    let mut orphans: Vec<usize> = (0..items.len()).filter(|i| !reached.contains(i)).collect();
    orphans.sort_by(|a, b| order_key(&items, *a).cmp(&order_key(&items, *b)));
    for i in orphans {
        if reached.contains(&i) {
            continue;
        }
        roots.push(i);
        let mut stack = vec![i];
        while let Some(j) = stack.pop() {
            if reached.insert(j) {
                stack.extend(children.get(&j).into_iter().flatten().copied());
            }
        }
    }
    roots.sort_by(|a, b| order_key(&items, *a).cmp(&order_key(&items, *b)));

    let root_set: HashSet<usize> = roots.iter().copied().collect();
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut placed: HashSet<usize> = HashSet::new();
    roots
        .iter()
        .filter_map(|&r| build_node(r, &children, &root_set, &mut slots, &mut placed))
        .collect()
}

/// Build the subtree under `idx`, skipping promoted roots and already placed nodes.
fn build_node<T>(
    idx: usize,
    children: &HashMap<usize, Vec<usize>>,
    roots: &HashSet<usize>,
    slots: &mut [Option<T>],
    placed: &mut HashSet<usize>,
) -> Option<TreeNode<T>> {
    if !placed.insert(idx) {
        return None;
    }
    let item = slots[idx].take()?;
    let subtasks = children
        .get(&idx)
        .into_iter()
        .flatten()
        .filter(|c| !roots.contains(c))
        .filter_map(|&c| build_node(c, children, roots, slots, placed))
        .collect();
    Some(TreeNode { item, subtasks })
}
