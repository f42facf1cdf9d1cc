//! Tree subcommand: print a user's tasks as an indented forest.

use clap::Args;
use std::fmt::Write;

use crate::tree::TreeNode;
use crate::types::{Board, Task};

/// Arguments for the tree subcommand
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Owner of the tasks
    #[arg(long)]
    pub user: String,

    /// Only include tasks currently on this board
    #[arg(long)]
    pub board: Option<Board>,
}

/// Render a forest, one task per line, subtasks indented two spaces.
pub fn render_forest(forest: &[TreeNode<Task>]) -> String {
    let mut out = String::new();
    for node in forest {
        render_node(node, 0, &mut out);
    }
    out
}

fn render_node(node: &TreeNode<Task>, depth: usize, out: &mut String) {
    let task = &node.item;
    let mark = if task.is_completed { "x" } else { " " };
    let _ = write!(out, "{}[{}] {} ({})", "  ".repeat(depth), mark, task.title, task.current_board);
    if let Some(due) = task.due_date {
        let _ = write!(out, " due {}", due);
    }
    if !node.subtasks.is_empty() {
        let rollup = node.rollup();
        let _ = write!(out, " {}/{}", rollup.completed, rollup.total);
    }
    out.push('\n');
    for child in &node.subtasks {
        render_node(child, depth + 1, out);
    }
}
