//! Change records and the tree-edit journal that makes every operation
//! reversible.
//!
//! Each mutation logs the exact edits it performed as child-index paths
//! into the working tree, together with the serialized subtree each edit
//! displaced. Undo replays the inverse edits in reverse order. Because a
//! session only ever undoes its most recent applied change, the recorded
//! indices are still valid when the inverse runs.

use serde::Serialize;
use uuid::Uuid;
use viaduct_sexpr::{Node, parse};

use crate::SessionError;

/// One edit to the working tree, addressed by child indices from the root.
#[derive(Debug, Clone)]
pub(crate) enum TreeEdit {
    /// The node at `path` was replaced; `before` is its prior serialization.
    Replace { path: Vec<usize>, before: String },
    /// A node was inserted at `path`.
    Insert { path: Vec<usize> },
    /// The node at `path` was removed; `before` is its serialization.
    Remove { path: Vec<usize>, before: String },
}

/// A single recorded change in a session.
///
/// The before/after snapshots are narrowly scoped serialized S-expressions
/// of the affected subtree (for a move, just the `at` node). They are kept
/// out of the serialized form, which reports only the change metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub change_id: String,
    pub operation: String,
    pub description: String,
    pub target: String,
    #[serde(skip)]
    pub before_snapshot: String,
    #[serde(skip)]
    pub after_snapshot: String,
    pub applied: bool,
    #[serde(skip)]
    pub(crate) edits: Vec<TreeEdit>,
}

impl ChangeRecord {
    pub(crate) fn new(
        operation: &str,
        description: String,
        target: String,
        before_snapshot: String,
        after_snapshot: String,
        edits: Vec<TreeEdit>,
    ) -> Self {
        ChangeRecord {
            change_id: short_id(),
            operation: operation.to_string(),
            description,
            target,
            before_snapshot,
            after_snapshot,
            applied: true,
            edits,
        }
    }
}

/// Short opaque id for sessions and changes.
pub(crate) fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

pub(crate) fn node_at_mut<'a>(root: &'a mut Node, path: &[usize]) -> Option<&'a mut Node> {
    let mut node = root;
    for &idx in path {
        node = node.children_mut()?.get_mut(idx)?;
    }
    Some(node)
}

fn remove_at(root: &mut Node, path: &[usize]) -> Option<Node> {
    let (&last, parent_path) = path.split_last()?;
    let parent = node_at_mut(root, parent_path)?;
    let children = parent.children_mut()?;
    if last < children.len() {
        Some(children.remove(last))
    } else {
        None
    }
}

fn insert_at(root: &mut Node, path: &[usize], node: Node) -> bool {
    let Some((&last, parent_path)) = path.split_last() else {
        return false;
    };
    let Some(parent) = node_at_mut(root, parent_path) else {
        return false;
    };
    let Some(children) = parent.children_mut() else {
        return false;
    };
    if last > children.len() {
        return false;
    }
    children.insert(last, node);
    true
}

/// Apply the inverse of `edits` to the working tree, newest edit first.
pub(crate) fn revert(root: &mut Node, edits: &[TreeEdit]) -> Result<(), SessionError> {
    for edit in edits.iter().rev() {
        match edit {
            TreeEdit::Replace { path, before } => {
                let restored = parse(before)?;
                let slot = node_at_mut(root, path)
                    .ok_or_else(|| SessionError::UndoFailed(format!("no node at {path:?}")))?;
                *slot = restored;
            }
            TreeEdit::Insert { path } => {
                remove_at(root, path)
                    .ok_or_else(|| SessionError::UndoFailed(format!("no node at {path:?}")))?;
            }
            TreeEdit::Remove { path, before } => {
                let restored = parse(before)?;
                if !insert_at(root, path, restored) {
                    return Err(SessionError::UndoFailed(format!(
                        "cannot reinsert at {path:?}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_replace() {
        let mut root = parse("(kicad_pcb (version 1))").unwrap();
        let version = node_at_mut(&mut root, &[0]).unwrap();
        let before = version.serialize(0);
        *version = parse("(version 2)").unwrap();

        revert(
            &mut root,
            &[TreeEdit::Replace {
                path: vec![0],
                before,
            }],
        )
        .unwrap();
        assert_eq!(root.serialize(0), "(kicad_pcb\n  (version 1))");
    }

    #[test]
    fn revert_insert_and_remove_in_reverse_order() {
        let original = "(kicad_pcb\n  (net 1 \"A\")\n  (net 2 \"B\"))";
        let mut root = parse(original).unwrap();
        let mut edits = Vec::new();

        // Remove (net 1 "A"), then append (net 3 "C"): the journal keeps
        // indices as they were live at each step.
        let children = root.children_mut().unwrap();
        let removed = children.remove(0);
        edits.push(TreeEdit::Remove {
            path: vec![0],
            before: removed.serialize(0),
        });
        let children = root.children_mut().unwrap();
        children.push(parse("(net 3 \"C\")").unwrap());
        edits.push(TreeEdit::Insert { path: vec![1] });

        revert(&mut root, &edits).unwrap();
        assert_eq!(root.serialize(0), original);
    }
}
