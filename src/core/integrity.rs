/// Graph integrity — structural edits that keep a [`DialogueTree`] consistent.
///
/// All reference repair after a deletion happens in [`delete_node`]; callers
/// never patch transitions by hand.

use log::debug;
use thiserror::Error;

use crate::schema::node::{Choice, ConditionalBlock, DialogueNode, NodeKind};
use crate::schema::tree::DialogueTree;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("node '{0}' is the start node and cannot be deleted")]
    StartNode(String),
    #[error("node not found: {0}")]
    UnknownNode(String),
    #[error("duplicate node id: {0}")]
    DuplicateId(String),
    #[error("node '{node}' is a {actual} node, expected {expected}")]
    WrongKind {
        node: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("node '{node}' has no choice at index {index}")]
    ChoiceIndex { node: String, index: usize },
    #[error("connection target '{0}' does not exist")]
    InvalidTarget(String),
}

/// Which kind of node [`create_node`] should insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Npc,
    Player,
    Conditional,
}

/// Remove a node and turn every transition that pointed at it into a
/// dangling one. Choices and blocks that led there are kept.
///
/// The start node can never be deleted; the tree is left unchanged.
pub fn delete_node(tree: &mut DialogueTree, id: &str) -> Result<DialogueNode, IntegrityError> {
    if id == tree.start_node_id {
        return Err(IntegrityError::StartNode(id.to_string()));
    }
    let removed = tree
        .nodes
        .shift_remove(id)
        .ok_or_else(|| IntegrityError::UnknownNode(id.to_string()))?;

    let mut cleared = 0;
    for node in tree.nodes.values_mut() {
        for target in node.targets_mut() {
            if target.as_deref() == Some(id) {
                *target = None;
                cleared += 1;
            }
        }
    }
    debug!("deleted node '{}', cleared {} transitions", id, cleared);
    Ok(removed)
}

/// Insert a fully built node. Ids are immutable handles, so an existing id
/// is never overwritten.
pub fn insert_node(tree: &mut DialogueTree, node: DialogueNode) -> Result<(), IntegrityError> {
    if tree.contains(&node.id) {
        return Err(IntegrityError::DuplicateId(node.id));
    }
    tree.nodes.insert(node.id.clone(), node);
    Ok(())
}

/// Insert an empty node of the given type under the next free `node_<n>`
/// id and return that id. Player nodes start with one choice.
pub fn create_node(tree: &mut DialogueTree, node_type: NodeType) -> String {
    let id = next_node_id(tree);
    let node = match node_type {
        NodeType::Npc => DialogueNode::npc(id.clone(), ""),
        NodeType::Player => {
            let first = new_choice(&id, &[]);
            DialogueNode::player(id.clone(), vec![first])
        }
        NodeType::Conditional => {
            DialogueNode::conditional(id.clone(), vec![ConditionalBlock::otherwise("")])
        }
    };
    tree.nodes.insert(id.clone(), node);
    if tree.start_node_id.is_empty() {
        tree.start_node_id = id.clone();
    }
    id
}

fn next_node_id(tree: &DialogueTree) -> String {
    let mut n = tree.nodes.len() + 1;
    loop {
        let candidate = format!("node_{}", n);
        if !tree.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Point an npc node at `to`. The target must exist.
pub fn connect(tree: &mut DialogueTree, from: &str, to: &str) -> Result<(), IntegrityError> {
    if !tree.contains(to) {
        return Err(IntegrityError::InvalidTarget(to.to_string()));
    }
    let node = tree
        .get_mut(from)
        .ok_or_else(|| IntegrityError::UnknownNode(from.to_string()))?;
    match &mut node.kind {
        NodeKind::Npc { next_node_id, .. } => {
            *next_node_id = Some(to.to_string());
            Ok(())
        }
        other => Err(IntegrityError::WrongKind {
            node: from.to_string(),
            expected: "npc",
            actual: other.name(),
        }),
    }
}

/// Point choice `index` of a player node at `to`. The target must exist.
pub fn connect_choice(
    tree: &mut DialogueTree,
    node_id: &str,
    index: usize,
    to: &str,
) -> Result<(), IntegrityError> {
    if !tree.contains(to) {
        return Err(IntegrityError::InvalidTarget(to.to_string()));
    }
    let node = tree
        .get_mut(node_id)
        .ok_or_else(|| IntegrityError::UnknownNode(node_id.to_string()))?;
    let actual = node.kind.name();
    let choices = node.choices_mut().ok_or_else(|| IntegrityError::WrongKind {
        node: node_id.to_string(),
        expected: "player",
        actual,
    })?;
    let choice = choices.get_mut(index).ok_or_else(|| IntegrityError::ChoiceIndex {
        node: node_id.to_string(),
        index,
    })?;
    choice.next_node_id = Some(to.to_string());
    Ok(())
}

/// A blank choice whose id does not collide with any in `choices`.
pub fn new_choice(node_id: &str, choices: &[Choice]) -> Choice {
    let mut n = choices.len() + 1;
    loop {
        let id = format!("{}_choice_{}", node_id, n);
        if !choices.iter().any(|c| c.id == id) {
            return Choice::new(id, "");
        }
        n += 1;
    }
}

pub fn add_choice(choices: &[Choice], choice: Choice) -> Vec<Choice> {
    let mut out = choices.to_vec();
    out.push(choice);
    out
}

/// Remove the choice at `index`. A player node keeps at least one choice, so
/// removing from a single-choice list returns it unchanged, as does an
/// out-of-range index.
pub fn remove_choice(choices: &[Choice], index: usize) -> Vec<Choice> {
    let mut out = choices.to_vec();
    if out.len() > 1 && index < out.len() {
        out.remove(index);
    }
    out
}

/// Replace the choice at `index`; out-of-range indices leave the list as is.
pub fn update_choice(choices: &[Choice], index: usize, choice: Choice) -> Vec<Choice> {
    let mut out = choices.to_vec();
    if let Some(slot) = out.get_mut(index) {
        *slot = choice;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::Condition;

    fn tree() -> DialogueTree {
        DialogueTree::new("t", "t", "a")
            .with_node(DialogueNode::npc("a", "Hello.").with_next("b"))
            .with_node(DialogueNode::npc("b", "Middle."))
            .with_node(DialogueNode::player(
                "c",
                vec![
                    Choice::new("c1", "Go to B").with_next("b"),
                    Choice::new("c2", "Go to A").with_next("a"),
                ],
            ))
            .with_node(DialogueNode::conditional(
                "d",
                vec![ConditionalBlock::when(vec![Condition::is_set("x")], "X").with_next("b")],
            ))
    }

    #[test]
    fn delete_cascades_to_dangling() {
        let mut tree = tree();
        let removed = delete_node(&mut tree, "b").unwrap();
        assert_eq!(removed.id, "b");
        assert!(!tree.contains("b"));

        match &tree.get("a").unwrap().kind {
            NodeKind::Npc { next_node_id, .. } => assert!(next_node_id.is_none()),
            other => panic!("unexpected kind {:?}", other),
        }
        let choices = tree.get("c").unwrap().choices().unwrap();
        assert_eq!(choices.len(), 2);
        assert!(choices[0].next_node_id.is_none());
        assert_eq!(choices[1].next_node_id.as_deref(), Some("a"));
        assert!(tree.get("d").unwrap().blocks().unwrap()[0].next_node_id.is_none());
    }

    #[test]
    fn start_node_is_protected() {
        let mut tree = tree();
        let before = tree.clone();
        assert_eq!(
            delete_node(&mut tree, "a"),
            Err(IntegrityError::StartNode("a".to_string()))
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn delete_unknown_node() {
        let mut tree = tree();
        assert!(matches!(
            delete_node(&mut tree, "zz"),
            Err(IntegrityError::UnknownNode(_))
        ));
    }

    #[test]
    fn delete_keeps_order() {
        let mut tree = tree();
        delete_node(&mut tree, "b").unwrap();
        let ids: Vec<_> = tree.nodes.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn create_node_allocates_free_ids() {
        let mut tree = tree();
        tree.nodes.insert("node_5".to_string(), DialogueNode::npc("node_5", ""));
        let id = create_node(&mut tree, NodeType::Player);
        assert_eq!(id, "node_6");
        let choices = tree.get(&id).unwrap().choices().unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].id, "node_6_choice_1");
    }

    #[test]
    fn create_node_in_empty_tree_becomes_start() {
        let mut tree = DialogueTree::new("t", "t", "");
        let id = create_node(&mut tree, NodeType::Npc);
        assert_eq!(tree.start_node_id, id);
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut tree = tree();
        assert_eq!(
            insert_node(&mut tree, DialogueNode::npc("a", "again")),
            Err(IntegrityError::DuplicateId("a".to_string()))
        );
        assert!(insert_node(&mut tree, DialogueNode::npc("e", "new")).is_ok());
    }

    #[test]
    fn connect_requires_live_target() {
        let mut tree = tree();
        assert_eq!(
            connect(&mut tree, "b", "missing"),
            Err(IntegrityError::InvalidTarget("missing".to_string()))
        );
        connect(&mut tree, "b", "c").unwrap();
        assert_eq!(tree.get("b").unwrap().targets()[0].as_deref(), Some("c"));
        assert!(matches!(
            connect(&mut tree, "c", "a"),
            Err(IntegrityError::WrongKind { actual: "player", .. })
        ));
    }

    #[test]
    fn connect_choice_checks_index() {
        let mut tree = tree();
        connect_choice(&mut tree, "c", 1, "d").unwrap();
        assert_eq!(tree.get("c").unwrap().choices().unwrap()[1].next_node_id.as_deref(), Some("d"));
        assert_eq!(
            connect_choice(&mut tree, "c", 5, "d"),
            Err(IntegrityError::ChoiceIndex {
                node: "c".to_string(),
                index: 5
            })
        );
        assert!(matches!(
            connect_choice(&mut tree, "a", 0, "d"),
            Err(IntegrityError::WrongKind { .. })
        ));
    }

    #[test]
    fn choice_list_operations_are_pure() {
        let choices = vec![Choice::new("n_choice_1", "One")];
        let added = add_choice(&choices, new_choice("n", &choices));
        assert_eq!(choices.len(), 1);
        assert_eq!(added.len(), 2);
        assert_eq!(added[1].id, "n_choice_2");

        let updated = update_choice(&added, 1, Choice::new("n_choice_2", "Two"));
        assert_eq!(updated[1].text, "Two");
        assert_eq!(update_choice(&added, 9, Choice::new("x", "x")), added);

        let removed = remove_choice(&updated, 0);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].text, "Two");
    }

    #[test]
    fn last_choice_is_never_removed() {
        let choices = vec![Choice::new("c1", "Only")];
        assert_eq!(remove_choice(&choices, 0), choices);
    }

    #[test]
    fn new_choice_skips_taken_ids() {
        let choices = vec![Choice::new("n_choice_2", "Two")];
        assert_eq!(new_choice("n", &choices).id, "n_choice_3");
    }
}
