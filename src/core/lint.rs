/// Static checks over a dialogue tree.
///
/// Nothing reported here stops the engine from running a tree; issues are
/// for authors. Errors mark content that can never play as written,
/// warnings mark content that plays but probably not as intended.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;

use crate::core::commands::{command_flags, is_scriptable_flag};
use crate::schema::condition::Condition;
use crate::schema::flag::FlagSchema;
use crate::schema::node::{live_target, BlockKind, ConditionalBlock, DialogueNode, NodeKind};
use crate::schema::tree::DialogueTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintKind {
    /// `startNodeId` does not name a node.
    MissingStart,
    /// A transition names a node that does not exist; it ends the dialogue.
    DanglingTarget { target: String },
    /// No path from the start node reaches this node.
    Unreachable,
    /// A player node with nothing to choose.
    NoChoices,
    /// `if` after the first block, or `else` before the last.
    BlockOrder { index: usize },
    /// A comparison operator with no value to compare against.
    MissingValue { flag: String },
    /// A flag used by the tree that the schema does not declare.
    UndeclaredFlag { flag: String },
    /// A flag id that cannot be written as `$flag` in a script, so the
    /// node loses it when saved as script text.
    UnscriptableFlag { flag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintIssue {
    pub severity: Severity,
    /// The node the issue was found in, if it belongs to one.
    pub node: Option<String>,
    pub kind: LintKind,
}

impl LintIssue {
    fn error(node: Option<&str>, kind: LintKind) -> Self {
        Self {
            severity: Severity::Error,
            node: node.map(str::to_string),
            kind,
        }
    }

    fn warning(node: Option<&str>, kind: LintKind) -> Self {
        Self {
            severity: Severity::Warning,
            node: node.map(str::to_string),
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "[{}] ", node)?;
        }
        match &self.kind {
            LintKind::MissingStart => write!(f, "start node does not exist"),
            LintKind::DanglingTarget { target } => {
                write!(f, "transition to missing node '{}' ends the dialogue", target)
            }
            LintKind::Unreachable => write!(f, "node is unreachable from the start node"),
            LintKind::NoChoices => write!(f, "player node has no choices"),
            LintKind::BlockOrder { index } => {
                write!(f, "conditional block {} is out of if/elseif/else order", index)
            }
            LintKind::MissingValue { flag } => {
                write!(f, "comparison on '{}' has no value", flag)
            }
            LintKind::UndeclaredFlag { flag } => {
                write!(f, "flag '{}' is not declared in the schema", flag)
            }
            LintKind::UnscriptableFlag { flag } => {
                write!(f, "flag '{}' cannot be written in script text", flag)
            }
        }
    }
}

/// Check `tree` against itself and `schema`.
///
/// Undeclared flags are only reported when the schema declares at least one
/// flag; an empty schema means the project does not use one.
pub fn lint(tree: &DialogueTree, schema: &FlagSchema) -> Vec<LintIssue> {
    let mut issues = Vec::new();

    if !tree.contains(&tree.start_node_id) {
        issues.push(LintIssue::error(None, LintKind::MissingStart));
    }

    let reachable = reachable_from_start(tree);
    let mut undeclared = FxHashSet::default();
    let mut unscriptable = FxHashSet::default();

    for node in tree.nodes.values() {
        let id = Some(node.id.as_str());

        for target in node.targets() {
            if let Some(target) = live_target(target) {
                if !tree.contains(target) {
                    issues.push(LintIssue::warning(
                        id,
                        LintKind::DanglingTarget {
                            target: target.to_string(),
                        },
                    ));
                }
            }
        }

        if !reachable.contains(node.id.as_str()) && tree.contains(&tree.start_node_id) {
            issues.push(LintIssue::warning(id, LintKind::Unreachable));
        }

        if let NodeKind::Player { choices } = &node.kind {
            if choices.is_empty() {
                issues.push(LintIssue::error(id, LintKind::NoChoices));
            }
        }

        if let Some(blocks) = node.blocks() {
            check_block_order(node, blocks, &mut issues);
        }

        for condition in node_conditions(node) {
            if condition.operator.requires_value() && condition.value.is_none() {
                issues.push(LintIssue::error(
                    id,
                    LintKind::MissingValue {
                        flag: condition.flag.clone(),
                    },
                ));
            }
        }

        for flag in node_flags(node) {
            if !is_scriptable_flag(&flag) && unscriptable.insert(flag.clone()) {
                issues.push(LintIssue::warning(id, LintKind::UnscriptableFlag { flag: flag.clone() }));
            }
            if !schema.is_empty() && !schema.contains(&flag) && undeclared.insert(flag.clone()) {
                issues.push(LintIssue::warning(id, LintKind::UndeclaredFlag { flag }));
            }
        }
    }

    issues
}

fn reachable_from_start(tree: &DialogueTree) -> FxHashSet<&str> {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::new();
    if let Some(start) = tree.start_node() {
        seen.insert(start.id.as_str());
        queue.push_back(start);
    }
    while let Some(node) = queue.pop_front() {
        for target in node.targets() {
            if let Some(next) = tree.resolve(target) {
                if seen.insert(next.id.as_str()) {
                    queue.push_back(next);
                }
            }
        }
    }
    seen
}

fn check_block_order(node: &DialogueNode, blocks: &[ConditionalBlock], issues: &mut Vec<LintIssue>) {
    let last = blocks.len().saturating_sub(1);
    for (index, block) in blocks.iter().enumerate() {
        let misplaced = match block.kind {
            BlockKind::If => index != 0,
            BlockKind::Else => index != last,
            BlockKind::ElseIf => false,
        };
        if misplaced {
            issues.push(LintIssue::error(Some(&node.id), LintKind::BlockOrder { index }));
        }
    }
}

fn node_conditions(node: &DialogueNode) -> Vec<&Condition> {
    match &node.kind {
        NodeKind::Player { choices } => choices.iter().flat_map(|c| c.conditions()).collect(),
        _ => node
            .blocks()
            .unwrap_or_default()
            .iter()
            .flat_map(|b| &b.condition)
            .collect(),
    }
}

/// Every flag the node reads or writes, in authoring order.
fn node_flags(node: &DialogueNode) -> Vec<String> {
    let mut flags: Vec<String> = node_conditions(node).into_iter().map(|c| c.flag.clone()).collect();
    match &node.kind {
        NodeKind::Npc {
            content, set_flags, ..
        } => {
            flags.extend(command_flags(content));
            flags.extend(set_flags.iter().flatten().cloned());
        }
        NodeKind::Player { choices } => {
            for choice in choices {
                flags.extend(choice.flags().iter().cloned());
            }
        }
        NodeKind::Conditional { .. } => {}
    }
    for block in node.blocks().unwrap_or_default() {
        flags.extend(command_flags(&block.content));
    }
    flags
}
