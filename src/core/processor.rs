/// Node processor — the interpreter step for a single dialogue node.

use log::trace;

use crate::core::commands::apply_commands;
use crate::core::evaluator::evaluate_all;
use crate::core::flags::{merge, FlagWarning};
use crate::core::variables::VariableStore;
use crate::schema::flag::FlagSchema;
use crate::schema::node::{live_target, BlockKind, Choice, ConditionalBlock, DialogueNode, NodeKind};

/// What a node resolves to for the current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedNode {
    pub node_id: String,
    pub speaker: Option<String>,
    /// Display text with command markup removed.
    pub content: String,
    /// Visible choices in authoring order. Only player nodes have any.
    pub choices: Vec<Choice>,
    /// Successor for npc/conditional nodes; `None` means the dialogue ends
    /// here unless the player picks a choice.
    pub next_node_id: Option<String>,
    pub is_decision: bool,
    pub warnings: Vec<FlagWarning>,
}

/// Outcome of selecting a choice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceOutcome {
    pub next_node_id: Option<String>,
    pub warnings: Vec<FlagWarning>,
}

/// First block whose conditions hold; `else` always matches.
pub fn select_block<'a>(blocks: &'a [ConditionalBlock], store: &VariableStore) -> Option<&'a ConditionalBlock> {
    blocks
        .iter()
        .find(|b| b.kind == BlockKind::Else || evaluate_all(&b.condition, store))
}

/// Process `node` against `store`.
///
/// Resolves the active conditional block, runs inline set commands found in
/// the selected content, raises the node's entry flags and filters player
/// choices. Calling it twice on equal inputs yields equal outputs.
pub fn step(node: &DialogueNode, store: &mut VariableStore, schema: &FlagSchema) -> ProcessedNode {
    trace!("processing node '{}' ({})", node.id, node.kind.name());

    let mut processed = ProcessedNode {
        node_id: node.id.clone(),
        speaker: node.speaker.clone(),
        ..ProcessedNode::default()
    };

    let (content, entry_flags): (Option<String>, &[String]) = match &node.kind {
        NodeKind::Npc {
            content,
            next_node_id,
            set_flags,
            conditional_blocks,
        } => {
            let flags = set_flags.as_deref().unwrap_or_default();
            match conditional_blocks {
                Some(blocks) => match select_block(blocks, store) {
                    Some(block) => {
                        apply_block(&mut processed, block);
                        if processed.next_node_id.is_none() {
                            processed.next_node_id = live_target(next_node_id).map(str::to_string);
                        }
                        (Some(block.content.clone()), flags)
                    }
                    None => (None, flags),
                },
                None => {
                    processed.next_node_id = live_target(next_node_id).map(str::to_string);
                    (Some(content.clone()), flags)
                }
            }
        }
        NodeKind::Conditional { conditional_blocks } => match select_block(conditional_blocks, store) {
            Some(block) => {
                apply_block(&mut processed, block);
                (Some(block.content.clone()), &[][..])
            }
            None => (None, &[][..]),
        },
        NodeKind::Player { choices } => {
            processed.is_decision = true;
            processed.choices = choices
                .iter()
                .filter(|c| evaluate_all(c.conditions(), store))
                .cloned()
                .collect();
            (None, &[][..])
        }
    };

    if let Some(content) = content {
        let outcome = apply_commands(&content, store, schema);
        processed.content = outcome.text;
        processed.warnings.extend(outcome.warnings);
    }

    processed.warnings.extend(raise_flags(entry_flags, store, schema));
    processed
}

/// Apply a selected choice: raise its flags and report where it leads.
/// A missing or empty target ends the dialogue.
pub fn apply_choice(choice: &Choice, store: &mut VariableStore, schema: &FlagSchema) -> ChoiceOutcome {
    trace!("choice '{}' selected", choice.id);
    ChoiceOutcome {
        warnings: raise_flags(choice.flags(), store, schema),
        next_node_id: live_target(&choice.next_node_id).map(str::to_string),
    }
}

/// Raise flags on entry or selection. Dialogue-typed and undeclared flags
/// become memory flags; persistent ones go through the schema merger.
pub fn raise_flags<S: AsRef<str>>(flags: &[S], store: &mut VariableStore, schema: &FlagSchema) -> Vec<FlagWarning> {
    let mut persistent = Vec::new();
    for flag in flags {
        let flag = flag.as_ref();
        if schema.is_memory_flag(flag) {
            store.set_memory_flag(flag);
        } else {
            persistent.push(flag);
        }
    }
    if persistent.is_empty() {
        return Vec::new();
    }
    let result = merge(store.variables(), &persistent[..], schema);
    store.replace_variables(result.state);
    result.warnings
}

fn apply_block(processed: &mut ProcessedNode, block: &ConditionalBlock) {
    if block.speaker.is_some() {
        processed.speaker = block.speaker.clone();
    }
    processed.next_node_id = live_target(&block.next_node_id).map(str::to_string);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::{Condition, Operator, Value};
    use crate::schema::flag::{FlagDefinition, FlagType, ValueType};

    fn schema() -> FlagSchema {
        FlagSchema::new()
            .with_flag(FlagDefinition::new("met_guard", "Met", FlagType::Dialogue))
            .with_flag(
                FlagDefinition::new("stat_gold", "Gold", FlagType::Stat)
                    .with_value_type(ValueType::Number)
                    .with_default(0.0),
            )
            .with_flag(FlagDefinition::new("quest_gate", "Gate quest", FlagType::Quest))
    }

    #[test]
    fn npc_yields_content_and_next() {
        let node = DialogueNode::npc("greet", "Halt!").with_speaker("Guard").with_next("ask");
        let mut store = VariableStore::new();
        let out = step(&node, &mut store, &schema());
        assert_eq!(out.speaker.as_deref(), Some("Guard"));
        assert_eq!(out.content, "Halt!");
        assert_eq!(out.next_node_id.as_deref(), Some("ask"));
        assert!(!out.is_decision);
    }

    #[test]
    fn empty_next_is_terminal() {
        let node = DialogueNode::npc("end", "Bye.").with_next("");
        let out = step(&node, &mut VariableStore::new(), &schema());
        assert!(out.next_node_id.is_none());
    }

    #[test]
    fn first_matching_block_wins() {
        let node = DialogueNode::conditional(
            "mood",
            vec![
                ConditionalBlock::when(vec![Condition::is_set("angry")], "Go away."),
                ConditionalBlock::or_when(vec![Condition::is_set("met_guard")], "Welcome back.")
                    .with_next("hub"),
                ConditionalBlock::otherwise("Hello, stranger."),
            ],
        );
        let mut store = VariableStore::new();
        store.set_memory_flag("met_guard");
        let out = step(&node, &mut store, &schema());
        assert_eq!(out.content, "Welcome back.");
        assert_eq!(out.next_node_id.as_deref(), Some("hub"));
    }

    #[test]
    fn else_block_selected_when_others_fail() {
        let node = DialogueNode::conditional(
            "mood",
            vec![
                ConditionalBlock::when(vec![Condition::is_set("angry")], "Go away."),
                ConditionalBlock::otherwise("Hello, stranger.").with_speaker("Guard"),
            ],
        );
        let out = step(&node, &mut VariableStore::new(), &schema());
        assert_eq!(out.content, "Hello, stranger.");
        assert_eq!(out.speaker.as_deref(), Some("Guard"));
    }

    #[test]
    fn no_match_yields_nothing() {
        let node = DialogueNode::npc("n", "fallback text")
            .with_next("somewhere")
            .with_blocks(vec![
                ConditionalBlock::when(vec![Condition::is_set("a")], "A").with_next("x"),
                ConditionalBlock::or_when(vec![Condition::is_set("b")], "B").with_next("y"),
            ]);
        let out = step(&node, &mut VariableStore::new(), &schema());
        assert!(out.content.is_empty());
        assert!(out.next_node_id.is_none());
    }

    #[test]
    fn npc_block_falls_back_to_node_next() {
        let node = DialogueNode::npc("n", "")
            .with_next("after")
            .with_blocks(vec![ConditionalBlock::otherwise("Fine.")]);
        let out = step(&node, &mut VariableStore::new(), &schema());
        assert_eq!(out.next_node_id.as_deref(), Some("after"));
    }

    #[test]
    fn inline_commands_apply_and_strip() {
        let node = DialogueNode::npc("pay", "Take these coins. <<set $stat_gold to $stat_gold + 10>>");
        let mut store = VariableStore::from_schema(&schema(), &Default::default());
        let out = step(&node, &mut store, &schema());
        assert_eq!(out.content, "Take these coins.");
        assert_eq!(store.get("stat_gold"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn entry_flags_split_memory_and_persistent() {
        let node = DialogueNode::npc("greet", "Halt!")
            .with_flag("met_guard")
            .with_flag("quest_gate")
            .with_flag("undeclared");
        let mut store = VariableStore::new();
        let out = step(&node, &mut store, &schema());
        assert!(store.has_memory_flag("met_guard"));
        assert!(store.has_memory_flag("undeclared"));
        assert_eq!(store.get("quest_gate"), Some(&Value::Bool(true)));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn player_choices_filtered_in_order() {
        let node = DialogueNode::player(
            "ask",
            vec![
                Choice::new("c1", "Bribe").with_condition(Condition::compare(
                    "stat_gold",
                    Operator::GreaterEqual,
                    10.0,
                )),
                Choice::new("c2", "Ask politely"),
                Choice::new("c3", "Remind him").with_condition(Condition::is_set("met_guard")),
                Choice::new("c4", "Leave"),
            ],
        );
        let mut store = VariableStore::new();
        store.set_memory_flag("met_guard");
        let out = step(&node, &mut store, &schema());
        assert!(out.is_decision);
        let ids: Vec<_> = out.choices.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3", "c4"]);
    }

    #[test]
    fn apply_choice_raises_flags_and_targets() {
        let choice = Choice::new("c1", "Pay")
            .with_next("gate")
            .with_flag("stat_gold")
            .with_flag("met_guard");
        let mut store = VariableStore::new();
        store.set("stat_gold", 100.0);
        let out = apply_choice(&choice, &mut store, &schema());
        assert_eq!(out.next_node_id.as_deref(), Some("gate"));
        assert_eq!(store.get("stat_gold"), Some(&Value::Number(101.0)));
        assert!(store.has_memory_flag("met_guard"));

        let dangling = Choice::new("c2", "Walk away").with_next("");
        assert!(apply_choice(&dangling, &mut store, &schema()).next_node_id.is_none());
    }

    #[test]
    fn deterministic_for_equal_inputs() {
        let node = DialogueNode::npc("pay", "Coins! <<set $stat_gold to $stat_gold + 1>>")
            .with_flag("quest_gate");
        let base = VariableStore::from_schema(&schema(), &Default::default());
        let mut a = base.clone();
        let mut b = base.clone();
        assert_eq!(step(&node, &mut a, &schema()), step(&node, &mut b, &schema()));
        assert_eq!(a, b);
    }
}
