/// Script serializer — [`DialogueTree`] back into Yarn-style text.
///
/// Output follows node insertion order and re-parses to an equivalent tree
/// for plain and speaker-prefixed lines, choices, jumps, boolean flag raises
/// and if/elseif/else content built from the eight condition operators.
/// Flag ids must satisfy [`is_scriptable_flag`](crate::core::commands::is_scriptable_flag).

use log::debug;
use std::fmt::Write;

use crate::core::parser::split_speaker;
use crate::schema::condition::{Condition, Operator, Value};
use crate::schema::node::{live_target, BlockKind, Choice, ConditionalBlock, DialogueNode, NodeKind};
use crate::schema::tree::DialogueTree;

/// Render a whole tree as a script.
pub fn serialize(tree: &DialogueTree) -> String {
    let mut out = String::new();
    if !tree.id.is_empty() {
        let _ = writeln!(out, "// dialogue: {}", tree.id);
    }
    if !tree.title.is_empty() {
        let _ = writeln!(out, "// name: {}", tree.title);
    }
    if !tree.start_node_id.is_empty() {
        let _ = writeln!(out, "// start: {}", tree.start_node_id);
    }

    for node in tree.nodes.values() {
        if !out.is_empty() {
            out.push('\n');
        }
        write_node(&mut out, node);
    }
    out
}

/// Render a condition list as a script expression (`$a and $b >= 3`).
pub fn format_expression(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .filter_map(format_condition)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Render a value as a script literal.
pub fn format_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

fn format_condition(condition: &Condition) -> Option<String> {
    match condition.operator {
        Operator::IsSet => Some(format!("${}", condition.flag)),
        Operator::IsNotSet => Some(format!("not ${}", condition.flag)),
        op => {
            let Some(value) = &condition.value else {
                debug!("dropping '{}' comparison without a value", condition.flag);
                return None;
            };
            let symbol = op.symbol()?;
            Some(format!("${} {} {}", condition.flag, symbol, format_literal(value)))
        }
    }
}

fn write_node(out: &mut String, node: &DialogueNode) {
    let _ = writeln!(out, "title: {}", node.id);

    match &node.kind {
        NodeKind::Npc {
            content,
            next_node_id,
            set_flags,
            conditional_blocks,
        } => {
            let has_text = content.lines().any(|l| is_text_line(l));
            if let (Some(speaker), false) = (&node.speaker, has_text) {
                let _ = writeln!(out, "speaker: {}", speaker);
            }
            out.push_str("---\n");
            write_lines(out, node.speaker.as_deref(), content);
            if let Some(blocks) = conditional_blocks {
                write_blocks(out, blocks);
            }
            for flag in set_flags.iter().flatten() {
                let _ = writeln!(out, "<<set ${} = true>>", flag);
            }
            if let Some(target) = live_target(next_node_id) {
                let _ = writeln!(out, "<<jump {}>>", target);
            }
        }
        NodeKind::Player { choices } => {
            if let Some(speaker) = &node.speaker {
                let _ = writeln!(out, "speaker: {}", speaker);
            }
            out.push_str("---\n");
            for choice in choices {
                write_choice(out, choice);
            }
        }
        NodeKind::Conditional { conditional_blocks } => {
            if let Some(speaker) = &node.speaker {
                let _ = writeln!(out, "speaker: {}", speaker);
            }
            out.push_str("---\n");
            write_blocks(out, conditional_blocks);
        }
    }

    out.push_str("===\n");
}

fn write_choice(out: &mut String, choice: &Choice) {
    let expr = format_expression(choice.conditions());
    if expr.is_empty() {
        let _ = writeln!(out, "-> {}", choice.text);
    } else {
        let _ = writeln!(out, "-> {} <<if {}>>", choice.text, expr);
    }
    for flag in choice.flags() {
        let _ = writeln!(out, "    <<set ${} = true>>", flag);
    }
    if let Some(target) = live_target(&choice.next_node_id) {
        let _ = writeln!(out, "    <<jump {}>>", target);
    }
}

fn write_blocks(out: &mut String, blocks: &[ConditionalBlock]) {
    if blocks.is_empty() {
        return;
    }
    for block in blocks {
        let expr = format_expression(&block.condition);
        match (block.kind, expr.is_empty()) {
            (BlockKind::If, true) => out.push_str("<<if>>\n"),
            (BlockKind::If, false) => {
                let _ = writeln!(out, "<<if {}>>", expr);
            }
            (BlockKind::ElseIf, true) => out.push_str("<<elseif>>\n"),
            (BlockKind::ElseIf, false) => {
                let _ = writeln!(out, "<<elseif {}>>", expr);
            }
            (BlockKind::Else, _) => out.push_str("<<else>>\n"),
        }
        write_lines(out, block.speaker.as_deref(), &block.content);
        if let Some(target) = live_target(&block.next_node_id) {
            let _ = writeln!(out, "<<jump {}>>", target);
        }
    }
    out.push_str("<<endif>>\n");
}

fn write_lines(out: &mut String, speaker: Option<&str>, content: &str) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !is_text_line(line) {
            let _ = writeln!(out, "{}", line);
            continue;
        }
        match speaker {
            Some(name) => {
                let _ = writeln!(out, "{}: {}", name, escape_text(line));
            }
            None => {
                let _ = writeln!(out, "{}", escape_text(line));
            }
        }
    }
}

/// Escape a dialogue line so it reads back unchanged: backslashes are
/// doubled and a colon that would read as `Speaker: ` becomes `\:`.
fn escape_text(line: &str) -> String {
    let escaped = line.replace('\\', "\\\\");
    match split_speaker(&escaped) {
        (Some(_), _) => escaped.replacen(": ", "\\: ", 1),
        (None, _) => escaped,
    }
}

/// Dialogue text as opposed to command markup.
fn is_text_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with("<<")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse;

    #[test]
    fn npc_output() {
        let tree = DialogueTree::new("gate", "Gate", "greet").with_node(
            DialogueNode::npc("greet", "Halt!\nWho goes there?")
                .with_speaker("Guard")
                .with_flag("met_guard")
                .with_next("ask"),
        );
        let text = serialize(&tree);
        assert_eq!(
            text,
            "// dialogue: gate\n// name: Gate\n// start: greet\n\n\
             title: greet\n---\nGuard: Halt!\nGuard: Who goes there?\n\
             <<set $met_guard = true>>\n<<jump ask>>\n===\n"
        );
    }

    #[test]
    fn choice_output() {
        let tree = DialogueTree::new("t", "t", "ask").with_node(DialogueNode::player(
            "ask",
            vec![
                Choice::new("c1", "Pay")
                    .with_condition(Condition::compare("stat_gold", Operator::GreaterEqual, 10.0))
                    .with_condition(Condition::is_not_set("banned"))
                    .with_flag("paid")
                    .with_next("gate"),
                Choice::new("c2", "Leave"),
            ],
        ));
        let text = serialize(&tree);
        assert!(text.contains("-> Pay <<if $stat_gold >= 10 and not $banned>>\n    <<set $paid = true>>\n    <<jump gate>>\n"));
        assert!(text.contains("-> Leave\n===\n"));
    }

    #[test]
    fn string_literals_are_quoted() {
        let expr = format_expression(&[Condition::compare("title", Operator::NotEquals, "Sir \"Ada\"")]);
        assert_eq!(expr, r#"$title != "Sir \"Ada\"""#);
        assert_eq!(format_literal(&Value::from("C:\\road")), r#""C:\\road""#);
    }

    #[test]
    fn narration_colons_are_escaped() {
        assert_eq!(escape_text("Remember: dusk."), "Remember\\: dusk.");
        assert_eq!(escape_text("The gate closes at dusk."), "The gate closes at dusk.");
        assert_eq!(escape_text("C:\\road"), "C:\\\\road");

        let tree = DialogueTree::new("t", "t", "a")
            .with_node(DialogueNode::npc("a", "Remember: the gate closes at dusk."))
            .with_node(DialogueNode::npc("b", "Orders: none.").with_speaker("Guard"));
        let text = serialize(&tree);
        assert!(text.contains("---\nRemember\\: the gate closes at dusk.\n"));
        assert!(text.contains("Guard: Orders\\: none.\n"));
        assert_eq!(parse(&text), tree);
    }

    #[test]
    fn dangling_targets_are_not_written() {
        let tree = DialogueTree::new("t", "t", "a").with_node(DialogueNode::npc("a", "Bye.").with_next(""));
        assert!(!serialize(&tree).contains("<<jump"));
    }

    #[test]
    fn speaker_without_text_uses_header() {
        let node = DialogueNode::npc("n", "")
            .with_speaker("Guard")
            .with_blocks(vec![ConditionalBlock::when(vec![Condition::is_set("armed")], "Move along.")]);
        let tree = DialogueTree::new("t", "t", "n").with_node(node);
        let back = parse(&serialize(&tree));
        assert_eq!(back.get("n").unwrap().speaker.as_deref(), Some("Guard"));
    }

    #[test]
    fn conditional_node_round_trips() {
        let node = DialogueNode::conditional(
            "mood",
            vec![
                ConditionalBlock::when(vec![Condition::compare("visits", Operator::LessEqual, 0.0)], "First time?")
                    .with_speaker("Guard"),
                ConditionalBlock::or_when(vec![Condition::is_set("friend")], "Welcome back.").with_next("hub"),
                ConditionalBlock::otherwise("Hm."),
            ],
        );
        let tree = DialogueTree::new("t", "t", "mood").with_node(node.clone());
        let back = parse(&serialize(&tree));
        assert_eq!(back.get("mood"), Some(&node));
    }
}
