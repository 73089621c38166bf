use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Normalise a transition target: an empty id is the same as no target.
pub fn live_target(target: &Option<String>) -> Option<&str> {
    target.as_deref().filter(|id| !id.is_empty())
}

/// Which arm of an if/elseif/else chain a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    If,
    ElseIf,
    Else,
}

/// One alternative of conditional content inside a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Conjunction of conditions; empty for `else` (and for an
    /// unconditional `if`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition: Vec<Condition>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(
        rename = "nextNodeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_node_id: Option<String>,
}

impl ConditionalBlock {
    pub fn new(kind: BlockKind, condition: Vec<Condition>, content: impl Into<String>) -> Self {
        Self {
            kind,
            condition,
            content: content.into(),
            speaker: None,
            next_node_id: None,
        }
    }

    pub fn when(condition: Vec<Condition>, content: impl Into<String>) -> Self {
        Self::new(BlockKind::If, condition, content)
    }

    pub fn or_when(condition: Vec<Condition>, content: impl Into<String>) -> Self {
        Self::new(BlockKind::ElseIf, condition, content)
    }

    pub fn otherwise(content: impl Into<String>) -> Self {
        Self::new(BlockKind::Else, Vec::new(), content)
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_next(mut self, node_id: impl Into<String>) -> Self {
        self.next_node_id = Some(node_id.into());
        self
    }
}

/// A selectable player option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
    #[serde(
        rename = "nextNodeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_node_id: Option<String>,
    /// Visibility gate; all conditions must hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(rename = "setFlags", default, skip_serializing_if = "Option::is_none")]
    pub set_flags: Option<Vec<String>>,
}

impl Choice {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            next_node_id: None,
            conditions: None,
            set_flags: None,
        }
    }

    pub fn with_next(mut self, node_id: impl Into<String>) -> Self {
        self.next_node_id = Some(node_id.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.get_or_insert_with(Vec::new).push(condition);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.set_flags.get_or_insert_with(Vec::new).push(flag.into());
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        self.conditions.as_deref().unwrap_or_default()
    }

    pub fn flags(&self) -> &[String] {
        self.set_flags.as_deref().unwrap_or_default()
    }
}

/// The variant-specific part of a node, tagged by `"type"` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// A line of dialogue spoken by a character.
    Npc {
        #[serde(default)]
        content: String,
        #[serde(
            rename = "nextNodeId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        next_node_id: Option<String>,
        #[serde(rename = "setFlags", default, skip_serializing_if = "Option::is_none")]
        set_flags: Option<Vec<String>>,
        /// Supersedes `content` when present.
        #[serde(
            rename = "conditionalBlocks",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        conditional_blocks: Option<Vec<ConditionalBlock>>,
    },
    /// A decision point offering choices to the player.
    Player {
        #[serde(default)]
        choices: Vec<Choice>,
    },
    /// Content chosen entirely by first-match block evaluation.
    Conditional {
        #[serde(rename = "conditionalBlocks", default)]
        conditional_blocks: Vec<ConditionalBlock>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Npc { .. } => "npc",
            Self::Player { .. } => "player",
            Self::Conditional { .. } => "conditional",
        }
    }
}

/// A node of the dialogue graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl DialogueNode {
    pub fn npc(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            speaker: None,
            kind: NodeKind::Npc {
                content: content.into(),
                next_node_id: None,
                set_flags: None,
                conditional_blocks: None,
            },
        }
    }

    pub fn player(id: impl Into<String>, choices: Vec<Choice>) -> Self {
        Self {
            id: id.into(),
            speaker: None,
            kind: NodeKind::Player { choices },
        }
    }

    pub fn conditional(id: impl Into<String>, blocks: Vec<ConditionalBlock>) -> Self {
        Self {
            id: id.into(),
            speaker: None,
            kind: NodeKind::Conditional {
                conditional_blocks: blocks,
            },
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Set the successor of an npc node. Other kinds are left untouched.
    pub fn with_next(mut self, node_id: impl Into<String>) -> Self {
        if let NodeKind::Npc { next_node_id, .. } = &mut self.kind {
            *next_node_id = Some(node_id.into());
        }
        self
    }

    /// Add an on-entry flag to an npc node. Other kinds are left untouched.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        if let NodeKind::Npc { set_flags, .. } = &mut self.kind {
            set_flags.get_or_insert_with(Vec::new).push(flag.into());
        }
        self
    }

    /// Attach conditional blocks to an npc node.
    pub fn with_blocks(mut self, blocks: Vec<ConditionalBlock>) -> Self {
        if let NodeKind::Npc {
            conditional_blocks, ..
        } = &mut self.kind
        {
            *conditional_blocks = Some(blocks);
        }
        self
    }

    pub fn choices(&self) -> Option<&[Choice]> {
        match &self.kind {
            NodeKind::Player { choices } => Some(choices),
            _ => None,
        }
    }

    pub fn choices_mut(&mut self) -> Option<&mut Vec<Choice>> {
        match &mut self.kind {
            NodeKind::Player { choices } => Some(choices),
            _ => None,
        }
    }

    /// The conditional blocks driving this node's content, if any.
    pub fn blocks(&self) -> Option<&[ConditionalBlock]> {
        match &self.kind {
            NodeKind::Npc {
                conditional_blocks, ..
            } => conditional_blocks.as_deref(),
            NodeKind::Conditional { conditional_blocks } => Some(conditional_blocks),
            NodeKind::Player { .. } => None,
        }
    }

    /// Every outgoing transition slot of the node, in authoring order.
    pub fn targets(&self) -> Vec<&Option<String>> {
        let mut out = Vec::new();
        match &self.kind {
            NodeKind::Npc {
                next_node_id,
                conditional_blocks,
                ..
            } => {
                out.push(next_node_id);
                for block in conditional_blocks.iter().flatten() {
                    out.push(&block.next_node_id);
                }
            }
            NodeKind::Player { choices } => {
                out.extend(choices.iter().map(|c| &c.next_node_id));
            }
            NodeKind::Conditional { conditional_blocks } => {
                out.extend(conditional_blocks.iter().map(|b| &b.next_node_id));
            }
        }
        out
    }

    /// Mutable access to every outgoing transition slot.
    pub fn targets_mut(&mut self) -> Vec<&mut Option<String>> {
        let mut out = Vec::new();
        match &mut self.kind {
            NodeKind::Npc {
                next_node_id,
                conditional_blocks,
                ..
            } => {
                out.push(next_node_id);
                for block in conditional_blocks.iter_mut().flatten() {
                    out.push(&mut block.next_node_id);
                }
            }
            NodeKind::Player { choices } => {
                out.extend(choices.iter_mut().map(|c| &mut c.next_node_id));
            }
            NodeKind::Conditional { conditional_blocks } => {
                out.extend(conditional_blocks.iter_mut().map(|b| &mut b.next_node_id));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::Operator;

    #[test]
    fn live_target_filters_empty() {
        assert_eq!(live_target(&None), None);
        assert_eq!(live_target(&Some(String::new())), None);
        assert_eq!(live_target(&Some("hub".to_string())), Some("hub"));
    }

    #[test]
    fn npc_json_shape() {
        let node = DialogueNode::npc("greet", "Halt!")
            .with_speaker("Guard")
            .with_next("ask")
            .with_flag("met_guard");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "npc");
        assert_eq!(json["id"], "greet");
        assert_eq!(json["speaker"], "Guard");
        assert_eq!(json["nextNodeId"], "ask");
        assert_eq!(json["setFlags"][0], "met_guard");
        assert!(json.get("conditionalBlocks").is_none());
    }

    #[test]
    fn player_json_round_trip() {
        let node = DialogueNode::player(
            "ask",
            vec![Choice::new("c1", "Pay the toll")
                .with_next("gate")
                .with_condition(Condition::compare("gold", Operator::GreaterEqual, 10.0))
                .with_flag("paid_toll")],
        );
        let json = serde_json::to_string(&node).unwrap();
        let back: DialogueNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn conditional_json_parses_block_types() {
        let json = r#"{
            "id": "mood",
            "type": "conditional",
            "conditionalBlocks": [
                {"type": "if", "condition": [{"flag": "angry", "operator": "is_set"}], "content": "Go away."},
                {"type": "elseif", "condition": [{"flag": "friend", "operator": "is_set"}], "content": "Welcome back!", "nextNodeId": "hub"},
                {"type": "else", "content": "Hello."}
            ]
        }"#;
        let node: DialogueNode = serde_json::from_str(json).unwrap();
        let blocks = node.blocks().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].kind, BlockKind::ElseIf);
        assert_eq!(blocks[1].next_node_id.as_deref(), Some("hub"));
        assert!(blocks[2].condition.is_empty());
    }

    #[test]
    fn targets_cover_blocks_and_next() {
        let node = DialogueNode::npc("n", "")
            .with_next("a")
            .with_blocks(vec![ConditionalBlock::otherwise("x").with_next("b")]);
        let targets: Vec<_> = node.targets().into_iter().map(live_target).collect();
        assert_eq!(targets, vec![Some("a"), Some("b")]);
    }

    #[test]
    fn builders_ignore_other_kinds() {
        let node = DialogueNode::player("p", Vec::new()).with_next("x").with_flag("f");
        assert_eq!(node.kind, NodeKind::Player { choices: Vec::new() });
    }
}
