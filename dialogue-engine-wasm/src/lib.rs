//! WASM bindings for dialogue-engine — powers the browser editor and player.
//!
//! Trees, schemas and game state cross the boundary as their canonical JSON
//! strings.

use wasm_bindgen::prelude::*;

use dialogue_engine::core::integrity::{self, NodeType};
use dialogue_engine::core::lint::{lint, Severity};
use dialogue_engine::core::parser::{parse_with, ParseOptions};
use dialogue_engine::core::processor::ProcessedNode;
use dialogue_engine::core::runner::DialogueRunner;
use dialogue_engine::core::serializer::serialize;
use dialogue_engine::schema::flag::{FlagSchema, GameState};
use dialogue_engine::schema::node::Choice;
use dialogue_engine::schema::tree::DialogueTree;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct IssueInfo {
    severity: &'static str,
    node: Option<String>,
    message: String,
}

#[derive(serde::Serialize)]
struct ChoiceInfo {
    index: usize,
    id: String,
    text: String,
}

#[derive(serde::Serialize)]
struct NodeInfo {
    node_id: String,
    speaker: Option<String>,
    content: String,
    choices: Vec<ChoiceInfo>,
    is_decision: bool,
    warnings: Vec<String>,
}

impl From<&ProcessedNode> for NodeInfo {
    fn from(node: &ProcessedNode) -> Self {
        NodeInfo {
            node_id: node.node_id.clone(),
            speaker: node.speaker.clone(),
            content: node.content.clone(),
            choices: node
                .choices
                .iter()
                .enumerate()
                .map(|(index, c)| ChoiceInfo {
                    index,
                    id: c.id.clone(),
                    text: c.text.clone(),
                })
                .collect(),
            is_decision: node.is_decision,
            warnings: node.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------
fn read_tree(tree_json: &str) -> Result<DialogueTree, JsError> {
    DialogueTree::parse_json(tree_json).map_err(|e| JsError::new(&format!("Invalid tree JSON: {e}")))
}

fn read_schema(schema_json: &str) -> Result<FlagSchema, JsError> {
    if schema_json.trim().is_empty() {
        return Ok(FlagSchema::new());
    }
    FlagSchema::parse_json(schema_json).map_err(|e| JsError::new(&format!("Invalid schema JSON: {e}")))
}

fn read_state(state_json: &str) -> Result<GameState, JsError> {
    if state_json.trim().is_empty() {
        return Ok(GameState::new());
    }
    serde_json::from_str(state_json).map_err(|e| JsError::new(&format!("Invalid game state JSON: {e}")))
}

fn write_tree(tree: &DialogueTree) -> Result<String, JsError> {
    tree.to_json().map_err(|e| JsError::new(&format!("Tree encode error: {e}")))
}

/// Run a pure choice-list edit against one player node of `tree_json`.
fn edit_choices(
    tree_json: &str,
    node_id: &str,
    edit: impl FnOnce(&[Choice]) -> Vec<Choice>,
) -> Result<String, JsError> {
    let mut tree = read_tree(tree_json)?;
    let node = tree
        .get_mut(node_id)
        .ok_or_else(|| JsError::new(&format!("Node not found: {node_id}")))?;
    let choices = node
        .choices_mut()
        .ok_or_else(|| JsError::new(&format!("Node '{node_id}' is not a player node")))?;
    let updated = edit(choices);
    *choices = updated;
    write_tree(&tree)
}

fn node_type(kind: &str) -> Result<NodeType, JsError> {
    match kind {
        "npc" => Ok(NodeType::Npc),
        "player" => Ok(NodeType::Player),
        "conditional" => Ok(NodeType::Conditional),
        _ => Err(JsError::new(&format!("Unknown node type: {kind}"))),
    }
}

// ---------------------------------------------------------------------------
// Script and editing entry points
// ---------------------------------------------------------------------------

/// Parse a script into tree JSON.
#[wasm_bindgen]
pub fn parse_script(text: &str, strict: bool) -> Result<String, JsError> {
    let tree = parse_with(text, ParseOptions { strict })
        .map_err(|e| JsError::new(&format!("Script error: {e}")))?;
    write_tree(&tree)
}

/// Render tree JSON as a script.
#[wasm_bindgen]
pub fn serialize_tree(tree_json: &str) -> Result<String, JsError> {
    Ok(serialize(&read_tree(tree_json)?))
}

/// Lint tree JSON. Returns a JSON array of `{severity, node, message}`.
#[wasm_bindgen]
pub fn lint_tree(tree_json: &str, schema_json: &str) -> Result<String, JsError> {
    let tree = read_tree(tree_json)?;
    let schema = read_schema(schema_json)?;
    let issues: Vec<IssueInfo> = lint(&tree, &schema)
        .into_iter()
        .map(|issue| IssueInfo {
            severity: match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            },
            message: issue.to_string(),
            node: issue.node,
        })
        .collect();
    serde_json::to_string(&issues).map_err(|e| JsError::new(&format!("Encode error: {e}")))
}

/// Add an empty node of type `npc`, `player` or `conditional`. Returns the
/// updated tree JSON; the new node is the last entry of `nodes`.
#[wasm_bindgen]
pub fn create_node(tree_json: &str, kind: &str) -> Result<String, JsError> {
    let mut tree = read_tree(tree_json)?;
    integrity::create_node(&mut tree, node_type(kind)?);
    write_tree(&tree)
}

/// Delete a node and clear every transition into it. Returns the updated
/// tree JSON.
#[wasm_bindgen]
pub fn delete_node(tree_json: &str, node_id: &str) -> Result<String, JsError> {
    let mut tree = read_tree(tree_json)?;
    integrity::delete_node(&mut tree, node_id).map_err(|e| JsError::new(&e.to_string()))?;
    write_tree(&tree)
}

/// Point an npc node at an existing node. Returns the updated tree JSON.
#[wasm_bindgen]
pub fn connect(tree_json: &str, from: &str, to: &str) -> Result<String, JsError> {
    let mut tree = read_tree(tree_json)?;
    integrity::connect(&mut tree, from, to).map_err(|e| JsError::new(&e.to_string()))?;
    write_tree(&tree)
}

/// Point choice `index` of a player node at an existing node.
#[wasm_bindgen]
pub fn connect_choice(tree_json: &str, node_id: &str, index: usize, to: &str) -> Result<String, JsError> {
    let mut tree = read_tree(tree_json)?;
    integrity::connect_choice(&mut tree, node_id, index, to).map_err(|e| JsError::new(&e.to_string()))?;
    write_tree(&tree)
}

/// Append a blank choice to a player node.
#[wasm_bindgen]
pub fn add_choice(tree_json: &str, node_id: &str) -> Result<String, JsError> {
    edit_choices(tree_json, node_id, |choices| {
        integrity::add_choice(choices, integrity::new_choice(node_id, choices))
    })
}

/// Remove choice `index`; the last remaining choice is kept.
#[wasm_bindgen]
pub fn remove_choice(tree_json: &str, node_id: &str, index: usize) -> Result<String, JsError> {
    edit_choices(tree_json, node_id, |choices| integrity::remove_choice(choices, index))
}

/// Replace choice `index` with `choice_json` (a `Choice` object).
#[wasm_bindgen]
pub fn update_choice(tree_json: &str, node_id: &str, index: usize, choice_json: &str) -> Result<String, JsError> {
    let choice: Choice =
        serde_json::from_str(choice_json).map_err(|e| JsError::new(&format!("Invalid choice JSON: {e}")))?;
    edit_choices(tree_json, node_id, |choices| integrity::update_choice(choices, index, choice))
}

// ---------------------------------------------------------------------------
// DialoguePlayer — the exported playback session
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct DialoguePlayer {
    runner: DialogueRunner,
}

#[wasm_bindgen]
impl DialoguePlayer {
    /// Start a playthrough. `schema_json` and `state_json` may be empty.
    #[wasm_bindgen(constructor)]
    pub fn new(tree_json: &str, schema_json: &str, state_json: &str) -> Result<DialoguePlayer, JsError> {
        let runner = DialogueRunner::builder()
            .with_tree(read_tree(tree_json)?)
            .with_schema(read_schema(schema_json)?)
            .with_initial_state(read_state(state_json)?)
            .build()
            .map_err(|e| JsError::new(&format!("Player build error: {e}")))?;
        Ok(DialoguePlayer { runner })
    }

    /// The current node as JSON, or `null` once the dialogue has ended.
    pub fn current(&mut self) -> Result<String, JsError> {
        let info = self.runner.current().map(NodeInfo::from);
        serde_json::to_string(&info).map_err(|e| JsError::new(&format!("Encode error: {e}")))
    }

    /// Continue past an npc or conditional node.
    pub fn advance(&mut self) -> Result<String, JsError> {
        self.runner.advance().map_err(|e| JsError::new(&e.to_string()))?;
        self.current()
    }

    /// Pick a visible choice by index.
    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        self.runner.choose(index).map_err(|e| JsError::new(&e.to_string()))?;
        self.current()
    }

    pub fn is_finished(&self) -> bool {
        self.runner.is_finished()
    }

    /// Persistent flags to hand back to the game, as a JSON object.
    pub fn game_state(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.runner.game_state())
            .map_err(|e| JsError::new(&format!("Encode error: {e}")))
    }

    pub fn restart(&mut self) {
        self.runner.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogue_engine::schema::node::DialogueNode;

    fn tree_json() -> String {
        DialogueTree::new("t", "t", "a")
            .with_node(DialogueNode::npc("a", "Hi."))
            .with_node(DialogueNode::player("b", vec![Choice::new("b_choice_1", "Bye")]))
            .to_json()
            .unwrap()
    }

    fn choices(json: &str) -> Vec<Choice> {
        let tree = DialogueTree::parse_json(json).unwrap();
        tree.get("b").unwrap().choices().unwrap().to_vec()
    }

    #[test]
    fn choice_list_edits() {
        let json = add_choice(&tree_json(), "b").unwrap();
        let ids: Vec<_> = choices(&json).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b_choice_1", "b_choice_2"]);

        let json = update_choice(&json, "b", 1, r#"{"id":"b_choice_2","text":"Stay"}"#).unwrap();
        assert_eq!(choices(&json)[1].text, "Stay");

        let json = remove_choice(&json, "b", 0).unwrap();
        let json = remove_choice(&json, "b", 0).unwrap();
        let left = choices(&json);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "Stay");
    }

    #[test]
    fn connections() {
        let json = connect(&tree_json(), "a", "b").unwrap();
        let json = connect_choice(&json, "b", 0, "a").unwrap();
        let tree = DialogueTree::parse_json(&json).unwrap();
        assert!(tree.resolve(&tree.get("b").unwrap().choices().unwrap()[0].next_node_id).is_some());
        assert_eq!(tree.get("a").unwrap().targets(), vec![&Some("b".to_string())]);
    }
}
