use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::node::{live_target, DialogueNode};

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A complete dialogue graph: an arena of nodes keyed by id.
///
/// `nodes` keeps insertion order; script output and JSON follow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTree {
    pub id: String,
    pub title: String,
    #[serde(rename = "startNodeId")]
    pub start_node_id: String,
    #[serde(default)]
    pub nodes: IndexMap<String, DialogueNode>,
}

impl DialogueTree {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start_node_id: start_node_id.into(),
            nodes: IndexMap::new(),
        }
    }

    /// Insert (or replace) a node under its own id.
    pub fn with_node(mut self, node: DialogueNode) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn get(&self, id: &str) -> Option<&DialogueNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DialogueNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn start_node(&self) -> Option<&DialogueNode> {
        self.nodes.get(&self.start_node_id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follow a transition target. Missing, empty and dangling targets all
    /// resolve to `None`, meaning the dialogue ends.
    pub fn resolve(&self, target: &Option<String>) -> Option<&DialogueNode> {
        live_target(target).and_then(|id| self.nodes.get(id))
    }

    /// Load a tree from its canonical JSON file.
    pub fn load_from_json(path: &Path) -> Result<DialogueTree, TreeError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    pub fn parse_json(input: &str) -> Result<DialogueTree, TreeError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
