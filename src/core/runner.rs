/// Playback driver: walks a tree node by node for one playthrough.

use log::{debug, trace};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::flags::FlagWarning;
use crate::core::processor::{apply_choice, step, ProcessedNode};
use crate::core::variables::VariableStore;
use crate::schema::flag::{FlagSchema, GameState, SchemaError};
use crate::schema::tree::DialogueTree;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("dialogue tree has no nodes")]
    EmptyTree,
    #[error("start node not found: {0}")]
    MissingStart(String),
    #[error("node '{0}' is waiting for a choice")]
    AwaitingChoice(String),
    #[error("choice {index} is not available ({available} visible)")]
    ChoiceOutOfRange { index: usize, available: usize },
    #[error("dialogue has finished")]
    Finished,
}

/// Builder for configuring a [`DialogueRunner`].
#[derive(Debug, Default)]
pub struct DialogueRunnerBuilder {
    tree: Option<DialogueTree>,
    schema: Option<FlagSchema>,
    schema_files: Vec<PathBuf>,
    initial_state: GameState,
    start: Option<String>,
}

impl DialogueRunnerBuilder {
    pub fn with_tree(mut self, tree: DialogueTree) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Provide the flag schema directly.
    pub fn with_schema(mut self, schema: FlagSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Load a schema file (RON, or JSON by extension) at build time. Files
    /// are merged in the order given, on top of any schema set directly.
    pub fn schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_files.push(path.into());
        self
    }

    /// Persistent game state to start from; overrides schema defaults.
    pub fn with_initial_state(mut self, state: GameState) -> Self {
        self.initial_state = state;
        self
    }

    /// Start somewhere other than the tree's start node.
    pub fn start_at(mut self, node_id: impl Into<String>) -> Self {
        self.start = Some(node_id.into());
        self
    }

    pub fn build(self) -> Result<DialogueRunner, RunnerError> {
        let tree = self.tree.ok_or(RunnerError::EmptyTree)?;
        if tree.is_empty() {
            return Err(RunnerError::EmptyTree);
        }

        let mut schema = self.schema.unwrap_or_default();
        for path in &self.schema_files {
            debug!("loading flag schema {}", path.display());
            schema.merge(FlagSchema::load(path)?);
        }

        let start = self.start.unwrap_or_else(|| tree.start_node_id.clone());
        if !tree.contains(&start) {
            return Err(RunnerError::MissingStart(start));
        }

        let store = VariableStore::from_schema(&schema, &self.initial_state);
        Ok(DialogueRunner {
            start: start.clone(),
            current: Some(start),
            visit: None,
            tree,
            schema,
            store,
            warnings: Vec::new(),
        })
    }
}

/// One playthrough of a dialogue tree.
///
/// The runner owns its tree, schema and [`VariableStore`]. Each node is
/// processed once per visit; asking for the current node again returns the
/// cached result instead of re-running its commands.
#[derive(Debug, Clone)]
pub struct DialogueRunner {
    tree: DialogueTree,
    schema: FlagSchema,
    store: VariableStore,
    start: String,
    current: Option<String>,
    visit: Option<ProcessedNode>,
    warnings: Vec<FlagWarning>,
}

impl DialogueRunner {
    pub fn builder() -> DialogueRunnerBuilder {
        DialogueRunnerBuilder::default()
    }

    /// The current node as resolved for the live state, or `None` once the
    /// dialogue has ended.
    pub fn current(&mut self) -> Option<&ProcessedNode> {
        if self.visit.is_none() {
            let id = self.current.as_deref()?;
            let node = self.tree.get(id)?;
            let processed = step(node, &mut self.store, &self.schema);
            self.warnings.extend(processed.warnings.iter().cloned());
            self.visit = Some(processed);
        }
        self.visit.as_ref()
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Follow the current npc or conditional node to its successor.
    pub fn advance(&mut self) -> Result<Option<&ProcessedNode>, RunnerError> {
        let processed = self.current().ok_or(RunnerError::Finished)?;
        if processed.is_decision {
            return Err(RunnerError::AwaitingChoice(processed.node_id.clone()));
        }
        let next = processed.next_node_id.clone();
        self.move_to(next);
        Ok(self.current())
    }

    /// Pick choice `index` among the visible choices of the current player
    /// node, raise its flags and move to its target.
    pub fn choose(&mut self, index: usize) -> Result<Option<&ProcessedNode>, RunnerError> {
        let processed = self.current().ok_or(RunnerError::Finished)?;
        let choice = processed
            .choices
            .get(index)
            .cloned()
            .ok_or(RunnerError::ChoiceOutOfRange {
                index,
                available: processed.choices.len(),
            })?;
        let outcome = apply_choice(&choice, &mut self.store, &self.schema);
        self.warnings.extend(outcome.warnings);
        self.move_to(outcome.next_node_id);
        Ok(self.current())
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    /// Start over from the node the runner was built to start at, with the
    /// store's initial state.
    pub fn restart(&mut self) {
        self.store.reset();
        self.current = Some(self.start.clone());
        self.visit = None;
        self.warnings.clear();
    }

    /// Persistent flags to hand back to the game.
    pub fn game_state(&self) -> GameState {
        self.store.game_state(&self.schema)
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn tree(&self) -> &DialogueTree {
        &self.tree
    }

    pub fn schema(&self) -> &FlagSchema {
        &self.schema
    }

    /// Warnings collected since the playthrough started.
    pub fn warnings(&self) -> &[FlagWarning] {
        &self.warnings
    }

    fn move_to(&mut self, target: Option<String>) {
        let next = target.filter(|id| self.tree.contains(id));
        match &next {
            Some(id) => trace!("moving to node '{}'", id),
            None => trace!("dialogue finished"),
        }
        self.current = next;
        self.visit = None;
    }
}
