/// The mutable flag state of one playthrough.

use rustc_hash::FxHashSet;
use std::collections::HashMap;

use crate::schema::condition::Value;
use crate::schema::flag::{FlagSchema, GameState};

/// Named flag values plus the set of memory flags raised during the
/// current playthrough.
///
/// Memory flags carry no value; their presence alone satisfies `is_set`.
/// A store belongs to exactly one playthrough; concurrent playthroughs use
/// separate stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    variables: HashMap<String, Value>,
    memory_flags: FxHashSet<String>,
    initial: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from schema defaults overlaid with the caller's
    /// persistent game state (game state wins).
    pub fn from_schema(schema: &FlagSchema, initial_state: &GameState) -> Self {
        let mut variables = schema.defaults();
        for (id, value) in initial_state {
            variables.insert(id.clone(), value.clone());
        }
        Self {
            initial: variables.clone(),
            variables,
            memory_flags: FxHashSet::default(),
        }
    }

    pub fn get(&self, flag: &str) -> Option<&Value> {
        self.variables.get(flag)
    }

    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(flag.into(), value.into());
    }

    pub fn remove(&mut self, flag: &str) -> Option<Value> {
        self.variables.remove(flag)
    }

    /// A flag is set when raised as a memory flag, or when it holds a value
    /// other than `false`, `0` or `""`.
    pub fn is_set(&self, flag: &str) -> bool {
        self.memory_flags.contains(flag)
            || self.variables.get(flag).is_some_and(Value::is_truthy)
    }

    pub fn set_memory_flag(&mut self, flag: impl Into<String>) {
        self.memory_flags.insert(flag.into());
    }

    pub fn unset_memory_flag(&mut self, flag: &str) -> bool {
        self.memory_flags.remove(flag)
    }

    pub fn has_memory_flag(&self, flag: &str) -> bool {
        self.memory_flags.contains(flag)
    }

    pub fn clear_memory_flags(&mut self) {
        self.memory_flags.clear();
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn memory_flags(&self) -> &FxHashSet<String> {
        &self.memory_flags
    }

    /// Replace the variable map wholesale, e.g. with a merged game state.
    pub fn replace_variables(&mut self, variables: HashMap<String, Value>) {
        self.variables = variables;
    }

    /// Return to the state the store was created with.
    pub fn reset(&mut self) {
        self.variables = self.initial.clone();
        self.memory_flags.clear();
    }

    /// The persistent part of the state, to hand back to the game: every
    /// variable that is not a memory flag according to `schema`.
    pub fn game_state(&self, schema: &FlagSchema) -> GameState {
        self.variables
            .iter()
            .filter(|(id, _)| schema.contains(id) && !schema.is_memory_flag(id))
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect()
    }
}
