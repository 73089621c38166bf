use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::condition::Value;

/// Persistent flag values owned by the game, keyed by flag id.
pub type GameState = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate flag id '{0}'")]
    DuplicateFlag(String),
}

/// The category a flag belongs to. Only `Dialogue` flags are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Dialogue,
    Quest,
    Achievement,
    Item,
    Stat,
    Title,
    Global,
}

impl FlagType {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Dialogue)
    }
}

/// The declared value type of a persistent flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
}

impl ValueType {
    /// Convert `value` to this type when the conversion is unambiguous.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Boolean, Value::Bool(b)) => Some(Value::Bool(*b)),
            (Self::Boolean, Value::Number(n)) if *n == 0.0 || *n == 1.0 => {
                Some(Value::Bool(*n == 1.0))
            }
            (Self::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Self::Boolean, Value::Number(_)) => None,
            (Self::Number, Value::Number(n)) => Some(Value::Number(*n)),
            (Self::Number, Value::Bool(b)) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),
            (Self::Number, Value::String(s)) => s.trim().parse().ok().map(Value::Number),
            (Self::String, Value::String(s)) => Some(Value::String(s.clone())),
            (Self::String, other) => Some(Value::String(other.to_string())),
        }
    }

    /// Whether `value` already has this type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Boolean, Value::Bool(_))
                | (Self::Number, Value::Number(_))
                | (Self::String, Value::String(_))
        )
    }
}

/// A typed flag declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    #[serde(rename = "valueType", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(
        rename = "defaultValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FlagDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, flag_type: FlagType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            flag_type,
            value_type: None,
            default_value: None,
            category: None,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_transient(&self) -> bool {
        self.flag_type.is_transient()
    }

    /// The declared default, converted to the declared value type.
    pub fn typed_default(&self) -> Option<Value> {
        let value = self.default_value.as_ref()?;
        match self.value_type {
            Some(vt) => vt.coerce(value),
            None => Some(value.clone()),
        }
    }
}

/// All flag declarations known to a project, keyed by id.
///
/// The JSON and RON forms are a plain list of definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<FlagDefinition>",
    into = "Vec<FlagDefinition>"
)]
pub struct FlagSchema {
    flags: IndexMap<String, FlagDefinition>,
}

impl TryFrom<Vec<FlagDefinition>> for FlagSchema {
    type Error = SchemaError;

    fn try_from(defs: Vec<FlagDefinition>) -> Result<Self, Self::Error> {
        let mut flags = IndexMap::new();
        for def in defs {
            if flags.contains_key(&def.id) {
                return Err(SchemaError::DuplicateFlag(def.id));
            }
            flags.insert(def.id.clone(), def);
        }
        Ok(FlagSchema { flags })
    }
}

impl From<FlagSchema> for Vec<FlagDefinition> {
    fn from(schema: FlagSchema) -> Self {
        schema.flags.into_values().collect()
    }
}

impl FlagSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, def: FlagDefinition) -> Self {
        self.insert(def);
        self
    }

    /// Insert or replace a definition.
    pub fn insert(&mut self, def: FlagDefinition) {
        self.flags.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&FlagDefinition> {
        self.flags.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.flags.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagDefinition> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flags that live only for the current playthrough: `dialogue`-typed
    /// ones and anything the schema does not declare.
    pub fn is_memory_flag(&self, id: &str) -> bool {
        self.flags.get(id).map_or(true, FlagDefinition::is_transient)
    }

    /// Declared defaults of persistent flags.
    pub fn defaults(&self) -> GameState {
        self.flags
            .values()
            .filter(|def| !def.is_transient())
            .filter_map(|def| def.typed_default().map(|v| (def.id.clone(), v)))
            .collect()
    }

    /// Merge another schema into this one. Definitions from `other`
    /// override definitions in `self` with the same id.
    pub fn merge(&mut self, other: FlagSchema) {
        for (id, def) in other.flags {
            self.flags.insert(id, def);
        }
    }

    /// Load a schema from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<FlagSchema, SchemaError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Load a schema from a JSON file.
    pub fn load_from_json(path: &Path) -> Result<FlagSchema, SchemaError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    /// Load a schema, picking the format from the file extension
    /// (`.json`, anything else is read as RON).
    pub fn load(path: &Path) -> Result<FlagSchema, SchemaError> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::load_from_json(path),
            _ => Self::load_from_ron(path),
        }
    }

    pub fn parse_ron(input: &str) -> Result<FlagSchema, SchemaError> {
        let defs: Vec<FlagDefinition> = ron::from_str(input)?;
        defs.try_into()
    }

    pub fn parse_json(input: &str) -> Result<FlagSchema, SchemaError> {
        let defs: Vec<FlagDefinition> = serde_json::from_str(input)?;
        defs.try_into()
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FlagSchema {
        FlagSchema::new()
            .with_flag(FlagDefinition::new("met_guard", "Met the guard", FlagType::Dialogue))
            .with_flag(
                FlagDefinition::new("stat_gold", "Gold", FlagType::Stat)
                    .with_value_type(ValueType::Number)
                    .with_default(0.0),
            )
            .with_flag(
                FlagDefinition::new("title_name", "Title", FlagType::Title)
                    .with_value_type(ValueType::String)
                    .with_default("Squire"),
            )
            .with_flag(FlagDefinition::new("quest_started", "Quest", FlagType::Quest))
    }

    #[test]
    fn memory_flags_are_dialogue_or_unknown() {
        let s = schema();
        assert!(s.is_memory_flag("met_guard"));
        assert!(s.is_memory_flag("never_declared"));
        assert!(!s.is_memory_flag("stat_gold"));
    }

    #[test]
    fn defaults_skip_transient_and_undeclared() {
        let defaults = schema().defaults();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults["stat_gold"], Value::Number(0.0));
        assert_eq!(defaults["title_name"], Value::from("Squire"));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(ValueType::Number.coerce(&Value::from("12")), Some(Value::Number(12.0)));
        assert_eq!(ValueType::Number.coerce(&Value::from("lots")), None);
        assert_eq!(ValueType::Boolean.coerce(&Value::Number(1.0)), Some(Value::Bool(true)));
        assert_eq!(ValueType::Boolean.coerce(&Value::Number(7.0)), None);
        assert_eq!(ValueType::String.coerce(&Value::Number(7.0)), Some(Value::from("7")));
    }

    #[test]
    fn json_is_a_list_and_round_trips() {
        let s = schema();
        let json = s.to_json().unwrap();
        assert!(json.trim_start().starts_with('['));
        assert!(json.contains("\"valueType\": \"number\""));
        let back = FlagSchema::parse_json(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = r#"[
            {"id": "a", "name": "A", "type": "quest"},
            {"id": "a", "name": "A again", "type": "item"}
        ]"#;
        assert!(matches!(
            FlagSchema::parse_json(json),
            Err(SchemaError::DuplicateFlag(id)) if id == "a"
        ));
    }

    #[test]
    fn parse_ron_list() {
        let input = r#"[
            (id: "stat_gold", name: "Gold", type: stat, valueType: Some(number), defaultValue: Some(5)),
            (id: "met_guard", name: "Met guard", type: dialogue),
        ]"#;
        let s = FlagSchema::parse_ron(input).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.get("stat_gold").unwrap().typed_default(), Some(Value::Number(5.0)));
        assert!(s.get("met_guard").unwrap().is_transient());
    }

    #[test]
    fn merge_precedence() {
        let mut base = schema();
        base.merge(FlagSchema::new().with_flag(
            FlagDefinition::new("stat_gold", "Gold", FlagType::Stat)
                .with_value_type(ValueType::Number)
                .with_default(50.0),
        ));
        assert_eq!(base.len(), 4);
        assert_eq!(base.defaults()["stat_gold"], Value::Number(50.0));
    }
}
