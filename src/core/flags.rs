/// Folds raised flags into persistent game state.

use log::warn;
use thiserror::Error;

use crate::schema::condition::Value;
use crate::schema::flag::{FlagSchema, GameState, ValueType};

/// A non-fatal diagnostic raised while applying flags or commands.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlagWarning {
    #[error("flag '{flag}' is not declared in the schema; set to true")]
    UnknownFlag { flag: String },
    #[error("value {from} for flag '{flag}' was coerced to {to}")]
    TypeCoerced { flag: String, from: Value, to: Value },
    #[error("value {value} cannot be stored in flag '{flag}'; set to true instead")]
    CommandFallback { flag: String, value: Value },
}

/// The state produced by [`merge`] and anything worth telling the author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeResult {
    pub state: GameState,
    pub warnings: Vec<FlagWarning>,
}

/// Raise each flag in `flag_ids` on a copy of `current`.
///
/// The written value always matches the flag's declared `valueType`:
/// - no type or `boolean`: `true`
/// - `number`: one more than the current number (falling back to the
///   declared default, then `0`)
/// - `string`: the declared default, else the current string, else the
///   flag's display name
///
/// Ids missing from the schema are written as `true` and reported as
/// [`FlagWarning::UnknownFlag`].
pub fn merge<S: AsRef<str>>(current: &GameState, flag_ids: &[S], schema: &FlagSchema) -> MergeResult {
    let mut state = current.clone();
    let mut warnings = Vec::new();

    for id in flag_ids {
        let id = id.as_ref();
        let Some(def) = schema.get(id) else {
            warn!("unknown flag '{}' merged as true", id);
            state.insert(id.to_string(), Value::Bool(true));
            warnings.push(FlagWarning::UnknownFlag {
                flag: id.to_string(),
            });
            continue;
        };

        let value = match def.value_type {
            None | Some(ValueType::Boolean) => Value::Bool(true),
            Some(ValueType::Number) => {
                let base = match state.get(id) {
                    Some(Value::Number(n)) => *n,
                    _ => def
                        .typed_default()
                        .map_or(0.0, |v| v.as_number()),
                };
                Value::Number(base + 1.0)
            }
            Some(ValueType::String) => def
                .typed_default()
                .or_else(|| state.get(id).filter(|v| ValueType::String.matches(v)).cloned())
                .unwrap_or_else(|| Value::String(def.name.clone())),
        };
        state.insert(id.to_string(), value);
    }

    MergeResult { state, warnings }
}
