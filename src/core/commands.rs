/// Inline mutation commands embedded in dialogue text.
///
/// Content may carry `<<set $flag = value>>` / `<<set $flag to $flag + 5>>`
/// markup. The processor applies each command in textual order and strips
/// the markup from the displayed line.

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::flags::FlagWarning;
use crate::core::variables::VariableStore;
use crate::schema::condition::Value;
use crate::schema::flag::FlagSchema;

/// Characters a flag id may contain in script text. Anything the
/// expression syntax uses as a delimiter is excluded.
pub(crate) const FLAG_ID: &str = r#"[^\s=!<>$&|"']+"#;

static SET_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"<<\s*set\s+\$({})\s*(?:=|\bto\b)\s*((?:"(?:[^"\\]|\\.)*"|[^">])*?)\s*>>"#,
        FLAG_ID
    ))
    .expect("set command regex must compile")
});

static OFFSET_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\$({})\s*([+-])\s*(-?[0-9]+(?:\.[0-9]+)?)$", FLAG_ID))
        .expect("offset expression regex must compile")
});

static SCRIPTABLE_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{}$", FLAG_ID)).expect("flag id regex must compile"));

/// Whether `flag` can be written as `$flag` in a script and read back.
pub fn is_scriptable_flag(flag: &str) -> bool {
    SCRIPTABLE_FLAG.is_match(flag)
}

/// The right-hand side of a set command.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// A literal: `true`, `12`, `"Sir Ada"`, `knight`.
    Literal(Value),
    /// Another flag's current value: `$other`.
    Copy(String),
    /// Another flag's numeric value plus a delta: `$gold - 5`.
    Offset { source: String, delta: f64 },
}

/// A parsed `<<set>>` command.
#[derive(Debug, Clone, PartialEq)]
pub struct SetCommand {
    pub flag: String,
    pub expr: SetExpr,
}

impl SetCommand {
    /// Whether this command is a plain `= true` assignment, which the script
    /// format maps onto a node or choice `setFlags` entry.
    pub fn is_boolean_raise(&self) -> bool {
        self.expr == SetExpr::Literal(Value::Bool(true))
    }

    /// Evaluate the right-hand side against the current store.
    pub fn resolve(&self, store: &VariableStore) -> Value {
        match &self.expr {
            SetExpr::Literal(v) => v.clone(),
            SetExpr::Copy(source) => store.get(source).cloned().unwrap_or_else(|| {
                Value::Bool(store.has_memory_flag(source))
            }),
            SetExpr::Offset { source, delta } => {
                let base = store.get(source).map_or(0.0, Value::as_number);
                Value::Number(base + delta)
            }
        }
    }
}

/// Parse a single line holding exactly one set command.
pub fn parse_command(line: &str) -> Option<SetCommand> {
    let line = line.trim();
    let caps = SET_COMMAND.captures(line)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != line.len() {
        return None;
    }
    Some(SetCommand {
        flag: caps[1].to_string(),
        expr: parse_expr(&caps[2])?,
    })
}

/// Parse a literal as written in scripts: booleans, numbers, quoted or
/// bare strings.
pub fn parse_literal(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        return Some(Value::Number(n));
    }
    let quoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    match quoted {
        Some(inner) => Some(Value::String(unescape_quoted(inner))),
        None => Some(Value::String(raw.to_string())),
    }
}

/// Undo the `\\` and `\"` escapes of a quoted literal. Other backslashes
/// are kept as written.
fn unescape_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('\\' | '"')) => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Flags assigned or read by the set commands in `content`.
pub fn command_flags(content: &str) -> Vec<String> {
    let mut flags = Vec::new();
    for caps in SET_COMMAND.captures_iter(content) {
        flags.push(caps[1].to_string());
        match parse_expr(&caps[2]) {
            Some(SetExpr::Copy(source)) | Some(SetExpr::Offset { source, .. }) => flags.push(source),
            _ => {}
        }
    }
    flags
}

fn parse_expr(raw: &str) -> Option<SetExpr> {
    let raw = raw.trim();
    if let Some(caps) = OFFSET_EXPR.captures(raw) {
        let magnitude: f64 = caps[3].parse().ok()?;
        let delta = if &caps[2] == "-" { -magnitude } else { magnitude };
        return Some(SetExpr::Offset {
            source: caps[1].to_string(),
            delta,
        });
    }
    if let Some(source) = raw.strip_prefix('$') {
        return Some(SetExpr::Copy(source.to_string()));
    }
    parse_literal(raw).map(SetExpr::Literal)
}

/// Result of running the commands embedded in a piece of content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    /// Content with command markup removed.
    pub text: String,
    pub warnings: Vec<FlagWarning>,
}

/// Apply every set command in `content` to `store`, in textual order, and
/// return the content with the markup stripped.
///
/// Values are coerced to the flag's declared type where possible; values
/// that cannot be coerced fall back to boolean `true`.
pub fn apply_commands(content: &str, store: &mut VariableStore, schema: &FlagSchema) -> CommandOutcome {
    let mut warnings = Vec::new();
    let mut lines = Vec::new();

    for line in content.lines() {
        if !SET_COMMAND.is_match(line) {
            lines.push(line.to_string());
            continue;
        }
        for caps in SET_COMMAND.captures_iter(line) {
            let Some(expr) = parse_expr(&caps[2]) else {
                continue;
            };
            let command = SetCommand {
                flag: caps[1].to_string(),
                expr,
            };
            let value = command.resolve(store);
            if let Some(warning) = assign(store, schema, &command.flag, value) {
                warnings.push(warning);
            }
        }
        let stripped = SET_COMMAND.replace_all(line, "");
        let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if !stripped.is_empty() {
            lines.push(stripped);
        }
    }

    CommandOutcome {
        text: lines.join("\n"),
        warnings,
    }
}

fn assign(store: &mut VariableStore, schema: &FlagSchema, flag: &str, value: Value) -> Option<FlagWarning> {
    let def = schema.get(flag);

    if def.is_some_and(|d| d.is_transient()) {
        if value.is_truthy() {
            store.set_memory_flag(flag);
        } else {
            store.unset_memory_flag(flag);
        }
        store.set(flag, value);
        return None;
    }

    let Some(value_type) = def.and_then(|d| d.value_type) else {
        store.set(flag, value);
        return None;
    };

    if value_type.matches(&value) {
        store.set(flag, value);
        return None;
    }

    match value_type.coerce(&value) {
        Some(coerced) => {
            store.set(flag, coerced.clone());
            Some(FlagWarning::TypeCoerced {
                flag: flag.to_string(),
                from: value,
                to: coerced,
            })
        }
        None => {
            warn!("cannot store {} in flag '{}'; setting true", value, flag);
            store.set(flag, true);
            Some(FlagWarning::CommandFallback {
                flag: flag.to_string(),
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::flag::{FlagDefinition, FlagType, ValueType};

    fn schema() -> FlagSchema {
        FlagSchema::new()
            .with_flag(
                FlagDefinition::new("stat_gold", "Gold", FlagType::Stat)
                    .with_value_type(ValueType::Number),
            )
            .with_flag(FlagDefinition::new("met_guard", "Met", FlagType::Dialogue))
    }

    #[test]
    fn parse_single_commands() {
        let cmd = parse_command("<<set $met_guard = true>>").unwrap();
        assert_eq!(cmd.flag, "met_guard");
        assert!(cmd.is_boolean_raise());

        let cmd = parse_command("  <<set $gold to $gold - 5>>").unwrap();
        assert_eq!(
            cmd.expr,
            SetExpr::Offset {
                source: "gold".to_string(),
                delta: -5.0
            }
        );

        let cmd = parse_command(r#"<<set $title = "Sir Ada">>"#).unwrap();
        assert_eq!(cmd.expr, SetExpr::Literal(Value::from("Sir Ada")));
        assert!(!cmd.is_boolean_raise());
    }

    #[test]
    fn punctuated_flag_ids_and_quoted_markup() {
        let cmd = parse_command("<<set $met-guard = true>>").unwrap();
        assert_eq!(cmd.flag, "met-guard");
        assert!(cmd.is_boolean_raise());

        let cmd = parse_command(r#"<<set $quest.stage to "gate >> keep">>"#).unwrap();
        assert_eq!(cmd.flag, "quest.stage");
        assert_eq!(cmd.expr, SetExpr::Literal(Value::from("gate >> keep")));

        let cmd = parse_command("<<set $gold-left to $gold-left - 2>>").unwrap();
        assert_eq!(
            cmd.expr,
            SetExpr::Offset {
                source: "gold-left".to_string(),
                delta: -2.0
            }
        );
    }

    #[test]
    fn scriptable_flags() {
        assert!(is_scriptable_flag("met_guard"));
        assert!(is_scriptable_flag("met-guard"));
        assert!(is_scriptable_flag("quest.stage"));
        assert!(!is_scriptable_flag("met guard"));
        assert!(!is_scriptable_flag("a=b"));
        assert!(!is_scriptable_flag(""));
    }

    #[test]
    fn parse_rejects_surrounding_text() {
        assert!(parse_command("Hello <<set $a = true>>").is_none());
        assert!(parse_command("<<jump start>>").is_none());
    }

    #[test]
    fn referenced_flags() {
        let flags = command_flags("Paid. <<set $purse to $stat_gold - 5>> <<set $met = true>>");
        assert_eq!(flags, vec!["purse", "stat_gold", "met"]);
    }

    #[test]
    fn literals() {
        assert_eq!(parse_literal("false"), Some(Value::Bool(false)));
        assert_eq!(parse_literal("-2.5"), Some(Value::Number(-2.5)));
        assert_eq!(parse_literal("'knight'"), Some(Value::from("knight")));
        assert_eq!(parse_literal("knight"), Some(Value::from("knight")));
        assert_eq!(parse_literal("  "), None);
        assert_eq!(parse_literal(r#""Sir \"Ada\"""#), Some(Value::from("Sir \"Ada\"")));
        assert_eq!(parse_literal(r#""C:\\road""#), Some(Value::from("C:\\road")));
        assert_eq!(parse_literal(r#""a\nb""#), Some(Value::from("a\\nb")));
    }

    #[test]
    fn applies_in_order_and_strips_markup() {
        let mut store = VariableStore::new();
        store.set("stat_gold", 10.0);
        let out = apply_commands(
            "Here is your reward. <<set $stat_gold to $stat_gold + 5>>\n<<set $stat_gold = $stat_gold - 2>>\nGoodbye.",
            &mut store,
            &schema(),
        );
        assert_eq!(out.text, "Here is your reward.\nGoodbye.");
        assert_eq!(store.get("stat_gold"), Some(&Value::Number(13.0)));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn missing_source_counts_as_zero() {
        let mut store = VariableStore::new();
        apply_commands("<<set $coins to $coins + 3>>", &mut store, &schema());
        assert_eq!(store.get("coins"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn coerces_to_declared_type() {
        let mut store = VariableStore::new();
        let out = apply_commands(r#"<<set $stat_gold = "25">>"#, &mut store, &schema());
        assert_eq!(store.get("stat_gold"), Some(&Value::Number(25.0)));
        assert!(matches!(out.warnings[0], FlagWarning::TypeCoerced { .. }));
    }

    #[test]
    fn uncoercible_value_falls_back_to_true() {
        let mut store = VariableStore::new();
        let out = apply_commands("<<set $stat_gold = plenty>>", &mut store, &schema());
        assert_eq!(store.get("stat_gold"), Some(&Value::Bool(true)));
        assert!(matches!(out.warnings[0], FlagWarning::CommandFallback { .. }));
        assert!(out.text.is_empty());
    }

    #[test]
    fn dialogue_flags_toggle_memory() {
        let mut store = VariableStore::new();
        apply_commands("<<set $met_guard = true>>", &mut store, &schema());
        assert!(store.has_memory_flag("met_guard"));
        apply_commands("<<set $met_guard = false>>", &mut store, &schema());
        assert!(!store.has_memory_flag("met_guard"));
        assert!(!store.is_set("met_guard"));
    }
}
