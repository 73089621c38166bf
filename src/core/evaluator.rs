/// Condition evaluation against a variable store.

use crate::core::variables::VariableStore;
use crate::schema::condition::{Condition, Operator, Value};

/// Evaluate a single condition.
///
/// - `is_set` / `is_not_set` look at memory flags and value truthiness.
/// - `equals` / `not_equals` are strict: no coercion, and a missing
///   variable only equals a missing value.
/// - The four ordering operators compare numerically and read a missing
///   variable as `0`.
pub fn evaluate(condition: &Condition, store: &VariableStore) -> bool {
    let current = store.get(&condition.flag);
    match condition.operator {
        Operator::IsSet => store.is_set(&condition.flag),
        Operator::IsNotSet => !store.is_set(&condition.flag),
        Operator::Equals => current == condition.value.as_ref(),
        Operator::NotEquals => current != condition.value.as_ref(),
        Operator::GreaterThan => compare(current, &condition.value, |a, b| a > b),
        Operator::LessThan => compare(current, &condition.value, |a, b| a < b),
        Operator::GreaterEqual => compare(current, &condition.value, |a, b| a >= b),
        Operator::LessEqual => compare(current, &condition.value, |a, b| a <= b),
    }
}

/// Logical AND over `conditions`. An empty list holds unconditionally.
pub fn evaluate_all(conditions: &[Condition], store: &VariableStore) -> bool {
    conditions.iter().all(|c| evaluate(c, store))
}

fn compare(current: Option<&Value>, expected: &Option<Value>, op: fn(f64, f64) -> bool) -> bool {
    let lhs = current.map_or(0.0, Value::as_number);
    let rhs = expected.as_ref().map_or(f64::NAN, Value::as_number);
    op(lhs, rhs)
}
