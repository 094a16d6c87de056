//! Row filters: conjunctions of equality, `IN` and `NOT IN` conditions plus
//! an optional ascending sort column.

use std::cmp::Ordering;

use serde_json::Value;

/// One condition on a column. Column names are record field names.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    NotIn { column: String, values: Vec<Value> },
}

impl Condition {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Condition::Eq { column, value } => row.get(column) == Some(value),
            Condition::In { column, values } => row
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Condition::NotIn { column, values } => row
                .get(column)
                .map(|v| !values.contains(v))
                .unwrap_or(true),
        }
    }
}

/// A conjunction of conditions. An empty filter matches every row.
///
/// ```
/// use goldi_storage::Filter;
///
/// let f = Filter::new()
///     .eq("persona_id", "p-1")
///     .not_in("id", ["s-1", "s-2"])
///     .order_by("position");
/// assert_eq!(f.conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    order_by: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::NotIn {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Sort results ascending by this column. Rows are otherwise returned
    /// in insertion order.
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order_column(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// Whether a serialized row satisfies every condition.
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Stable ascending comparison of two rows by the order column.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match &self.order_by {
            Some(column) => compare_values(a.get(column), b.get(column)),
            None => Ordering::Equal,
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({"id": "a"})));
        assert!(Filter::new().matches(&json!({})));
    }

    #[test]
    fn eq_and_in_are_conjunctive() {
        let f = Filter::new().eq("persona_id", "p1").is_in("id", ["a", "b"]);
        assert!(f.matches(&json!({"id": "a", "persona_id": "p1"})));
        assert!(!f.matches(&json!({"id": "c", "persona_id": "p1"})));
        assert!(!f.matches(&json!({"id": "a", "persona_id": "p2"})));
    }

    #[test]
    fn not_in_with_empty_list_matches_all() {
        let f = Filter::new().not_in("id", Vec::<String>::new());
        assert!(f.matches(&json!({"id": "x"})));
    }

    #[test]
    fn in_with_empty_list_matches_nothing() {
        let f = Filter::new().is_in("id", Vec::<String>::new());
        assert!(!f.matches(&json!({"id": "x"})));
    }

    #[test]
    fn eq_on_bool_column() {
        let f = Filter::new().eq("is_selected", true);
        assert!(f.matches(&json!({"is_selected": true})));
        assert!(!f.matches(&json!({"is_selected": false})));
    }

    #[test]
    fn compare_orders_numbers_numerically() {
        let f = Filter::new().order_by("position");
        let a = json!({"position": 2});
        let b = json!({"position": 10});
        assert_eq!(f.compare(&a, &b), Ordering::Less);
    }
}
