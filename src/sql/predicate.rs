use super::{Writer, qualify, selector::Selector};
use crate::value::Value;

/// A filter over the rows of one table scope.
///
/// Column names are unqualified and resolve against the table (or alias) of
/// the statement the predicate is attached to; `table.column` pins a column
/// to an explicit table.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    Contains(String, String),
    HasPrefix(String, String),
    InSelect(String, Box<Selector>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Eq(column.into(), value.into())
    }

    pub fn neq<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Neq(column.into(), value.into())
    }

    pub fn gt<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Gt(column.into(), value.into())
    }

    pub fn gte<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Gte(column.into(), value.into())
    }

    pub fn lt<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Lt(column.into(), value.into())
    }

    pub fn lte<C: Into<String>, V: Into<Value>>(column: C, value: V) -> Self {
        Predicate::Lte(column.into(), value.into())
    }

    pub fn in_values<C, I, V>(column: C, values: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<C, I, V>(column: C, values: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::NotIn(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null<C: Into<String>>(column: C) -> Self {
        Predicate::IsNull(column.into())
    }

    pub fn not_null<C: Into<String>>(column: C) -> Self {
        Predicate::NotNull(column.into())
    }

    pub fn contains<C: Into<String>, S: Into<String>>(column: C, needle: S) -> Self {
        Predicate::Contains(column.into(), needle.into())
    }

    pub fn has_prefix<C: Into<String>, S: Into<String>>(column: C, prefix: S) -> Self {
        Predicate::HasPrefix(column.into(), prefix.into())
    }

    pub fn in_select<C: Into<String>>(column: C, select: Selector) -> Self {
        Predicate::InSelect(column.into(), Box::new(select))
    }

    pub fn and<I: IntoIterator<Item = Predicate>>(preds: I) -> Self {
        Predicate::And(preds.into_iter().collect())
    }

    pub fn or<I: IntoIterator<Item = Predicate>>(preds: I) -> Self {
        Predicate::Or(preds.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(pred: Predicate) -> Self {
        Predicate::Not(Box::new(pred))
    }

    pub(crate) fn render(&self, scope: &str, w: &mut Writer) {
        match self {
            Predicate::Eq(c, Value::Null) => {
                w.push(&qualify(scope, c));
                w.push(" IS NULL");
            }
            Predicate::Eq(c, v) => binary(scope, c, " = ", v, w),
            Predicate::Neq(c, Value::Null) => {
                w.push(&qualify(scope, c));
                w.push(" IS NOT NULL");
            }
            Predicate::Neq(c, v) => binary(scope, c, " <> ", v, w),
            Predicate::Gt(c, v) => binary(scope, c, " > ", v, w),
            Predicate::Gte(c, v) => binary(scope, c, " >= ", v, w),
            Predicate::Lt(c, v) => binary(scope, c, " < ", v, w),
            Predicate::Lte(c, v) => binary(scope, c, " <= ", v, w),
            Predicate::In(_, values) if values.is_empty() => w.push("FALSE"),
            Predicate::In(c, values) => {
                w.push(&qualify(scope, c));
                w.push(" IN (");
                w.args(values.iter().cloned());
                w.push(")");
            }
            Predicate::NotIn(_, values) if values.is_empty() => w.push("TRUE"),
            Predicate::NotIn(c, values) => {
                w.push(&qualify(scope, c));
                w.push(" NOT IN (");
                w.args(values.iter().cloned());
                w.push(")");
            }
            Predicate::IsNull(c) => {
                w.push(&qualify(scope, c));
                w.push(" IS NULL");
            }
            Predicate::NotNull(c) => {
                w.push(&qualify(scope, c));
                w.push(" IS NOT NULL");
            }
            Predicate::Contains(c, needle) => {
                like(scope, c, format!("%{}%", escape_like(needle)), w)
            }
            Predicate::HasPrefix(c, prefix) => {
                like(scope, c, format!("{}%", escape_like(prefix)), w)
            }
            Predicate::InSelect(c, select) => {
                w.push(&qualify(scope, c));
                w.push(" IN (");
                select.render(w);
                w.push(")");
            }
            Predicate::And(preds) => join(scope, preds, " AND ", "TRUE", w),
            Predicate::Or(preds) => join(scope, preds, " OR ", "FALSE", w),
            Predicate::Not(pred) => {
                w.push("NOT (");
                pred.render(scope, w);
                w.push(")");
            }
        }
    }
}

fn binary(scope: &str, column: &str, op: &str, value: &Value, w: &mut Writer) {
    w.push(&qualify(scope, column));
    w.push(op);
    w.arg(value.clone());
}

fn like(scope: &str, column: &str, pattern: String, w: &mut Writer) {
    w.push(&qualify(scope, column));
    w.push(" LIKE ");
    w.arg(Value::Text(pattern));
    w.push(" ESCAPE '\\'");
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn join(scope: &str, preds: &[Predicate], sep: &str, empty: &str, w: &mut Writer) {
    if preds.is_empty() {
        w.push(empty);
        return;
    }
    w.push("(");
    for (i, pred) in preds.iter().enumerate() {
        if i > 0 {
            w.push(sep);
        }
        pred.render(scope, w);
    }
    w.push(")");
}

/// Render a conjunction of predicates into `w`, without a leading keyword.
pub(crate) fn render_all(scope: &str, preds: &[Predicate], w: &mut Writer) {
    for (i, pred) in preds.iter().enumerate() {
        if i > 0 {
            w.push(" AND ");
        }
        pred.render(scope, w);
    }
}
