//! Minimal SQLite statement builder used by the graph compiler.
//!
//! Statements render to SQL text with positional `?` placeholders plus the
//! ordered argument list. Identifiers are double-quoted; nothing else about
//! dialect quoting is attempted.

mod builders;
mod predicate;
mod selector;

pub use builders::{Assign, DeleteBuilder, InsertBuilder, OnConflict, Resolve, UpdateBuilder};
pub use predicate::Predicate;
pub use selector::{Join, Order, SelectItem, Selector};

use crate::value::Value;

/// A rendered statement ready for execution.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
pub(crate) struct Writer {
    sql: String,
    args: Vec<Value>,
}

impl Writer {
    pub(crate) fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub(crate) fn arg(&mut self, value: Value) {
        self.sql.push('?');
        self.args.push(value);
    }

    pub(crate) fn args<I: IntoIterator<Item = Value>>(&mut self, values: I) {
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.arg(value);
        }
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }
}

pub(crate) fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify `column` with `scope` unless it already names its table
/// (`table.column`).
pub(crate) fn qualify(scope: &str, column: &str) -> String {
    if column.contains('.') {
        column.split('.').map(ident).collect::<Vec<_>>().join(".")
    } else {
        format!("{}.{}", ident(scope), ident(column))
    }
}
