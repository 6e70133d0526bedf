use super::{
    Statement, Writer, ident,
    predicate::{Predicate, render_all},
};
use crate::value::Value;

/// Assignment in the `DO UPDATE` branch of an upsert.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolve {
    /// The value the insert proposed, `excluded.column`.
    Excluded,
    Value(Value),
    Null,
    /// `column = COALESCE(column, 0) + value`
    Add(Value),
}

/// `ON CONFLICT` clause of an insert.
///
/// Without assignments the clause renders as `DO NOTHING`. Conflict columns
/// are optional; SQLite then resolves any uniqueness conflict.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OnConflict {
    pub columns: Vec<String>,
    /// Overwrite every inserted column outside `columns` and `ignore` with
    /// the proposed value.
    pub new_values: bool,
    pub ignore: Vec<String>,
    /// Explicit assignments, applied after the new values.
    pub sets: Vec<(String, Resolve)>,
    /// Guard of the update branch. A conflicting row that fails it is kept
    /// as is.
    pub update_where: Vec<Predicate>,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        Self::default()
    }

    pub fn update_new_values() -> Self {
        Self {
            new_values: true,
            ..Self::default()
        }
    }

    /// Conflict target columns.
    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Leave `column` untouched when resolving with new values.
    pub fn ignore<C: Into<String>>(mut self, column: C) -> Self {
        let column = column.into();
        if !self.ignore.contains(&column) {
            self.ignore.push(column);
        }
        self
    }

    pub fn set<C: Into<String>>(mut self, column: C, resolve: Resolve) -> Self {
        self.sets.push((column.into(), resolve));
        self
    }

    pub fn set_excluded<C: Into<String>>(self, column: C) -> Self {
        self.set(column, Resolve::Excluded)
    }

    pub fn update_where(mut self, pred: Predicate) -> Self {
        self.update_where.push(pred);
        self
    }

    /// Assignments for an insert of `inserted`; a later one for the same
    /// column wins.
    pub fn assignments(&self, inserted: &[String]) -> Vec<(String, Resolve)> {
        let mut out: Vec<(String, Resolve)> = Vec::new();
        let mut assign = |column: &str, resolve: Resolve| {
            match out.iter_mut().find(|(c, _)| c == column) {
                Some(slot) => slot.1 = resolve,
                None => out.push((column.to_string(), resolve)),
            }
        };
        if self.new_values {
            for column in inserted {
                if !self.columns.contains(column) && !self.ignore.contains(column) {
                    assign(column.as_str(), Resolve::Excluded);
                }
            }
        }
        for (column, resolve) in &self.sets {
            assign(column.as_str(), resolve.clone());
        }
        out
    }
}

/// Multi-row `INSERT`. Single-row callers use [`InsertBuilder::set`].
#[derive(Clone, Debug, Default)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    conflict: Option<OnConflict>,
    returning: Vec<String>,
}

impl InsertBuilder {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set a column of the first (and only) row, replacing an earlier value.
    pub fn set<C: Into<String>>(&mut self, column: C, value: Value) -> &mut Self {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        let column = column.into();
        match self.columns.iter().position(|c| *c == column) {
            Some(pos) => self.rows[0][pos] = value,
            None => {
                self.columns.push(column);
                self.rows[0].push(value);
            }
        }
        self
    }

    pub fn columns<I, C>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn values(&mut self, row: Vec<Value>) -> &mut Self {
        self.rows.push(row);
        self
    }

    pub fn on_conflict_do_nothing(&mut self) -> &mut Self {
        self.on_conflict(OnConflict::do_nothing())
    }

    pub fn on_conflict(&mut self, conflict: OnConflict) -> &mut Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn returning<I, C>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len().max(1)
    }

    pub fn build(&self) -> Statement {
        let mut w = Writer::default();
        w.push("INSERT INTO ");
        w.push(&ident(&self.table));
        if self.columns.is_empty() {
            w.push(" DEFAULT VALUES");
            return w.finish();
        }
        w.push(" (");
        w.push(&idents(&self.columns));
        w.push(") VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push("(");
            w.args(row.iter().cloned());
            w.push(")");
        }
        if let Some(conflict) = &self.conflict {
            self.render_conflict(conflict, &mut w);
        }
        if !self.returning.is_empty() {
            w.push(" RETURNING ");
            w.push(&idents(&self.returning));
        }
        w.finish()
    }

    fn render_conflict(&self, conflict: &OnConflict, w: &mut Writer) {
        w.push(" ON CONFLICT");
        if !conflict.columns.is_empty() {
            w.push(" (");
            w.push(&idents(&conflict.columns));
            w.push(")");
        }
        let sets = conflict.assignments(&self.columns);
        if sets.is_empty() {
            w.push(" DO NOTHING");
            return;
        }
        w.push(" DO UPDATE SET ");
        for (i, (column, resolve)) in sets.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let column = ident(column);
            w.push(&column);
            w.push(" = ");
            match resolve {
                Resolve::Excluded => w.push(&format!("excluded.{column}")),
                Resolve::Value(v) => w.arg(v.clone()),
                Resolve::Null => w.push("NULL"),
                Resolve::Add(v) => {
                    w.push(&format!("COALESCE({column}, 0) + "));
                    w.arg(v.clone());
                }
            }
        }
        if !conflict.update_where.is_empty() {
            w.push(" WHERE ");
            render_all(&self.table, &conflict.update_where, w);
        }
    }
}

fn idents(columns: &[String]) -> String {
    columns.iter().map(|c| ident(c)).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, PartialEq)]
pub enum Assign {
    Value(Value),
    Null,
    /// `column = COALESCE(column, 0) + value`
    Add(Value),
    /// `NULL` when the current value is one of the given values, else kept.
    NullIf(Vec<Value>),
}

#[derive(Clone, Debug, Default)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, Assign)>,
    predicates: Vec<Predicate>,
}

impl UpdateBuilder {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    fn assign(&mut self, column: String, assign: Assign) -> &mut Self {
        match self.sets.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = assign,
            None => self.sets.push((column, assign)),
        }
        self
    }

    pub fn set<C: Into<String>>(&mut self, column: C, value: Value) -> &mut Self {
        self.assign(column.into(), Assign::Value(value))
    }

    pub fn set_null<C: Into<String>>(&mut self, column: C) -> &mut Self {
        self.assign(column.into(), Assign::Null)
    }

    pub fn add<C: Into<String>>(&mut self, column: C, value: Value) -> &mut Self {
        self.assign(column.into(), Assign::Add(value))
    }

    pub fn set_null_if_in<C: Into<String>>(&mut self, column: C, values: Vec<Value>) -> &mut Self {
        self.assign(column.into(), Assign::NullIf(values))
    }

    pub fn where_(&mut self, pred: Predicate) -> &mut Self {
        self.predicates.push(pred);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn build(&self) -> Statement {
        let mut w = Writer::default();
        w.push("UPDATE ");
        w.push(&ident(&self.table));
        w.push(" SET ");
        for (i, (column, assign)) in self.sets.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let column = ident(column);
            w.push(&column);
            w.push(" = ");
            match assign {
                Assign::Value(v) => w.arg(v.clone()),
                Assign::Null => w.push("NULL"),
                Assign::Add(v) => {
                    w.push(&format!("COALESCE({column}, 0) + "));
                    w.arg(v.clone());
                }
                Assign::NullIf(values) => {
                    w.push(&format!("CASE WHEN {column} IN ("));
                    w.args(values.iter().cloned());
                    w.push(&format!(") THEN NULL ELSE {column} END"));
                }
            }
        }
        if !self.predicates.is_empty() {
            w.push(" WHERE ");
            render_all(&self.table, &self.predicates, &mut w);
        }
        w.finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeleteBuilder {
    table: String,
    predicates: Vec<Predicate>,
}

impl DeleteBuilder {
    pub fn new<T: Into<String>>(table: T) -> Self {
        Self {
            table: table.into(),
            predicates: Vec::new(),
        }
    }

    pub fn where_(&mut self, pred: Predicate) -> &mut Self {
        self.predicates.push(pred);
        self
    }

    pub fn build(&self) -> Statement {
        let mut w = Writer::default();
        w.push("DELETE FROM ");
        w.push(&ident(&self.table));
        if !self.predicates.is_empty() {
            w.push(" WHERE ");
            render_all(&self.table, &self.predicates, &mut w);
        }
        w.finish()
    }
}
