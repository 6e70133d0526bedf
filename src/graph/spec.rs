//! Ephemeral descriptions of one graph operation.
//!
//! Specs are built per call, consumed once by the compiler and never shared.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{
    errors::EntGraphError,
    sql::{OnConflict, Order, Predicate},
    value::{FieldType, Value},
};

/// Edge cardinality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Rel {
    O2O,
    O2M,
    M2O,
    M2M,
}

impl Rel {
    /// The owner side links to at most one target.
    pub fn is_unique(self) -> bool {
        matches!(self, Rel::O2O | Rel::M2O)
    }
}

impl std::fmt::Display for Rel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rel::O2O => "O2O",
            Rel::O2M => "O2M",
            Rel::M2O => "M2O",
            Rel::M2M => "M2M",
        };
        f.write_str(s)
    }
}

/// Where an edge is physically written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeStorage {
    /// Foreign key on the owner's row, written by the owner's own statement.
    OwnColumn,
    /// Foreign key on the target's row, written by a guarded follow-up update.
    TargetColumn,
    /// Pair rows in a join table.
    JoinTable,
}

/// One column and the value written to it.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    pub ty: FieldType,
    pub value: Value,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn new<C: Into<String>, V: Into<Value>>(column: C, ty: FieldType, value: V) -> Self {
        Self {
            column: column.into(),
            ty,
            value: value.into(),
            nullable: false,
        }
    }

    /// Column descriptor without a value, used for ID columns.
    pub fn column<C: Into<String>>(column: C, ty: FieldType) -> Self {
        Self::new(column, ty, Value::Null)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.value = value.into();
        self
    }

    /// The value as written to the column.
    pub(crate) fn bound(&self) -> Result<Value, EntGraphError> {
        self.ty.encode(&self.value)
    }

    pub(crate) fn validate(&self) -> Result<(), EntGraphError> {
        if self.value.is_null() && !self.nullable {
            return Err(EntGraphError::validation(
                &self.column,
                "null value on a non-nullable column",
            ));
        }
        if !self.ty.accepts(&self.value) {
            return Err(EntGraphError::validation(
                &self.column,
                format!("value {} is not a valid {}", self.value, self.ty),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EdgeTarget {
    /// ID column of the target table.
    pub id: FieldSpec,
    pub nodes: Vec<Value>,
    /// Extra join-table columns written with every pair.
    pub fields: Vec<FieldSpec>,
}

/// One relation of a node.
///
/// For O2O, O2M and M2O edges `table` holds the single foreign-key column in
/// `columns[0]`. For M2M edges `table` is the join table, `columns[0]` the
/// column of the type that declared the edge and `columns[1]` the column of
/// its target; an inverse edge writes its owner into `columns[1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSpec {
    pub rel: Rel,
    pub inverse: bool,
    pub bidi: bool,
    pub table: String,
    pub columns: Vec<String>,
    pub target: EdgeTarget,
}

impl EdgeSpec {
    pub fn new<T, I, C>(rel: Rel, table: T, columns: I, target_id: FieldSpec) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            rel,
            inverse: false,
            bidi: false,
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            target: EdgeTarget {
                id: target_id,
                nodes: Vec::new(),
                fields: Vec::new(),
            },
        }
    }

    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    pub fn bidi(mut self, bidi: bool) -> Self {
        self.bidi = bidi;
        self
    }

    pub fn nodes<I, V>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.target.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.target.fields = fields;
        self
    }

    /// Primary storage of the edge. See [`EdgeSpec::stored_in`] for bidirectional
    /// O2O edges, which live in two places.
    pub fn storage(&self) -> EdgeStorage {
        match self.rel {
            Rel::M2M => EdgeStorage::JoinTable,
            Rel::M2O => EdgeStorage::OwnColumn,
            Rel::O2O if self.inverse || self.bidi => EdgeStorage::OwnColumn,
            Rel::O2O | Rel::O2M => EdgeStorage::TargetColumn,
        }
    }

    pub fn stored_in(&self, storage: EdgeStorage) -> bool {
        match storage {
            EdgeStorage::JoinTable => self.rel == Rel::M2M,
            EdgeStorage::OwnColumn => {
                self.rel == Rel::M2O || (self.rel == Rel::O2O && (self.inverse || self.bidi))
            }
            EdgeStorage::TargetColumn => {
                self.rel == Rel::O2M || (self.rel == Rel::O2O && !self.inverse)
            }
        }
    }

    /// Writing or clearing the edge needs a statement besides the owner's own.
    pub fn is_external(&self) -> bool {
        self.stored_in(EdgeStorage::JoinTable) || self.stored_in(EdgeStorage::TargetColumn)
    }

    pub(crate) fn fk_column(&self) -> Result<&str, EntGraphError> {
        self.columns
            .first()
            .map(String::as_str)
            .ok_or_else(|| EntGraphError::validation(&self.table, "edge has no columns"))
    }

    /// Join-table columns as `(owner, target)`.
    pub(crate) fn pair_columns(&self) -> Result<(&str, &str), EntGraphError> {
        match self.columns.as_slice() {
            [a, b] if self.inverse => Ok((b, a)),
            [a, b] => Ok((a, b)),
            _ => Err(EntGraphError::validation(
                &self.table,
                "join table edge needs exactly two columns",
            )),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EntGraphError> {
        if self.rel.is_unique() && self.target.nodes.len() > 1 {
            return Err(EntGraphError::validation(
                self.columns.first().map(String::as_str).unwrap_or(&self.table),
                format!("multiple unique assign ({} ids)", self.target.nodes.len()),
            ));
        }
        if self.target.nodes.iter().any(Value::is_null) {
            return Err(EntGraphError::validation(&self.table, "null edge target id"));
        }
        match self.rel {
            Rel::M2M => {
                self.pair_columns()?;
            }
            _ => {
                self.fk_column()?;
            }
        }
        for field in &self.target.fields {
            field.validate()?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: FieldType,
}

impl Column {
    pub fn new<N: Into<String>>(name: N, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Identity and selectable columns of one entity type.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSpec {
    pub table: String,
    /// Every column read back by queries, ID first.
    pub columns: Vec<Column>,
    pub id: FieldSpec,
}

impl NodeSpec {
    pub fn new<T: Into<String>>(table: T, id: FieldSpec) -> Self {
        let columns = vec![Column::new(id.column.clone(), id.ty)];
        Self {
            table: table.into(),
            columns,
            id,
        }
    }

    pub fn column<N: Into<String>>(mut self, name: N, ty: FieldType) -> Self {
        let name = name.into();
        if !self.columns.iter().any(|c| c.name == name) {
            self.columns.push(Column::new(name, ty));
        }
        self
    }

    pub(crate) fn column_type(&self, name: &str) -> Option<FieldType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.ty)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateSpec {
    pub node: NodeSpec,
    pub fields: Vec<FieldSpec>,
    pub edges: Vec<EdgeSpec>,
    /// Turns the insert into an upsert. The returned ID is the one of the
    /// row that holds the node afterwards.
    pub on_conflict: Option<OnConflict>,
}

impl CreateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            fields: Vec::new(),
            edges: Vec::new(),
            on_conflict: None,
        }
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    /// Creation with a caller-chosen ID.
    pub fn with_id<V: Into<Value>>(mut self, id: V) -> Self {
        self.node.id.value = id.into();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub(crate) fn id_value(&self) -> Option<&Value> {
        (!self.node.id.value.is_null()).then_some(&self.node.id.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchCreateSpec {
    pub nodes: Vec<CreateSpec>,
    /// Applies to every node without its own conflict options.
    pub on_conflict: Option<OnConflict>,
}

impl BatchCreateSpec {
    pub fn new(nodes: Vec<CreateSpec>) -> Self {
        Self {
            nodes,
            on_conflict: None,
        }
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    pub(crate) fn conflict_of<'a>(&'a self, node: &'a CreateSpec) -> Option<&'a OnConflict> {
        node.on_conflict.as_ref().or(self.on_conflict.as_ref())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldMut {
    pub set: Vec<FieldSpec>,
    /// Numeric increments, `column = column + value`.
    pub add: Vec<FieldSpec>,
    /// Columns set to `NULL`.
    pub clear: Vec<FieldSpec>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeMut {
    pub add: Vec<EdgeSpec>,
    /// Edges to remove. An edge without target nodes clears every link.
    pub clear: Vec<EdgeSpec>,
}

impl EdgeMut {
    pub fn is_external(&self) -> bool {
        self.add.iter().chain(&self.clear).any(EdgeSpec::is_external)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateSpec {
    pub node: NodeSpec,
    /// Required for single-node updates, ignored otherwise.
    pub id: Option<Value>,
    pub fields: FieldMut,
    pub edges: EdgeMut,
    pub predicates: Vec<Predicate>,
}

impl UpdateSpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            id: None,
            fields: FieldMut::default(),
            edges: EdgeMut::default(),
            predicates: Vec::new(),
        }
    }

    pub fn id<V: Into<Value>>(mut self, id: V) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set(mut self, field: FieldSpec) -> Self {
        self.fields.set.push(field);
        self
    }

    pub fn add(mut self, field: FieldSpec) -> Self {
        self.fields.add.push(field);
        self
    }

    pub fn clear(mut self, field: FieldSpec) -> Self {
        self.fields.clear.push(field);
        self
    }

    pub fn add_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.add.push(edge);
        self
    }

    pub fn clear_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.clear.push(edge);
        self
    }

    pub fn where_(mut self, pred: Predicate) -> Self {
        self.predicates.push(pred);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteSpec {
    pub node: NodeSpec,
    pub predicates: Vec<Predicate>,
}

/// Eager load of one edge's targets onto the queried records.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeLoad {
    pub name: String,
    pub edge: EdgeSpec,
    pub target: NodeSpec,
    pub predicates: Vec<Predicate>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub node: NodeSpec,
    pub predicates: Vec<Predicate>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Select distinct rows.
    pub unique: bool,
    pub edges: Vec<EdgeLoad>,
}

impl QuerySpec {
    pub fn new(node: NodeSpec) -> Self {
        Self {
            node,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
            edges: Vec::new(),
        }
    }

    pub fn where_(mut self, pred: Predicate) -> Self {
        self.predicates.push(pred);
        self
    }
}

/// Join-table pairs of one M2M edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeQuerySpec {
    pub edge: EdgeSpec,
    pub predicates: Vec<Predicate>,
}

/// One node read back from the database.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    pub values: BTreeMap<String, Value>,
    /// Eager-loaded neighbors by edge name. Targets reached from several
    /// owners are shared.
    pub edges: BTreeMap<String, Vec<Arc<Record>>>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn edge(&self, name: &str) -> &[Arc<Record>] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
