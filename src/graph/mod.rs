//! Graph-to-relational compiler.
//!
//! Each operation takes a spec describing one node type, its fields and its
//! typed edges, renders the statements that store them, and executes them on a
//! [`Driver`](crate::driver::Driver). Multi-statement writes run in one
//! transaction and roll back together.

mod batch;
mod create;
mod delete;
mod edges;
mod query;
pub mod spec;
mod step;
mod update;

use std::collections::BTreeMap;

use rusqlite::Row;

pub use batch::batch_create;
pub use create::create_node;
pub use delete::delete_nodes;
pub use query::{count_nodes, query_edges, query_nodes};
pub use spec::{
    BatchCreateSpec, Column, CreateSpec, DeleteSpec, EdgeLoad, EdgeMut, EdgeQuerySpec, EdgeSpec,
    EdgeStorage, EdgeTarget, FieldMut, FieldSpec, NodeSpec, QuerySpec, Record, Rel, UpdateSpec,
};
pub use step::{Step, has_neighbors, has_neighbors_with, neighbors, set_neighbors};
pub use update::{update_node, update_nodes};

use crate::{
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    sql::{Predicate, Selector},
    value::Value,
};

/// Bound-parameter limit of the bundled SQLite build.
pub(crate) const MAX_PARAMS: usize = 32766;

pub(crate) fn decode_columns(
    row: &Row<'_>,
    columns: &[Column],
    offset: usize,
) -> Result<BTreeMap<String, Value>, EntGraphError> {
    let mut values = BTreeMap::new();
    for (i, column) in columns.iter().enumerate() {
        values.insert(column.name.clone(), column.ty.decode(row.get_ref(offset + i)?)?);
    }
    Ok(values)
}

pub(crate) fn node_selector(node: &NodeSpec) -> Selector {
    Selector::new(&node.table).select(node.columns.iter().map(|c| c.name.clone()))
}

/// Read one node back by ID.
pub(crate) fn select_by_id(
    ctx: &Context,
    driver: &Driver,
    node: &NodeSpec,
    id: &Value,
) -> Result<Record, EntGraphError> {
    let mut selector = node_selector(node);
    selector.where_(Predicate::eq(&node.id.column, id)).limit(1);
    let mut rows = driver.query(ctx, &selector.build(), |row| {
        decode_columns(row, &node.columns, 0)
    })?;
    match rows.pop() {
        Some(values) => Ok(Record {
            values,
            edges: BTreeMap::new(),
        }),
        None => Err(EntGraphError::not_found(&node.table)),
    }
}
