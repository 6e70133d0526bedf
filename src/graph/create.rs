use tracing::debug;

use crate::{
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    fault_injection::{self, FaultPoint},
    sql::{InsertBuilder, OnConflict, Predicate, Selector},
    value::Value,
};

use super::{
    edges::{add_fk_edges, add_m2m_edges},
    spec::{CreateSpec, EdgeSpec, EdgeStorage},
};

/// Insert one node and its edges, returning the assigned ID.
pub fn create_node(
    ctx: &Context,
    driver: &Driver,
    spec: &CreateSpec,
) -> Result<Value, EntGraphError> {
    validate(spec)?;
    let tx = driver.maybe_tx(ctx, spec.edges.iter().any(EdgeSpec::is_external))?;

    let id = insert_node(ctx, driver, spec, spec.on_conflict.as_ref())?;
    let ids = [id.clone()];
    let edges: Vec<&EdgeSpec> = spec.edges.iter().collect();
    add_m2m_edges(ctx, driver, &ids, &edges)?;
    add_fk_edges(ctx, driver, &ids, &edges)?;

    if let Some(tx) = tx {
        fault_injection::check_fault(FaultPoint::CreateBeforeCommit)?;
        tx.commit()?;
    }
    debug!(table = %spec.node.table, id = %id, edges = spec.edges.len(), "node created");
    Ok(id)
}

pub(crate) fn validate(spec: &CreateSpec) -> Result<(), EntGraphError> {
    let id = &spec.node.id;
    match spec.id_value() {
        Some(value) if !id.ty.accepts(value) => {
            return Err(EntGraphError::validation(
                &id.column,
                format!("value {value} is not a valid {}", id.ty),
            ));
        }
        None if !id.ty.is_numeric() => {
            return Err(EntGraphError::validation(
                &id.column,
                format!("missing id value for {} id of table {}", id.ty, spec.node.table),
            ));
        }
        _ => {}
    }
    for field in &spec.fields {
        field.validate()?;
    }
    for edge in &spec.edges {
        edge.validate()?;
    }
    Ok(())
}

/// Own columns of the node: ID when given, fields, and every edge whose
/// foreign key lives on this row.
pub(crate) fn row_columns(spec: &CreateSpec) -> Result<Vec<(String, Value)>, EntGraphError> {
    let mut columns = Vec::with_capacity(1 + spec.fields.len());
    if let Some(id) = spec.id_value() {
        columns.push((spec.node.id.column.clone(), id.clone()));
    }
    for field in &spec.fields {
        columns.push((field.column.clone(), field.bound()?));
    }
    for edge in &spec.edges {
        if edge.stored_in(EdgeStorage::OwnColumn)
            && let Some(target) = edge.target.nodes.first()
        {
            columns.push((edge.fk_column()?.to_string(), target.clone()));
        }
    }
    Ok(columns)
}

/// Insert the node's own row and return its ID.
pub(crate) fn insert_node(
    ctx: &Context,
    driver: &Driver,
    spec: &CreateSpec,
    conflict: Option<&OnConflict>,
) -> Result<Value, EntGraphError> {
    let table = &spec.node.table;
    let columns = row_columns(spec)?;
    let mut insert = InsertBuilder::new(table);
    for (column, value) in &columns {
        insert.set(column.clone(), value.clone());
    }
    let Some(conflict) = conflict else {
        driver
            .exec(ctx, &insert.build())
            .map_err(|e| e.context(format!("insert node to table {table}")))?;
        return Ok(match spec.id_value() {
            Some(id) => id.clone(),
            None => Value::Int(driver.last_insert_rowid()),
        });
    };

    // The ID column keeps its value when a conflicting row is updated.
    let id = &spec.node.id;
    insert
        .on_conflict(conflict.clone().ignore(&id.column))
        .returning([id.column.clone()]);
    let mut returned = driver
        .query(ctx, &insert.build(), |row| id.ty.decode(row.get_ref(0)?))
        .map_err(|e| e.context(format!("upsert node to table {table}")))?;
    if let Some(found) = returned.pop() {
        return Ok(found);
    }
    existing_id(ctx, driver, spec, conflict, &columns)
}

/// ID of the row that made an upsert skip its insert, located through the
/// conflict columns or, without them, the given ID.
fn existing_id(
    ctx: &Context,
    driver: &Driver,
    spec: &CreateSpec,
    conflict: &OnConflict,
    columns: &[(String, Value)],
) -> Result<Value, EntGraphError> {
    let id = &spec.node.id;
    let keys: Vec<(&str, &Value)> = if conflict.columns.is_empty() {
        spec.id_value()
            .map(|value| (id.column.as_str(), value))
            .into_iter()
            .collect()
    } else {
        conflict
            .columns
            .iter()
            .filter_map(|c| columns.iter().find(|(name, _)| name == c))
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    };
    let skipped = || {
        EntGraphError::not_found(format!("row of table {} skipped on conflict", spec.node.table))
    };
    if keys.is_empty() || keys.len() < conflict.columns.len() {
        return Err(skipped());
    }
    let mut selector = Selector::new(&spec.node.table).select([id.column.clone()]);
    for (column, value) in keys {
        selector.where_(Predicate::eq(column, value));
    }
    selector.limit(1);
    driver
        .query(ctx, &selector.build(), |row| id.ty.decode(row.get_ref(0)?))?
        .pop()
        .ok_or_else(skipped)
}
