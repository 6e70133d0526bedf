use ahash::AHashSet;
use tracing::debug;

use crate::{
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    fault_injection::{self, FaultPoint},
    sql::{Predicate, SelectItem, Selector, UpdateBuilder},
    value::{FieldType, Value},
};

use super::{
    edges::{add_fk_edges, add_m2m_edges, clear_fk_edges, clear_m2m_edges},
    node_selector, select_by_id,
    spec::{EdgeSpec, EdgeStorage, Record, UpdateSpec},
};

/// Update one node by ID and return it as stored after the change.
///
/// Runs in a transaction: the row's own columns first, then edge removals,
/// then edge additions. A guarded foreign-key add that finds its target
/// already linked aborts the whole update.
pub fn update_node(
    ctx: &Context,
    driver: &Driver,
    spec: &UpdateSpec,
) -> Result<Record, EntGraphError> {
    let id = spec.id.as_ref().ok_or_else(|| {
        EntGraphError::validation(
            &spec.node.id.column,
            format!("missing node id for update table {}", spec.node.table),
        )
    })?;
    validate(spec)?;

    let tx = driver.tx(ctx)?;
    let matched = Predicate::eq(&spec.node.id.column, id);
    let update = own_columns(spec)?;
    if update.is_empty() {
        let mut exists = node_selector(&spec.node);
        exists.set_items(vec![SelectItem::Count]);
        exists.where_(matched.clone());
        for pred in &spec.predicates {
            exists.where_(pred.clone());
        }
        if driver.query_count(ctx, &exists.build())? == 0 {
            return Err(EntGraphError::not_found(&spec.node.table));
        }
    } else {
        let mut update = update;
        update.where_(matched);
        for pred in &spec.predicates {
            update.where_(pred.clone());
        }
        if driver.exec(ctx, &update.build())? == 0 {
            return Err(EntGraphError::not_found(&spec.node.table));
        }
    }

    let ids = [id.clone()];
    external_edges(ctx, driver, &ids, spec)?;
    fault_injection::check_fault(FaultPoint::UpdateBeforeCommit)?;
    let record = select_by_id(ctx, driver, &spec.node, id)?;
    tx.commit()?;
    debug!(table = %spec.node.table, id = %id, "node updated");
    Ok(record)
}

/// Update every node matching the predicates and return how many matched.
///
/// Without edges outside the rows this is a single `UPDATE`. Otherwise the
/// matching IDs are read first and everything runs in one transaction.
pub fn update_nodes(
    ctx: &Context,
    driver: &Driver,
    spec: &UpdateSpec,
) -> Result<usize, EntGraphError> {
    validate(spec)?;
    let mut update = own_columns(spec)?;

    if !spec.edges.is_external() {
        if update.is_empty() {
            return Ok(0);
        }
        for pred in &spec.predicates {
            update.where_(pred.clone());
        }
        let affected = driver.exec(ctx, &update.build())?;
        debug!(table = %spec.node.table, affected, "nodes updated");
        return Ok(affected);
    }

    let tx = driver.tx(ctx)?;
    let mut selector = Selector::new(&spec.node.table).select([spec.node.id.column.clone()]);
    for pred in &spec.predicates {
        selector.where_(pred.clone());
    }
    let id_type = spec.node.id.ty;
    let ids = driver.query(ctx, &selector.build(), |row| id_type.decode(row.get_ref(0)?))?;
    if ids.is_empty() {
        tx.commit()?;
        return Ok(0);
    }
    if !update.is_empty() {
        update.where_(Predicate::in_values(&spec.node.id.column, &ids));
        driver.exec(ctx, &update.build())?;
    }
    external_edges(ctx, driver, &ids, spec)?;
    fault_injection::check_fault(FaultPoint::UpdateManyBeforeCommit)?;
    tx.commit()?;
    debug!(table = %spec.node.table, affected = ids.len(), "nodes updated");
    Ok(ids.len())
}

fn validate(spec: &UpdateSpec) -> Result<(), EntGraphError> {
    for field in &spec.fields.set {
        field.validate()?;
    }
    for field in &spec.fields.add {
        if !matches!(field.ty, FieldType::Int | FieldType::Float) || field.value.is_null() {
            return Err(EntGraphError::validation(
                &field.column,
                format!("cannot add {} to a {} column", field.value, field.ty),
            ));
        }
        field.validate()?;
    }
    for field in &spec.fields.clear {
        if !field.nullable {
            return Err(EntGraphError::validation(
                &field.column,
                "cannot clear a non-nullable column",
            ));
        }
    }
    for edge in spec.edges.add.iter().chain(&spec.edges.clear) {
        edge.validate()?;
    }
    Ok(())
}

/// The single `UPDATE` of the node's own row: field sets, increments and
/// clears, plus foreign keys of edges stored on the row. An edge both cleared
/// and set in one update keeps the new value.
fn own_columns(spec: &UpdateSpec) -> Result<UpdateBuilder, EntGraphError> {
    let mut update = UpdateBuilder::new(&spec.node.table);
    let mut set_edges = AHashSet::new();
    for edge in &spec.edges.add {
        if edge.stored_in(EdgeStorage::OwnColumn) && !edge.target.nodes.is_empty() {
            set_edges.insert(edge.fk_column()?);
        }
    }
    for field in &spec.fields.clear {
        update.set_null(&field.column);
    }
    for edge in &spec.edges.clear {
        if edge.stored_in(EdgeStorage::OwnColumn) {
            let fk = edge.fk_column()?;
            if set_edges.contains(fk) {
                continue;
            }
            // Removing given targets unlinks the row only from those.
            if edge.target.nodes.is_empty() {
                update.set_null(fk);
            } else {
                update.set_null_if_in(fk, edge.target.nodes.clone());
            }
        }
    }
    for field in &spec.fields.set {
        update.set(&field.column, field.bound()?);
    }
    for edge in &spec.edges.add {
        if edge.stored_in(EdgeStorage::OwnColumn)
            && let Some(target) = edge.target.nodes.first()
        {
            update.set(edge.fk_column()?, target.clone());
        }
    }
    for field in &spec.fields.add {
        update.add(&field.column, field.value.clone());
    }
    Ok(update)
}

fn external_edges(
    ctx: &Context,
    driver: &Driver,
    ids: &[Value],
    spec: &UpdateSpec,
) -> Result<(), EntGraphError> {
    let clear: Vec<&EdgeSpec> = spec.edges.clear.iter().collect();
    let add: Vec<&EdgeSpec> = spec.edges.add.iter().collect();
    clear_m2m_edges(ctx, driver, ids, &clear)?;
    clear_fk_edges(ctx, driver, ids, &clear)?;
    add_m2m_edges(ctx, driver, ids, &add)?;
    add_fk_edges(ctx, driver, ids, &add)
}
