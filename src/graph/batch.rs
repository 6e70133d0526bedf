use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    config::{BatchConfig, execute_batch},
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    fault_injection::{self, FaultPoint},
    sql::InsertBuilder,
    value::Value,
};

use super::{
    MAX_PARAMS,
    create::{insert_node, row_columns, validate},
    edges::{JoinInserts, add_fk_edges},
    spec::{BatchCreateSpec, EdgeSpec},
};

/// Insert many nodes of one type, returning their IDs in input order.
///
/// Rows share one column list, the sorted union of every node's columns with
/// `NULL` for the gaps, so each chunk is a single multi-row `INSERT`. With
/// conflict options nodes are upserted one row at a time, so each ID is the
/// one of the row holding the node.
pub fn batch_create(
    ctx: &Context,
    driver: &Driver,
    spec: &BatchCreateSpec,
    config: &BatchConfig,
) -> Result<Vec<Value>, EntGraphError> {
    let Some(first) = spec.nodes.first() else {
        return Ok(Vec::new());
    };
    let table = first.node.table.as_str();
    let with_ids = spec.nodes.iter().filter(|n| n.id_value().is_some()).count();
    if with_ids != 0 && with_ids != spec.nodes.len() {
        return Err(EntGraphError::validation(
            &first.node.id.column,
            "ids must be set for all nodes or none",
        ));
    }

    let mut rows = Vec::with_capacity(spec.nodes.len());
    let mut columns = BTreeSet::new();
    for (i, node) in spec.nodes.iter().enumerate() {
        if node.node.table != table {
            return Err(EntGraphError::validation(
                "table",
                format!(
                    "batch nodes target different tables: {table} and {}",
                    node.node.table
                ),
            )
            .in_batch(i));
        }
        validate(node).map_err(|e| e.in_batch(i))?;
        let row: BTreeMap<String, Value> = row_columns(node)?.into_iter().collect();
        columns.extend(row.keys().cloned());
        rows.push(row);
    }
    let columns: Vec<String> = columns.into_iter().collect();

    let per_chunk = MAX_PARAMS / columns.len().max(1);
    let chunked = config.enable_chunking && rows.len() > per_chunk.min(config.max_batch_size);
    let external = spec
        .nodes
        .iter()
        .flat_map(|n| &n.edges)
        .any(EdgeSpec::is_external);
    let upsert = spec.nodes.iter().any(|n| spec.conflict_of(n).is_some());
    let tx = driver.maybe_tx(
        ctx,
        external || chunked || columns.is_empty() || (upsert && spec.nodes.len() > 1),
    )?;

    let ids = if upsert {
        let mut ids = Vec::with_capacity(spec.nodes.len());
        for (i, node) in spec.nodes.iter().enumerate() {
            ids.push(
                insert_node(ctx, driver, node, spec.conflict_of(node)).map_err(|e| e.in_batch(i))?,
            );
        }
        ids
    } else {
        let ids = execute_batch(&rows, per_chunk, config, |offset, chunk| {
            insert_chunk(ctx, driver, table, &columns, chunk, with_ids == 0).map_err(|e| {
                e.context(format!(
                    "insert nodes {offset}..{} to table {table}",
                    offset + chunk.len()
                ))
            })
        })?;
        if with_ids == 0 {
            ids
        } else {
            spec.nodes
                .iter()
                .filter_map(|n| n.id_value().cloned())
                .collect()
        }
    };

    let mut joins = JoinInserts::default();
    for (node, id) in spec.nodes.iter().zip(&ids) {
        for edge in &node.edges {
            joins.push(id, edge)?;
        }
    }
    joins.flush(ctx, driver)?;
    for (i, (node, id)) in spec.nodes.iter().zip(&ids).enumerate() {
        let edges: Vec<&EdgeSpec> = node.edges.iter().collect();
        add_fk_edges(ctx, driver, std::slice::from_ref(id), &edges).map_err(|e| e.in_batch(i))?;
    }

    if let Some(tx) = tx {
        fault_injection::check_fault(FaultPoint::BatchCreateBeforeCommit)?;
        tx.commit()?;
    }
    debug!(table, nodes = ids.len(), "batch created");
    Ok(ids)
}

/// Insert one chunk and return the rowids it produced when IDs are assigned
/// by the database.
fn insert_chunk(
    ctx: &Context,
    driver: &Driver,
    table: &str,
    columns: &[String],
    chunk: &[BTreeMap<String, Value>],
    auto_ids: bool,
) -> Result<Vec<Value>, EntGraphError> {
    if columns.is_empty() {
        // `DEFAULT VALUES` inserts exactly one row.
        let mut ids = Vec::with_capacity(chunk.len());
        for _ in chunk {
            driver.exec(ctx, &InsertBuilder::new(table).build())?;
            ids.push(Value::Int(driver.last_insert_rowid()));
        }
        return Ok(if auto_ids { ids } else { Vec::new() });
    }

    let mut insert = InsertBuilder::new(table);
    insert.columns(columns.iter().cloned());
    for row in chunk {
        insert.values(
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }
    driver.exec(ctx, &insert.build())?;
    if !auto_ids {
        return Ok(Vec::new());
    }
    // Rows of one multi-row insert get consecutive rowids.
    let last = driver.last_insert_rowid();
    let first = last - chunk.len() as i64 + 1;
    Ok((first..=last).map(Value::Int).collect())
}
