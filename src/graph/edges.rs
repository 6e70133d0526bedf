//! Statements that write edges living outside the owner's row.

use std::collections::BTreeMap;

use crate::{
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    sql::{DeleteBuilder, InsertBuilder, Predicate, UpdateBuilder},
    value::Value,
};

use super::{
    MAX_PARAMS,
    spec::{EdgeSpec, EdgeStorage, FieldSpec, Rel},
};

/// Pending inserts into one join table.
pub(crate) struct JoinRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    ignore_conflicts: bool,
}

impl JoinRows {
    fn new(edge: &EdgeSpec) -> Self {
        let mut columns = edge.columns.clone();
        columns.extend(edge.target.fields.iter().map(|f| f.column.clone()));
        Self {
            columns,
            rows: Vec::new(),
            // Extra edge fields may differ between inserts of the same pair.
            ignore_conflicts: edge.target.fields.is_empty(),
        }
    }

    fn push(&mut self, owner: &Value, edge: &EdgeSpec) -> Result<(), EntGraphError> {
        let extra = edge
            .target
            .fields
            .iter()
            .map(FieldSpec::bound)
            .collect::<Result<Vec<_>, _>>()?;
        for target in &edge.target.nodes {
            let (first, second) = if edge.inverse {
                (target, owner)
            } else {
                (owner, target)
            };
            self.push_pair(first, second, &extra);
            if edge.bidi {
                self.push_pair(second, first, &extra);
            }
        }
        Ok(())
    }

    fn push_pair(&mut self, first: &Value, second: &Value, extra: &[Value]) {
        let mut row = Vec::with_capacity(2 + extra.len());
        row.push(first.clone());
        row.push(second.clone());
        row.extend(extra.iter().cloned());
        self.rows.push(row);
    }
}

/// Join-table inserts grouped by table, flushed in table order.
#[derive(Default)]
pub(crate) struct JoinInserts {
    tables: BTreeMap<String, JoinRows>,
}

impl JoinInserts {
    pub(crate) fn push(&mut self, owner: &Value, edge: &EdgeSpec) -> Result<(), EntGraphError> {
        if edge.rel != Rel::M2M || edge.target.nodes.is_empty() {
            return Ok(());
        }
        edge.pair_columns()?;
        self.tables
            .entry(edge.table.clone())
            .or_insert_with(|| JoinRows::new(edge))
            .push(owner, edge)
    }

    pub(crate) fn flush(self, ctx: &Context, driver: &Driver) -> Result<(), EntGraphError> {
        for (table, join) in self.tables {
            let per_chunk = (MAX_PARAMS / join.columns.len().max(1)).max(1);
            for chunk in join.rows.chunks(per_chunk) {
                let mut insert = InsertBuilder::new(&table);
                insert.columns(join.columns.iter().cloned());
                for row in chunk {
                    insert.values(row.clone());
                }
                if join.ignore_conflicts {
                    insert.on_conflict_do_nothing();
                }
                driver
                    .exec(ctx, &insert.build())
                    .map_err(|e| e.context(format!("add m2m edge for table {table}")))?;
            }
        }
        Ok(())
    }
}

pub(crate) fn add_m2m_edges(
    ctx: &Context,
    driver: &Driver,
    ids: &[Value],
    edges: &[&EdgeSpec],
) -> Result<(), EntGraphError> {
    let mut inserts = JoinInserts::default();
    for id in ids {
        for edge in edges {
            inserts.push(id, edge)?;
        }
    }
    inserts.flush(ctx, driver)
}

/// Remove join-table pairs. An edge without target nodes removes every pair
/// of the owners.
pub(crate) fn clear_m2m_edges(
    ctx: &Context,
    driver: &Driver,
    ids: &[Value],
    edges: &[&EdgeSpec],
) -> Result<(), EntGraphError> {
    let mut tables: BTreeMap<&str, Vec<Predicate>> = BTreeMap::new();
    for edge in edges.iter().filter(|e| e.rel == Rel::M2M) {
        let (from, to) = edge.pair_columns()?;
        let preds = tables.entry(edge.table.as_str()).or_default();
        let nodes = &edge.target.nodes;
        if nodes.is_empty() {
            preds.push(Predicate::in_values(from, ids));
            if edge.bidi {
                preds.push(Predicate::in_values(to, ids));
            }
        } else {
            preds.push(Predicate::and([
                Predicate::in_values(from, ids),
                Predicate::in_values(to, nodes),
            ]));
            if edge.bidi {
                preds.push(Predicate::and([
                    Predicate::in_values(to, ids),
                    Predicate::in_values(from, nodes),
                ]));
            }
        }
    }
    for (table, preds) in tables {
        let mut delete = DeleteBuilder::new(table);
        delete.where_(Predicate::or(preds));
        driver
            .exec(ctx, &delete.build())
            .map_err(|e| e.context(format!("remove m2m edge for table {table}")))?;
    }
    Ok(())
}

/// Null the foreign key on target rows that point at the owners.
pub(crate) fn clear_fk_edges(
    ctx: &Context,
    driver: &Driver,
    ids: &[Value],
    edges: &[&EdgeSpec],
) -> Result<(), EntGraphError> {
    for edge in edges
        .iter()
        .filter(|e| e.stored_in(EdgeStorage::TargetColumn))
    {
        let fk = edge.fk_column()?;
        let mut update = UpdateBuilder::new(&edge.table);
        update.set_null(fk).where_(Predicate::in_values(fk, ids));
        if !edge.target.nodes.is_empty() {
            update.where_(Predicate::in_values(
                &edge.target.id.column,
                &edge.target.nodes,
            ));
        }
        driver
            .exec(ctx, &update.build())
            .map_err(|e| e.context(format!("clear {} edge for table {}", edge.rel, edge.table)))?;
    }
    Ok(())
}

/// Point target rows at the owner, only where they are not linked yet.
///
/// Fewer changed rows than targets means one of them already belongs to a
/// different owner, which is a constraint violation.
pub(crate) fn add_fk_edges(
    ctx: &Context,
    driver: &Driver,
    ids: &[Value],
    edges: &[&EdgeSpec],
) -> Result<(), EntGraphError> {
    let edges: Vec<&&EdgeSpec> = edges
        .iter()
        .filter(|e| e.stored_in(EdgeStorage::TargetColumn) && !e.target.nodes.is_empty())
        .collect();
    if edges.is_empty() {
        return Ok(());
    }
    let [id] = ids else {
        return Err(EntGraphError::validation(
            edges[0].fk_column()?,
            format!("unable to link FK edge to {} nodes, expected exactly 1", ids.len()),
        ));
    };
    for edge in edges {
        let fk = edge.fk_column()?;
        let nodes = &edge.target.nodes;
        let mut update = UpdateBuilder::new(&edge.table);
        update
            .set(fk, id.clone())
            .where_(Predicate::in_values(&edge.target.id.column, nodes))
            .where_(Predicate::is_null(fk));
        let affected = driver
            .exec(ctx, &update.build())
            .map_err(|e| e.context(format!("add {} edge for table {}", edge.rel, edge.table)))?;
        if affected < nodes.len() {
            let ids: Vec<String> = nodes.iter().map(ToString::to_string).collect();
            return Err(EntGraphError::constraint(format!(
                "one of [{}] is already connected to a different {fk}",
                ids.join(", ")
            )));
        }
    }
    Ok(())
}
