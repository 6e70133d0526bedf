use tracing::debug;

use crate::{context::Context, driver::Driver, errors::EntGraphError, sql::DeleteBuilder};

use super::spec::DeleteSpec;

/// Delete the matching rows of one table.
///
/// Dependents are not touched here; removing them is left to the schema's
/// `ON DELETE` clauses.
pub fn delete_nodes(
    ctx: &Context,
    driver: &Driver,
    spec: &DeleteSpec,
) -> Result<usize, EntGraphError> {
    let mut delete = DeleteBuilder::new(&spec.node.table);
    for pred in &spec.predicates {
        delete.where_(pred.clone());
    }
    let affected = driver
        .exec(ctx, &delete.build())
        .map_err(|e| e.context(format!("delete nodes from table {}", spec.node.table)))?;
    debug!(table = %spec.node.table, affected, "nodes deleted");
    Ok(affected)
}
