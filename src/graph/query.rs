use std::{collections::BTreeMap, sync::Arc};

use ahash::AHashMap;
use tracing::debug;

use crate::{
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    sql::{Join, Order, Predicate, SelectItem, Selector},
    value::{NodeKey, Value},
};

use super::{
    decode_columns, node_selector,
    spec::{EdgeLoad, EdgeQuerySpec, EdgeStorage, QuerySpec, Record, Rel},
};

const JOIN_TABLE_ALIAS: &str = "edge_pairs";

fn edge_alias(i: usize) -> String {
    format!("e{i}")
}

/// Select the matching nodes and eager-load the requested edges.
///
/// To-one edges are joined into the main query. To-many edges are read with
/// one follow-up query per edge keyed by the owners' IDs and merged in
/// memory; a target reached from several owners is shared between them.
pub fn query_nodes(
    ctx: &Context,
    driver: &Driver,
    spec: &QuerySpec,
) -> Result<Vec<Record>, EntGraphError> {
    for load in &spec.edges {
        check_load(load)?;
    }
    let mut selector = node_selector(&spec.node);
    for pred in &spec.predicates {
        selector.where_(pred.clone());
    }
    for order in &spec.order {
        selector.order_by(order.clone());
    }
    if let Some(limit) = spec.limit {
        selector.limit(limit);
    }
    if let Some(offset) = spec.offset {
        selector.offset(offset);
    }
    selector.distinct(spec.unique);

    let to_one: Vec<(usize, &EdgeLoad)> = spec
        .edges
        .iter()
        .enumerate()
        .filter(|(_, load)| load.edge.rel.is_unique())
        .collect();
    for (i, load) in &to_one {
        join_to_one(&mut selector, &spec.node.id.column, *i, load)?;
    }

    let mut shared: Vec<AHashMap<NodeKey, Arc<Record>>> = vec![AHashMap::new(); to_one.len()];
    let mut records = driver.query(ctx, &selector.build(), |row| {
        let mut record = Record {
            values: decode_columns(row, &spec.node.columns, 0)?,
            edges: BTreeMap::new(),
        };
        let mut offset = spec.node.columns.len();
        for (slot, (_, load)) in to_one.iter().enumerate() {
            let values = decode_columns(row, &load.target.columns, offset)?;
            offset += load.target.columns.len();
            let targets = record.edges.entry(load.name.clone()).or_default();
            let Some(key) = values.get(&load.target.id.column).and_then(Value::key) else {
                continue;
            };
            let target = shared[slot]
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(Record {
                        values,
                        edges: BTreeMap::new(),
                    })
                })
                .clone();
            targets.push(target);
        }
        Ok(record)
    })?;

    for load in spec.edges.iter().filter(|l| !l.edge.rel.is_unique()) {
        load_to_many(ctx, driver, spec, load, &mut records)?;
    }
    debug!(table = %spec.node.table, rows = records.len(), edges = spec.edges.len(), "nodes queried");
    Ok(records)
}

fn check_load(load: &EdgeLoad) -> Result<(), EntGraphError> {
    match load.edge.rel {
        Rel::M2M => load.edge.pair_columns().map(|_| ()),
        _ => load.edge.fk_column().map(|_| ()),
    }
}

fn join_to_one(
    selector: &mut Selector,
    owner_id: &str,
    i: usize,
    load: &EdgeLoad,
) -> Result<(), EntGraphError> {
    let alias = edge_alias(i);
    let fk = load.edge.fk_column()?;
    let join = if load.edge.stored_in(EdgeStorage::OwnColumn) {
        Join {
            table: load.target.table.clone(),
            alias: alias.clone(),
            column: load.target.id.column.clone(),
            on_column: fk.to_string(),
            predicates: load.predicates.clone(),
        }
    } else {
        Join {
            table: load.target.table.clone(),
            alias: alias.clone(),
            column: fk.to_string(),
            on_column: owner_id.to_string(),
            predicates: load.predicates.clone(),
        }
    };
    selector.join(join);
    for column in &load.target.columns {
        selector.select_item(SelectItem::Joined {
            alias: alias.clone(),
            column: column.name.clone(),
        });
    }
    Ok(())
}

fn load_to_many(
    ctx: &Context,
    driver: &Driver,
    spec: &QuerySpec,
    load: &EdgeLoad,
    records: &mut [Record],
) -> Result<(), EntGraphError> {
    let mut owners: AHashMap<NodeKey, Vec<usize>> = AHashMap::new();
    let mut owner_ids = Vec::new();
    for (i, record) in records.iter_mut().enumerate() {
        record.edges.entry(load.name.clone()).or_default();
        let Some(id) = record.values.get(&spec.node.id.column) else {
            continue;
        };
        if let Some(key) = id.key() {
            let slots = owners.entry(key).or_default();
            if slots.is_empty() {
                owner_ids.push(id.clone());
            }
            slots.push(i);
        }
    }
    if owner_ids.is_empty() {
        return Ok(());
    }

    let target = &load.target;
    let mut selector = node_selector(target);
    if load.edge.rel == Rel::M2M {
        let (owner_column, target_column) = load.edge.pair_columns()?;
        selector.join(Join {
            table: load.edge.table.clone(),
            alias: JOIN_TABLE_ALIAS.to_string(),
            column: target_column.to_string(),
            on_column: target.id.column.clone(),
            predicates: Vec::new(),
        });
        selector.select_item(SelectItem::Joined {
            alias: JOIN_TABLE_ALIAS.to_string(),
            column: owner_column.to_string(),
        });
        selector.where_(Predicate::in_values(
            format!("{JOIN_TABLE_ALIAS}.{owner_column}"),
            &owner_ids,
        ));
    } else {
        let fk = load.edge.fk_column()?;
        selector.select_item(SelectItem::Column(fk.to_string()));
        selector.where_(Predicate::in_values(fk, &owner_ids));
    }
    for pred in &load.predicates {
        selector.where_(pred.clone());
    }
    selector.order_by(Order::asc(&target.id.column));

    let width = target.columns.len();
    let rows = driver.query(ctx, &selector.build(), |row| {
        let values = decode_columns(row, &target.columns, 0)?;
        let owner = Value::from(row.get_ref(width)?);
        Ok((owner, values))
    })?;

    let mut shared: AHashMap<NodeKey, Arc<Record>> = AHashMap::new();
    for (owner, values) in rows {
        let (Some(owner), Some(key)) = (
            owner.key(),
            values.get(&target.id.column).and_then(Value::key),
        ) else {
            continue;
        };
        let Some(slots) = owners.get(&owner) else {
            continue;
        };
        let node = shared
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Record {
                    values,
                    edges: BTreeMap::new(),
                })
            })
            .clone();
        for &slot in slots {
            records[slot]
                .edges
                .entry(load.name.clone())
                .or_default()
                .push(Arc::clone(&node));
        }
    }
    Ok(())
}

/// Count the matching nodes. Ordering and paging are ignored; `unique`
/// counts distinct IDs.
pub fn count_nodes(
    ctx: &Context,
    driver: &Driver,
    spec: &QuerySpec,
) -> Result<usize, EntGraphError> {
    let mut selector = Selector::new(&spec.node.table);
    selector.set_items(vec![if spec.unique {
        SelectItem::CountDistinct(spec.node.id.column.clone())
    } else {
        SelectItem::Count
    }]);
    for pred in &spec.predicates {
        selector.where_(pred.clone());
    }
    driver.query_count(ctx, &selector.build())
}

/// Read the `(owner, target)` pairs stored for an M2M edge.
pub fn query_edges(
    ctx: &Context,
    driver: &Driver,
    spec: &EdgeQuerySpec,
) -> Result<Vec<(Value, Value)>, EntGraphError> {
    if spec.edge.rel != Rel::M2M {
        return Err(EntGraphError::validation(
            &spec.edge.table,
            format!("query edges of a {} edge, expected M2M", spec.edge.rel),
        ));
    }
    let (owner, target) = spec.edge.pair_columns()?;
    let mut selector = Selector::new(&spec.edge.table).select([owner, target]);
    for pred in &spec.predicates {
        selector.where_(pred.clone());
    }
    selector.order_by(Order::asc(owner)).order_by(Order::asc(target));
    driver.query(ctx, &selector.build(), |row| {
        Ok((Value::from(row.get_ref(0)?), Value::from(row.get_ref(1)?)))
    })
}
