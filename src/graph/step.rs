//! One-hop traversals rendered as nested selects.

use crate::{
    errors::EntGraphError,
    sql::{Predicate, Selector},
    value::Value,
};

use super::spec::{EdgeSpec, EdgeStorage, Rel};

/// A hop from nodes of one table to their neighbors over one edge.
///
/// `from_value` is only read by [`neighbors`]; the `has_*` predicates filter
/// rows of `from_table`.
#[derive(Clone, Debug)]
pub struct Step {
    pub from_table: String,
    pub from_column: String,
    pub from_value: Value,
    pub edge: EdgeSpec,
    pub to_table: String,
    pub to_column: String,
}

impl Step {
    pub fn new<F, C, T, D>(
        from_table: F,
        from_column: C,
        edge: EdgeSpec,
        to_table: T,
        to_column: D,
    ) -> Self
    where
        F: Into<String>,
        C: Into<String>,
        T: Into<String>,
        D: Into<String>,
    {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            from_value: Value::Null,
            edge,
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    pub fn from_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.from_value = value.into();
        self
    }

    fn hop(&self) -> HopKind {
        match self.edge.rel {
            Rel::M2M => HopKind::JoinTable,
            _ if self.edge.stored_in(EdgeStorage::TargetColumn) => HopKind::ToOwner,
            _ => HopKind::FromOwner,
        }
    }
}

enum HopKind {
    JoinTable,
    /// The foreign key sits on the `from` row.
    FromOwner,
    /// The foreign key sits on the neighbor row.
    ToOwner,
}

/// Neighbors of `step.from_value`, selecting every column of the neighbor table.
pub fn neighbors(step: &Step) -> Result<Selector, EntGraphError> {
    let to = Selector::new(&step.to_table);
    let from_value = step.from_value.clone();
    let selector = match step.hop() {
        HopKind::JoinTable => {
            let (owner, target) = step.edge.pair_columns()?;
            let pairs = Selector::new(&step.edge.table)
                .select([target])
                .filter(Predicate::eq(owner, from_value));
            to.filter(Predicate::in_select(&step.to_column, pairs))
        }
        HopKind::FromOwner => {
            let fk = step.edge.fk_column()?;
            let owner = Selector::new(&step.edge.table)
                .select([fk])
                .filter(Predicate::eq(&step.from_column, from_value));
            to.filter(Predicate::in_select(&step.to_column, owner))
        }
        HopKind::ToOwner => to.filter(Predicate::eq(step.edge.fk_column()?, from_value)),
    };
    Ok(selector)
}

/// Neighbors of every row `from` selects, selecting every column of the
/// neighbor table. `from` must read `step.from_table`; its selected items are
/// replaced, while its filter, order and limit shape the source set.
pub fn set_neighbors(step: &Step, from: Selector) -> Result<Selector, EntGraphError> {
    let to = Selector::new(&step.to_table);
    let sources = from.select([step.from_column.clone()]);
    let selector = match step.hop() {
        HopKind::JoinTable => {
            let (owner, target) = step.edge.pair_columns()?;
            let pairs = Selector::new(&step.edge.table)
                .select([target])
                .filter(Predicate::in_select(owner, sources));
            to.filter(Predicate::in_select(&step.to_column, pairs))
        }
        HopKind::FromOwner => {
            let fk = step.edge.fk_column()?;
            let owners = Selector::new(&step.edge.table)
                .select([fk])
                .filter(Predicate::in_select(&step.from_column, sources));
            to.filter(Predicate::in_select(&step.to_column, owners))
        }
        HopKind::ToOwner => to.filter(Predicate::in_select(step.edge.fk_column()?, sources)),
    };
    Ok(selector)
}

/// Rows of `from_table` with at least one neighbor.
pub fn has_neighbors(step: &Step) -> Result<Predicate, EntGraphError> {
    let pred = match step.hop() {
        HopKind::JoinTable => {
            let (owner, _) = step.edge.pair_columns()?;
            Predicate::in_select(
                &step.from_column,
                Selector::new(&step.edge.table).select([owner]),
            )
        }
        HopKind::FromOwner => Predicate::not_null(step.edge.fk_column()?),
        HopKind::ToOwner => {
            let fk = step.edge.fk_column()?;
            Predicate::in_select(
                &step.from_column,
                Selector::new(&step.edge.table)
                    .select([fk])
                    .filter(Predicate::not_null(fk)),
            )
        }
    };
    Ok(pred)
}

/// Rows of `from_table` with at least one neighbor matching `preds`.
pub fn has_neighbors_with(step: &Step, preds: Vec<Predicate>) -> Result<Predicate, EntGraphError> {
    let mut matching = Selector::new(&step.to_table).select([step.to_column.clone()]);
    for pred in preds.iter().cloned() {
        matching.where_(pred);
    }
    let pred = match step.hop() {
        HopKind::JoinTable => {
            let (owner, target) = step.edge.pair_columns()?;
            let pairs = Selector::new(&step.edge.table)
                .select([owner])
                .filter(Predicate::in_select(target, matching));
            Predicate::in_select(&step.from_column, pairs)
        }
        HopKind::FromOwner => Predicate::in_select(step.edge.fk_column()?, matching),
        HopKind::ToOwner => {
            let fk = step.edge.fk_column()?;
            let mut owners = Selector::new(&step.to_table).select([fk]);
            for pred in preds {
                owners.where_(pred);
            }
            Predicate::in_select(&step.from_column, owners)
        }
    };
    Ok(pred)
}
