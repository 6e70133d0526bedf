//! Pending operations as privacy rules and hooks see them.
//!
//! Field and edge names refer to the entity's descriptors. Predicates name
//! columns of the entity's table.

use crate::{
    privacy::Op,
    sql::{OnConflict, Order, Predicate},
    value::Value,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    entity: String,
    op: Op,
    id: Option<Value>,
    pub(crate) set: Vec<(String, Value)>,
    pub(crate) add: Vec<(String, Value)>,
    pub(crate) clear: Vec<String>,
    pub(crate) add_edges: Vec<(String, Vec<Value>)>,
    /// An empty list removes every link of the edge.
    pub(crate) clear_edges: Vec<(String, Vec<Value>)>,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) on_conflict: Option<OnConflict>,
}

impl Mutation {
    fn new<E: Into<String>>(entity: E, op: Op, id: Option<Value>) -> Self {
        Self {
            entity: entity.into(),
            op,
            id,
            set: Vec::new(),
            add: Vec::new(),
            clear: Vec::new(),
            add_edges: Vec::new(),
            clear_edges: Vec::new(),
            predicates: Vec::new(),
            on_conflict: None,
        }
    }

    pub fn create<E: Into<String>>(entity: E) -> Self {
        Self::new(entity, Op::CREATE, None)
    }

    pub fn update<E: Into<String>>(entity: E) -> Self {
        Self::new(entity, Op::UPDATE, None)
    }

    pub fn update_one<E: Into<String>, V: Into<Value>>(entity: E, id: V) -> Self {
        Self::new(entity, Op::UPDATE_ONE, Some(id.into()))
    }

    pub fn delete<E: Into<String>>(entity: E) -> Self {
        Self::new(entity, Op::DELETE, None)
    }

    pub fn delete_one<E: Into<String>, V: Into<Value>>(entity: E, id: V) -> Self {
        Self::new(entity, Op::DELETE_ONE, Some(id.into()))
    }

    /// Caller-chosen ID for a create.
    pub fn with_id<V: Into<Value>>(mut self, id: V) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set<N: Into<String>, V: Into<Value>>(mut self, field: N, value: V) -> Self {
        self.set_field(field, value);
        self
    }

    pub fn add<N: Into<String>, V: Into<Value>>(mut self, field: N, value: V) -> Self {
        self.add.push((field.into(), value.into()));
        self
    }

    pub fn clear<N: Into<String>>(mut self, field: N) -> Self {
        self.clear.push(field.into());
        self
    }

    pub fn add_edge<N, I, V>(mut self, edge: N, ids: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let edge = edge.into();
        let ids = ids.into_iter().map(Into::into);
        match self.add_edges.iter_mut().find(|(name, _)| *name == edge) {
            Some((_, existing)) => existing.extend(ids),
            None => self.add_edges.push((edge, ids.collect())),
        }
        self
    }

    /// Remove every link of the edge.
    pub fn clear_edge<N: Into<String>>(mut self, edge: N) -> Self {
        self.clear_edges.push((edge.into(), Vec::new()));
        self
    }

    /// Remove the links to the given targets.
    pub fn remove_edge<N, I, V>(mut self, edge: N, ids: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if !ids.is_empty() {
            self.clear_edges.push((edge.into(), ids));
        }
        self
    }

    pub fn where_(mut self, pred: Predicate) -> Self {
        self.where_p(pred);
        self
    }

    /// Upsert on create. Conflict and assigned columns name table columns,
    /// like predicates.
    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    pub fn conflict(&self) -> Option<&OnConflict> {
        self.on_conflict.as_ref()
    }

    pub fn where_p(&mut self, pred: Predicate) {
        self.predicates.push(pred);
    }

    /// Set a field, replacing an earlier value for it.
    pub fn set_field<N: Into<String>, V: Into<Value>>(&mut self, field: N, value: V) {
        let field = field.into();
        let value = value.into();
        match self.set.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = value,
            None => self.set.push((field, value)),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Value the mutation sets for `field`.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.set
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.set.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn cleared(&self, field: &str) -> bool {
        self.clear.iter().any(|name| name == field)
    }

    /// Targets the mutation links through `edge`.
    pub fn added_ids(&self, edge: &str) -> &[Value] {
        self.add_edges
            .iter()
            .find(|(name, _)| name == edge)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

/// Eager load requested on a query.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WithEdge {
    pub(crate) name: String,
    pub(crate) predicates: Vec<Predicate>,
}

/// Filter on the existence of neighbors.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HasEdge {
    pub(crate) name: String,
    pub(crate) predicates: Option<Vec<Predicate>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    entity: String,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) order: Vec<Order>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
    pub(crate) unique: bool,
    pub(crate) with_edges: Vec<WithEdge>,
    pub(crate) has_edges: Vec<HasEdge>,
}

impl Query {
    pub fn new<E: Into<String>>(entity: E) -> Self {
        Self {
            entity: entity.into(),
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
            with_edges: Vec::new(),
            has_edges: Vec::new(),
        }
    }

    pub fn where_(mut self, pred: Predicate) -> Self {
        self.where_p(pred);
        self
    }

    pub fn where_p(&mut self, pred: Predicate) {
        self.predicates.push(pred);
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Eager-load every neighbor over `edge`.
    pub fn with_edge<N: Into<String>>(self, edge: N) -> Self {
        self.with_edge_where(edge, Vec::new())
    }

    /// Eager-load the neighbors over `edge` that match `preds`.
    pub fn with_edge_where<N: Into<String>>(mut self, edge: N, preds: Vec<Predicate>) -> Self {
        self.with_edges.push(WithEdge {
            name: edge.into(),
            predicates: preds,
        });
        self
    }

    /// Keep nodes with at least one neighbor over `edge`.
    pub fn has_edge<N: Into<String>>(mut self, edge: N) -> Self {
        self.has_edges.push(HasEdge {
            name: edge.into(),
            predicates: None,
        });
        self
    }

    /// Keep nodes with at least one neighbor over `edge` matching `preds`.
    pub fn has_edge_with<N: Into<String>>(mut self, edge: N, preds: Vec<Predicate>) -> Self {
        self.has_edges.push(HasEdge {
            name: edge.into(),
            predicates: Some(preds),
        });
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}
