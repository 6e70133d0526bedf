//! Lowering of pending mutations and queries into compiler specs.

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    errors::EntGraphError,
    graph::{
        CreateSpec, DeleteSpec, EdgeLoad, EdgeQuerySpec, EdgeSpec, EdgeStorage, FieldSpec,
        NodeSpec, QuerySpec, Step, UpdateSpec, has_neighbors, has_neighbors_with,
    },
    sql::Predicate,
    value::{FieldType, Value},
};

use super::{
    entity::{EdgeDescriptor, EntityType},
    ops::{Mutation, Query},
};

/// Registered entity types by name.
#[derive(Clone, Debug, Default)]
pub(crate) struct Schema {
    entities: AHashMap<String, Arc<EntityType>>,
}

impl Schema {
    pub(crate) fn insert(&mut self, entity: EntityType) -> Arc<EntityType> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.name.clone(), Arc::clone(&entity));
        entity
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Arc<EntityType>, EntGraphError> {
        self.entities
            .get(name)
            .ok_or_else(|| EntGraphError::validation(name, "unknown entity type"))
    }

    /// ID column of an edge's target. Unregistered targets default to an
    /// integer `id`.
    fn target_id(&self, edge: &EdgeDescriptor) -> FieldSpec {
        let target = self.entities.get(&edge.target);
        let ty = target.map_or(FieldType::Int, |t| t.id_type);
        let column = match (&edge.target_id, target) {
            (Some(column), _) => column.clone(),
            (None, Some(target)) => target.id_column.clone(),
            (None, None) => "id".to_string(),
        };
        FieldSpec::column(column, ty)
    }

    /// Table and ID column of an edge's target.
    fn target_of(&self, edge: &EdgeDescriptor) -> Result<(String, FieldSpec), EntGraphError> {
        let table = match (&edge.target_table, self.entities.get(&edge.target)) {
            (Some(table), _) => table.clone(),
            (None, Some(target)) => target.table.clone(),
            (None, None) => {
                return Err(EntGraphError::validation(
                    &edge.name,
                    format!("edge target {} is not registered", edge.target),
                ));
            }
        };
        Ok((table, self.target_id(edge)))
    }

    pub(crate) fn edge_spec(&self, edge: &EdgeDescriptor) -> EdgeSpec {
        EdgeSpec::new(
            edge.rel,
            &edge.table,
            edge.columns.iter().cloned(),
            self.target_id(edge),
        )
        .inverse(edge.inverse)
        .bidi(edge.bidi)
    }

    /// Columns read back for an entity: ID, fields, then the foreign keys
    /// stored on its own rows.
    pub(crate) fn node_spec(&self, entity: &EntityType) -> Result<NodeSpec, EntGraphError> {
        let id = FieldSpec::column(&entity.id_column, entity.id_type);
        let mut node = NodeSpec::new(&entity.table, id);
        for field in &entity.fields {
            node = node.column(&field.column, field.ty);
        }
        for edge in &entity.edges {
            let spec = self.edge_spec(edge);
            if spec.stored_in(EdgeStorage::OwnColumn) {
                node = node.column(spec.fk_column()?, spec.target.id.ty);
            }
        }
        Ok(node)
    }

    pub(crate) fn create(
        &self,
        entity: &EntityType,
        m: &Mutation,
    ) -> Result<CreateSpec, EntGraphError> {
        if let Some((name, _)) = m.add.first() {
            return Err(EntGraphError::validation(name, "add is not supported on create"));
        }
        if let Some(name) = m.clear.first() {
            return Err(EntGraphError::validation(name, "clear is not supported on create"));
        }
        if let Some((name, _)) = m.clear_edges.first() {
            return Err(EntGraphError::validation(
                name,
                "edge removal is not supported on create",
            ));
        }
        let mut spec = CreateSpec::new(self.node_spec(entity)?);
        if let Some(id) = m.id() {
            spec = spec.with_id(id.clone());
        }
        for (name, value) in &m.set {
            let field = entity.field_named(name)?;
            spec = spec.field(
                FieldSpec::new(&field.column, field.ty, value.clone())
                    .nullable(field.column_nullable()),
            );
        }
        for field in entity.fields.iter().filter(|f| !f.optional) {
            if m.field(&field.name).is_none() {
                return Err(EntGraphError::validation(
                    &field.name,
                    format!("missing required field of {}", entity.name),
                ));
            }
        }
        for (name, ids) in &m.add_edges {
            let edge = self.edge_spec(entity.edge_named(name)?);
            spec = spec.edge(edge.nodes(ids.iter().cloned()));
        }
        if let Some(conflict) = m.conflict() {
            // Immutable fields keep the value they were created with.
            let conflict = entity
                .fields
                .iter()
                .filter(|f| f.immutable)
                .fold(conflict.clone(), |c, f| c.ignore(&f.column));
            spec = spec.on_conflict(conflict);
        }
        Ok(spec)
    }

    pub(crate) fn update(
        &self,
        entity: &EntityType,
        m: &Mutation,
    ) -> Result<UpdateSpec, EntGraphError> {
        if m.conflict().is_some() {
            return Err(EntGraphError::validation(
                "on_conflict",
                "conflict options are only supported on create",
            ));
        }
        let mut spec = UpdateSpec::new(self.node_spec(entity)?);
        if let Some(id) = m.id() {
            spec = spec.id(id.clone());
        }
        for (name, value) in &m.set {
            let field = entity.field_named(name)?;
            if field.immutable {
                return Err(EntGraphError::validation(name, "immutable field"));
            }
            spec = spec.set(
                FieldSpec::new(&field.column, field.ty, value.clone())
                    .nullable(field.column_nullable()),
            );
        }
        for (name, value) in &m.add {
            let field = entity.field_named(name)?;
            if field.immutable {
                return Err(EntGraphError::validation(name, "immutable field"));
            }
            spec = spec.add(FieldSpec::new(&field.column, field.ty, value.clone()));
        }
        for name in &m.clear {
            let field = entity.field_named(name)?;
            if field.immutable {
                return Err(EntGraphError::validation(name, "immutable field"));
            }
            spec = spec.clear(
                FieldSpec::column(&field.column, field.ty).nullable(field.column_nullable()),
            );
        }
        for (name, ids) in &m.clear_edges {
            let edge = self.edge_spec(entity.edge_named(name)?);
            spec = spec.clear_edge(edge.nodes(ids.iter().cloned()));
        }
        for (name, ids) in &m.add_edges {
            let edge = self.edge_spec(entity.edge_named(name)?);
            spec = spec.add_edge(edge.nodes(ids.iter().cloned()));
        }
        for pred in &m.predicates {
            spec = spec.where_(pred.clone());
        }
        Ok(spec)
    }

    pub(crate) fn delete(
        &self,
        entity: &EntityType,
        m: &Mutation,
    ) -> Result<DeleteSpec, EntGraphError> {
        let mut predicates = m.predicates.clone();
        if let Some(id) = m.id() {
            predicates.push(Predicate::eq(&entity.id_column, id));
        }
        Ok(DeleteSpec {
            node: self.node_spec(entity)?,
            predicates,
        })
    }

    pub(crate) fn query(&self, entity: &EntityType, q: &Query) -> Result<QuerySpec, EntGraphError> {
        let mut spec = QuerySpec::new(self.node_spec(entity)?);
        spec.predicates = q.predicates.clone();
        for has in &q.has_edges {
            let step = self.step(entity, &has.name)?;
            let pred = match &has.predicates {
                Some(preds) => has_neighbors_with(&step, preds.clone())?,
                None => has_neighbors(&step)?,
            };
            spec.predicates.push(pred);
        }
        spec.order = q.order.clone();
        spec.limit = q.limit;
        spec.offset = q.offset;
        spec.unique = q.unique;
        for load in &q.with_edges {
            let descriptor = entity.edge_named(&load.name)?;
            let target = self.get(&descriptor.target)?;
            spec.edges.push(EdgeLoad {
                name: load.name.clone(),
                edge: self.edge_spec(descriptor),
                target: self.node_spec(target)?,
                predicates: load.predicates.clone(),
            });
        }
        Ok(spec)
    }

    /// Hop from `entity` over its edge `name`.
    pub(crate) fn step(&self, entity: &EntityType, name: &str) -> Result<Step, EntGraphError> {
        let descriptor = entity.edge_named(name)?;
        let (to_table, to_id) = self.target_of(descriptor)?;
        Ok(Step::new(
            &entity.table,
            &entity.id_column,
            self.edge_spec(descriptor),
            to_table,
            to_id.column,
        ))
    }

    pub(crate) fn edge_query(
        &self,
        entity: &EntityType,
        name: &str,
        owner: Option<&Value>,
    ) -> Result<EdgeQuerySpec, EntGraphError> {
        let edge = self.edge_spec(entity.edge_named(name)?);
        let mut predicates = Vec::new();
        if let Some(owner) = owner {
            let (owner_column, _) = edge.pair_columns()?;
            predicates.push(Predicate::eq(owner_column, owner));
        }
        Ok(EdgeQuerySpec { edge, predicates })
    }
}
