//! Typed entry point over the compiler and the policy engine.
//!
//! A [`Client`] owns the [`Driver`] and the registered [`EntityType`]s. Every
//! operation derives its own [`Context`], evaluates the entity's policy on it,
//! runs the entity's hooks with the same context, lowers the pending
//! [`Mutation`] or [`Query`] into a spec and hands it to the compiler.

mod entity;
mod lower;
mod ops;

use std::path::Path;

use ahash::AHashMap;
use tracing::debug;

pub use entity::{EdgeDescriptor, EntityType, FieldDescriptor, HookFunc, MutationHook};
pub use ops::{Mutation, Query};

use crate::{
    config::ClientConfig,
    context::Context,
    driver::Driver,
    errors::EntGraphError,
    graph::{
        self, BatchCreateSpec, Record, batch_create, count_nodes, create_node, delete_nodes,
        query_edges, query_nodes, update_node, update_nodes,
    },
    privacy::{Op, PolicyEngine},
    sql::{Order, SelectItem, Selector},
    value::Value,
};

use self::lower::Schema;

pub struct Client {
    driver: Driver,
    schema: Schema,
    engines: AHashMap<String, PolicyEngine>,
    config: ClientConfig,
}

impl Client {
    pub fn open<P: AsRef<Path>>(path: P, config: &ClientConfig) -> Result<Self, EntGraphError> {
        let driver = Driver::open(path, &config.sqlite)?;
        Ok(Self::from_driver(driver, config))
    }

    pub fn open_in_memory(config: &ClientConfig) -> Result<Self, EntGraphError> {
        let driver = Driver::open_in_memory(&config.sqlite)?;
        Ok(Self::from_driver(driver, config))
    }

    pub fn from_driver(driver: Driver, config: &ClientConfig) -> Self {
        Self {
            driver,
            schema: Schema::default(),
            engines: AHashMap::new(),
            config: config.clone(),
        }
    }

    /// Register an entity type, replacing an earlier one of the same name.
    pub fn register(&mut self, entity: EntityType) -> &mut Self {
        let engine = PolicyEngine::new(entity.policies.clone(), self.config.policy_fallback);
        let entity = self.schema.insert(entity);
        debug!(
            entity = %entity.name,
            table = %entity.table,
            fields = entity.fields.len(),
            edges = entity.edges.len(),
            "entity registered"
        );
        self.engines.insert(entity.name.clone(), engine);
        self
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType, EntGraphError> {
        self.schema.get(name).map(|e| &**e)
    }

    fn engine(&self, name: &str) -> Result<&PolicyEngine, EntGraphError> {
        self.engines
            .get(name)
            .ok_or_else(|| EntGraphError::validation(name, "unknown entity type"))
    }

    /// Policy, then hooks, on a context private to this operation.
    fn prepare_mutation(
        &self,
        ctx: &Context,
        mutation: &mut Mutation,
        expected: Op,
    ) -> Result<Context, EntGraphError> {
        if !mutation.op().is(expected) {
            return Err(EntGraphError::validation(
                "op",
                format!("expected {expected}, got {}", mutation.op()),
            ));
        }
        let entity = self.schema.get(mutation.entity())?;
        let mut op_ctx = ctx.clone();
        self.engine(mutation.entity())?
            .eval_mutation(&mut op_ctx, mutation)?;
        for hook in &entity.hooks {
            hook.run(&op_ctx, self, mutation)?;
        }
        Ok(op_ctx)
    }

    fn prepare_query(&self, ctx: &Context, query: &mut Query) -> Result<Context, EntGraphError> {
        let mut op_ctx = ctx.clone();
        self.engine(query.entity())?.eval_query(&mut op_ctx, query)?;
        Ok(op_ctx)
    }

    /// Create one node and return its ID.
    pub fn create(&self, ctx: &Context, mut mutation: Mutation) -> Result<Value, EntGraphError> {
        let op_ctx = self.prepare_mutation(ctx, &mut mutation, Op::CREATE)?;
        let entity = self.schema.get(mutation.entity())?;
        let spec = self.schema.create(entity, &mutation)?;
        create_node(&op_ctx, &self.driver, &spec)
    }

    /// Create nodes of one entity type together and return their IDs in order.
    ///
    /// Each mutation passes its own policy evaluation and hooks before any row
    /// is written.
    pub fn create_bulk(
        &self,
        ctx: &Context,
        mutations: Vec<Mutation>,
    ) -> Result<Vec<Value>, EntGraphError> {
        let Some(first) = mutations.first() else {
            return Ok(Vec::new());
        };
        let name = first.entity().to_string();
        let entity = self.schema.get(&name)?;
        let mut nodes = Vec::with_capacity(mutations.len());
        for (i, mut mutation) in mutations.into_iter().enumerate() {
            if mutation.entity() != name {
                return Err(EntGraphError::validation(
                    "entity",
                    format!("bulk create of {name} got a {} mutation", mutation.entity()),
                ));
            }
            self.prepare_mutation(ctx, &mut mutation, Op::CREATE)?;
            nodes.push(
                self.schema
                    .create(entity, &mutation)
                    .map_err(|e| e.in_batch(i))?,
            );
        }
        batch_create(ctx, &self.driver, &BatchCreateSpec::new(nodes), &self.config.batch)
    }

    /// Update one node by ID and return it as stored.
    pub fn update_one(&self, ctx: &Context, mut mutation: Mutation) -> Result<Record, EntGraphError> {
        let op_ctx = self.prepare_mutation(ctx, &mut mutation, Op::UPDATE_ONE)?;
        let entity = self.schema.get(mutation.entity())?;
        let spec = self.schema.update(entity, &mutation)?;
        update_node(&op_ctx, &self.driver, &spec)
    }

    /// Update every matching node and return how many matched.
    pub fn update(&self, ctx: &Context, mut mutation: Mutation) -> Result<usize, EntGraphError> {
        let op_ctx = self.prepare_mutation(ctx, &mut mutation, Op::UPDATE)?;
        let entity = self.schema.get(mutation.entity())?;
        let spec = self.schema.update(entity, &mutation)?;
        update_nodes(&op_ctx, &self.driver, &spec)
    }

    pub fn delete(&self, ctx: &Context, mut mutation: Mutation) -> Result<usize, EntGraphError> {
        let op_ctx = self.prepare_mutation(ctx, &mut mutation, Op::DELETE)?;
        let entity = self.schema.get(mutation.entity())?;
        let spec = self.schema.delete(entity, &mutation)?;
        delete_nodes(&op_ctx, &self.driver, &spec)
    }

    /// Delete one node by ID. Fails with `NotFound` when no row matched.
    pub fn delete_one(&self, ctx: &Context, mut mutation: Mutation) -> Result<(), EntGraphError> {
        let op_ctx = self.prepare_mutation(ctx, &mut mutation, Op::DELETE_ONE)?;
        let entity = self.schema.get(mutation.entity())?;
        let spec = self.schema.delete(entity, &mutation)?;
        match delete_nodes(&op_ctx, &self.driver, &spec)? {
            0 => Err(EntGraphError::not_found(&entity.name)),
            _ => Ok(()),
        }
    }

    pub fn query(&self, ctx: &Context, mut query: Query) -> Result<Vec<Record>, EntGraphError> {
        let op_ctx = self.prepare_query(ctx, &mut query)?;
        let entity = self.schema.get(query.entity())?;
        let spec = self.schema.query(entity, &query)?;
        query_nodes(&op_ctx, &self.driver, &spec)
    }

    /// The single matching node. `NotFound` for none, `NotSingular` for more.
    pub fn only(&self, ctx: &Context, query: Query) -> Result<Record, EntGraphError> {
        let label = query.entity().to_string();
        let mut records = self.query(ctx, query.limit(2))?;
        match records.len() {
            0 => Err(EntGraphError::not_found(label)),
            1 => Ok(records.remove(0)),
            _ => Err(EntGraphError::not_singular(label)),
        }
    }

    pub fn first(&self, ctx: &Context, query: Query) -> Result<Option<Record>, EntGraphError> {
        Ok(self.query(ctx, query.limit(1))?.into_iter().next())
    }

    pub fn count(&self, ctx: &Context, mut query: Query) -> Result<usize, EntGraphError> {
        let op_ctx = self.prepare_query(ctx, &mut query)?;
        let entity = self.schema.get(query.entity())?;
        let spec = self.schema.query(entity, &query)?;
        count_nodes(&op_ctx, &self.driver, &spec)
    }

    pub fn exists(&self, ctx: &Context, query: Query) -> Result<bool, EntGraphError> {
        Ok(self.count(ctx, query)? > 0)
    }

    /// Neighbors of node `id` of `entity` over `edge`, ordered by ID.
    ///
    /// The target entity's query policy applies; filter rules narrow the
    /// neighbor set.
    pub fn neighbors<V: Into<Value>>(
        &self,
        ctx: &Context,
        entity: &str,
        id: V,
        edge: &str,
    ) -> Result<Vec<Record>, EntGraphError> {
        let owner = self.schema.get(entity)?;
        let descriptor = owner.edge_named(edge)?;
        let target = self.schema.get(&descriptor.target)?;
        let mut query = Query::new(&target.name);
        let op_ctx = self.prepare_query(ctx, &mut query)?;

        let step = self.schema.step(owner, edge)?.from_value(id);
        self.neighbor_records(&op_ctx, target, graph::neighbors(&step)?, &query)
    }

    /// Neighbors over `edge` of every node `from` matches, ordered by ID.
    ///
    /// Both entities' query policies apply: the source's narrows `from`, the
    /// target's narrows the neighbors.
    pub fn query_neighbors(
        &self,
        ctx: &Context,
        mut from: Query,
        edge: &str,
    ) -> Result<Vec<Record>, EntGraphError> {
        self.prepare_query(ctx, &mut from)?;
        let owner = self.schema.get(from.entity())?;
        let source = self.schema.query(owner, &from)?;
        let mut sources = Selector::new(&owner.table);
        for pred in source.predicates {
            sources.where_(pred);
        }
        for order in source.order {
            sources.order_by(order);
        }
        if let Some(limit) = source.limit {
            sources.limit(limit);
        }
        if let Some(offset) = source.offset {
            sources.offset(offset);
        }

        let descriptor = owner.edge_named(edge)?;
        let target = self.schema.get(&descriptor.target)?;
        let mut query = Query::new(&target.name);
        let op_ctx = self.prepare_query(ctx, &mut query)?;
        let step = self.schema.step(owner, edge)?;
        self.neighbor_records(&op_ctx, target, graph::set_neighbors(&step, sources)?, &query)
    }

    fn neighbor_records(
        &self,
        ctx: &Context,
        target: &EntityType,
        mut selector: Selector,
        query: &Query,
    ) -> Result<Vec<Record>, EntGraphError> {
        let node = self.schema.node_spec(target)?;
        selector.set_items(
            node.columns
                .iter()
                .map(|c| SelectItem::Column(c.name.clone()))
                .collect(),
        );
        for pred in query.predicates() {
            selector.where_(pred.clone());
        }
        selector.order_by(Order::asc(&node.id.column));
        self.driver.query(ctx, &selector.build(), |row| {
            Ok(Record {
                values: graph::decode_columns(row, &node.columns, 0)?,
                edges: Default::default(),
            })
        })
    }

    /// `(owner, target)` pairs of an M2M edge, optionally of one owner.
    pub fn query_edges(
        &self,
        ctx: &Context,
        entity: &str,
        edge: &str,
        owner: Option<Value>,
    ) -> Result<Vec<(Value, Value)>, EntGraphError> {
        let mut query = Query::new(entity);
        let op_ctx = self.prepare_query(ctx, &mut query)?;
        let spec = self
            .schema
            .edge_query(self.schema.get(entity)?, edge, owner.as_ref())?;
        query_edges(&op_ctx, &self.driver, &spec)
    }

    /// Run `f` in one transaction. Operations inside nest as savepoints; an
    /// error from `f` rolls everything back.
    pub fn transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T, EntGraphError>
    where
        F: FnOnce(&Client) -> Result<T, EntGraphError>,
    {
        let tx = self.driver.tx(ctx)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}
