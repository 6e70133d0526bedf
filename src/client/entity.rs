//! Entity type declarations registered on a [`Client`](super::Client).

use std::sync::Arc;

use crate::{
    context::Context,
    errors::EntGraphError,
    graph::Rel,
    privacy::{Policies, Policy},
    value::FieldType,
};

use super::{Client, ops::Mutation};

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub ty: FieldType,
    /// May be omitted on create.
    pub optional: bool,
    /// May hold `NULL`.
    pub nullable: bool,
    /// Set on create only.
    pub immutable: bool,
}

impl FieldDescriptor {
    /// A required field stored in a column of the same name.
    pub fn new<N: Into<String>>(name: N, ty: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            ty,
            optional: false,
            nullable: false,
            immutable: false,
        }
    }

    pub fn column<C: Into<String>>(mut self, column: C) -> Self {
        self.column = column.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// An optional field is stored as `NULL` when unset.
    pub(crate) fn column_nullable(&self) -> bool {
        self.optional || self.nullable
    }
}

/// One edge of an entity type.
///
/// `table` and `columns` locate the edge the same way [`EdgeSpec`] does: the
/// table holding the foreign key for O2O, O2M and M2O edges, or the join table
/// and its `(declaring type, target type)` columns for M2M edges.
/// `target_table` and `target_id` fall back to the registered target entity.
///
/// [`EdgeSpec`]: crate::graph::EdgeSpec
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeDescriptor {
    pub name: String,
    pub target: String,
    pub rel: Rel,
    pub inverse: bool,
    pub bidi: bool,
    pub table: String,
    pub columns: Vec<String>,
    pub target_table: Option<String>,
    pub target_id: Option<String>,
}

impl EdgeDescriptor {
    pub fn new<N, T, S, I, C>(name: N, rel: Rel, target: T, table: S, columns: I) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        S: Into<String>,
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        Self {
            name: name.into(),
            target: target.into(),
            rel,
            inverse: false,
            bidi: false,
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            target_table: None,
            target_id: None,
        }
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// Edge to the same type that is its own inverse, like a spouse or friends.
    pub fn bidi(mut self) -> Self {
        self.bidi = true;
        self
    }

    pub fn target_table<T: Into<String>>(mut self, table: T) -> Self {
        self.target_table = Some(table.into());
        self
    }

    pub fn target_id<C: Into<String>>(mut self, column: C) -> Self {
        self.target_id = Some(column.into());
        self
    }
}

/// Runs on a pending mutation after its policy allowed it and before it is
/// compiled. Returning an error aborts the mutation.
pub trait MutationHook: Send + Sync {
    fn run(&self, ctx: &Context, client: &Client, mutation: &mut Mutation)
    -> Result<(), EntGraphError>;
}

pub struct HookFunc<F>(F);

impl<F> HookFunc<F>
where
    F: Fn(&Context, &Client, &mut Mutation) -> Result<(), EntGraphError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MutationHook for HookFunc<F>
where
    F: Fn(&Context, &Client, &mut Mutation) -> Result<(), EntGraphError> + Send + Sync,
{
    fn run(
        &self,
        ctx: &Context,
        client: &Client,
        mutation: &mut Mutation,
    ) -> Result<(), EntGraphError> {
        (self.0)(ctx, client, mutation)
    }
}

/// Schema of one entity type: its table, fields, edges, policies and hooks.
#[derive(Clone)]
pub struct EntityType {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) id_column: String,
    pub(crate) id_type: FieldType,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) edges: Vec<EdgeDescriptor>,
    pub(crate) policies: Policies,
    pub(crate) hooks: Vec<Arc<dyn MutationHook>>,
}

impl std::fmt::Debug for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("id_column", &self.id_column)
            .field("id_type", &self.id_type)
            .field("fields", &self.fields)
            .field("edges", &self.edges)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl EntityType {
    /// An entity with an integer `id` primary key.
    pub fn new<N: Into<String>, T: Into<String>>(name: N, table: T) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_column: "id".to_string(),
            id_type: FieldType::Int,
            fields: Vec::new(),
            edges: Vec::new(),
            policies: Policies::new(),
            hooks: Vec::new(),
        }
    }

    pub fn id<C: Into<String>>(mut self, column: C, ty: FieldType) -> Self {
        self.id_column = column.into();
        self.id_type = ty;
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn edge(mut self, edge: EdgeDescriptor) -> Self {
        self.edges.push(edge);
        self
    }

    /// Append a policy. Policies run in the order they were added.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn hook<H: MutationHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub(crate) fn field_named(&self, name: &str) -> Result<&FieldDescriptor, EntGraphError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| EntGraphError::validation(name, format!("unknown field of {}", self.name)))
    }

    pub(crate) fn edge_named(&self, name: &str) -> Result<&EdgeDescriptor, EntGraphError> {
        self.edges
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| EntGraphError::validation(name, format!("unknown edge of {}", self.name)))
    }
}
