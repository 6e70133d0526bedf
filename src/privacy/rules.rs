use std::sync::Arc;

use crate::{
    client::{Mutation, Query},
    context::Context,
    sql::Predicate,
};

use super::{Decision, MutationRule, Op, QueryRule, RuleResult};

/// Allows every query and mutation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysAllowRule;

impl QueryRule for AlwaysAllowRule {
    fn eval_query(&self, _: &Context, _: &mut Query) -> RuleResult {
        Ok(Decision::Allow)
    }
}

impl MutationRule for AlwaysAllowRule {
    fn eval_mutation(&self, _: &Context, _: &mut Mutation) -> RuleResult {
        Ok(Decision::Allow)
    }
}

/// Denies every query and mutation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysDenyRule;

impl QueryRule for AlwaysDenyRule {
    fn eval_query(&self, _: &Context, query: &mut Query) -> RuleResult {
        Ok(Decision::deny(format!("query on {} denied", query.entity())))
    }
}

impl MutationRule for AlwaysDenyRule {
    fn eval_mutation(&self, _: &Context, mutation: &mut Mutation) -> RuleResult {
        Ok(Decision::deny(format!(
            "{} on {} denied",
            mutation.op(),
            mutation.entity()
        )))
    }
}

/// Decides from the context alone, for queries and mutations alike.
pub struct ContextRule<F>(F);

impl<F> ContextRule<F>
where
    F: Fn(&Context) -> RuleResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> QueryRule for ContextRule<F>
where
    F: Fn(&Context) -> RuleResult + Send + Sync,
{
    fn eval_query(&self, ctx: &Context, _: &mut Query) -> RuleResult {
        (self.0)(ctx)
    }
}

impl<F> MutationRule for ContextRule<F>
where
    F: Fn(&Context) -> RuleResult + Send + Sync,
{
    fn eval_mutation(&self, ctx: &Context, _: &mut Mutation) -> RuleResult {
        (self.0)(ctx)
    }
}

pub struct QueryRuleFunc<F>(F);

impl<F> QueryRuleFunc<F>
where
    F: Fn(&Context, &mut Query) -> RuleResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> QueryRule for QueryRuleFunc<F>
where
    F: Fn(&Context, &mut Query) -> RuleResult + Send + Sync,
{
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult {
        (self.0)(ctx, query)
    }
}

pub struct MutationRuleFunc<F>(F);

impl<F> MutationRuleFunc<F>
where
    F: Fn(&Context, &mut Mutation) -> RuleResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> MutationRule for MutationRuleFunc<F>
where
    F: Fn(&Context, &mut Mutation) -> RuleResult + Send + Sync,
{
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        (self.0)(ctx, mutation)
    }
}

/// Runs the wrapped rule only for the given operations and skips otherwise.
#[derive(Clone)]
pub struct OnMutationOperation {
    rule: Arc<dyn MutationRule>,
    op: Op,
}

impl MutationRule for OnMutationOperation {
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        if mutation.op().is(self.op) {
            self.rule.eval_mutation(ctx, mutation)
        } else {
            Ok(Decision::Skip)
        }
    }
}

pub fn on_mutation_operation<R: MutationRule + 'static>(rule: R, op: Op) -> OnMutationOperation {
    OnMutationOperation {
        rule: Arc::new(rule),
        op,
    }
}

/// Denies the given mutation operations.
pub fn deny_mutation_operation_rule(op: Op) -> OnMutationOperation {
    on_mutation_operation(
        MutationRuleFunc::new(|_: &Context, m: &mut Mutation| -> RuleResult {
            Ok(Decision::deny(format!("operation {} is not allowed", m.op())))
        }),
        op,
    )
}

/// A pending operation a filter rule can narrow.
pub trait Filter {
    fn entity(&self) -> &str;

    /// AND a predicate into the operation's filter.
    fn where_p(&mut self, pred: Predicate);
}

impl Filter for Query {
    fn entity(&self) -> &str {
        Query::entity(self)
    }

    fn where_p(&mut self, pred: Predicate) {
        Query::where_p(self, pred);
    }
}

impl Filter for Mutation {
    fn entity(&self) -> &str {
        Mutation::entity(self)
    }

    fn where_p(&mut self, pred: Predicate) {
        Mutation::where_p(self, pred);
    }
}

/// Narrows queries and mutations instead of deciding on them.
///
/// The function usually returns `Skip` after adding predicates, so later
/// rules see the narrowed operation.
pub struct FilterRule<F>(F);

impl<F> FilterRule<F>
where
    F: Fn(&Context, &mut dyn Filter) -> RuleResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> QueryRule for FilterRule<F>
where
    F: Fn(&Context, &mut dyn Filter) -> RuleResult + Send + Sync,
{
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult {
        let filter: &mut dyn Filter = query;
        (self.0)(ctx, filter)
    }
}

impl<F> MutationRule for FilterRule<F>
where
    F: Fn(&Context, &mut dyn Filter) -> RuleResult + Send + Sync,
{
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        let filter: &mut dyn Filter = mutation;
        (self.0)(ctx, filter)
    }
}
