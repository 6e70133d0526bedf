//! Privacy policies evaluated before every query and mutation.
//!
//! A policy is an ordered list of rules. Each rule returns a [`Decision`]:
//! `Allow` and `Deny` end the evaluation, `Skip` hands over to the next rule.
//! The [`PolicyEngine`] applies the configured [`PolicyFallback`] when every
//! rule skips and caches the terminal outcome in the [`Context`], so nested
//! operations on the same context replay it without running rules again.

mod op;
mod rules;

use std::sync::Arc;

use tracing::debug;

pub use op::Op;
pub use rules::{
    AlwaysAllowRule, AlwaysDenyRule, ContextRule, Filter, FilterRule, MutationRuleFunc,
    OnMutationOperation, QueryRuleFunc, deny_mutation_operation_rule, on_mutation_operation,
};

pub use crate::config::PolicyFallback;
use crate::{
    client::{Mutation, Query},
    context::Context,
    errors::EntGraphError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
    Skip,
}

impl Decision {
    pub fn deny<T: Into<String>>(reason: T) -> Self {
        Decision::Deny(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Decision::Skip)
    }
}

/// Outcome of one rule. An `Err` ends the evaluation like a deny.
pub type RuleResult = Result<Decision, EntGraphError>;

pub trait QueryRule: Send + Sync {
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult;
}

pub trait MutationRule: Send + Sync {
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult;
}

/// Query rules in evaluation order.
#[derive(Clone, Default)]
pub struct QueryPolicy {
    rules: Vec<Arc<dyn QueryRule>>,
}

impl QueryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule<R: QueryRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl QueryRule for QueryPolicy {
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult {
        for rule in &self.rules {
            match rule.eval_query(ctx, query)? {
                Decision::Skip => continue,
                decision => return Ok(decision),
            }
        }
        Ok(Decision::Skip)
    }
}

/// Mutation rules in evaluation order.
#[derive(Clone, Default)]
pub struct MutationPolicy {
    rules: Vec<Arc<dyn MutationRule>>,
}

impl MutationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule<R: MutationRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl MutationRule for MutationPolicy {
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        for rule in &self.rules {
            match rule.eval_mutation(ctx, mutation)? {
                Decision::Skip => continue,
                decision => return Ok(decision),
            }
        }
        Ok(Decision::Skip)
    }
}

/// Query and mutation policies of one schema.
#[derive(Clone, Default)]
pub struct Policy {
    pub query: QueryPolicy,
    pub mutation: MutationPolicy,
}

impl Policy {
    pub fn new(query: QueryPolicy, mutation: MutationPolicy) -> Self {
        Self { query, mutation }
    }

    pub fn query(query: QueryPolicy) -> Self {
        Self::new(query, MutationPolicy::default())
    }

    pub fn mutation(mutation: MutationPolicy) -> Self {
        Self::new(QueryPolicy::default(), mutation)
    }
}

impl QueryRule for Policy {
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult {
        self.query.eval_query(ctx, query)
    }
}

impl MutationRule for Policy {
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        self.mutation.eval_mutation(ctx, mutation)
    }
}

/// Several policies evaluated as one, for example a schema's own policy
/// after those of its mixins. The first non-skip decision wins.
#[derive(Clone, Default)]
pub struct Policies {
    policies: Vec<Policy>,
}

impl Policies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl From<Vec<Policy>> for Policies {
    fn from(policies: Vec<Policy>) -> Self {
        Self { policies }
    }
}

impl QueryRule for Policies {
    fn eval_query(&self, ctx: &Context, query: &mut Query) -> RuleResult {
        for policy in &self.policies {
            match policy.eval_query(ctx, query)? {
                Decision::Skip => continue,
                decision => return Ok(decision),
            }
        }
        Ok(Decision::Skip)
    }
}

impl MutationRule for Policies {
    fn eval_mutation(&self, ctx: &Context, mutation: &mut Mutation) -> RuleResult {
        for policy in &self.policies {
            match policy.eval_mutation(ctx, mutation)? {
                Decision::Skip => continue,
                decision => return Ok(decision),
            }
        }
        Ok(Decision::Skip)
    }
}

/// Runs policies against pending operations and caches the outcome.
#[derive(Clone, Default)]
pub struct PolicyEngine {
    policies: Policies,
    fallback: PolicyFallback,
}

impl PolicyEngine {
    pub fn new(policies: Policies, fallback: PolicyFallback) -> Self {
        Self { policies, fallback }
    }

    pub fn fallback(&self) -> PolicyFallback {
        self.fallback
    }

    pub fn eval_query(&self, ctx: &mut Context, query: &mut Query) -> Result<(), EntGraphError> {
        let entity = query.entity().to_string();
        self.decide(ctx, &entity, "query", |ctx| self.policies.eval_query(ctx, query))
    }

    pub fn eval_mutation(
        &self,
        ctx: &mut Context,
        mutation: &mut Mutation,
    ) -> Result<(), EntGraphError> {
        let entity = mutation.entity().to_string();
        let op = mutation.op().to_string();
        self.decide(ctx, &entity, &op, |ctx| {
            self.policies.eval_mutation(ctx, mutation)
        })
    }

    fn decide<F>(
        &self,
        ctx: &mut Context,
        entity: &str,
        op: &str,
        eval: F,
    ) -> Result<(), EntGraphError>
    where
        F: FnOnce(&Context) -> RuleResult,
    {
        if let Some(cached) = ctx.decision() {
            debug!(entity, op, allowed = cached.is_ok(), "privacy decision replayed");
            return cached.clone();
        }
        let outcome = match eval(&*ctx) {
            Ok(Decision::Allow) => Ok(()),
            Ok(Decision::Deny(reason)) => Err(EntGraphError::denied(reason)),
            Ok(Decision::Skip) => match self.fallback {
                PolicyFallback::Allow => Ok(()),
                PolicyFallback::Deny => Err(EntGraphError::denied(
                    "no rule reached a terminal decision",
                )),
            },
            Err(err) => Err(err),
        };
        match &outcome {
            Ok(()) => debug!(entity, op, "privacy allowed"),
            Err(err) => debug!(entity, op, reason = %err, "privacy denied"),
        }
        ctx.cache_decision(outcome.clone());
        outcome
    }
}
