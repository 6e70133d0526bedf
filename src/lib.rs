//! Entity-graph storage core on SQLite.
//!
//! Entity types are nodes, their relations are typed edges. The [`graph`]
//! compiler turns one create, update, delete or query over a node and its
//! edges into SQL statements executed in a single transaction; the [`privacy`]
//! engine evaluates ordered allow/deny/skip rules before every operation.
//! [`Client`] ties both to registered [`EntityType`]s.
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod client;
pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod fault_injection;
pub mod graph;
pub mod privacy;
pub mod sql;
pub mod value;

pub use crate::client::{
    Client, EdgeDescriptor, EntityType, FieldDescriptor, HookFunc, Mutation, MutationHook, Query,
};
pub use crate::config::{BatchConfig, ClientConfig, PolicyFallback, SqliteConfig, open_client};
pub use crate::context::{CancelHandle, Context};
pub use crate::driver::{Driver, DriverMetricsSnapshot, TxGuard};
pub use crate::errors::EntGraphError;
pub use crate::graph::{EdgeStorage, Record, Rel};
pub use crate::privacy::{
    Decision, MutationPolicy, MutationRule, Op, Policies, Policy, PolicyEngine, QueryPolicy,
    QueryRule, RuleResult,
};
pub use crate::sql::{OnConflict, Order, Predicate, Resolve};
pub use crate::value::{FieldType, Value};
