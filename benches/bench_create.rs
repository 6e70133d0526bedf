use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use entgraph::{
    Client, ClientConfig, Context, EdgeDescriptor, EntityType, FieldDescriptor, FieldType,
    Mutation, Order, Query, Rel, Value,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const SEED: u64 = 0xE17A;
const GROUPS: usize = 16;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);
const SCALES: &[usize] = &[100, 1_000, 5_000];

const SCHEMA: &str = r#"
CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
CREATE TABLE groups (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE user_groups (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_id)
);
"#;

struct Fixture {
    client: Client,
    groups: Vec<Value>,
}

fn fixture() -> Fixture {
    let mut client = Client::open_in_memory(&ClientConfig::default()).expect("client");
    client.driver().execute_batch(SCHEMA).expect("schema");
    client
        .register(
            EntityType::new("User", "users")
                .field(FieldDescriptor::new("name", FieldType::String))
                .field(FieldDescriptor::new("age", FieldType::Int).optional())
                .edge(EdgeDescriptor::new(
                    "groups",
                    Rel::M2M,
                    "Group",
                    "user_groups",
                    ["user_id", "group_id"],
                )),
        )
        .register(
            EntityType::new("Group", "groups")
                .field(FieldDescriptor::new("name", FieldType::String)),
        );
    let ctx = Context::background();
    let groups = client
        .create_bulk(
            &ctx,
            (0..GROUPS)
                .map(|i| Mutation::create("Group").set("name", format!("group_{i}")))
                .collect(),
        )
        .expect("groups");
    Fixture { client, groups }
}

fn users(rng: &mut StdRng, groups: &[Value], count: usize) -> Vec<Mutation> {
    (0..count)
        .map(|i| {
            let group = groups[rng.gen_range(0..groups.len())].clone();
            Mutation::create("User")
                .set("name", format!("user_{i}"))
                .set("age", rng.gen_range(18_i64..90))
                .add_edge("groups", [group])
        })
        .collect()
}

fn bench_create_one_by_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_one_by_one");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &count in SCALES.iter().take(2) {
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                let fixture = fixture();
                let mut rng = StdRng::seed_from_u64(SEED + count as u64);
                let ctx = Context::background();
                for mutation in users(&mut rng, &fixture.groups, count) {
                    let _ = fixture.client.create(&ctx, mutation).expect("create");
                }
            });
        });
    }
    group.finish();
}

fn bench_create_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_bulk");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &count in SCALES {
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                let fixture = fixture();
                let mut rng = StdRng::seed_from_u64(SEED + count as u64);
                let batch = users(&mut rng, &fixture.groups, count);
                let _ = fixture
                    .client
                    .create_bulk(&Context::background(), batch)
                    .expect("bulk");
            });
        });
    }
    group.finish();
}

fn bench_eager_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_with_groups");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for &count in SCALES {
        let fixture = fixture();
        let mut rng = StdRng::seed_from_u64(SEED ^ count as u64);
        let batch = users(&mut rng, &fixture.groups, count);
        fixture
            .client
            .create_bulk(&Context::background(), batch)
            .expect("seed");
        group.bench_function(BenchmarkId::from_parameter(count), |b| {
            b.iter(|| {
                let records = fixture
                    .client
                    .query(
                        &Context::background(),
                        Query::new("User").order(Order::asc("id")).with_edge("groups"),
                    )
                    .expect("query");
                assert_eq!(records.len(), count);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_create_one_by_one,
    bench_create_bulk,
    bench_eager_load
);
criterion_main!(benches);
