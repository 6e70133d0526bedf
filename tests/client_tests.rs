mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use common::{client, client_with, count_rows, create_named, ctx, planet, user};
use entgraph::{
    Client, ClientConfig, Context, Decision, EntGraphError, HookFunc, Mutation, MutationPolicy,
    Op, Policy, PolicyFallback, Predicate, Query, QueryPolicy, RuleResult, Value,
    privacy::{
        AlwaysAllowRule, AlwaysDenyRule, Filter, FilterRule, QueryRuleFunc,
        deny_mutation_operation_rule,
    },
};

#[test]
fn test_planet_update_denied_by_always_deny_rule() {
    let guarded = client_with(
        ClientConfig::default(),
        vec![Policy::mutation(MutationPolicy::new().rule(AlwaysDenyRule))],
    );
    let err = guarded
        .create(&ctx(), Mutation::create("Planet").set("name", "Earth"))
        .unwrap_err();
    assert!(err.is_denied());
    let earth = guarded
        .create(
            &Context::background().with_decision(Decision::Allow),
            Mutation::create("Planet").set("name", "Earth"),
        )
        .expect("seed");

    let err = guarded
        .update_one(
            &ctx(),
            Mutation::update_one("Planet", earth.clone()).set("name", "Mars"),
        )
        .unwrap_err();
    assert!(err.is_denied(), "unexpected {err:?}");
    let stored = guarded
        .only(&ctx(), Query::new("Planet").where_(Predicate::eq("id", &earth)))
        .expect("planet");
    assert_eq!(stored.get("name"), Some(&Value::from("Earth")));

    // Other entities are not affected by the planet policy.
    guarded
        .create(&ctx(), Mutation::create("User").set("name", "a8m"))
        .expect("user create");
}

#[test]
fn test_filter_rule_narrows_queries_and_mutations() {
    let adults = FilterRule::new(|_: &Context, f: &mut dyn Filter| -> RuleResult {
        f.where_p(Predicate::gte("age", 18));
        Ok(Decision::Skip)
    });
    let client = client_with(
        ClientConfig::default(),
        vec![Policy::new(
            QueryPolicy::new().rule(adults),
            MutationPolicy::new().rule(FilterRule::new(
                |_: &Context, f: &mut dyn Filter| -> RuleResult {
                    f.where_p(Predicate::gte("age", 18));
                    Ok(Decision::Skip)
                },
            )),
        )],
    );
    for (name, age) in [("young", 4), ("old", 4_500), ("ancient", 13_000)] {
        client
            .create(
                &ctx(),
                Mutation::create("Planet").set("name", name).set("age", age),
            )
            .expect("planet");
    }
    assert_eq!(count_rows(&client, "planets"), 3);
    assert_eq!(client.count(&ctx(), Query::new("Planet")).expect("count"), 2);

    let affected = client
        .delete(&ctx(), Mutation::delete("Planet"))
        .expect("delete");
    assert_eq!(affected, 2);
    assert_eq!(count_rows(&client, "planets"), 1);
}

#[test]
fn test_operation_denied_through_client() {
    let client = client_with(
        ClientConfig::default(),
        vec![Policy::mutation(
            MutationPolicy::new().rule(deny_mutation_operation_rule(Op::DELETE | Op::DELETE_ONE)),
        )],
    );
    let earth = create_named(&client, "Planet", "name", "Earth");
    let err = client
        .delete_one(&ctx(), Mutation::delete_one("Planet", earth))
        .unwrap_err();
    assert!(err.is_denied());
    assert_eq!(count_rows(&client, "planets"), 1);
}

#[test]
fn test_deny_fallback_requires_explicit_allow() {
    let config = ClientConfig::default().with_policy_fallback(PolicyFallback::Deny);
    let client = client_with(
        config,
        vec![Policy::query(QueryPolicy::new().rule(AlwaysAllowRule))],
    );
    let err = client
        .create(&ctx(), Mutation::create("Planet").set("name", "Earth"))
        .unwrap_err();
    assert!(err.is_denied());
    assert_eq!(client.count(&ctx(), Query::new("Planet")).expect("count"), 0);

    let system = Context::background().with_decision(Decision::Allow);
    client
        .create(&system, Mutation::create("Planet").set("name", "Earth"))
        .expect("pinned allow");
    assert_eq!(count_rows(&client, "planets"), 1);
}

#[test]
fn test_hooks_modify_mutation_and_nested_queries_hit_cache() {
    let planet_queries = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&planet_queries);
    let seen_planets = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&seen_planets);

    let mut client = Client::open_in_memory(&ClientConfig::default()).expect("client");
    client
        .driver()
        .execute_batch(common::SCHEMA)
        .expect("schema");
    client.register(planet().policy(Policy::query(QueryPolicy::new().rule(
        QueryRuleFunc::new(move |_: &Context, _: &mut Query| -> RuleResult {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Decision::Allow)
        }),
    ))));
    client.register(user().hook(HookFunc::new(
        move |ctx: &Context, client: &Client, m: &mut Mutation| -> Result<(), EntGraphError> {
            let planets = client.count(ctx, Query::new("Planet"))?;
            seen.store(planets, Ordering::SeqCst);
            if m.field("nickname").is_none() {
                let name = m.field("name").cloned().unwrap_or(Value::Null);
                m.set_field("nickname", name);
            }
            Ok(())
        },
    )));

    client
        .create(
            &Context::background().with_decision(Decision::Allow),
            Mutation::create("Planet").set("name", "Earth"),
        )
        .expect("planet");
    let id = client
        .create(&ctx(), Mutation::create("User").set("name", "a8m"))
        .expect("user");

    // The hook's count ran under the user mutation's cached decision.
    assert_eq!(planet_queries.load(Ordering::SeqCst), 0);
    assert_eq!(seen_planets.load(Ordering::SeqCst), 1);
    let user = client
        .only(&ctx(), Query::new("User").where_(Predicate::eq("id", id)))
        .expect("user");
    assert_eq!(user.get("nickname"), Some(&Value::from("a8m")));

    client.count(&ctx(), Query::new("Planet")).expect("count");
    assert_eq!(planet_queries.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_hook_aborts_mutation() {
    let mut client = client();
    client.register(user().hook(HookFunc::new(
        |_: &Context, _: &Client, m: &mut Mutation| -> Result<(), EntGraphError> {
            match m.field("name").and_then(Value::as_str) {
                Some(name) if name.len() < 2 => {
                    Err(EntGraphError::validation("name", "too short"))
                }
                _ => Ok(()),
            }
        },
    )));
    let err = client
        .create(&ctx(), Mutation::create("User").set("name", "a"))
        .unwrap_err();
    assert_eq!(err, EntGraphError::validation("name", "too short"));
    assert_eq!(count_rows(&client, "users"), 0);
    client
        .create(&ctx(), Mutation::create("User").set("name", "a8m"))
        .expect("valid name");
}

#[test]
fn test_mismatched_operation_is_rejected() {
    let client = client();
    let err = client
        .update(&ctx(), Mutation::create("User").set("name", "a8m"))
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("expected OpUpdate, got OpCreate"));
    let err = client
        .create(&ctx(), Mutation::create("Car").set("name", "a8m"))
        .unwrap_err();
    assert!(err.to_string().contains("unknown entity type"));
}

#[test]
fn test_file_backed_client_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ent.db");
    {
        let mut client = entgraph::open_client(&path, &ClientConfig::default()).expect("open");
        client.driver().execute_batch(common::SCHEMA).expect("schema");
        client.register(planet());
        client
            .create(&ctx(), Mutation::create("Planet").set("name", "Earth"))
            .expect("create");
    }
    let mut client = Client::open(&path, &ClientConfig::default()).expect("reopen");
    client.register(planet());
    let earth = client.only(&ctx(), Query::new("Planet")).expect("earth");
    assert_eq!(earth.get("name"), Some(&Value::from("Earth")));
}
