mod common;

use std::time::{Duration, Instant};

use common::{client, count_rows, create_named, create_user, ctx};
use entgraph::{Client, ClientConfig, Context, EntGraphError, Mutation, Predicate, Query, Value};

#[test]
fn test_failed_join_insert_rolls_back_node() {
    let client = client();
    client
        .driver()
        .execute_batch(
            "CREATE TRIGGER no_closed_groups BEFORE INSERT ON user_groups
             WHEN NEW.group_id IN (SELECT id FROM groups WHERE name = 'closed')
             BEGIN SELECT RAISE(ABORT, 'group is closed'); END;",
        )
        .expect("trigger");
    let closed = create_named(&client, "Group", "name", "closed");
    let err = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "a8m")
                .add_edge("groups", [closed]),
        )
        .unwrap_err();
    assert!(err.is_constraint(), "unexpected {err:?}");
    assert_eq!(count_rows(&client, "users"), 0);
    assert_eq!(count_rows(&client, "user_groups"), 0);
    assert!(!client.driver().in_transaction());
}

#[test]
fn test_adding_owned_target_fails_atomically() {
    let client = client();
    let pet = create_named(&client, "Pet", "name", "pedro");
    let owner = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "a8m")
                .add_edge("pets", [pet.clone()]),
        )
        .expect("owner");

    let err = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "nati")
                .add_edge("pets", [pet.clone()]),
        )
        .unwrap_err();
    assert!(err.is_constraint(), "unexpected {err:?}");
    assert!(err.to_string().contains("already connected to a different owner_id"));
    assert_eq!(count_rows(&client, "users"), 1);

    let stored = client
        .only(&ctx(), Query::new("Pet").where_(Predicate::eq("id", pet)))
        .expect("pet");
    assert_eq!(stored.get("owner_id"), Some(&owner));
}

#[test]
fn test_failure_on_second_of_three_edges_rolls_back_the_whole_create() {
    let client = client();
    let github = create_named(&client, "Group", "name", "GitHub");
    let card = create_named(&client, "Card", "number", "4242");
    let pet = create_named(&client, "Pet", "name", "pedro");
    client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "a8m")
                .add_edge("pets", [pet.clone()]),
        )
        .expect("owner");
    client.driver().reset_metrics();

    // The join rows go in first, the owned pet fails, the card is never reached.
    let err = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "nati")
                .add_edge("groups", [github])
                .add_edge("pets", [pet])
                .add_edge("card", [card.clone()]),
        )
        .unwrap_err();
    assert!(err.is_constraint(), "unexpected {err:?}");
    assert_eq!(count_rows(&client, "users"), 1);
    assert_eq!(count_rows(&client, "user_groups"), 0);
    let card = client
        .only(&ctx(), Query::new("Card").where_(Predicate::eq("id", card)))
        .expect("card");
    assert_eq!(card.get("owner_id"), Some(&Value::Null));
    assert!(!client.driver().in_transaction());
    let snapshot = client.driver().metrics_snapshot();
    assert_eq!(snapshot.tx_begin_count, 1);
    assert_eq!(snapshot.tx_rollback_count, 1);
}

#[test]
fn test_deadline_passing_between_statements_rolls_back() {
    let client = client();
    let github = create_named(&client, "Group", "name", "GitHub");
    // The node insert outlives the deadline, so the edge statement is refused.
    client
        .driver()
        .execute_batch(
            "CREATE TABLE spin (n INTEGER);
             INSERT INTO spin (n)
                 WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 300)
                 SELECT x FROM c;
             CREATE TRIGGER slow_users AFTER INSERT ON users
             BEGIN SELECT count(*) FROM spin a, spin b, spin c WHERE a.n + b.n + c.n > 0; END;",
        )
        .expect("slow trigger");

    let timed = Context::background().with_timeout(Duration::from_millis(20));
    let err = client
        .create(
            &timed,
            Mutation::create("User")
                .set("name", "a8m")
                .add_edge("groups", [github]),
        )
        .unwrap_err();
    assert!(err.is_canceled(), "unexpected {err:?}");
    assert_eq!(count_rows(&client, "users"), 0);
    assert_eq!(count_rows(&client, "user_groups"), 0);
    assert!(!client.driver().in_transaction());
}

#[test]
fn test_o2o_target_is_guarded() {
    let client = client();
    let card = create_named(&client, "Card", "number", "4242");
    let a8m = create_user(&client, "a8m");
    let nati = create_user(&client, "nati");
    client
        .update_one(
            &ctx(),
            Mutation::update_one("User", a8m.clone()).add_edge("card", [card.clone()]),
        )
        .expect("attach");
    let err = client
        .update_one(
            &ctx(),
            Mutation::update_one("User", nati.clone())
                .set("nickname", "n")
                .add_edge("card", [card.clone()]),
        )
        .unwrap_err();
    assert!(err.is_constraint(), "unexpected {err:?}");
    let nati = client
        .only(&ctx(), Query::new("User").where_(Predicate::eq("id", nati)))
        .expect("nati");
    assert_eq!(nati.get("nickname"), Some(&Value::Null));
    let card = client
        .only(&ctx(), Query::new("Card").where_(Predicate::eq("id", card)))
        .expect("card");
    assert_eq!(card.get("owner_id"), Some(&a8m));
}

#[test]
fn test_canceled_context_writes_nothing() {
    let client = client();
    let (canceled, handle) = Context::background().with_cancel();
    handle.cancel();
    let err = client
        .create(&canceled, Mutation::create("User").set("name", "a8m"))
        .unwrap_err();
    assert!(err.is_canceled());

    let expired = Context::background().with_deadline(Instant::now() - Duration::from_millis(1));
    let err = client
        .create_bulk(
            &expired,
            vec![
                Mutation::create("User").set("name", "a"),
                Mutation::create("User").set("name", "b"),
            ],
        )
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(count_rows(&client, "users"), 0);
}

#[test]
fn test_client_transaction_commits_and_rolls_back() {
    let client = client();
    let ids = client
        .transaction(&ctx(), |tx: &Client| {
            let a = create_user(tx, "a8m");
            let b = create_user(tx, "nati");
            Ok(vec![a, b])
        })
        .expect("commit");
    assert_eq!(ids.len(), 2);
    assert_eq!(count_rows(&client, "users"), 2);

    let err = client
        .transaction(&ctx(), |tx: &Client| -> Result<(), EntGraphError> {
            create_user(tx, "alex");
            Err(EntGraphError::validation("name", "abort"))
        })
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(count_rows(&client, "users"), 2);
    assert!(!client.driver().in_transaction());
}

#[test]
fn test_failed_operation_inside_transaction_rolls_back_alone() {
    let client = client();
    let pet = create_named(&client, "Pet", "name", "pedro");
    create_user(&client, "owner");
    client
        .update(
            &ctx(),
            Mutation::update("User")
                .where_(Predicate::eq("name", "owner"))
                .add_edge("pets", [pet.clone()]),
        )
        .expect("owner");

    client
        .transaction(&ctx(), |tx: &Client| {
            create_user(tx, "a8m");
            let err = tx
                .create(
                    &ctx(),
                    Mutation::create("User")
                        .set("name", "nati")
                        .add_edge("pets", [pet.clone()]),
                )
                .unwrap_err();
            assert!(err.is_constraint());
            assert!(tx.driver().in_transaction());
            Ok(())
        })
        .expect("outer commit");
    let names: Vec<String> = client
        .query(&ctx(), Query::new("User").order(entgraph::Order::asc("id")))
        .expect("users")
        .iter()
        .filter_map(|u| u.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(names, ["owner", "a8m"]);
}

#[test]
fn test_metrics_count_transactions() {
    let client = Client::open_in_memory(&ClientConfig::default()).expect("client");
    client.driver().execute_batch(common::SCHEMA).expect("schema");
    let mut client = client;
    client.register(common::user()).register(common::group());

    let group = client
        .create(&ctx(), Mutation::create("Group").set("name", "GitHub"))
        .expect("group");
    client.driver().reset_metrics();

    // A node without external edges is a single statement.
    create_user(&client, "a8m");
    let snapshot = client.driver().metrics_snapshot();
    assert_eq!(snapshot.tx_begin_count, 0);

    client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "nati")
                .add_edge("groups", [group]),
        )
        .expect("with edge");
    let snapshot = client.driver().metrics_snapshot();
    assert_eq!(snapshot.tx_begin_count, 1);
    assert_eq!(snapshot.tx_commit_count, 1);
    assert_eq!(snapshot.tx_rollback_count, 0);

    client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "alex")
                .add_edge("groups", [Value::Int(404)]),
        )
        .expect_err("missing group");
    let snapshot = client.driver().metrics_snapshot();
    assert_eq!(snapshot.tx_begin_count, 2);
    assert_eq!(snapshot.tx_rollback_count, 1);
    assert_eq!(count_rows(&client, "users"), 2);
}
