mod common;

use std::sync::Arc;

use common::{client, create_named, ctx};
use entgraph::{Client, Mutation, Order, Predicate, Query, Value};

/// Two users in GitHub, one of them also in GitLab, and pets for the first.
fn seeded() -> (Client, Vec<Value>, Vec<Value>) {
    let client = client();
    let github = create_named(&client, "Group", "name", "GitHub");
    let gitlab = create_named(&client, "Group", "name", "GitLab");
    let pedro = create_named(&client, "Pet", "name", "pedro");
    let xabi = create_named(&client, "Pet", "name", "xabi");
    let a8m = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "a8m")
                .set("age", 30)
                .add_edge("groups", [github.clone(), gitlab.clone()])
                .add_edge("pets", [pedro, xabi]),
        )
        .expect("a8m");
    let nati = client
        .create(
            &ctx(),
            Mutation::create("User")
                .set("name", "nati")
                .set("age", 28)
                .add_edge("groups", [github.clone()]),
        )
        .expect("nati");
    let alex = client
        .create(
            &ctx(),
            Mutation::create("User").set("name", "alex").set("age", 28),
        )
        .expect("alex");
    (client, vec![a8m, nati, alex], vec![github, gitlab])
}

fn names(records: &[entgraph::Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[test]
fn test_query_orders_and_pages() {
    let (client, _, _) = seeded();
    let all = client
        .query(&ctx(), Query::new("User").order(Order::asc("name")))
        .expect("query");
    assert_eq!(names(&all), ["a8m", "alex", "nati"]);

    let page = client
        .query(
            &ctx(),
            Query::new("User")
                .order(Order::desc("age"))
                .order(Order::asc("name"))
                .limit(2)
                .offset(1),
        )
        .expect("page");
    assert_eq!(names(&page), ["alex", "nati"]);

    let tail = client
        .query(
            &ctx(),
            Query::new("User").order(Order::asc("id")).offset(2),
        )
        .expect("offset only");
    assert_eq!(names(&tail), ["alex"]);
}

#[test]
fn test_only_and_first() {
    let (client, _, _) = seeded();
    let err = client
        .only(&ctx(), Query::new("User").where_(Predicate::eq("age", 28)))
        .unwrap_err();
    assert!(err.is_not_singular());
    let err = client
        .only(&ctx(), Query::new("User").where_(Predicate::eq("age", 99)))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(
        client
            .first(&ctx(), Query::new("User").where_(Predicate::eq("age", 99)))
            .expect("first")
            .is_none()
    );
    let first = client
        .first(&ctx(), Query::new("User").order(Order::asc("name")))
        .expect("first")
        .expect("some user");
    assert_eq!(first.get("name"), Some(&Value::from("a8m")));
}

#[test]
fn test_count_and_exists_ignore_paging() {
    let (client, _, _) = seeded();
    let count = client
        .count(&ctx(), Query::new("User").limit(1).order(Order::asc("id")))
        .expect("count");
    assert_eq!(count, 3);
    assert!(
        client
            .exists(&ctx(), Query::new("User").where_(Predicate::has_prefix("name", "a")))
            .expect("exists")
    );
    assert!(
        !client
            .exists(&ctx(), Query::new("User").where_(Predicate::contains("name", "zz")))
            .expect("exists")
    );
}

#[test]
fn test_eager_load_o2m_gives_every_record_an_entry() {
    let (client, users, _) = seeded();
    let records = client
        .query(
            &ctx(),
            Query::new("User").order(Order::asc("id")).with_edge("pets"),
        )
        .expect("query");
    assert_eq!(records.len(), 3);
    let pets: Vec<&str> = records[0]
        .edge("pets")
        .iter()
        .filter_map(|p| p.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(pets, ["pedro", "xabi"]);
    for record in &records[1..] {
        assert!(record.edges.contains_key("pets"));
        assert!(record.edge("pets").is_empty());
    }
    assert_eq!(records[0].get("id"), Some(&users[0]));
}

#[test]
fn test_eager_load_m2m_shares_targets() {
    let (client, _, groups) = seeded();
    let records = client
        .query(
            &ctx(),
            Query::new("User").order(Order::asc("id")).with_edge("groups"),
        )
        .expect("query");
    let a8m_groups = records[0].edge("groups");
    let nati_groups = records[1].edge("groups");
    assert_eq!(a8m_groups.len(), 2);
    assert_eq!(nati_groups.len(), 1);
    assert_eq!(a8m_groups[0].get("id"), Some(&groups[0]));
    assert_eq!(a8m_groups[1].get("id"), Some(&groups[1]));
    // GitHub is loaded once and shared by both owners.
    assert!(Arc::ptr_eq(&a8m_groups[0], &nati_groups[0]));
    assert!(records[2].edge("groups").is_empty());
}

#[test]
fn test_eager_load_with_predicates() {
    let (client, _, _) = seeded();
    let records = client
        .query(
            &ctx(),
            Query::new("User")
                .where_(Predicate::eq("name", "a8m"))
                .with_edge_where("groups", vec![Predicate::eq("name", "GitLab")]),
        )
        .expect("query");
    let groups = records[0].edge("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].get("name"), Some(&Value::from("GitLab")));
}

#[test]
fn test_eager_load_to_one_edges() {
    let (client, users, _) = seeded();
    let pets = client
        .query(
            &ctx(),
            Query::new("Pet").order(Order::asc("id")).with_edge("owner"),
        )
        .expect("pets");
    assert_eq!(pets.len(), 2);
    for pet in &pets {
        let owner = pet.edge("owner");
        assert_eq!(owner.len(), 1);
        assert_eq!(owner[0].get("id"), Some(&users[0]));
    }
    assert!(Arc::ptr_eq(&pets[0].edge("owner")[0], &pets[1].edge("owner")[0]));

    let card = create_named(&client, "Card", "number", "4242");
    client
        .update_one(
            &ctx(),
            Mutation::update_one("User", users[1].clone()).add_edge("card", [card.clone()]),
        )
        .expect("card");
    let users = client
        .query(
            &ctx(),
            Query::new("User").order(Order::asc("id")).with_edge("card"),
        )
        .expect("users");
    assert!(users[0].edge("card").is_empty());
    assert_eq!(users[1].edge("card")[0].get("id"), Some(&card));
}

#[test]
fn test_eager_load_serializes_to_json() {
    let (client, _, _) = seeded();
    let records = client
        .query(
            &ctx(),
            Query::new("User")
                .where_(Predicate::eq("name", "nati"))
                .with_edge("groups"),
        )
        .expect("query");
    let json = serde_json::to_value(&records[0]).expect("json");
    assert_eq!(json["values"]["name"], "nati");
    assert_eq!(json["edges"]["groups"][0]["values"]["name"], "GitHub");
}

#[test]
fn test_has_edge_filters() {
    let (client, _, _) = seeded();
    let with_pets = client
        .query(&ctx(), Query::new("User").has_edge("pets"))
        .expect("has pets");
    assert_eq!(names(&with_pets), ["a8m"]);

    let in_gitlab = client
        .query(
            &ctx(),
            Query::new("User").has_edge_with("groups", vec![Predicate::eq("name", "GitLab")]),
        )
        .expect("gitlab");
    assert_eq!(names(&in_gitlab), ["a8m"]);

    let grouped = client
        .count(&ctx(), Query::new("User").has_edge("groups"))
        .expect("count");
    assert_eq!(grouped, 2);

    let owned = client
        .count(
            &ctx(),
            Query::new("Pet").has_edge_with("owner", vec![Predicate::eq("name", "a8m")]),
        )
        .expect("owned");
    assert_eq!(owned, 2);
}

#[test]
fn test_neighbors_over_inverse_edges() {
    let (client, users, groups) = seeded();
    let members = client
        .neighbors(&ctx(), "Group", groups[0].clone(), "users")
        .expect("members");
    assert_eq!(names(&members), ["a8m", "nati"]);

    let pets = client.query(&ctx(), Query::new("Pet")).expect("pets");
    let owner = client
        .neighbors(&ctx(), "Pet", pets[0].get("id").cloned().expect("pet id"), "owner")
        .expect("owner");
    assert_eq!(owner.len(), 1);
    assert_eq!(owner[0].get("id"), Some(&users[0]));
}

#[test]
fn test_query_neighbors_of_a_node_set() {
    let (client, users, _) = seeded();

    let pets = client
        .query_neighbors(&ctx(), Query::new("User"), "pets")
        .expect("o2m");
    assert_eq!(names(&pets), ["pedro", "xabi"]);
    let none = client
        .query_neighbors(&ctx(), Query::new("User").where_(Predicate::eq("age", 28)), "pets")
        .expect("o2m of petless users");
    assert!(none.is_empty());

    let owners = client
        .query_neighbors(&ctx(), Query::new("Pet"), "owner")
        .expect("m2o");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].get("id"), Some(&users[0]));

    let groups = client
        .query_neighbors(&ctx(), Query::new("User"), "groups")
        .expect("m2m");
    assert_eq!(names(&groups), ["GitHub", "GitLab"]);
    let younger = client
        .query_neighbors(&ctx(), Query::new("User").where_(Predicate::lt("age", 30)), "groups")
        .expect("m2m of younger users");
    assert_eq!(names(&younger), ["GitHub"]);

    // Paging of the source query bounds the source set.
    let first = client
        .query_neighbors(
            &ctx(),
            Query::new("User").order(Order::desc("name")).limit(1),
            "groups",
        )
        .expect("m2m of one user");
    assert_eq!(names(&first), ["GitHub"]);
}

#[test]
fn test_query_edges_requires_m2m() {
    let (client, _, _) = seeded();
    let err = client
        .query_edges(&ctx(), "User", "pets", None)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_unique_query_deduplicates() {
    let (client, _, _) = seeded();
    let count = client
        .count(&ctx(), Query::new("User").unique(true))
        .expect("count");
    assert_eq!(count, 3);
    let users = client
        .query(&ctx(), Query::new("User").unique(true))
        .expect("users");
    assert_eq!(users.len(), 3);
}

#[test]
fn test_query_unknown_entity_is_validation_error() {
    let client = client();
    let err = client.query(&ctx(), Query::new("Car")).unwrap_err();
    assert!(err.is_validation());
}
