#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, OnceLock};

use entgraph::{
    Client, ClientConfig, Context, EdgeDescriptor, EntityType, FieldDescriptor, FieldType,
    Mutation, Policy, Rel, Value,
    sql::{SelectItem, Selector},
};

pub const SCHEMA: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER,
    nickname TEXT,
    spouse_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL
);
CREATE TABLE posts (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    author_id INTEGER REFERENCES users(id) ON DELETE CASCADE
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    body TEXT NOT NULL,
    post_id INTEGER REFERENCES posts(id) ON DELETE CASCADE
);
CREATE TABLE groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE user_groups (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, group_id)
);
CREATE TABLE user_friends (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    friend_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, friend_id)
);
CREATE TABLE pets (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    owner_id INTEGER REFERENCES users(id) ON DELETE SET NULL
);
CREATE TABLE cards (
    id INTEGER PRIMARY KEY,
    number TEXT NOT NULL,
    owner_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL
);
CREATE TABLE planets (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    age INTEGER
);
"#;

pub fn user() -> EntityType {
    EntityType::new("User", "users")
        .field(FieldDescriptor::new("name", FieldType::String))
        .field(FieldDescriptor::new("age", FieldType::Int).optional())
        .field(FieldDescriptor::new("nickname", FieldType::String).optional())
        .edge(EdgeDescriptor::new("pets", Rel::O2M, "Pet", "pets", ["owner_id"]))
        .edge(EdgeDescriptor::new("posts", Rel::O2M, "Post", "posts", ["author_id"]))
        .edge(EdgeDescriptor::new(
            "groups",
            Rel::M2M,
            "Group",
            "user_groups",
            ["user_id", "group_id"],
        ))
        .edge(
            EdgeDescriptor::new(
                "friends",
                Rel::M2M,
                "User",
                "user_friends",
                ["user_id", "friend_id"],
            )
            .bidi(),
        )
        .edge(EdgeDescriptor::new("card", Rel::O2O, "Card", "cards", ["owner_id"]))
        .edge(EdgeDescriptor::new("spouse", Rel::O2O, "User", "users", ["spouse_id"]).bidi())
}

pub fn post() -> EntityType {
    EntityType::new("Post", "posts")
        .field(FieldDescriptor::new("title", FieldType::String))
        .edge(EdgeDescriptor::new("author", Rel::M2O, "User", "posts", ["author_id"]).inverse())
        .edge(EdgeDescriptor::new("comments", Rel::O2M, "Comment", "comments", ["post_id"]))
}

pub fn comment() -> EntityType {
    EntityType::new("Comment", "comments")
        .field(FieldDescriptor::new("body", FieldType::String))
        .edge(EdgeDescriptor::new("post", Rel::M2O, "Post", "comments", ["post_id"]).inverse())
}

pub fn group() -> EntityType {
    EntityType::new("Group", "groups")
        .field(FieldDescriptor::new("name", FieldType::String))
        .edge(
            EdgeDescriptor::new("users", Rel::M2M, "User", "user_groups", ["user_id", "group_id"])
                .inverse(),
        )
}

pub fn pet() -> EntityType {
    EntityType::new("Pet", "pets")
        .field(FieldDescriptor::new("name", FieldType::String))
        .edge(EdgeDescriptor::new("owner", Rel::M2O, "User", "pets", ["owner_id"]).inverse())
}

pub fn card() -> EntityType {
    EntityType::new("Card", "cards")
        .field(FieldDescriptor::new("number", FieldType::String).immutable())
        .edge(EdgeDescriptor::new("owner", Rel::O2O, "User", "cards", ["owner_id"]).inverse())
}

pub fn planet() -> EntityType {
    EntityType::new("Planet", "planets")
        .field(FieldDescriptor::new("name", FieldType::String))
        .field(FieldDescriptor::new("age", FieldType::Int).optional())
}

/// In-memory client with the schema created and every entity registered.
pub fn client() -> Client {
    client_with(ClientConfig::default(), Vec::new())
}

/// Client whose `Planet` entity carries `planet_policies`.
pub fn client_with(config: ClientConfig, planet_policies: Vec<Policy>) -> Client {
    let mut client = Client::open_in_memory(&config).expect("open client");
    client.driver().execute_batch(SCHEMA).expect("schema");
    let mut planet = planet();
    for policy in planet_policies {
        planet = planet.policy(policy);
    }
    client
        .register(user())
        .register(post())
        .register(comment())
        .register(group())
        .register(pet())
        .register(card())
        .register(planet);
    client
}

pub fn ctx() -> Context {
    Context::background()
}

pub fn create_user(client: &Client, name: &str) -> Value {
    client
        .create(&ctx(), Mutation::create("User").set("name", name))
        .expect("create user")
}

pub fn create_named(client: &Client, entity: &str, field: &str, value: &str) -> Value {
    client
        .create(&ctx(), Mutation::create(entity).set(field, value))
        .expect("create node")
}

pub fn count_rows(client: &Client, table: &str) -> usize {
    let mut count = Selector::new(table);
    count.set_items(vec![SelectItem::Count]);
    client
        .driver()
        .query_count(&ctx(), &count.build())
        .expect("count rows")
}

/// Serializes tests that configure the process-wide fault registry.
pub fn fault_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
