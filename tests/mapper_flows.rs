//! Integration tests for the mapping layer
//!
//! These drive the repository and link engine end to end over a scripted
//! executor, checking the exact statement text and argument lists that
//! reach the backend as well as the entity state coming back:
//! - CRUD statement shapes and validation guards
//! - codec passes and diff tracking on read entities
//! - relationship resolution (preloads, queries, partial failure)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use rowlink::{
    Condition, Entity, EntitySchema, Error, ExecResult, Executor, FieldSpec, LinkEngine, OrderBy,
    Registry, Relation, Repository, Result, Row, Codec,
};

// ============================================================================
// Scripted executor
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Call {
    sql: String,
    args: Vec<Value>,
}

/// Executor double that records every statement and replays scripted
/// results in order.
#[derive(Default)]
struct ScriptedExecutor {
    calls: Mutex<Vec<Call>>,
    fetch_results: Mutex<VecDeque<Result<Vec<Row>>>>,
    exec_results: Mutex<VecDeque<Result<ExecResult>>>,
}

impl ScriptedExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push_rows(&self, rows: &[Value]) {
        let rows: Vec<Row> = rows
            .iter()
            .map(|row| match row {
                Value::Object(map) => map.clone(),
                _ => panic!("scripted rows must be objects"),
            })
            .collect();
        self.fetch_results.lock().unwrap().push_back(Ok(rows));
    }

    fn push_fetch_error(&self, message: &str) {
        self.fetch_results
            .lock()
            .unwrap()
            .push_back(Err(Error::backend(message)));
    }

    fn push_exec(&self, last_insert_id: u64, rows_affected: u64) {
        self.exec_results.lock().unwrap().push_back(Ok(ExecResult {
            last_insert_id,
            rows_affected,
        }));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        self.fetch_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        self.exec_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecResult::default()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn model_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new("models", &["id", "a", "b", "jsonfield"])
            .with_plural("models")
            .with_serialized("jsonfield", Codec::Json),
    )
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

// ============================================================================
// Select
// ============================================================================

#[tokio::test]
async fn select_composes_statement_and_tracks_results() {
    let executor = ScriptedExecutor::new();
    executor.push_rows(&[json!({"id": 1, "a": "x", "jsonfield": "{\"k\":[1]}"})]);
    let repository = Repository::new(executor.clone());

    let entities = repository
        .find(&model_schema())
        .filter([Condition::new("a", json!("x"))])
        .order_by(OrderBy::Columns(vec!["-id".to_string()]))
        .paginate(0, 10)
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "SELECT * FROM `models` WHERE `a` = ? ORDER BY `id` DESC LIMIT 0, 10".to_string(),
            args: vec![json!("x")],
        }]
    );

    assert_eq!(entities.len(), 1);
    let entity = &entities[0];
    // codec field decoded on the way in
    assert_eq!(entity.get("jsonfield"), Some(&json!({"k": [1]})));
    // diff baseline captured at load time
    assert!(entity.original().is_some());
    assert!(entity.changes().is_empty());
}

#[tokio::test]
async fn select_applies_default_page_size_when_offset_only() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    repository
        .find(&model_schema())
        .offset(100)
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(
        executor.calls()[0].sql,
        "SELECT * FROM `models` LIMIT 100, 100"
    );
}

#[tokio::test]
async fn select_honours_a_configured_page_size() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone()).with_page_size(25);

    repository
        .find(&model_schema())
        .offset(50)
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(executor.calls()[0].sql, "SELECT * FROM `models` LIMIT 50, 25");
}

#[tokio::test]
async fn select_projects_dotted_fields() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    repository
        .find(&model_schema())
        .filter([Condition::new("jsonfield.k", json!(2))])
        .fields(FieldSpec::Many(vec!["id".to_string(), "jsonfield.k".to_string()]))
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(
        executor.calls()[0].sql,
        "SELECT `id`, `jsonfield`->>\"$.k\" as `jsonfield.k` FROM `models` WHERE `jsonfield`->>\"$.k\" = ?"
    );
}

#[tokio::test]
async fn backend_failures_surface_as_backend_errors() {
    let executor = ScriptedExecutor::new();
    executor.push_fetch_error("ER_NO_SUCH_TABLE: Table 'x.models' doesn't exist");
    let repository = Repository::new(executor.clone());

    let result = repository.find(&model_schema()).fetch_all().await;
    assert_matches!(result, Err(Error::Backend { message }) if message.contains("ER_NO_SUCH_TABLE"));
}

// ============================================================================
// Insert / update / delete
// ============================================================================

#[tokio::test]
async fn insert_encodes_and_returns_the_new_identity() {
    let executor = ScriptedExecutor::new();
    executor.push_exec(42, 1);
    let repository = Repository::new(executor.clone());

    let mut entity = Entity::new(
        model_schema(),
        object(json!({"a": "x", "jsonfield": {"k": [1]}})),
    );
    let id = repository.insert(&mut entity).await.unwrap();

    assert_eq!(id, 42);
    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "INSERT INTO `models` SET `a` = ?, `jsonfield` = ?".to_string(),
            args: vec![json!("x"), json!("{\"k\":[1]}")],
        }]
    );
}

#[tokio::test]
async fn insert_rejects_empty_entities_before_the_backend() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    let mut entity = Entity::empty(model_schema());
    let result = repository.insert(&mut entity).await;

    assert_matches!(result, Err(Error::EmptyValues));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn update_writes_only_the_changed_fields() {
    let executor = ScriptedExecutor::new();
    executor.push_exec(0, 1);
    let repository = Repository::new(executor.clone());

    let schema = model_schema();
    let mut entity = Entity::new(schema.clone(), object(json!({"id": 1, "a": "x", "b": 2})));
    entity.set_original(Entity::new(schema, object(json!({"id": 1, "a": "x", "b": 2}))));
    entity.set("a", json!("y"));

    let changed = repository.update(&mut entity).await.unwrap();
    assert!(changed);

    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "UPDATE `models` SET `a` = ? WHERE `id` = ?".to_string(),
            args: vec![json!("y"), json!(1)],
        }]
    );
}

#[tokio::test]
async fn update_requires_a_tracked_identity() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    let mut entity = Entity::new(model_schema(), object(json!({"id": 1, "a": "x"})));
    let result = repository.update(&mut entity).await;

    assert_matches!(result, Err(Error::MissingIdentity));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn update_rejects_an_empty_diff() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    let schema = model_schema();
    let mut entity = Entity::new(schema.clone(), object(json!({"id": 1, "a": "x"})));
    entity.set_original(Entity::new(schema, object(json!({"id": 1, "a": "x"}))));

    let result = repository.update(&mut entity).await;
    assert_matches!(result, Err(Error::NoChanges));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn delete_targets_the_identity_row() {
    let executor = ScriptedExecutor::new();
    executor.push_exec(0, 1);
    let repository = Repository::new(executor.clone());

    let entity = Entity::new(model_schema(), object(json!({"id": 5})));
    let removed = repository.delete(&entity).await.unwrap();

    assert!(removed);
    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "DELETE FROM `models` WHERE `id` = ?".to_string(),
            args: vec![json!(5)],
        }]
    );
}

#[tokio::test]
async fn delete_requires_an_identity() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    let entity = Entity::new(model_schema(), object(json!({"a": "x"})));
    assert_matches!(repository.delete(&entity).await, Err(Error::MissingIdentity));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn find_links_does_not_escape_the_raw_table_name() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());

    repository
        .find_links(
            "credit_map",
            &[Condition::new("gateway_id", json!(1))],
            &FieldSpec::One("organisation_id".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(
        executor.calls()[0].sql,
        "SELECT `organisation_id` FROM credit_map WHERE `gateway_id` = ?"
    );
}

// ============================================================================
// Link resolution
// ============================================================================

fn linked_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new("gateways", &["id", "name", "organisation_id"])
            .with_plural("gateways")
            .with_link(Relation::one_to_one("organisations", "organisation_id"))
            .with_link(Relation::many_to_many(
                "credits",
                "credit_id",
                "credit_map",
                "gateway_id",
            ))
            .with_link(Relation::one_to_many("webservices", "gateway_id")),
    )
}

fn webservice_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Arc::new(
        EntitySchema::new("webservices", &["id", "gateway_id"]).with_plural("webservices"),
    ));
    registry
}

#[tokio::test]
async fn one_to_one_moves_the_foreign_key_and_coerces_numeric_strings() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(
        linked_schema(),
        object(json!({"id": 1, "name": "gw", "organisation_id": "3"})),
    );
    let wire = engine.to_link(&entity, None).await;

    assert_eq!(
        Value::Object(wire),
        json!({"id": 1, "name": "gw", "links": {"organisations": 3}})
    );
    // one-to-one resolution never touches the backend
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn one_to_one_leaves_opaque_identifiers_untouched() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(
        linked_schema(),
        object(json!({"id": 1, "organisation_id": "org-7"})),
    );
    let wire = engine.to_link(&entity, None).await;

    assert_eq!(wire.get("links"), Some(&json!({"organisations": "org-7"})));
}

#[tokio::test]
async fn one_to_one_is_a_no_op_without_the_foreign_key() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(linked_schema(), object(json!({"id": 1, "name": "gw"})));
    let wire = engine.to_link(&entity, None).await;

    assert_eq!(
        Value::Object(wire),
        json!({"id": 1, "name": "gw", "links": {}})
    );
}

#[tokio::test]
async fn many_to_many_prefers_the_preloaded_relationship() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let mut entity = Entity::new(linked_schema(), object(json!({"id": 1})));
    entity.set_relationship("credit_map", vec![json!(2), json!(9)]);

    let wire = engine.to_link(&entity, Some(&["credits"])).await;

    assert_eq!(wire.get("links"), Some(&json!({"credits": [2, 9]})));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn many_to_many_issues_one_join_table_query_without_a_preload() {
    let executor = ScriptedExecutor::new();
    executor.push_rows(&[
        json!({"credit_id": 2}),
        json!({"credit_id": 9}),
    ]);
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(linked_schema(), object(json!({"id": 1})));
    let wire = engine.to_link(&entity, Some(&["credits"])).await;

    assert_eq!(wire.get("links"), Some(&json!({"credits": [2, 9]})));
    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "SELECT `credit_id` FROM credit_map WHERE `gateway_id` = ?".to_string(),
            args: vec![json!(1)],
        }]
    );
}

#[tokio::test]
async fn one_to_many_selects_child_identities_through_the_registry() {
    let executor = ScriptedExecutor::new();
    executor.push_rows(&[json!({"id": 11}), json!({"id": 12})]);
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(linked_schema(), object(json!({"id": 1})));
    let wire = engine.to_link(&entity, Some(&["webservices"])).await;

    assert_eq!(wire.get("links"), Some(&json!({"webservices": [11, 12]})));
    assert_eq!(
        executor.calls(),
        vec![Call {
            sql: "SELECT `id` FROM `webservices` WHERE `gateway_id` = ?".to_string(),
            args: vec![json!(1)],
        }]
    );
}

#[tokio::test]
async fn one_to_many_prefers_a_preload_keyed_on_the_child_table() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let mut entity = Entity::new(linked_schema(), object(json!({"id": 1})));
    entity.set_relationship("webservices", vec![json!(11)]);

    let wire = engine.to_link(&entity, Some(&["webservices"])).await;

    assert_eq!(wire.get("links"), Some(&json!({"webservices": [11]})));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn failed_relations_are_dropped_not_propagated() {
    let executor = ScriptedExecutor::new();
    executor.push_fetch_error("join table is gone");
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let entity = Entity::new(
        linked_schema(),
        object(json!({"id": 1, "organisation_id": "3"})),
    );
    let wire = engine
        .to_link(&entity, Some(&["organisations", "credits"]))
        .await;

    // the failed many-to-many is absent, the one-to-one survived
    assert_eq!(wire.get("links"), Some(&json!({"organisations": 3})));
}

#[tokio::test]
async fn from_link_rehydrates_one_to_one_only() {
    let executor = ScriptedExecutor::new();
    let repository = Repository::new(executor.clone());
    let registry = webservice_registry();
    let engine = LinkEngine::new(&repository, &registry);

    let wire = object(json!({
        "name": "gw",
        "links": {"organisations": 3, "webservices": [11, 12]}
    }));
    let entity = engine.from_link(linked_schema(), Some(json!({"tenant": 9})), wire);

    assert_eq!(entity.get("organisation_id"), Some(&json!(3)));
    // one-to-many links pass through without touching entity fields
    assert_eq!(entity.get("gateway_id"), None);
    assert_eq!(entity.get("links"), None);
    assert_eq!(entity.context(), Some(&json!({"tenant": 9})));
}
