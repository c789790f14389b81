//! The three dispatcher intents end-to-end, spec.md §4.5 and §8
//! scenarios 3 ("wildcards rejected") and 4 ("explore all").

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use switchyard::config::EngineConfig;
use switchyard::dispatch::{Dispatcher, ExternalRequest, Intent};
use switchyard::engine::Engine;
use switchyard::registry::{Action, FnHandler, Service};
use switchyard::schema::TypedSchema;
use switchyard::ExecutionContext;

#[derive(Debug, Serialize, Deserialize)]
struct CreateUser {
    name: String,
    email: String,
}

fn dispatcher() -> Dispatcher {
    let create = Arc::new(FnHandler::new(|payload: serde_json::Value, _ctx: ExecutionContext| async move {
        Ok(json!({"id": "u1", "name": payload["name"]}))
    }));
    let create_action = Action::new("createUser", "creates a user", create)
        .with_validation(Arc::new(TypedSchema::<CreateUser>::new()));

    let list = Arc::new(FnHandler::new(|_payload: serde_json::Value, _ctx: ExecutionContext| async move { Ok(json!([])) }));
    let list_action = Action::new("listUsers", "lists users", list).protected();

    let services = vec![
        Service::new("users", "user management").with_action(create_action).with_action(list_action),
        Service::new("health", "liveness checks"),
    ];
    let engine = Engine::new(EngineConfig::new("test-server").with_services(services)).unwrap();
    Dispatcher::new(Arc::new(engine))
}

fn request(intent: Intent, service: &str, action: &str, payload: serde_json::Value) -> ExternalRequest {
    ExternalRequest { intent, service: service.to_string(), action: action.to_string(), payload }
}

#[tokio::test]
async fn scenario_3_wildcards_rejected_on_execute() {
    let dispatcher = dispatcher();
    let ctx = dispatcher.engine().new_context();
    let req = request(Intent::Execute, "*", "*", json!({}));
    let resp = dispatcher.dispatch(req, ctx, None).await;

    assert!(!resp.status);
    assert_eq!(resp.http_status(), 400);
    assert!(resp.message.contains("wildcards not allowed"));
}

#[tokio::test]
async fn scenario_4_explore_all_lists_services_in_declaration_order() {
    let dispatcher = dispatcher();
    let ctx = dispatcher.engine().new_context();
    let req = request(Intent::Explore, "*", "*", json!({}));
    let resp = dispatcher.dispatch(req, ctx, None).await;

    assert!(resp.status);
    assert_eq!(resp.http_status(), 200);
    let names: Vec<_> = resp.data["result"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["users", "health"]);
}

#[tokio::test]
async fn explore_lists_actions_within_one_service() {
    let dispatcher = dispatcher();
    let ctx = dispatcher.engine().new_context();
    let req = request(Intent::Explore, "users", "*", json!({}));
    let resp = dispatcher.dispatch(req, ctx, None).await;

    assert!(resp.status);
    let names: Vec<_> = resp.data["result"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["createUser", "listUsers"]);
}

#[tokio::test]
async fn explore_then_schema_agree_on_validation_presence() {
    let dispatcher = dispatcher();

    let explore_req = request(Intent::Explore, "users", "createUser", json!({}));
    let explore_resp = dispatcher.dispatch(explore_req, dispatcher.engine().new_context(), None).await;
    assert!(explore_resp.status);
    assert_eq!(explore_resp.data["name"], json!("createUser"));
    assert_eq!(explore_resp.data["isProtected"], json!(false));

    let schema_req = request(Intent::Schema, "users", "createUser", json!({}));
    let schema_resp = dispatcher.dispatch(schema_req, dispatcher.engine().new_context(), None).await;
    assert!(schema_resp.status);
    // TypedSchema without `schema` feature support yields `null` — schemas are advisory (spec.md §4.5).
    assert!(schema_resp.data.get("createUser").is_some());
}

#[tokio::test]
async fn schema_wildcard_covers_every_service_and_action() {
    let dispatcher = dispatcher();
    let ctx = dispatcher.engine().new_context();
    let req = request(Intent::Schema, "*", "*", json!({}));
    let resp = dispatcher.dispatch(req, ctx, None).await;

    assert!(resp.status);
    assert!(resp.data["users"]["createUser"].is_null() || resp.data["users"]["createUser"].is_object());
    assert!(resp.data["users"].get("listUsers").is_some());
    assert!(resp.data.get("health").is_some());
}

#[tokio::test]
async fn explore_reports_unknown_service() {
    let dispatcher = dispatcher();
    let ctx = dispatcher.engine().new_context();
    let req = request(Intent::Explore, "ghost", "*", json!({}));
    let resp = dispatcher.dispatch(req, ctx, None).await;

    assert!(!resp.status);
    assert_eq!(resp.message, "Service 'ghost' not found");
}
