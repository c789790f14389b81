//! The Intent Dispatcher: maps `explore` / `execute` / `schema` to engine operations
//!
//! spec.md §4.5. Transport-neutral by design — a transport adapter turns
//! an HTTP request (or a WebSocket frame, or an RPC call) into an
//! [`ExternalRequest`] and turns an [`ExternalResponse`] back into
//! whatever its wire format is; this module never mentions HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthContext;
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::outcome::Outcome;

const WILDCARD: &str = "*";

/// The three top-level operations a client can address (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Explore,
    Execute,
    Schema,
}

/// The routing envelope carried on the wire (spec.md §3, "ExternalRequest").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRequest {
    pub intent: Intent,
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// The uniform response shape every intent produces (spec.md §3,
/// "ExternalResponse").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResponse {
    pub status: bool,
    pub message: String,
    pub data: Value,
}

impl ExternalResponse {
    /// `true → 200`, `false → 400` at the transport edge (spec.md §4.5).
    pub fn http_status(&self) -> u16 {
        if self.status { 200 } else { 400 }
    }
}

/// `toExternalResponse(result, successMessage)` (spec.md §4.5).
pub fn to_external_response(outcome: Outcome, success_message: impl Into<String>) -> ExternalResponse {
    match outcome {
        Outcome::Ok(v) => {
            let data = match &v {
                Value::Object(_) => v,
                _ => serde_json::json!({ "result": v }),
            };
            ExternalResponse { status: true, message: success_message.into(), data }
        }
        Outcome::Err(e) => ExternalResponse { status: false, message: e, data: Value::Object(Default::default()) },
    }
}

/// Maps the three intents onto [`Engine`] operations and shapes the
/// external response.
pub struct Dispatcher {
    engine: Arc<Engine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn dispatch(
        &self,
        request: ExternalRequest,
        context: ExecutionContext,
        auth_ctx: Option<AuthContext>,
    ) -> ExternalResponse {
        match request.intent {
            Intent::Explore => self.explore(&request.service, &request.action),
            Intent::Schema => self.schema(&request.service, &request.action),
            Intent::Execute => self.execute(&request.service, &request.action, request.payload, context, auth_ctx).await,
        }
    }

    fn explore(&self, service: &str, action: &str) -> ExternalResponse {
        let registry = self.engine.registry();
        match (service, action) {
            (WILDCARD, WILDCARD) => {
                let summaries = registry.get_services().to_vec();
                to_external_response(Outcome::ok(serde_json::to_value(summaries).unwrap()), "Services retrieved")
            }
            (service, WILDCARD) => match registry.get_service_actions(service) {
                Ok(actions) => to_external_response(
                    Outcome::ok(serde_json::to_value(actions).unwrap()),
                    format!("Actions retrieved for service '{service}'"),
                ),
                Err(e) => to_external_response(Outcome::err(e.into_message()), ""),
            },
            (service, action) => match registry.action_metadata(service, action) {
                Ok(meta) => to_external_response(Outcome::ok(serde_json::to_value(meta).unwrap()), "Action metadata retrieved"),
                Err(e) => to_external_response(Outcome::err(e.into_message()), ""),
            },
        }
    }

    fn schema(&self, service: &str, action: &str) -> ExternalResponse {
        let registry = self.engine.registry();
        match (service, action) {
            (WILDCARD, WILDCARD) => {
                let mut all: HashMap<String, HashMap<String, Value>> = HashMap::new();
                for summary in registry.get_services() {
                    let mut per_action = HashMap::new();
                    if let Ok(actions) = registry.get_service_actions(&summary.name) {
                        for action_summary in actions {
                            let schema = registry
                                .get_action(&summary.name, &action_summary.name)
                                .ok()
                                .and_then(|a| a.validation.as_ref().and_then(|s| s.to_json_schema()))
                                .unwrap_or(Value::Null);
                            per_action.insert(action_summary.name.clone(), schema);
                        }
                    }
                    all.insert(summary.name.clone(), per_action);
                }
                to_external_response(Outcome::ok(serde_json::to_value(all).unwrap()), "Schemas retrieved")
            }
            (service, WILDCARD) => match registry.get_service_actions(service) {
                Ok(actions) => {
                    let mut per_action = HashMap::new();
                    for action_summary in actions {
                        let schema = registry
                            .get_action(service, &action_summary.name)
                            .ok()
                            .and_then(|a| a.validation.as_ref().and_then(|s| s.to_json_schema()))
                            .unwrap_or(Value::Null);
                        per_action.insert(action_summary.name.clone(), schema);
                    }
                    to_external_response(
                        Outcome::ok(serde_json::to_value(per_action).unwrap()),
                        format!("Schemas retrieved for service '{service}'"),
                    )
                }
                Err(e) => to_external_response(Outcome::err(e.into_message()), ""),
            },
            (service, action) => match registry.get_action(service, action) {
                Ok(resolved) => {
                    let schema = resolved.validation.as_ref().and_then(|s| s.to_json_schema()).unwrap_or(Value::Null);
                    let mut map = HashMap::new();
                    map.insert(action.to_string(), schema);
                    to_external_response(
                        Outcome::ok(serde_json::to_value(map).unwrap()),
                        format!("Schema retrieved for action '{action}'"),
                    )
                }
                Err(e) => to_external_response(Outcome::err(e.into_message()), ""),
            },
        }
    }

    async fn execute(
        &self,
        service: &str,
        action: &str,
        payload: Value,
        context: ExecutionContext,
        auth_ctx: Option<AuthContext>,
    ) -> ExternalResponse {
        if service == WILDCARD || action == WILDCARD {
            return to_external_response(Outcome::err("wildcards not allowed for execute"), "");
        }
        let outcome = self.engine.execute_action(service, action, payload, context, auth_ctx).await;
        to_external_response(outcome, format!("Action '{service}.{action}' executed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::registry::{Action, FnHandler, Service};
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let handler = Arc::new(FnHandler::new(|p: Value, _ctx: ExecutionContext| async move { Ok(p) }));
        let services = vec![Service::new("users", "user management").with_action(Action::new("createUser", "creates a user", handler))];
        let engine = Engine::new(EngineConfig::new("test").with_services(services)).unwrap();
        Dispatcher::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn it_explores_all_services() {
        let dispatcher = dispatcher();
        let ctx = dispatcher.engine().new_context();
        let req = ExternalRequest { intent: Intent::Explore, service: "*".into(), action: "*".into(), payload: Value::Null };
        let resp = dispatcher.dispatch(req, ctx, None).await;
        assert!(resp.status);
        assert!(resp.data["result"].is_array());
    }

    #[tokio::test]
    async fn it_rejects_wildcards_on_execute() {
        let dispatcher = dispatcher();
        let ctx = dispatcher.engine().new_context();
        let req = ExternalRequest { intent: Intent::Execute, service: "*".into(), action: "*".into(), payload: json!({}) };
        let resp = dispatcher.dispatch(req, ctx, None).await;
        assert!(!resp.status);
        assert!(resp.message.contains("wildcards not allowed"));
    }

    #[tokio::test]
    async fn it_executes_happy_path_with_the_expected_message() {
        let dispatcher = dispatcher();
        let ctx = dispatcher.engine().new_context();
        let req = ExternalRequest {
            intent: Intent::Execute,
            service: "users".into(),
            action: "createUser".into(),
            payload: json!({"name": "Alice"}),
        };
        let resp = dispatcher.dispatch(req, ctx, None).await;
        assert!(resp.status);
        assert_eq!(resp.message, "Action 'users.createUser' executed");
        assert_eq!(resp.http_status(), 200);
    }

    #[tokio::test]
    async fn it_maps_schema_for_a_single_action() {
        let dispatcher = dispatcher();
        let ctx = dispatcher.engine().new_context();
        let req = ExternalRequest { intent: Intent::Schema, service: "users".into(), action: "createUser".into(), payload: Value::Null };
        let resp = dispatcher.dispatch(req, ctx, None).await;
        assert!(resp.status);
        assert_eq!(resp.data["createUser"], Value::Null);
    }
}
