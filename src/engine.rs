//! The Action Engine: orchestrates the pipeline for one `(service, action)` call
//!
//! spec.md §2, "Engine" and §4.4. `Engine::execute_action` is the single
//! entry point every intent ultimately funnels through; it owns nothing
//! request-scoped (that's [`ExecutionContext`]'s job) and is safe to share
//! behind an `Arc` across concurrently-running requests, the same
//! immutable-core-plus-per-request-state split volga's `AppInstance`
//! keeps between the server and each `HttpContext`.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthContext, TokenVerifier};
use crate::config::EngineConfig;
use crate::context::{ExecutionContext, Resources};
use crate::error::EngineError;
use crate::outcome::Outcome;
use crate::pipeline::{self, GlobalHook};
use crate::registry::{Action, ActionRegistry};
use crate::upload::UploadsConfig;

pub struct Engine {
    registry: Arc<ActionRegistry>,
    resources: Arc<Resources>,
    server_name: String,
    diagnostics: bool,
    log_services: bool,
    auth: Option<crate::auth::AuthConfig>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    uploads: UploadsConfig,
    on_before_action: Option<Arc<dyn GlobalHook>>,
    on_after_action: Option<Arc<dyn GlobalHook>>,
    on_boot: Option<Arc<dyn crate::config::BootHook>>,
}

impl Engine {
    /// Builds the registry from `config.services` (failing fast on any
    /// duplicate name, spec.md §3 invariant 1) and wires the rest of the
    /// engine's immutable configuration.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let registry = ActionRegistry::build(config.services)?;
        Ok(Self {
            registry: Arc::new(registry),
            resources: Arc::new(config.resources),
            server_name: config.server_name,
            diagnostics: config.diagnostics,
            log_services: config.log_services,
            auth: config.auth,
            verifier: config.verifier,
            uploads: config.uploads,
            on_before_action: config.on_before_action,
            on_after_action: config.on_after_action,
            on_boot: config.on_boot,
        })
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn resources(&self) -> &Arc<Resources> {
        &self.resources
    }

    pub fn uploads_config(&self) -> &UploadsConfig {
        &self.uploads
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Creates a fresh per-request [`ExecutionContext`] sharing this
    /// engine's resources (spec.md §4.2, "Lifecycle").
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.resources.clone())
    }

    /// Runs the registered service table print and the fire-and-forget
    /// `onBoot` hook once, after wiring (spec.md §6). Must be called from
    /// within a `tokio` runtime.
    pub async fn boot(&self) {
        if self.log_services {
            self.log_service_table();
        }
        if let Some(hook) = self.on_boot.clone() {
            tokio::spawn(async move {
                let _ = crate::invoke::capture(async move {
                    hook.call().await;
                    Ok(Value::Null)
                })
                .await;
            });
        }
    }

    fn log_service_table(&self) {
        #[cfg(feature = "tracing")]
        {
            tracing::info!(server = %self.server_name, "registered services:");
            for service in self.registry.get_services() {
                let actions = self.registry.get_service_actions(&service.name).unwrap_or_default();
                tracing::info!("  {} ({} actions)", service.name, actions.len());
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            println!("[{}] registered services:", self.server_name);
            for service in self.registry.get_services() {
                let actions = self.registry.get_service_actions(&service.name).unwrap_or_default();
                println!("  {} ({} actions)", service.name, actions.len());
            }
        }
    }

    #[cfg(feature = "tracing")]
    fn log_stage(&self, stage: &str, action_name: &str) {
        if self.diagnostics {
            tracing::debug!(stage, action = action_name, "pipeline stage");
        } else {
            tracing::trace!(stage, action = action_name, "pipeline stage");
        }
    }

    #[cfg(not(feature = "tracing"))]
    fn log_stage(&self, _stage: &str, _action_name: &str) {}

    /// Runs the full pipeline for a single `(service, action)` call
    /// (spec.md §4.4, Steps 0–6). The caller supplies the payload already
    /// shaped per §4.6/§9 (JSON body, or a [`crate::upload::StructuredPayload`]
    /// rendered to `Value`) — both front-ends converge here.
    pub async fn execute_action(
        &self,
        service: &str,
        action_name: &str,
        payload: Value,
        context: ExecutionContext,
        auth_ctx: Option<AuthContext>,
    ) -> Outcome {
        self.execute_action_cancellable(service, action_name, payload, context, auth_ctx, None).await
    }

    /// Same as [`Engine::execute_action`], but checked against a
    /// `tokio_util::sync::CancellationToken` at every stage boundary
    /// (spec.md §5, "Cancellation and timeouts" — the transport adapter
    /// owns the deadline; the engine only has to honor it promptly).
    pub async fn execute_action_cancellable(
        &self,
        service: &str,
        action_name: &str,
        payload: Value,
        context: ExecutionContext,
        auth_ctx: Option<AuthContext>,
        cancel: Option<CancellationToken>,
    ) -> Outcome {
        let qualified = format!("{service}.{action_name}");
        let action = match self.registry.get_action(service, action_name) {
            Ok(action) => action,
            Err(e) => return Outcome::err(e.into_message()),
        };

        context.reset_hook_context(qualified.clone(), payload.clone());

        // Scopes the whole pipeline run behind the task-local "current"
        // context (spec.md §4.2/§9) so hooks and handlers that don't carry
        // their own `ExecutionContext` parameter can still reach it via
        // `context::try_current`.
        let result = crate::context::with_current(context.clone(), async {
            self.run_pipeline(&action, &qualified, payload, &context, auth_ctx, cancel.as_ref()).await
        })
        .await;

        match result {
            Ok(value) => Outcome::Ok(self.shape_result(&action, value, &context)),
            Err(e) => Outcome::Err(e.into_message()),
        }
    }

    fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), EngineError> {
        match cancel {
            Some(token) if token.is_cancelled() => Err(EngineError::hook("Request timed out")),
            _ => Ok(()),
        }
    }

    async fn run_pipeline(
        &self,
        action: &Arc<Action>,
        qualified: &str,
        payload: Value,
        context: &ExecutionContext,
        auth_ctx: Option<AuthContext>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, EngineError> {
        Self::check_cancelled(cancel)?;
        self.log_stage("auth", qualified);
        pipeline::run_auth(action, self.auth.as_ref(), self.verifier.as_deref(), auth_ctx.as_ref(), context).await?;

        let mut current = payload;

        Self::check_cancelled(cancel)?;
        self.log_stage("pre_global", qualified);
        if let Some(hook) = &self.on_before_action {
            current = pipeline::run_global_hook(hook.as_ref(), context, qualified, current, None).await?;
        }

        Self::check_cancelled(cancel)?;
        self.log_stage("pre_hooks", qualified);
        current = pipeline::run_action_hooks(
            crate::context::HookPhase::Before,
            &action.hooks.before,
            &self.registry,
            context,
            current,
        )
        .await?;

        Self::check_cancelled(cancel)?;
        self.log_stage("validate", qualified);
        current = pipeline::run_validation(action, current)?;
        // spec.md §4.4 Step 6 wants the after-global-hook's `payload` to be
        // this validated value, distinct from `result` (the post-handler,
        // post-hooks value `current` becomes below).
        let validated = current.clone();

        Self::check_cancelled(cancel)?;
        self.log_stage("handle", qualified);
        current = pipeline::run_handler(action, context, current).await?;

        Self::check_cancelled(cancel)?;
        self.log_stage("post_hooks", qualified);
        current = pipeline::run_action_hooks(
            crate::context::HookPhase::After,
            &action.hooks.after,
            &self.registry,
            context,
            current,
        )
        .await?;

        Self::check_cancelled(cancel)?;
        self.log_stage("post_global", qualified);
        if let Some(hook) = &self.on_after_action {
            current = pipeline::run_global_hook(hook.as_ref(), context, qualified, validated, Some(current)).await?;
        }

        Ok(current)
    }

    fn shape_result(&self, action: &Action, value: Value, context: &ExecutionContext) -> Value {
        if action.result.pipeline {
            let log = context.hook_context().map(|hc| hc.log).unwrap_or_default();
            serde_json::json!({ "data": value, "pipeline": log })
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Action, FnHandler, Service};
    use serde_json::json;

    fn config_with(services: Vec<Service>) -> EngineConfig {
        EngineConfig::new("test-server").with_services(services)
    }

    #[tokio::test]
    async fn it_executes_the_happy_path() {
        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move {
            Ok(json!({"id": "u1", "name": payload["name"]}))
        }));
        let services = vec![Service::new("users", "").with_action(Action::new("createUser", "", handler))];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let outcome = engine
            .execute_action("users", "createUser", json!({"name": "Alice"}), ctx, None)
            .await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.into_value().unwrap(), json!({"id": "u1", "name": "Alice"}));
    }

    #[tokio::test]
    async fn it_reports_unknown_action() {
        let engine = Engine::new(config_with(vec![])).unwrap();
        let ctx = engine.new_context();
        let outcome = engine.execute_action("ghost", "nope", Value::Null, ctx, None).await;
        assert!(outcome.is_err());
        assert_eq!(outcome.into_error().unwrap(), "Service 'ghost' not found");
    }

    #[tokio::test]
    async fn it_wraps_pipeline_result_when_configured() {
        let handler = Arc::new(FnHandler::new(|_payload: Value, _ctx: ExecutionContext| async move { Ok(json!({"ok": true})) }));
        let action = Action::new("ping", "", handler).with_pipeline_result();
        let services = vec![Service::new("sys", "").with_action(action)];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let outcome = engine.execute_action("sys", "ping", Value::Null, ctx, None).await;
        let value = outcome.into_value().unwrap();
        assert_eq!(value["data"], json!({"ok": true}));
        assert!(value.get("pipeline").is_some());
    }

    #[tokio::test]
    async fn it_short_circuits_on_validation_failure() {
        use crate::schema::TypedSchema;
        #[derive(serde::Serialize, serde::Deserialize)]
        struct CreateUser {
            name: String,
            email: String,
        }
        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move { Ok(payload) }));
        let action = Action::new("createUser", "", handler).with_validation(Arc::new(TypedSchema::<CreateUser>::new()));
        let services = vec![Service::new("users", "").with_action(action)];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let outcome = engine
            .execute_action("users", "createUser", json!({"name": "Alice"}), ctx, None)
            .await;
        assert!(outcome.is_err());
        assert!(outcome.into_error().unwrap().starts_with("Validation failed"));
    }

    #[tokio::test]
    async fn it_aborts_on_a_critical_before_hook_failure() {
        use crate::registry::HookRef;
        let failing = Arc::new(FnHandler::new(|_payload: Value, _ctx: ExecutionContext| async move {
            Err::<Value, _>("Hook failed".to_string())
        }));
        let protected_handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move { Ok(payload) }));

        let action = Action::new("protected", "", protected_handler).with_hooks(crate::registry::Hooks {
            before: vec![HookRef::critical("hooks", "failingHook")],
            after: vec![],
        });

        let services = vec![
            Service::new("app", "").with_action(action),
            Service::new("hooks", "").with_action(Action::new("failingHook", "", failing)),
        ];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let outcome = engine.execute_action("app", "protected", Value::Null, ctx, None).await;
        assert_eq!(outcome.into_error().unwrap(), "Hook failed");
    }

    #[tokio::test]
    async fn it_continues_past_a_non_critical_hook_failure() {
        use crate::registry::HookRef;
        let failing = Arc::new(FnHandler::new(|_payload: Value, _ctx: ExecutionContext| async move {
            Err::<Value, _>("nope".to_string())
        }));
        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move { Ok(payload) }));

        let action = Action::new("action", "", handler).with_hooks(crate::registry::Hooks {
            before: vec![HookRef::non_critical("hooks", "failingHook")],
            after: vec![],
        });

        let services = vec![
            Service::new("app", "").with_action(action),
            Service::new("hooks", "").with_action(Action::new("failingHook", "", failing)),
        ];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let outcome = engine.execute_action("app", "action", json!({"x": 1}), ctx, None).await;
        assert_eq!(outcome.into_value().unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn post_global_hook_sees_the_validated_payload_separately_from_the_result() {
        use crate::pipeline::GlobalHookInput;

        struct RecordResult;
        impl crate::pipeline::GlobalHook for RecordResult {
            fn call(&self, input: GlobalHookInput) -> futures_util::future::BoxFuture<'static, Result<Value, String>> {
                Box::pin(async move {
                    let mut result = input.result.unwrap();
                    result["payload_seen"] = input.payload;
                    Ok(result)
                })
            }
        }

        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move {
            let mut out = payload;
            out["handled"] = json!(true);
            Ok(out)
        }));
        let services = vec![Service::new("app", "").with_action(Action::new("echo", "", handler))];
        let engine = Engine::new(
            EngineConfig::new("test-server").with_services(services).with_after_action_hook(Arc::new(RecordResult)),
        )
        .unwrap();
        let ctx = engine.new_context();

        let outcome = engine.execute_action("app", "echo", json!({"x": 1}), ctx, None).await;
        let value = outcome.into_value().unwrap();
        assert_eq!(value["handled"], json!(true));
        assert_eq!(value["payload_seen"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn it_aborts_immediately_when_already_cancelled() {
        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: ExecutionContext| async move { Ok(payload) }));
        let services = vec![Service::new("app", "").with_action(Action::new("ping", "", handler))];
        let engine = Engine::new(config_with(services)).unwrap();
        let ctx = engine.new_context();

        let token = CancellationToken::new();
        token.cancel();

        let outcome = engine
            .execute_action_cancellable("app", "ping", Value::Null, ctx, None, Some(token))
            .await;
        assert_eq!(outcome.into_error().unwrap(), "Request timed out");
    }
}
