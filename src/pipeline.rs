//! The five pipeline stages and the per-request state machine
//!
//! Implements spec.md §4.4 Steps 0–6 as stateless functions: each takes
//! the current in-flight value (and whatever else it needs) and returns
//! either the next value or an [`EngineError`] that short-circuits the
//! rest of the pipeline. [`engine::Engine::execute_action`] is the only
//! caller; these are not meant to be part of the crate's stable surface
//! beyond the module boundary, but are `pub(crate)` rather than private
//! so integration tests in `tests/` can exercise individual steps.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::auth::{AuthConfig, AuthContext, TokenVerifier};
use crate::context::{ExecutionContext, HookLogEntry, HookPhase};
use crate::error::EngineError;
use crate::invoke;
use crate::registry::{Action, ActionRegistry, HookRef};

/// `RECEIVED → AUTH → PRE_GLOBAL → PRE_HOOKS → VALIDATE → HANDLE →
/// POST_HOOKS → POST_GLOBAL → DONE` (spec.md §4.8). No backward
/// transitions; a later stage can only be reached once the prior one
/// returned `Ok`. Kept as an explicit enum (rather than inferred from
/// control flow) so tests can assert the sequence directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Received,
    Auth,
    PreGlobal,
    PreHooks,
    Validate,
    Handle,
    PostHooks,
    PostGlobal,
    Done,
}

impl State {
    /// The only state reachable immediately after `self`, used by tests
    /// and by the engine's tracing spans to name the step about to run.
    pub fn next(self) -> Option<State> {
        use State::*;
        Some(match self {
            Received => Auth,
            Auth => PreGlobal,
            PreGlobal => PreHooks,
            PreHooks => Validate,
            Validate => Handle,
            Handle => PostHooks,
            PostHooks => PostGlobal,
            PostGlobal => Done,
            Done => return None,
        })
    }
}

/// Global before/after hook contract (spec.md §4.4 Steps 1 and 6).
/// Invoked through the crash-safe invoker like any other user code.
pub trait GlobalHook: Send + Sync {
    fn call(&self, input: GlobalHookInput) -> BoxFuture<'static, Result<Value, String>>;
}

/// What a global hook receives. `result` is `None` for the before-hook
/// and `Some(current value)` for the after-hook, matching spec.md's
/// `{context, action, payload, result: Ok(currentValue)}` shape.
pub struct GlobalHookInput {
    pub context: ExecutionContext,
    pub action_name: String,
    pub payload: Value,
    pub result: Option<Value>,
}

/// Lifts a plain async closure into a [`GlobalHook`].
pub struct FnGlobalHook<F> {
    f: F,
}

impl<F> FnGlobalHook<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> GlobalHook for FnGlobalHook<F>
where
    F: Fn(GlobalHookInput) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
{
    fn call(&self, input: GlobalHookInput) -> BoxFuture<'static, Result<Value, String>> {
        Box::pin((self.f)(input))
    }
}

/// Step 0 — Authentication. Skipped entirely when the action is not
/// `isProtected` or no engine-level [`AuthConfig`] is configured
/// (spec.md §9, Open Question: silently ignored rather than fail-closed).
pub(crate) async fn run_auth(
    action: &Action,
    auth_config: Option<&AuthConfig>,
    verifier: Option<&dyn TokenVerifier>,
    auth_ctx: Option<&AuthContext>,
    context: &ExecutionContext,
) -> Result<(), EngineError> {
    let (Some(config), true) = (auth_config, action.is_protected) else {
        return Ok(());
    };

    let Some(auth_ctx) = auth_ctx else {
        return Err(EngineError::auth("Authentication required: no auth context provided"));
    };

    let verifier = verifier.expect("auth_config set implies a verifier is configured");
    let result = verifier.verify(auth_ctx, config)?;
    context.set_auth(result);
    Ok(())
}

/// Step 1 / Step 6 — the single global before/after hook, if configured.
pub(crate) async fn run_global_hook(
    hook: &dyn GlobalHook,
    context: &ExecutionContext,
    action_name: &str,
    payload: Value,
    result: Option<Value>,
) -> Result<Value, EngineError> {
    let input = GlobalHookInput {
        context: context.clone(),
        action_name: action_name.to_string(),
        payload,
        result,
    };
    match invoke::capture(hook.call(input)).await.into_value_or_error() {
        Ok(v) => Ok(v),
        Err(e) => Err(EngineError::hook(e)),
    }
}

/// Steps 2 / 5 — runs one ordered list of per-action hooks (before or
/// after) against the current in-flight value.
pub(crate) async fn run_action_hooks(
    phase: HookPhase,
    hook_refs: &[HookRef],
    registry: &ActionRegistry,
    context: &ExecutionContext,
    mut current: Value,
) -> Result<Value, EngineError> {
    for hook_ref in hook_refs {
        let qualified = hook_ref.qualified_name();

        let action = match registry.get_action(&hook_ref.service, &hook_ref.action) {
            Ok(action) => action,
            Err(_) => {
                context.add_hook_log(
                    phase,
                    HookLogEntry { name: qualified.clone(), input: current.clone(), output: Value::Null, passed: false },
                );
                if hook_ref.is_critical {
                    let message = format!("Hook '{qualified}' could not be resolved");
                    context.set_hook_error(message.clone());
                    return Err(EngineError::hook(message));
                }
                continue;
            }
        };

        let outcome = invoke::capture(action.handler.call(current.clone(), context.clone())).await;
        let passed = outcome.is_ok();
        let output = outcome.clone().into_value().unwrap_or(Value::Null);

        context.add_hook_log(
            phase,
            HookLogEntry { name: qualified.clone(), input: current.clone(), output: output.clone(), passed },
        );

        match outcome.into_value_or_error() {
            Ok(next) => current = next,
            Err(message) => {
                if hook_ref.is_critical {
                    context.set_hook_error(message.clone());
                    return Err(EngineError::hook(message));
                }
            }
        }
    }
    Ok(current)
}

/// Step 3 — validation. Replaces the in-flight value with the schema's
/// (possibly coerced) output on success. Routed through the crash-safe
/// invoker like every other boundary into user-supplied code (spec.md
/// §4.1: "used at every boundary where user code is called … schema
/// parsing"), since a schema is caller-supplied and may panic.
pub(crate) fn run_validation(action: &Action, current: Value) -> Result<Value, EngineError> {
    let Some(schema) = action.validation.clone() else {
        return Ok(current);
    };
    invoke::capture_sync(std::panic::AssertUnwindSafe(move || schema.safe_parse(&current)))
        .into_value_or_error()
        .map_err(|pretty| EngineError::schema_validation(format!("Validation failed: {pretty}")))
}

/// Step 4 — the action's own handler.
pub(crate) async fn run_handler(action: &Action, context: &ExecutionContext, current: Value) -> Result<Value, EngineError> {
    match invoke::capture(action.handler.call(current, context.clone())).await.into_value_or_error() {
        Ok(v) => {
            context.set_hook_output(v.clone());
            Ok(v)
        }
        Err(e) => Err(EngineError::hook(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_walks_states_in_order_with_no_backward_transitions() {
        let mut state = State::Received;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                State::Received,
                State::Auth,
                State::PreGlobal,
                State::PreHooks,
                State::Validate,
                State::Handle,
                State::PostHooks,
                State::PostGlobal,
                State::Done,
            ]
        );
        assert_eq!(State::Done.next(), None);
    }

    #[tokio::test]
    async fn it_skips_auth_when_action_is_not_protected() {
        use crate::registry::{Action, FnHandler};
        let action = Action::new(
            "ping",
            "",
            Arc::new(FnHandler::new(|p: Value, _ctx: ExecutionContext| async move { Ok(p) })),
        );
        let context = ExecutionContext::new(Arc::new(crate::context::Resources::new()));
        let result = run_auth(&action, None, None, None, &context).await;
        assert!(result.is_ok());
        assert!(context.auth().is_none());
    }

    #[tokio::test]
    async fn it_fails_when_protected_action_has_no_auth_context() {
        use crate::auth::{AuthConfig, AuthMethod};
        use crate::registry::{Action, FnHandler};
        let action = Action::new(
            "secret",
            "",
            Arc::new(FnHandler::new(|p: Value, _ctx: ExecutionContext| async move { Ok(p) })),
        )
        .protected();
        let config = AuthConfig::new("s", AuthMethod::Header);
        let context = ExecutionContext::new(Arc::new(crate::context::Resources::new()));

        struct NeverCalled;
        impl TokenVerifier for NeverCalled {
            fn verify(&self, _: &AuthContext, _: &AuthConfig) -> Result<crate::context::AuthResult, EngineError> {
                unreachable!()
            }
        }

        let err = run_auth(&action, Some(&config), Some(&NeverCalled), None, &context).await.unwrap_err();
        assert!(err.to_string().contains("no auth context provided"));
    }
}
