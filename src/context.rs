//! The shared execution context threaded through a single request
//!
//! One [`ExecutionContext`] is created per transport request (spec.md §4.2)
//! and handed to every stage of the pipeline as an `Arc`. It carries the
//! read-only [`Resources`] bag, per-interface session state, a free-form
//! key/value store, the populated [`AuthResult`] slot, and the in-flight
//! [`HookContext`] that records every hook invocation for this request.
//!
//! Nothing here is process-global: the optional [`current`] accessor is
//! backed by `tokio::task_local!`, bound to the task driving the request,
//! the way volga keeps per-connection state out of module statics.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which transport surface a session bag belongs to.
///
/// Sessions are instance-scoped per [`ExecutionContext`] — never shared
/// across requests — so this only distinguishes *which* bag a given
/// transport adapter should read/write on a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Rest,
    Ws,
    Rpc,
}

/// Read-only bag of injected collaborators: logger, database, cache, and
/// any user-defined singleton, resolved by type the way volga's DI
/// container resolves singletons — but flat, with no scoped/transient
/// lifetime machinery, matching spec.md §4.2's "read-only bag".
#[derive(Default)]
pub struct Resources {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collaborator under its concrete type. A later call
    /// with the same type replaces the earlier one.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
        self
    }

    /// Resolves a previously registered collaborator by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries.get(&TypeId::of::<T>()).and_then(|b| b.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources").field("count", &self.entries.len()).finish()
    }
}

/// One entry in the hook log: the resolved `service.action` name, what it
/// was given, what it returned, and whether it passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookLogEntry {
    pub name: String,
    pub input: Value,
    pub output: Value,
    pub passed: bool,
}

/// Which half of a hook pair an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Before,
    After,
}

/// The in-flight record for a single `executeAction` call (spec.md §3,
/// "HookContext (in-flight)"). Reset at the start of every request by
/// [`ExecutionContext::reset_hook_context`] — never reused across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    pub action_name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub state: IndexMap<String, Value>,
    pub log: HookLog,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookLog {
    pub before: Vec<HookLogEntry>,
    pub after: Vec<HookLogEntry>,
}

impl HookContext {
    fn new(action_name: impl Into<String>, input: Value) -> Self {
        Self {
            action_name: action_name.into(),
            input,
            output: None,
            error: None,
            state: IndexMap::new(),
            log: HookLog::default(),
        }
    }
}

/// Auth data populated into the context by pipeline Step 0 once a
/// protected action's JWT has been verified (spec.md §3, "AuthResult").
/// Never populated for non-protected actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub user_id: String,
    pub organization_id: String,
    pub claims: Value,
}

struct Inner {
    resources: Arc<Resources>,
    sessions: Mutex<HashMap<Interface, Value>>,
    store: Mutex<IndexMap<String, Value>>,
    auth_result: Mutex<Option<AuthResult>>,
    hook: Mutex<Option<HookContext>>,
}

/// The per-request execution context. Cheap to clone (an `Arc` underneath);
/// owned by exactly one in-flight request (spec.md §5, "Per-request
/// isolation").
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl ExecutionContext {
    pub fn new(resources: Arc<Resources>) -> Self {
        Self {
            inner: Arc::new(Inner {
                resources,
                sessions: Mutex::new(HashMap::new()),
                store: Mutex::new(IndexMap::new()),
                auth_result: Mutex::new(None),
                hook: Mutex::new(None),
            }),
        }
    }

    /// Free-form key/value store, scoped to this request.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.store.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.store.lock().unwrap().insert(key.into(), value);
    }

    /// Per-interface session bag. Never process-wide — always read from
    /// and written to this request's own context.
    pub fn get_session(&self, interface: Interface) -> Option<Value> {
        self.inner.sessions.lock().unwrap().get(&interface).cloned()
    }

    pub fn set_session(&self, interface: Interface, value: Value) {
        self.inner.sessions.lock().unwrap().insert(interface, value);
    }

    pub fn resources(&self) -> &Resources {
        &self.inner.resources
    }

    pub fn auth(&self) -> Option<AuthResult> {
        self.inner.auth_result.lock().unwrap().clone()
    }

    /// The `userId` of the populated [`AuthResult`], if any.
    pub fn get_user(&self) -> Option<String> {
        self.auth().map(|a| a.user_id)
    }

    pub(crate) fn set_auth(&self, result: AuthResult) {
        *self.inner.auth_result.lock().unwrap() = Some(result);
    }

    /// Starts a fresh [`HookContext`] for `action_name` with `input` as
    /// the initial in-flight value. Called once at the top of
    /// `executeAction`, before any stage runs (spec.md invariant 3).
    pub fn reset_hook_context(&self, action_name: impl Into<String>, input: Value) {
        *self.inner.hook.lock().unwrap() = Some(HookContext::new(action_name, input));
    }

    pub fn update_hook_state(&self, key: impl Into<String>, value: Value) {
        if let Some(hc) = self.inner.hook.lock().unwrap().as_mut() {
            hc.state.insert(key.into(), value);
        }
    }

    pub fn add_hook_log(&self, phase: HookPhase, entry: HookLogEntry) {
        if let Some(hc) = self.inner.hook.lock().unwrap().as_mut() {
            match phase {
                HookPhase::Before => hc.log.before.push(entry),
                HookPhase::After => hc.log.after.push(entry),
            }
        }
    }

    pub fn set_hook_error(&self, message: impl Into<String>) {
        if let Some(hc) = self.inner.hook.lock().unwrap().as_mut() {
            hc.error = Some(message.into());
        }
    }

    pub fn set_hook_output(&self, value: Value) {
        if let Some(hc) = self.inner.hook.lock().unwrap().as_mut() {
            hc.output = Some(value);
        }
    }

    /// A snapshot of the current hook context, if one has been started.
    pub fn hook_context(&self) -> Option<HookContext> {
        self.inner.hook.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExecutionContext(..)")
    }
}

tokio::task_local! {
    /// Ergonomic task-local accessor for the context currently driving a
    /// request. Bound per-task by [`with_current`] — never a module-level
    /// static, per spec.md §9 ("Global state elimination").
    static CURRENT: ExecutionContext;
}

/// Runs `fut` with `ctx` bound as the task-local "current" context, the
/// way a goroutine-local or async-local would scope it to one request.
pub async fn with_current<F, T>(ctx: ExecutionContext, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT.scope(ctx, fut).await
}

/// Reads the task-local "current" context, if `with_current` has bound
/// one for this task. Returns `None` outside of a request scope rather
/// than panicking, so ergonomic helpers degrade gracefully.
pub fn try_current() -> Option<ExecutionContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_stores_and_reads_the_kv_store() {
        let ctx = ExecutionContext::new(Arc::new(Resources::new()));
        assert_eq!(ctx.get("k"), None);
        ctx.set("k", Value::String("v".into()));
        assert_eq!(ctx.get("k"), Some(Value::String("v".into())));
    }

    #[test]
    fn it_scopes_sessions_per_interface() {
        let ctx = ExecutionContext::new(Arc::new(Resources::new()));
        ctx.set_session(Interface::Rest, serde_json::json!({"a": 1}));
        ctx.set_session(Interface::Ws, serde_json::json!({"b": 2}));
        assert_eq!(ctx.get_session(Interface::Rest), Some(serde_json::json!({"a": 1})));
        assert_eq!(ctx.get_session(Interface::Ws), Some(serde_json::json!({"b": 2})));
        assert_eq!(ctx.get_session(Interface::Rpc), None);
    }

    #[test]
    fn it_resolves_resources_by_type() {
        #[derive(PartialEq, Debug)]
        struct Db(u32);
        let mut resources = Resources::new();
        resources.insert(Db(7));
        let ctx = ExecutionContext::new(Arc::new(resources));
        assert_eq!(ctx.resources().get::<Db>(), Some(&Db(7)));
    }

    #[test]
    fn it_resets_hook_context_and_logs() {
        let ctx = ExecutionContext::new(Arc::new(Resources::new()));
        assert!(ctx.hook_context().is_none());

        ctx.reset_hook_context("users.createUser", serde_json::json!({"name": "Alice"}));
        ctx.add_hook_log(HookPhase::Before, HookLogEntry {
            name: "hooks.audit".into(),
            input: Value::Null,
            output: Value::Null,
            passed: true,
        });
        ctx.set_hook_output(serde_json::json!({"id": "u1"}));

        let hc = ctx.hook_context().unwrap();
        assert_eq!(hc.action_name, "users.createUser");
        assert_eq!(hc.log.before.len(), 1);
        assert_eq!(hc.output, Some(serde_json::json!({"id": "u1"})));
    }

    #[tokio::test]
    async fn it_scopes_current_to_the_task() {
        assert!(try_current().is_none());
        let ctx = ExecutionContext::new(Arc::new(Resources::new()));
        ctx.set("probe", Value::Bool(true));
        let seen = with_current(ctx, async { try_current().map(|c| c.get("probe")) }).await;
        assert_eq!(seen, Some(Some(Value::Bool(true))));
        assert!(try_current().is_none());
    }
}
