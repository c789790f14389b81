//! Services, actions, and the O(1) lookup registry built from them
//!
//! Mirrors spec.md §4.3: the registry is built once from a static list of
//! [`Service`]s, rejects duplicate service/action names at construction,
//! and exposes `get_services` / `get_service_actions` / `get_action` as
//! the only ways to reach a concrete [`Action`].

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::schema::Schema;

/// A reference to another action used as a hook (spec.md §3, "HookRef").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookRef {
    pub service: String,
    pub action: String,
    /// `true`: hook failure aborts the pipeline. `false`: logged and the
    /// pipeline continues with the current value unchanged. The source's
    /// inconsistent `canFail` naming (spec.md §9, Open Questions) is not
    /// reproduced here — this field always means "critical".
    pub is_critical: bool,
}

impl HookRef {
    pub fn critical(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self { service: service.into(), action: action.into(), is_critical: true }
    }

    pub fn non_critical(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self { service: service.into(), action: action.into(), is_critical: false }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.service, self.action)
    }
}

/// Before/after hook lists attached to an action.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub before: Vec<HookRef>,
    pub after: Vec<HookRef>,
}

/// How an action's `result` is shaped coming out of the pipeline
/// (spec.md §3: `result.pipeline`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionResultConfig {
    /// When `true`, the response is wrapped as `{data, pipeline: hookLog}`.
    pub pipeline: bool,
}

/// Which wire content-type an action requires, and how its multipart
/// payload should be shaped once parsed (spec.md §3: `isSpecial`).
#[derive(Debug, Clone)]
pub struct SpecialContentType {
    pub content_type: String,
    pub upload_mode: Option<UploadMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Files and string fields share one flat key space; a key used by
    /// both a file and a string field is rejected.
    Flat,
    /// Files and fields are grouped into separate maps.
    Structured,
}

/// An async unit of work: `(payload, context) -> Result<Value, String>`
/// (spec.md §3, "handler"). Object-safe so actions can be stored
/// uniformly in the registry regardless of the concrete handler type,
/// the same boxed-future approach volga uses for its middleware/error
/// handler type aliases.
pub trait ActionHandler: Send + Sync {
    fn call(&self, payload: Value, context: ExecutionContext) -> BoxFuture<'static, Result<Value, String>>;
}

/// Lifts any `Fn(Value, ExecutionContext) -> Future<Output = Result<Value, String>>`
/// closure into an [`ActionHandler`], so both plain functions and async
/// closures can be registered directly without a manual trait impl.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    fn call(&self, payload: Value, context: ExecutionContext) -> BoxFuture<'static, Result<Value, String>> {
        Box::pin((self.f)(payload, context))
    }
}

/// A named, validated unit of work belonging to a [`Service`]
/// (spec.md §3, "Action").
pub struct Action {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn ActionHandler>,
    pub validation: Option<Arc<dyn Schema>>,
    pub is_protected: bool,
    pub hooks: Hooks,
    pub access_control: Vec<String>,
    pub is_special: Option<SpecialContentType>,
    pub result: ActionResultConfig,
    pub meta: Option<Value>,
}

impl Action {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
            validation: None,
            is_protected: false,
            hooks: Hooks::default(),
            access_control: Vec::new(),
            is_special: None,
            result: ActionResultConfig::default(),
            meta: None,
        }
    }

    pub fn with_validation(mut self, schema: Arc<dyn Schema>) -> Self {
        self.validation = Some(schema);
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_access_control(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.access_control = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_special_content_type(mut self, special: SpecialContentType) -> Self {
        self.is_special = Some(special);
        self
    }

    pub fn with_pipeline_result(mut self) -> Self {
        self.result.pipeline = true;
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// A named collection of actions with shared identity and metadata
/// (spec.md §3, "Service").
pub struct Service {
    pub name: String,
    pub description: String,
    pub actions: Vec<Action>,
    pub meta: Option<Value>,
}

impl Service {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into(), actions: Vec::new(), meta: None }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Discovery summary for a service, in declaration order (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub description: String,
    pub meta: Option<Value>,
}

/// Discovery summary for an action (spec.md §4.3, "ActionSummary").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub name: String,
    pub description: String,
    pub is_protected: bool,
    pub validation: bool,
    pub access_control: Vec<String>,
}

/// The richer metadata returned by `explore` for a single action
/// (spec.md §4.5, "Action metadata returned by explore").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub name: String,
    pub description: String,
    pub is_protected: bool,
    pub access_control: Vec<String>,
    pub hooks: Option<HooksMetadata>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksMetadata {
    pub before: Vec<HookRef>,
    pub after: Vec<HookRef>,
}

/// Precomputed O(1) lookup tables built from a static service list
/// (spec.md §4.3). Construction fails fast on any duplicate service or
/// action name.
pub struct ActionRegistry {
    service_summaries: Vec<ServiceSummary>,
    service_order: Vec<String>,
    service_actions: IndexMap<String, Vec<ActionSummary>>,
    actions: IndexMap<String, IndexMap<String, Arc<Action>>>,
}

impl ActionRegistry {
    /// Builds the registry, enforcing invariant 1 (spec.md §3): service
    /// names unique, and action names unique within their service.
    pub fn build(services: Vec<Service>) -> Result<Self, EngineError> {
        let mut service_summaries = Vec::with_capacity(services.len());
        let mut service_order = Vec::with_capacity(services.len());
        let mut service_actions = IndexMap::with_capacity(services.len());
        let mut actions = IndexMap::with_capacity(services.len());

        for service in services {
            if actions.contains_key(&service.name) {
                return Err(EngineError::registry(format!(
                    "Duplicate service name: '{}'",
                    service.name
                )));
            }

            let mut summaries = Vec::with_capacity(service.actions.len());
            let mut action_map = IndexMap::with_capacity(service.actions.len());

            for action in service.actions {
                if action_map.contains_key(&action.name) {
                    return Err(EngineError::registry(format!(
                        "Duplicate action name '{}' in service '{}'",
                        action.name, service.name
                    )));
                }
                summaries.push(ActionSummary {
                    name: action.name.clone(),
                    description: action.description.clone(),
                    is_protected: action.is_protected,
                    validation: action.validation.is_some(),
                    access_control: action.access_control.clone(),
                });
                action_map.insert(action.name.clone(), Arc::new(action));
            }

            service_summaries.push(ServiceSummary {
                name: service.name.clone(),
                description: service.description.clone(),
                meta: service.meta.clone(),
            });
            service_order.push(service.name.clone());
            service_actions.insert(service.name.clone(), summaries);
            actions.insert(service.name, action_map);
        }

        Ok(Self { service_summaries, service_order, service_actions, actions })
    }

    /// `getServices()` — stable declaration order.
    pub fn get_services(&self) -> &[ServiceSummary] {
        &self.service_summaries
    }

    pub fn service_names(&self) -> &[String] {
        &self.service_order
    }

    /// `getServiceActions(service)`.
    pub fn get_service_actions(&self, service: &str) -> Result<&[ActionSummary], EngineError> {
        self.service_actions
            .get(service)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::routing(format!("Service '{service}' not found")))
    }

    /// `getAction(service, action)`.
    pub fn get_action(&self, service: &str, action: &str) -> Result<Arc<Action>, EngineError> {
        let actions = self
            .actions
            .get(service)
            .ok_or_else(|| EngineError::routing(format!("Service '{service}' not found")))?;
        actions
            .get(action)
            .cloned()
            .ok_or_else(|| EngineError::routing(format!("Action '{action}' not found in service '{service}'")))
    }

    /// Action metadata as returned by `explore` (spec.md §4.5).
    pub fn action_metadata(&self, service: &str, action: &str) -> Result<ActionMetadata, EngineError> {
        let action = self.get_action(service, action)?;
        let hooks = if action.hooks.before.is_empty() && action.hooks.after.is_empty() {
            None
        } else {
            Some(HooksMetadata { before: action.hooks.before.clone(), after: action.hooks.after.clone() })
        };
        Ok(ActionMetadata {
            name: action.name.clone(),
            description: action.description.clone(),
            is_protected: action.is_protected,
            access_control: action.access_control.clone(),
            hooks,
            meta: action.meta.clone(),
        })
    }
}
