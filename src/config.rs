//! The configuration surface enumerated in spec.md §6
//!
//! `EngineConfig` is built with the same consuming `with_*` builder idiom
//! `volga::tracing::TracingConfig`/`BearerAuthConfig` use: each method
//! takes `self` by value and returns `self`, so configuration reads as a
//! chain ending in [`crate::engine::Engine::new`].

use std::sync::Arc;

use crate::auth::{AuthConfig, TokenVerifier};
use crate::context::Resources;
use crate::pipeline::GlobalHook;
use crate::registry::Service;
use crate::upload::UploadsConfig;

/// Fire-and-forget boot hook (spec.md §6, `onBoot.fn`), run once after
/// the engine finishes wiring. Crash-safe: a panic here is logged, not
/// propagated — boot must not be able to take the process down.
pub trait BootHook: Send + Sync {
    fn call(&self) -> futures_util::future::BoxFuture<'static, ()>;
}

impl<F, Fut> BootHook for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    fn call(&self) -> futures_util::future::BoxFuture<'static, ()> {
        Box::pin(self())
    }
}

/// Builder for the engine's configuration surface (spec.md §6,
/// "Configuration surface (enumerated)").
pub struct EngineConfig {
    pub(crate) server_name: String,
    pub(crate) runtime: String,
    pub(crate) services: Vec<Service>,
    pub(crate) diagnostics: bool,
    pub(crate) log_services: bool,
    pub(crate) resources: Resources,
    pub(crate) auth: Option<AuthConfig>,
    pub(crate) verifier: Option<Arc<dyn TokenVerifier>>,
    pub(crate) uploads: UploadsConfig,
    pub(crate) on_before_action: Option<Arc<dyn GlobalHook>>,
    pub(crate) on_after_action: Option<Arc<dyn GlobalHook>>,
    pub(crate) on_boot: Option<Arc<dyn BootHook>>,
}

impl EngineConfig {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            runtime: "tokio".to_string(),
            services: Vec::new(),
            diagnostics: false,
            log_services: true,
            resources: Resources::new(),
            auth: None,
            verifier: None,
            uploads: UploadsConfig::default(),
            on_before_action: None,
            on_after_action: None,
            on_boot: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_services(mut self, services: Vec<Service>) -> Self {
        self.services = services;
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn with_log_services(mut self, enabled: bool) -> Self {
        self.log_services = enabled;
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.auth = Some(auth);
        self.verifier = Some(verifier);
        self
    }

    pub fn with_uploads(mut self, uploads: UploadsConfig) -> Self {
        self.uploads = uploads;
        self
    }

    pub fn with_before_action_hook(mut self, hook: Arc<dyn GlobalHook>) -> Self {
        self.on_before_action = Some(hook);
        self
    }

    pub fn with_after_action_hook(mut self, hook: Arc<dyn GlobalHook>) -> Self {
        self.on_after_action = Some(hook);
        self
    }

    pub fn with_on_boot(mut self, hook: Arc<dyn BootHook>) -> Self {
        self.on_boot = Some(hook);
        self
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}
