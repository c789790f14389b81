//! The transport contract (spec.md §1, §2: "only the contract … is in scope")
//!
//! A transport adapter parses a wire request into an [`ExternalRequest`],
//! enforces its own concerns (CORS, rate limiting, auth extraction,
//! deadlines) and hands the envelope to a [`Dispatcher`]. [`Transport`] is
//! the minimal object-safe seam that contract requires; [`crate::rest`]
//! is one concrete implementation of it, the way `volga::middleware`
//! defines a handler contract that `volga::server` drives.

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthContext;
use crate::context::ExecutionContext;
use crate::dispatch::{Dispatcher, ExternalRequest, ExternalResponse};

/// Implemented by a concrete wire adapter (REST, WebSocket, RPC, …).
/// `switchyard::rest` is the only adapter shipped in this crate; others
/// are expected to be external collaborators built the same way.
pub trait Transport: Send + Sync {
    /// Handles one already-parsed envelope, returning the shaped response.
    /// `cancel`, if provided, lets the engine abort the pipeline early
    /// once the transport's own deadline has passed (spec.md §5,
    /// "Cancellation and timeouts").
    fn handle(
        &self,
        dispatcher: &Dispatcher,
        request: ExternalRequest,
        context: ExecutionContext,
        auth_ctx: Option<AuthContext>,
        cancel: Option<CancellationToken>,
    ) -> BoxFuture<'static, ExternalResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dispatch::Intent;
    use crate::engine::Engine;
    use crate::registry::{Action, FnHandler, Service};
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Echo;

    impl Transport for Echo {
        fn handle(
            &self,
            dispatcher: &Dispatcher,
            request: ExternalRequest,
            context: ExecutionContext,
            auth_ctx: Option<AuthContext>,
            cancel: Option<CancellationToken>,
        ) -> BoxFuture<'static, ExternalResponse> {
            let dispatcher = Arc::new(Dispatcher::new(dispatcher.engine().clone()));
            let _ = cancel;
            Box::pin(async move { dispatcher.dispatch(request, context, auth_ctx).await })
        }
    }

    #[tokio::test]
    async fn a_minimal_transport_round_trips_through_the_dispatcher() {
        let handler = Arc::new(FnHandler::new(|p: Value, _ctx: ExecutionContext| async move { Ok(p) }));
        let services = vec![Service::new("sys", "").with_action(Action::new("ping", "", handler))];
        let engine = Arc::new(Engine::new(EngineConfig::new("test").with_services(services)).unwrap());
        let dispatcher = Dispatcher::new(engine.clone());
        let ctx = engine.new_context();

        let transport = Echo;
        let request = ExternalRequest { intent: Intent::Execute, service: "sys".into(), action: "ping".into(), payload: json!({"a": 1}) };
        let response = transport.handle(&dispatcher, request, ctx, None, None).await;
        assert!(response.status);
    }
}
