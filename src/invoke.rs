//! The crash-safe invoker
//!
//! Every call into user-supplied code (action handlers, hooks, global
//! hooks) is wrapped by [`capture`]. A panic inside the supplied future is
//! caught by spawning it onto its own `tokio` task and converting a
//! [`tokio::task::JoinError`] into an [`Outcome::Err`] — the engine's own
//! code never relies on `catch_unwind` directly and never lets a user
//! panic cross a pipeline stage boundary.

use std::future::Future;
use serde_json::Value;

use crate::outcome::Outcome;

/// Runs `fut` to completion, converting a normal `Result<Value, String>`
/// into the matching [`Outcome`] and a panic into `Outcome::Err`.
pub async fn capture<F>(fut: F) -> Outcome
where
    F: Future<Output = Result<Value, String>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(message)) => Outcome::Err(message),
        Err(join_err) => Outcome::Err(describe_panic(join_err)),
    }
}

/// Same as [`capture`] but for thunks that are not already boxed/'static —
/// used for short-lived synchronous validation (e.g. `Schema::safe_parse`)
/// where spawning a task would be wasteful. Panics are still caught.
pub fn capture_sync<F>(f: F) -> Outcome
where
    F: FnOnce() -> Result<Value, String> + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(Ok(value)) => Outcome::Ok(value),
        Ok(Err(message)) => Outcome::Err(message),
        Err(panic) => Outcome::Err(describe_std_panic(&panic)),
    }
}

fn describe_panic(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => describe_std_panic(&payload),
        Err(_) => "unknown panic".to_string(),
    }
}

fn describe_std_panic(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_converts_ok_future() {
        let outcome = capture(async { Ok(Value::String("ok".into())) }).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn it_converts_err_future() {
        let outcome = capture(async { Err::<Value, _>("nope".to_string()) }).await;
        assert_eq!(outcome.into_error().unwrap(), "nope");
    }

    #[tokio::test]
    async fn it_converts_panic_to_err() {
        let outcome = capture(async {
            panic!("kaboom");
            #[allow(unreachable_code)]
            Ok(Value::Null)
        }).await;
        assert!(outcome.is_err());
        assert!(outcome.into_error().unwrap().contains("kaboom"));
    }

    #[test]
    fn it_captures_sync_panic() {
        let outcome = capture_sync(|| -> Result<Value, String> {
            panic!("sync kaboom");
        });
        assert!(outcome.is_err());
    }
}
