//! Envelope admission and handler invocation.
//!
//! # Invariants
//! - Checks run in a fixed order: envelope shape, app status, signature,
//!   replay window, rate limit, capability resolution, permission. A
//!   rejection at any step returns before the handler exists.
//! - Signatures are checked only for apps holding a signing key.
//! - Every outcome, including a handler panic, becomes a `Response` whose id
//!   echoes the envelope id.

use super::handlers::{self, HandlerResult};
use super::signature::verify_envelope;
use super::HostContext;
use crate::capability::{parse_capability, Capability};
use crate::protocol::{major_version, now_ms, Envelope, ErrorCode, Response, PROTOCOL_VERSION};
use log::{debug, error, warn};
use serde_json::Value;
use std::sync::Arc;

pub(crate) async fn dispatch(ctx: &Arc<HostContext>, app_id: &str, envelope: Envelope) -> Response {
    if let Some(reason) = envelope_defect(&envelope.id, &envelope.protocol_version) {
        warn!(
            "event=dispatch module=bridge status=invalid_envelope app_id={} reason={}",
            app_id, reason
        );
        return Response::err(envelope.id, ErrorCode::InvalidEnvelope, reason);
    }

    if ctx.is_suspended(app_id) {
        warn!(
            "event=dispatch module=bridge status=suspended app_id={} request_id={}",
            app_id, envelope.id
        );
        return Response::err(envelope.id, ErrorCode::AppSuspended, "App is suspended");
    }

    if let Some(key) = ctx.signing_keys.get(app_id) {
        if !verify_envelope(&envelope, &key) {
            warn!(
                "event=dispatch module=bridge status=bad_signature app_id={} request_id={}",
                app_id, envelope.id
            );
            return Response::err(
                envelope.id,
                ErrorCode::InvalidSignature,
                "Message signature verification failed",
            );
        }
    }

    let Envelope {
        id,
        capability,
        payload,
        timestamp,
        ..
    } = envelope;

    if let Err(rejection) = ctx.guard.admit(app_id, &id, timestamp, now_ms()) {
        warn!(
            "event=dispatch module=bridge status=rejected app_id={} code={} reason={}",
            app_id, rejection.code, rejection.reason
        );
        return Response::err(id, rejection.code, rejection.reason);
    }

    let capability = match parse_capability(&capability) {
        Ok(capability) => capability,
        Err(err) => {
            warn!(
                "event=dispatch module=bridge status=unknown_capability app_id={} request_id={}",
                app_id, id
            );
            return Response::err(id, ErrorCode::UnknownCapability, err.to_string());
        }
    };

    if let Some(required) = capability.required_permission() {
        if !ctx.grants.has_permission(app_id, required) {
            warn!(
                "event=dispatch module=bridge status=denied app_id={} capability={} permission={}",
                app_id, capability, required
            );
            return Response::err(
                id,
                ErrorCode::PermissionDenied,
                format!("Permission denied: {required}"),
            );
        }
    }

    match run_handler(ctx, app_id, capability, payload).await {
        Ok(data) => {
            debug!(
                "event=dispatch module=bridge status=ok app_id={} capability={} request_id={}",
                app_id, capability, id
            );
            Response::ok(id, data)
        }
        Err(err) => {
            warn!(
                "event=dispatch module=bridge status=error app_id={} capability={} code={}",
                app_id, capability, err.code
            );
            Response::err(id, err.code, err.message)
        }
    }
}

fn envelope_defect(id: &str, protocol_version: &str) -> Option<&'static str> {
    if id.trim().is_empty() {
        return Some("Envelope id is required");
    }
    match (major_version(protocol_version), major_version(PROTOCOL_VERSION)) {
        (Some(theirs), Some(ours)) if theirs == ours => None,
        _ => Some("Unsupported protocol version"),
    }
}

/// Runs the handler in its own task so panics and session aborts are
/// observed as join errors instead of unwinding into the dispatcher.
async fn run_handler(
    ctx: &Arc<HostContext>,
    app_id: &str,
    capability: Capability,
    payload: Value,
) -> HandlerResult {
    let task_ctx = Arc::clone(ctx);
    let task_app = app_id.to_string();
    let mut task = tokio::spawn(async move {
        handlers::handle(&task_ctx, &task_app, capability, payload).await
    });
    let call_id = ctx.sessions.track(app_id, task.abort_handle());

    let joined = match ctx.config.handler_timeout() {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                task.abort();
                None
            }
        },
        None => Some((&mut task).await),
    };
    ctx.sessions.untrack(app_id, call_id);

    match joined {
        Some(Ok(result)) => result,
        Some(Err(err)) if err.is_cancelled() => Err(handlers::HandlerError::session_closed()),
        Some(Err(err)) => {
            error!(
                "event=dispatch module=bridge status=panic app_id={} capability={} error={}",
                app_id, capability, err
            );
            Err(handlers::HandlerError::new("Handler failed unexpectedly"))
        }
        None => {
            warn!(
                "event=dispatch module=bridge status=timeout app_id={} capability={}",
                app_id, capability
            );
            Err(handlers::HandlerError::with_code(
                ErrorCode::Timeout,
                format!("Handler for {capability} timed out"),
            ))
        }
    }
}
