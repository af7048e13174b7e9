use super::{parse_payload, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::UiOp;
use crate::collab::UiEvent;
use crate::pending::{is_affirmative, PendingKind, PendingOutcome};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToastPayload {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    variant: Option<String>,
    #[serde(default)]
    duration: Option<u64>,
}

#[derive(Deserialize)]
struct ConfirmPayload {
    #[serde(default)]
    message: String,
}

pub(super) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    op: UiOp,
    payload: Value,
) -> HandlerResult {
    match op {
        UiOp::ShowToast => {
            let toast: ToastPayload = parse_payload(payload, "toast")?;
            if toast.message.trim().is_empty() {
                return Err(HandlerError::new("Invalid toast: message is required"));
            }
            ctx.services.ui.notify(UiEvent::Toast {
                app_id: app_id.to_string(),
                message: toast.message,
                variant: toast.variant,
                duration_ms: toast.duration,
            });
            Ok(Value::Null)
        }
        UiOp::ShowConfirm => confirm(ctx, app_id, payload).await,
        UiOp::ShowModal => {
            ctx.services.ui.notify(UiEvent::ShowModal {
                app_id: app_id.to_string(),
                options: payload,
            });
            Ok(Value::Null)
        }
        UiOp::CloseModal => {
            ctx.services.ui.notify(UiEvent::CloseModal {
                app_id: app_id.to_string(),
            });
            Ok(Value::Null)
        }
    }
}

async fn confirm(ctx: &HostContext, app_id: &str, payload: Value) -> HandlerResult {
    let request: ConfirmPayload = parse_payload(payload.clone(), "confirmation")?;
    if request.message.trim().is_empty() {
        return Err(HandlerError::new("Invalid confirmation: message is required"));
    }

    let ticket = ctx.pending.begin(PendingKind::Confirm, app_id, payload)?;
    ctx.services
        .ui
        .notify(UiEvent::PendingRequested(ticket.request().clone()));
    match ticket.wait().await {
        PendingOutcome::Resolved(value) => Ok(json!({ "confirmed": is_affirmative(&value) })),
        PendingOutcome::Rejected(_) => Ok(json!({ "confirmed": false })),
        PendingOutcome::TimedOut => Ok(json!({
            "confirmed": false,
            "error": "Confirmation timed out",
        })),
        PendingOutcome::Cancelled => Err(HandlerError::session_closed()),
    }
}
