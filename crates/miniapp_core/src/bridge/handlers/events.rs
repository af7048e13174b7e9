use super::{parse_payload, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::EventsOp;
use crate::collab::UiEvent;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct EventPayload {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: Value,
}

pub(super) fn handle(ctx: &HostContext, app_id: &str, op: EventsOp, payload: Value) -> HandlerResult {
    let request: EventPayload = parse_payload(payload, "event request")?;
    let event = request.event.trim();
    if event.is_empty() {
        return Err(HandlerError::new("Invalid event request: event name is required"));
    }

    match op {
        EventsOp::Subscribe => Ok(json!(ctx.sessions.subscribe(app_id, event))),
        EventsOp::Unsubscribe => Ok(json!(ctx.sessions.unsubscribe(app_id, event))),
        EventsOp::Emit => {
            ctx.services.ui.notify(UiEvent::AppEvent {
                app_id: app_id.to_string(),
                event: event.to_string(),
                data: request.data,
            });
            Ok(Value::Null)
        }
    }
}
