use super::{parse_payload, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::StorageOp;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct KeyPayload {
    // Missing keys fall through to storage key validation.
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: Value,
}

pub(super) fn handle(ctx: &HostContext, app_id: &str, op: StorageOp, payload: Value) -> HandlerResult {
    let storage = &ctx.storage;
    match op {
        StorageOp::Get => {
            let request: KeyPayload = parse_payload(payload, "storage request")?;
            Ok(storage.get(app_id, &request.key)?.unwrap_or(Value::Null))
        }
        StorageOp::Set => {
            let request: KeyPayload = parse_payload(payload, "storage request")?;
            storage.set(app_id, &request.key, &request.value)?;
            Ok(Value::Null)
        }
        StorageOp::Remove => {
            let request: KeyPayload = parse_payload(payload, "storage request")?;
            Ok(json!(storage.remove(app_id, &request.key)?))
        }
        StorageOp::Clear => Ok(json!(storage.clear(app_id)?)),
        StorageOp::Keys => Ok(json!(storage.keys(app_id)?)),
    }
}
