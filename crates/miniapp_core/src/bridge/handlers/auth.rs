use super::{current_user, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::AuthOp;
use serde_json::json;

pub(super) fn handle(ctx: &HostContext, app_id: &str, op: AuthOp) -> HandlerResult {
    match op {
        AuthOp::GetCurrentUser => {
            let user = current_user(ctx)?;
            serde_json::to_value(user).map_err(|err| HandlerError::new(err.to_string()))
        }
        AuthOp::GetPermissions => Ok(json!(ctx.grants.get_app_permissions(app_id))),
    }
}
