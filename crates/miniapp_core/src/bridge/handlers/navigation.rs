use super::{parse_payload, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::NavigationOp;
use crate::launcher::LaunchOutcome;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct GoToPayload {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAppPayload {
    #[serde(default)]
    app_id: String,
}

pub(super) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    op: NavigationOp,
    payload: Value,
) -> HandlerResult {
    match op {
        NavigationOp::GoTo => {
            let request: GoToPayload = parse_payload(payload, "navigation request")?;
            if !is_in_app_route(&request.path) {
                return Err(HandlerError::new(format!(
                    "Invalid navigation path: {}",
                    request.path
                )));
            }
            ctx.services.navigator.navigate(&request.path);
            Ok(Value::Null)
        }
        NavigationOp::GoBack => {
            ctx.services.navigator.go_back();
            Ok(Value::Null)
        }
        NavigationOp::OpenApp => {
            let request: OpenAppPayload = parse_payload(payload, "open app request")?;
            let target = request.app_id.trim();
            let manifest = ctx
                .manifest(target)
                .ok_or_else(|| HandlerError::new(format!("App not found: {target}")))?;
            let outcome = ctx
                .launcher()
                .launch(&manifest)
                .await
                .map_err(|err| HandlerError::new(err.to_string()))?;
            ctx.grants.record_app_usage(target);
            info!(
                "event=open_app module=bridge status=ok app_id={} target={}",
                app_id,
                target
            );
            Ok(match outcome {
                LaunchOutcome::Navigated { route } => json!({ "route": route }),
                LaunchOutcome::OpenedExternal { url } => json!({ "url": url }),
            })
        }
    }
}

/// Absolute in-app route; no scheme or protocol-relative host.
fn is_in_app_route(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::is_in_app_route;

    #[test]
    fn only_absolute_in_app_routes_are_allowed() {
        assert!(is_in_app_route("/app/wallet"));
        assert!(!is_in_app_route("app/wallet"));
        assert!(!is_in_app_route("//evil.test"));
        assert!(!is_in_app_route("/redirect?to=https://evil.test"));
        assert!(!is_in_app_route(""));
    }
}
