use super::{parse_payload, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::LocationOp;
use crate::geo::{GeoPoint, PositionOptions};
use crate::protocol::ErrorCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Deserialize, Default)]
#[serde(default)]
struct PositionPayload {
    options: Option<PositionOptions>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchPayload {
    #[serde(default)]
    watch_id: String,
}

#[derive(Deserialize)]
struct DistancePayload {
    from: GeoPoint,
    to: GeoPoint,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Deserialize)]
struct GeocodePayload {
    #[serde(default)]
    address: String,
}

pub(super) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    op: LocationOp,
    payload: Value,
) -> HandlerResult {
    match op {
        LocationOp::GetCurrentPosition => {
            let request: PositionPayload = parse_payload(payload, "position request")?;
            current_position(ctx, request.options.unwrap_or_default()).await
        }
        LocationOp::WatchPosition => {
            let watch_id = watch_id(payload)?;
            ctx.sessions.add_watch(app_id, &watch_id);
            Ok(json!({ "success": true }))
        }
        LocationOp::ClearWatch => {
            let watch_id = watch_id(payload)?;
            Ok(json!({ "success": ctx.sessions.clear_watch(app_id, &watch_id) }))
        }
        LocationOp::CalculateDistance => {
            let request: DistancePayload = parse_payload(payload, "distance request")?;
            if !request.from.is_valid() || !request.to.is_valid() {
                return Err(HandlerError::with_code(
                    ErrorCode::ValidationError,
                    "Invalid coordinates",
                ));
            }
            let meters = request.from.distance_meters(&request.to);
            Ok(json!({
                "distanceMeters": meters,
                "distanceKm": meters / 1000.0,
                "mode": request.mode.unwrap_or_else(|| "straight".to_string()),
            }))
        }
        LocationOp::Geocode => {
            let request: GeocodePayload = parse_payload(payload, "geocode request")?;
            let address = request.address.trim();
            if address.is_empty() {
                return Err(HandlerError::new(
                    "Invalid geocode request: address is required",
                ));
            }
            let point = ctx.services.location.geocode(address).await?;
            Ok(json!(point))
        }
        LocationOp::ReverseGeocode => {
            let point: GeoPoint = parse_payload(payload, "reverse geocode request")?;
            if !point.is_valid() {
                return Err(HandlerError::with_code(
                    ErrorCode::ValidationError,
                    "Invalid coordinates",
                ));
            }
            let name = ctx.services.location.reverse_geocode(point).await?;
            Ok(json!(name))
        }
    }
}

async fn current_position(ctx: &HostContext, options: PositionOptions) -> HandlerResult {
    let limit = Duration::from_millis(options.timeout_ms);
    match tokio::time::timeout(limit, ctx.services.location.current_position(&options)).await {
        Ok(position) => {
            serde_json::to_value(position?).map_err(|err| HandlerError::new(err.to_string()))
        }
        Err(_) => Err(HandlerError::with_code(
            ErrorCode::Timeout,
            "Position request timed out",
        )),
    }
}

fn watch_id(payload: Value) -> Result<String, HandlerError> {
    let request: WatchPayload = parse_payload(payload, "watch request")?;
    let watch_id = request.watch_id.trim();
    if watch_id.is_empty() {
        return Err(HandlerError::new(
            "Invalid watch request: watchId is required",
        ));
    }
    Ok(watch_id.to_string())
}
