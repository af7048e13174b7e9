use super::{current_user, parse_payload, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::WalletOp;
use crate::collab::{TokenBalance, TransferRequest, UiEvent};
use crate::pending::{is_affirmative, PendingKind, PendingOutcome};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalancePayload {
    #[serde(default)]
    asset_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPayload {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    from_block: Option<u64>,
}

pub(super) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    op: WalletOp,
    payload: Value,
) -> HandlerResult {
    match op {
        WalletOp::GetBalance => {
            let request: BalancePayload = parse_payload(payload, "balance request")?;
            let user = current_user(ctx)?;
            let balances = ctx.services.wallet.balances(&user.address).await?;
            let records: Vec<Value> = balances
                .iter()
                .filter(|balance| {
                    request
                        .asset_id
                        .as_deref()
                        .map_or(true, |asset_id| balance.asset_id == asset_id)
                })
                .map(balance_json)
                .collect::<Result<_, _>>()?;
            Ok(Value::Array(records))
        }
        WalletOp::GetHistory => {
            let request: HistoryPayload = parse_payload(payload, "history request")?;
            let user = current_user(ctx)?;
            let limit = request
                .limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .min(MAX_HISTORY_LIMIT);
            let history = ctx
                .services
                .wallet
                .history(&user.address, limit, request.from_block)
                .await?;
            serde_json::to_value(history).map_err(|err| HandlerError::new(err.to_string()))
        }
        WalletOp::RequestTransfer => request_transfer(ctx, app_id, payload).await,
    }
}

async fn request_transfer(ctx: &HostContext, app_id: &str, payload: Value) -> HandlerResult {
    let request: TransferRequest = parse_payload(payload, "transfer request")?;
    if request.to.trim().is_empty() || request.amount.trim().is_empty() {
        return Err(HandlerError::new(
            "Invalid transfer request: missing required fields",
        ));
    }
    let user = current_user(ctx)?;
    let params = serde_json::to_value(&request).map_err(|err| HandlerError::new(err.to_string()))?;

    let ticket = ctx.pending.begin(PendingKind::Transfer, app_id, params)?;
    ctx.services
        .ui
        .notify(UiEvent::PendingRequested(ticket.request().clone()));
    match ticket.wait().await {
        PendingOutcome::Resolved(value) if is_affirmative(&value) => {
            match ctx.services.wallet.submit_transfer(&user.address, &request).await {
                Ok(tx_hash) => Ok(json!({ "confirmed": true, "txHash": tx_hash })),
                Err(err) => {
                    warn!(
                        "event=transfer_submit module=bridge status=error app_id={} error={}",
                        app_id, err
                    );
                    Ok(json!({ "confirmed": false, "error": err.to_string() }))
                }
            }
        }
        PendingOutcome::Resolved(value) => Ok(declined(value.get("error").and_then(Value::as_str))),
        PendingOutcome::Rejected(reason) => Ok(declined(Some(&reason))),
        PendingOutcome::TimedOut => Ok(declined(Some("Transfer request timed out"))),
        PendingOutcome::Cancelled => Err(HandlerError::session_closed()),
    }
}

fn declined(error: Option<&str>) -> Value {
    match error {
        Some(error) => json!({ "confirmed": false, "error": error }),
        None => json!({ "confirmed": false }),
    }
}

fn balance_json(balance: &TokenBalance) -> Result<Value, HandlerError> {
    let mut value = serde_json::to_value(balance).map_err(|err| HandlerError::new(err.to_string()))?;
    if let Value::Object(object) = &mut value {
        object.insert(
            "formatted".to_string(),
            Value::String(format_units(&balance.free, balance.decimals)),
        );
    }
    Ok(value)
}

/// Renders an integer amount in smallest units as a decimal string.
///
/// Non-numeric input is returned unchanged.
fn format_units(raw: &str, decimals: u8) -> String {
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return digits.to_string();
    }
    let decimals = usize::from(decimals);
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let whole = match whole.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    match fraction.trim_end_matches('0') {
        "" => whole.to_string(),
        fraction => format!("{whole}.{fraction}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{declined, format_units};
    use serde_json::json;

    #[test]
    fn formats_smallest_units() {
        assert_eq!(format_units("1500000000000", 12), "1.5");
        assert_eq!(format_units("123", 2), "1.23");
        assert_eq!(format_units("5", 3), "0.005");
        assert_eq!(format_units("0", 12), "0");
        assert_eq!(format_units("42", 0), "42");
        assert_eq!(format_units("n/a", 12), "n/a");
    }

    #[test]
    fn declined_shape_omits_missing_error() {
        assert_eq!(declined(None), json!({"confirmed": false}));
        assert_eq!(
            declined(Some("nope")),
            json!({"confirmed": false, "error": "nope"})
        );
    }
}
