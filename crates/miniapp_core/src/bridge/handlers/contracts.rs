use super::{current_user, HandlerError, HandlerResult};
use crate::bridge::HostContext;
use crate::capability::ContractsOp;
use crate::collab::{ContractKind, DeployedContract, UiEvent};
use crate::pending::{is_affirmative, PendingKind, PendingOutcome};
use crate::sync::lock;
use log::{info, warn};
use serde_json::{json, Value};

const SHARE_TOLERANCE: f64 = 0.01;

pub(super) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    op: ContractsOp,
    payload: Value,
) -> HandlerResult {
    let kind = match op {
        ContractsOp::List => return Ok(Value::Array(read_contracts(ctx, app_id))),
        ContractsOp::DeployLoyalty => ContractKind::Loyalty,
        ContractsOp::DeployEscrow => ContractKind::Escrow,
        ContractsOp::DeployRevenueSplit => ContractKind::RevenueSplit,
    };
    validate_config(kind, &payload)?;
    let owner = current_user(ctx)?;

    let ticket = ctx.pending.begin(
        PendingKind::Deployment,
        app_id,
        json!({ "type": kind.as_str(), "config": payload }),
    )?;
    ctx.services
        .ui
        .notify(UiEvent::PendingRequested(ticket.request().clone()));
    match ticket.wait().await {
        PendingOutcome::Resolved(value) if is_affirmative(&value) => {
            let contract = ctx
                .services
                .contracts
                .deploy(&owner.address, kind, &payload)
                .await?;
            record_contract(ctx, app_id, &contract);
            info!(
                "event=contract_deploy module=bridge status=ok app_id={} type={} contract_id={}",
                app_id,
                kind.as_str(),
                contract.contract_id
            );
            serde_json::to_value(contract).map_err(|err| HandlerError::new(err.to_string()))
        }
        PendingOutcome::Resolved(_) => Err(HandlerError::new("Deployment rejected: declined by user")),
        PendingOutcome::Rejected(reason) => {
            Err(HandlerError::new(format!("Deployment rejected: {reason}")))
        }
        PendingOutcome::TimedOut => Ok(json!({ "deployed": false, "error": "Deployment timed out" })),
        PendingOutcome::Cancelled => Err(HandlerError::session_closed()),
    }
}

fn validate_config(kind: ContractKind, config: &Value) -> Result<(), HandlerError> {
    match kind {
        ContractKind::Loyalty => {
            if !has_text(config, "name") || !has_text(config, "symbol") {
                return Err(HandlerError::new(
                    "Invalid loyalty config: name and symbol are required",
                ));
            }
        }
        ContractKind::Escrow => {
            if !has_text(config, "seller") || !has_text(config, "buyer") || !has_amount(config) {
                return Err(HandlerError::new(
                    "Invalid escrow config: seller, buyer, and amount are required",
                ));
            }
        }
        ContractKind::RevenueSplit => {
            let participants = config
                .get("participants")
                .and_then(Value::as_array)
                .filter(|participants| !participants.is_empty())
                .ok_or_else(|| {
                    HandlerError::new("Invalid revenue split config: participants are required")
                })?;
            let total: f64 = participants
                .iter()
                .map(|participant| participant.get("share").and_then(Value::as_f64).unwrap_or(0.0))
                .sum();
            if (total - 100.0).abs() > SHARE_TOLERANCE {
                return Err(HandlerError::new(
                    "Invalid revenue split config: shares must sum to 100%",
                ));
            }
        }
    }
    Ok(())
}

fn has_text(config: &Value, field: &str) -> bool {
    config
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.trim().is_empty())
}

fn has_amount(config: &Value) -> bool {
    match config.get("amount") {
        Some(Value::String(amount)) => !amount.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

fn contracts_key(ctx: &HostContext, app_id: &str) -> String {
    format!("{}:{app_id}", ctx.config.contracts_namespace)
}

/// Contracts recorded for `app_id`; missing or unreadable lists read as empty.
fn read_contracts(ctx: &HostContext, app_id: &str) -> Vec<Value> {
    let key = contracts_key(ctx, app_id);
    match ctx.backend.get(&key) {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(contracts) => contracts,
            Err(err) => {
                warn!(
                    "event=contract_list module=bridge status=unreadable app_id={} error={}",
                    app_id, err
                );
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(
                "event=contract_list module=bridge status=error app_id={} error={}",
                app_id, err
            );
            Vec::new()
        }
    }
}

fn record_contract(ctx: &HostContext, app_id: &str, contract: &DeployedContract) {
    let _guard = lock(&ctx.contract_log);
    let mut contracts = read_contracts(ctx, app_id);
    match serde_json::to_value(contract) {
        Ok(value) => contracts.push(value),
        Err(err) => {
            warn!(
                "event=contract_record module=bridge status=error app_id={} error={}",
                app_id, err
            );
            return;
        }
    }
    let result = serde_json::to_string(&contracts)
        .map_err(|err| err.to_string())
        .and_then(|raw| {
            ctx.backend
                .put(&contracts_key(ctx, app_id), &raw)
                .map_err(|err| err.to_string())
        });
    if let Err(err) = result {
        // The contract exists on chain; only the local index is stale.
        warn!(
            "event=contract_record module=bridge status=error app_id={} error={}",
            app_id, err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::validate_config;
    use crate::collab::ContractKind;
    use serde_json::json;

    #[test]
    fn loyalty_and_escrow_require_fields() {
        validate_config(ContractKind::Loyalty, &json!({"name": "Club", "symbol": "CLB"}))
            .expect("valid loyalty");
        let err = validate_config(ContractKind::Loyalty, &json!({"name": "Club"}))
            .expect_err("missing symbol");
        assert_eq!(
            err.message,
            "Invalid loyalty config: name and symbol are required"
        );

        validate_config(
            ContractKind::Escrow,
            &json!({"seller": "5Gs", "buyer": "5Gb", "amount": 10}),
        )
        .expect("numeric amount");
        validate_config(ContractKind::Escrow, &json!({"seller": "5Gs", "buyer": "5Gb"}))
            .expect_err("missing amount");
    }

    #[test]
    fn revenue_split_shares_must_total_one_hundred() {
        validate_config(
            ContractKind::RevenueSplit,
            &json!({"participants": [{"address": "a", "share": 60}, {"address": "b", "share": 40}]}),
        )
        .expect("valid split");

        let err = validate_config(
            ContractKind::RevenueSplit,
            &json!({"participants": [{"address": "a", "share": 60}]}),
        )
        .expect_err("short split");
        assert_eq!(
            err.message,
            "Invalid revenue split config: shares must sum to 100%"
        );

        let err = validate_config(ContractKind::RevenueSplit, &json!({"participants": []}))
            .expect_err("empty split");
        assert_eq!(
            err.message,
            "Invalid revenue split config: participants are required"
        );
    }
}
