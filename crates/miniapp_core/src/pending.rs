//! Single-flight pending operations awaiting human approval.
//!
//! # Responsibility
//! - Hold at most one outstanding operation per [`PendingKind`].
//! - Settle each operation exactly once: explicit resolve/reject, timeout,
//!   or cancellation when its app session closes.
//!
//! # Invariants
//! - A second `begin` for an occupied kind fails with
//!   [`PendingError::OperationInProgress`]; the first caller keeps its slot.
//! - A slot is released when its ticket settles or is dropped, and only the
//!   ticket that created a slot can release it.

use crate::config::KernelConfig;
use crate::protocol::now_ms;
use crate::sync::lock;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    Confirm,
    Transfer,
    Deployment,
}

impl PendingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Transfer => "transfer",
            Self::Deployment => "deployment",
        }
    }
}

impl Display for PendingKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pending operation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOutcome {
    /// The host UI answered with a result value.
    Resolved(Value),
    /// The host UI rejected the operation with a reason.
    Rejected(String),
    TimedOut,
    /// The owning app session closed first.
    Cancelled,
}

/// Whether a resolve value means "the user approved".
///
/// Accepts `true` or an object with `"confirmed": true`.
pub fn is_affirmative(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Object(object) => object.get("confirmed").and_then(Value::as_bool) == Some(true),
        _ => false,
    }
}

/// Snapshot of an outstanding operation, shown by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub operation_id: String,
    pub kind: PendingKind,
    pub app_id: String,
    pub created_at: u64,
    pub timeout_ms: u64,
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimeouts {
    pub confirm: Duration,
    pub transfer: Duration,
    pub deployment: Duration,
}

impl PendingTimeouts {
    pub fn for_kind(&self, kind: PendingKind) -> Duration {
        match kind {
            PendingKind::Confirm => self.confirm,
            PendingKind::Transfer => self.transfer,
            PendingKind::Deployment => self.deployment,
        }
    }
}

impl From<&KernelConfig> for PendingTimeouts {
    fn from(config: &KernelConfig) -> Self {
        Self {
            confirm: Duration::from_millis(config.confirm_timeout_ms),
            transfer: Duration::from_millis(config.transfer_timeout_ms),
            deployment: Duration::from_millis(config.deployment_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    OperationInProgress { kind: PendingKind, app_id: String },
}

impl Display for PendingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OperationInProgress { kind, app_id } => write!(
                f,
                "a {kind} operation requested by `{app_id}` is already awaiting approval"
            ),
        }
    }
}

impl Error for PendingError {}

#[derive(Debug)]
struct Slot {
    request: PendingRequest,
    settle: oneshot::Sender<PendingOutcome>,
}

#[derive(Debug)]
pub struct PendingManager {
    timeouts: PendingTimeouts,
    slots: Mutex<HashMap<PendingKind, Slot>>,
}

impl PendingManager {
    pub fn new(timeouts: PendingTimeouts) -> Self {
        Self {
            timeouts,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the slot for `kind`.
    pub fn begin(
        self: &Arc<Self>,
        kind: PendingKind,
        app_id: &str,
        params: Value,
    ) -> Result<PendingTicket, PendingError> {
        let timeout = self.timeouts.for_kind(kind);
        let mut slots = lock(&self.slots);
        if let Some(existing) = slots.get(&kind) {
            warn!(
                "event=pending_begin module=pending status=in_progress kind={} app_id={} holder={}",
                kind, app_id, existing.request.app_id
            );
            return Err(PendingError::OperationInProgress {
                kind,
                app_id: existing.request.app_id.clone(),
            });
        }

        let request = PendingRequest {
            operation_id: Uuid::new_v4().to_string(),
            kind,
            app_id: app_id.to_string(),
            created_at: now_ms(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            params,
        };
        let (settle, receiver) = oneshot::channel();
        slots.insert(
            kind,
            Slot {
                request: request.clone(),
                settle,
            },
        );
        info!(
            "event=pending_begin module=pending status=ok kind={} app_id={} operation_id={}",
            kind, app_id, request.operation_id
        );
        Ok(PendingTicket {
            manager: Arc::clone(self),
            request,
            timeout,
            receiver: Some(receiver),
        })
    }

    /// Resolves the outstanding operation of `kind`. Returns whether one existed.
    pub fn resolve(&self, kind: PendingKind, value: Value) -> bool {
        self.settle(kind, PendingOutcome::Resolved(value))
    }

    pub fn reject(&self, kind: PendingKind, reason: impl Into<String>) -> bool {
        self.settle(kind, PendingOutcome::Rejected(reason.into()))
    }

    /// Cancels every operation owned by `app_id` and returns how many.
    pub fn cancel_app(&self, app_id: &str) -> usize {
        let cancelled: Vec<Slot> = {
            let mut slots = lock(&self.slots);
            let kinds: Vec<PendingKind> = slots
                .iter()
                .filter(|(_, slot)| slot.request.app_id == app_id)
                .map(|(kind, _)| *kind)
                .collect();
            kinds
                .into_iter()
                .filter_map(|kind| slots.remove(&kind))
                .collect()
        };
        let count = cancelled.len();
        for slot in cancelled {
            let _ = slot.settle.send(PendingOutcome::Cancelled);
        }
        if count > 0 {
            info!(
                "event=pending_cancel module=pending status=ok app_id={} cancelled={}",
                app_id, count
            );
        }
        count
    }

    pub fn outstanding(&self, kind: PendingKind) -> Option<PendingRequest> {
        lock(&self.slots)
            .get(&kind)
            .map(|slot| slot.request.clone())
    }

    fn settle(&self, kind: PendingKind, outcome: PendingOutcome) -> bool {
        let Some(slot) = lock(&self.slots).remove(&kind) else {
            warn!(
                "event=pending_settle module=pending status=no_operation kind={}",
                kind
            );
            return false;
        };
        info!(
            "event=pending_settle module=pending status=ok kind={} app_id={} operation_id={}",
            kind, slot.request.app_id, slot.request.operation_id
        );
        // A dropped receiver means the caller already went away.
        let _ = slot.settle.send(outcome);
        true
    }

    fn release(&self, kind: PendingKind, operation_id: &str) -> bool {
        let mut slots = lock(&self.slots);
        let owned = slots
            .get(&kind)
            .is_some_and(|slot| slot.request.operation_id == operation_id);
        if owned {
            slots.remove(&kind);
        }
        owned
    }
}

/// Handle held by the capability call that created a pending operation.
#[derive(Debug)]
pub struct PendingTicket {
    manager: Arc<PendingManager>,
    request: PendingRequest,
    timeout: Duration,
    receiver: Option<oneshot::Receiver<PendingOutcome>>,
}

impl PendingTicket {
    pub fn request(&self) -> &PendingRequest {
        &self.request
    }

    /// Waits until the operation settles or its timeout elapses.
    pub async fn wait(mut self) -> PendingOutcome {
        let Some(receiver) = self.receiver.take() else {
            return PendingOutcome::Cancelled;
        };
        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => PendingOutcome::Cancelled,
            Err(_) => {
                if self
                    .manager
                    .release(self.request.kind, &self.request.operation_id)
                {
                    info!(
                        "event=pending_settle module=pending status=timeout kind={} app_id={} operation_id={}",
                        self.request.kind, self.request.app_id, self.request.operation_id
                    );
                }
                PendingOutcome::TimedOut
            }
        }
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.manager
            .release(self.request.kind, &self.request.operation_id);
    }
}
