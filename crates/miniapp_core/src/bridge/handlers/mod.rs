//! Capability handlers, one module per resource.
//!
//! Handlers run only after the dispatcher admitted the envelope and checked
//! the required permission. They never see another app's id.

mod auth;
mod contracts;
mod events;
mod location;
mod navigation;
mod storage;
mod ui;
mod wallet;

use super::HostContext;
use crate::capability::Capability;
use crate::collab::{CollaboratorError, UserIdentity};
use crate::pending::PendingError;
use crate::protocol::ErrorCode;
use crate::storage::StorageError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by a capability handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    /// Generic `HANDLER_ERROR` failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::HandlerError, message)
    }

    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_authenticated() -> Self {
        Self::new("User not authenticated")
    }

    pub fn session_closed() -> Self {
        Self::with_code(ErrorCode::SessionClosed, "App session closed")
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for HandlerError {}

impl From<StorageError> for HandlerError {
    fn from(value: StorageError) -> Self {
        let code = if value.is_quota() {
            ErrorCode::QuotaExceeded
        } else if value.is_validation() {
            ErrorCode::ValidationError
        } else {
            ErrorCode::HandlerError
        };
        Self::with_code(code, value.to_string())
    }
}

impl From<PendingError> for HandlerError {
    fn from(value: PendingError) -> Self {
        Self::with_code(ErrorCode::OperationInProgress, value.to_string())
    }
}

impl From<CollaboratorError> for HandlerError {
    fn from(value: CollaboratorError) -> Self {
        Self::new(value.to_string())
    }
}

pub type HandlerResult = Result<Value, HandlerError>;

/// Runs the handler for `capability` on behalf of `app_id`.
pub(crate) async fn handle(
    ctx: &HostContext,
    app_id: &str,
    capability: Capability,
    payload: Value,
) -> HandlerResult {
    match capability {
        Capability::Auth(op) => auth::handle(ctx, app_id, op),
        Capability::Wallet(op) => wallet::handle(ctx, app_id, op, payload).await,
        Capability::Storage(op) => storage::handle(ctx, app_id, op, payload),
        Capability::Ui(op) => ui::handle(ctx, app_id, op, payload).await,
        Capability::Navigation(op) => navigation::handle(ctx, app_id, op, payload).await,
        Capability::Events(op) => events::handle(ctx, app_id, op, payload),
        Capability::Contracts(op) => contracts::handle(ctx, app_id, op, payload).await,
        Capability::Location(op) => location::handle(ctx, app_id, op, payload).await,
    }
}

/// Decodes a payload; a null payload decodes like `{}`.
fn parse_payload<T: DeserializeOwned>(payload: Value, what: &str) -> Result<T, HandlerError> {
    let payload = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(payload).map_err(|err| HandlerError::new(format!("Invalid {what}: {err}")))
}

fn current_user(ctx: &HostContext) -> Result<UserIdentity, HandlerError> {
    ctx.services
        .identity
        .current_user()
        .ok_or_else(HandlerError::not_authenticated)
}
