//! Envelope/response wire types exchanged across the isolation boundary.
//!
//! # Invariants
//! - A response always echoes the id of the envelope it answers.
//! - Exactly one of `data` / `error` is meaningful, selected by `success`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Protocol version spoken by this kernel.
pub const PROTOCOL_VERSION: &str = "0.2.0";

/// Inbound capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: String,
    pub capability: String,
    #[serde(default)]
    pub payload: Value,
    /// Sender clock, epoch milliseconds.
    pub timestamp: u64,
    pub protocol_version: String,
    /// Base64 HMAC-SHA256 over the signed fields; required for apps
    /// holding a signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Builds an envelope stamped with the current time and protocol version.
    pub fn new(id: impl Into<String>, capability: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            payload,
            timestamp: now_ms(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            signature: None,
        }
    }
}

/// Wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownCapability,
    PermissionDenied,
    HandlerError,
    ValidationError,
    QuotaExceeded,
    OperationInProgress,
    Timeout,
    InvalidEnvelope,
    ReplayDetected,
    RateLimitExceeded,
    SessionClosed,
    AppSuspended,
    InvalidSignature,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownCapability => "UNKNOWN_CAPABILITY",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::HandlerError => "HANDLER_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::OperationInProgress => "OPERATION_IN_PROGRESS",
            Self::Timeout => "TIMEOUT",
            Self::InvalidEnvelope => "INVALID_ENVELOPE",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::AppSuspended => "APP_SUSPENDED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Outbound reply correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub timestamp: u64,
}

impl Response {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_ms(),
        }
    }

    pub fn err(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
                details: None,
            }),
            timestamp: now_ms(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|error| error.code)
    }
}

/// Host-originated event pushed to subscribed apps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event: String,
    pub data: Value,
    pub timestamp: u64,
}

/// Message delivered across an app boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outbound {
    Response(Response),
    Event(EventMessage),
}

/// Current wall clock in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Major component of a `major.minor.patch` version string.
pub(crate) fn major_version(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}
