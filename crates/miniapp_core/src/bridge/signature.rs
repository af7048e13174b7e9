//! HMAC envelope signatures for apps that hold a signing key.
//!
//! The signed bytes are the compact JSON of `{id, type, payload, timestamp}`
//! in that order, where `type` carries the capability string. Object keys
//! inside `payload` serialize in sorted order.

use crate::protocol::Envelope;
use crate::sync::lock;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct SignedFields<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    capability: &'a str,
    payload: &'a Value,
    timestamp: u64,
}

#[derive(Debug)]
pub enum SignatureError {
    Encode(serde_json::Error),
    Key,
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "failed to encode signed fields: {err}"),
            Self::Key => f.write_str("signing key rejected"),
        }
    }
}

impl std::error::Error for SignatureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Key => None,
        }
    }
}

fn mac_for(envelope: &Envelope, key: &[u8]) -> Result<HmacSha256, SignatureError> {
    let fields = SignedFields {
        id: &envelope.id,
        capability: &envelope.capability,
        payload: &envelope.payload,
        timestamp: envelope.timestamp,
    };
    let bytes = serde_json::to_vec(&fields).map_err(SignatureError::Encode)?;
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignatureError::Key)?;
    mac.update(&bytes);
    Ok(mac)
}

/// Computes the base64 signature an app sends in `envelope.signature`.
pub fn sign_envelope(envelope: &Envelope, key: &[u8]) -> Result<String, SignatureError> {
    let tag = mac_for(envelope, key)?.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(tag))
}

/// Constant-time check of `envelope.signature` against `key`.
pub(crate) fn verify_envelope(envelope: &Envelope, key: &[u8]) -> bool {
    let Some(encoded) = envelope.signature.as_deref() else {
        return false;
    };
    let Ok(tag) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    match mac_for(envelope, key) {
        Ok(mac) => mac.verify_slice(&tag).is_ok(),
        Err(_) => false,
    }
}

/// Per-app signing keys. Held in memory only.
#[derive(Default)]
pub(crate) struct SigningKeys {
    keys: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl SigningKeys {
    pub fn set(&self, app_id: &str, key: &[u8]) {
        lock(&self.keys).insert(app_id.to_string(), Arc::from(key));
    }

    pub fn remove(&self, app_id: &str) -> bool {
        lock(&self.keys).remove(app_id).is_some()
    }

    pub fn get(&self, app_id: &str) -> Option<Arc<[u8]>> {
        lock(&self.keys).get(app_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{sign_envelope, verify_envelope, SigningKeys};
    use crate::protocol::Envelope;
    use serde_json::json;

    fn signed(key: &[u8]) -> Envelope {
        let mut envelope = Envelope::new("req-1", "storage:get", json!({"key": "n", "a": 1}));
        envelope.signature = Some(sign_envelope(&envelope, key).expect("sign"));
        envelope
    }

    #[test]
    fn signature_binds_key_and_fields() {
        let envelope = signed(b"secret");
        assert!(verify_envelope(&envelope, b"secret"));
        assert!(!verify_envelope(&envelope, b"other"));

        let mut tampered = envelope.clone();
        tampered.capability = "storage:clear".to_string();
        assert!(!verify_envelope(&tampered, b"secret"));

        let mut retimed = envelope;
        retimed.timestamp += 1;
        assert!(!verify_envelope(&retimed, b"secret"));
    }

    #[test]
    fn missing_or_malformed_signatures_fail() {
        let mut envelope = Envelope::new("req-1", "storage:get", json!({}));
        assert!(!verify_envelope(&envelope, b"secret"));
        envelope.signature = Some("not base64!".to_string());
        assert!(!verify_envelope(&envelope, b"secret"));
    }

    #[test]
    fn signature_ignores_protocol_version() {
        let mut envelope = signed(b"secret");
        envelope.protocol_version = "0.9.0".to_string();
        assert!(verify_envelope(&envelope, b"secret"));
    }

    #[test]
    fn keys_are_per_app() {
        let keys = SigningKeys::default();
        keys.set("demo", b"k1");
        assert_eq!(keys.get("demo").as_deref(), Some(&b"k1"[..]));
        assert!(keys.get("other").is_none());
        assert!(keys.remove("demo"));
        assert!(!keys.remove("demo"));
    }
}
