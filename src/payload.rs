//! QR payload parsing
//!
//! Devices encode `{"macAddress": "...", "encryptedData": "..."}` in their
//! QR code. Invalid JSON is rejected outright. Valid JSON with a missing
//! field is accepted by default with the field set to [`NOT_AVAILABLE`];
//! [`PayloadPolicy::Strict`] turns that into a rejection.

use crate::error::AccessError;
use serde_json::Value;
use std::fmt;

/// Placeholder for a field the QR payload did not carry
pub const NOT_AVAILABLE: &str = "N/A";

/// A scanned device's request for access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    mac_address: String,
    encrypted_payload: String,
}

impl AccessRequest {
    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    pub fn encrypted_payload(&self) -> &str {
        &self.encrypted_payload
    }

    /// True if either field was substituted during parsing
    pub fn is_partial(&self) -> bool {
        self.mac_address == NOT_AVAILABLE || self.encrypted_payload == NOT_AVAILABLE
    }
}

impl fmt::Display for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAC={} payload={} chars",
            self.mac_address,
            self.encrypted_payload.len()
        )
    }
}

/// How to treat valid JSON that lacks one of the expected fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadPolicy {
    /// Substitute "N/A" and carry on
    #[default]
    Lenient,
    /// Reject with `MalformedPayload`
    Strict,
}

impl PayloadPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            PayloadPolicy::Strict
        } else {
            PayloadPolicy::Lenient
        }
    }
}

/// Parse decoded QR text into an [`AccessRequest`]
pub fn parse_access_request(text: &str, policy: PayloadPolicy) -> Result<AccessRequest, AccessError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| AccessError::MalformedPayload(format!("not valid JSON: {}", e)))?;

    if value.is_null() {
        return Err(AccessError::MalformedPayload("payload is null".to_string()));
    }

    let mac_address = field(&value, "macAddress");
    let encrypted_payload = field(&value, "encryptedData");

    if policy == PayloadPolicy::Strict {
        let missing: Vec<&str> = [
            ("macAddress", mac_address.is_none()),
            ("encryptedData", encrypted_payload.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(AccessError::MalformedPayload(format!(
                "missing field(s): {}",
                missing.join(", ")
            )));
        }
    }

    Ok(AccessRequest {
        mac_address: mac_address.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        encrypted_payload: encrypted_payload.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    })
}

/// A field counts as present only if it holds a meaningful value:
/// empty strings, `false`, zero and `null` are treated as absent.
fn field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        v @ (Value::Array(_) | Value::Object(_)) => Some(v.to_string()),
        _ => None,
    }
}
