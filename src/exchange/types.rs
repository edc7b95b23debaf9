//! Wire types for the trust service endpoints

use serde::{Deserialize, Serialize};

/// POST /get-secret-key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRequest {
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyResponse {
    pub secret_key: Option<String>,
}

/// POST /decrypt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub mac_address: String,
    pub encrypted_data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    /// Shape is up to the device firmware; usually a string
    pub decrypted_data: Option<serde_json::Value>,
    pub guid: Option<String>,
}

/// POST /generate-pin
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRequest {
    pub mac_address: String,
    pub guid: String,
    pub role: String,
    pub secret_key: String,
}

impl std::fmt::Debug for PinRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinRequest")
            .field("mac_address", &self.mac_address)
            .field("guid", &self.guid)
            .field("role", &self.role)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// The service answers with `generated_pin` as either a string or a number
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PinResponse {
    pub generated_pin: Option<serde_json::Value>,
}

/// Successful result of the decrypt step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub decrypted_data: Option<String>,
    pub guid: String,
}
