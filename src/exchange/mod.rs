//! Exchange with the trust service
//!
//! Three independent calls turn a scanned request into a PIN:
//! 1. `/get-secret-key` with the device MAC → secret key (cached)
//! 2. `/decrypt` with MAC + encrypted QR payload → GUID
//! 3. `/generate-pin` with MAC, GUID, operator role and secret key → PIN
//!
//! [`TrustService`] is the transport seam; [`ExchangeClient`] maps its
//! failures onto [`AccessError`] kinds and maintains the secret cache.
//! Nothing here retries.

pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use crate::cache::SecretCache;
use crate::error::{describe, AccessError};
use crate::pin::Pin;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use types::{
    DecryptRequest, DecryptResponse, Decrypted, PinRequest, PinResponse, SecretKeyRequest,
    SecretKeyResponse,
};

pub use http::HttpTrustService;

/// Raw request/response access to the trust service
#[async_trait]
pub trait TrustService: Send + Sync {
    async fn get_secret_key(&self, request: &SecretKeyRequest) -> Result<SecretKeyResponse>;
    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse>;
    async fn generate_pin(&self, request: &PinRequest) -> Result<PinResponse>;
}

/// Trust service calls with error mapping and secret caching
#[derive(Clone)]
pub struct ExchangeClient {
    service: Arc<dyn TrustService>,
    cache: SecretCache,
}

impl ExchangeClient {
    pub fn new(service: Arc<dyn TrustService>, cache: SecretCache) -> Self {
        Self { service, cache }
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Fetch the device's secret key and record it in the cache
    pub async fn fetch_secret_key(&self, mac_address: &str) -> Result<String, AccessError> {
        let request = SecretKeyRequest {
            mac_address: mac_address.to_string(),
        };
        let response = self
            .service
            .get_secret_key(&request)
            .await
            .map_err(|e| AccessError::KeyExchange(describe(&e)))?;

        let secret_key = response
            .secret_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AccessError::KeyExchange("response did not include a secret key".to_string())
            })?;

        if let Err(e) = self.cache.store(mac_address, &secret_key).await {
            warn!("Secret key for {} cached in memory only: {:#}", mac_address, e);
        }

        info!(
            "Obtained secret key for {} ({} device(s) cached)",
            mac_address,
            self.cache.len().await
        );
        Ok(secret_key)
    }

    /// Have the trust service decrypt the QR payload
    pub async fn decrypt(
        &self,
        mac_address: &str,
        encrypted_data: &str,
    ) -> Result<Decrypted, AccessError> {
        let request = DecryptRequest {
            mac_address: mac_address.to_string(),
            encrypted_data: encrypted_data.to_string(),
        };
        let response = self
            .service
            .decrypt(&request)
            .await
            .map_err(|e| AccessError::Decryption(describe(&e)))?;

        let guid = response
            .guid
            .filter(|g| !g.is_empty())
            .ok_or_else(|| AccessError::Decryption("response did not include a guid".to_string()))?;

        let decrypted_data = response.decrypted_data.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        info!("Decrypted payload for {} (guid {})", mac_address, guid);
        Ok(Decrypted {
            decrypted_data,
            guid,
        })
    }

    /// Request a one-time PIN for the decrypted session
    pub async fn generate_pin(
        &self,
        mac_address: &str,
        guid: &str,
        role: &str,
        secret_key: &str,
    ) -> Result<Pin, AccessError> {
        let request = PinRequest {
            mac_address: mac_address.to_string(),
            guid: guid.to_string(),
            role: role.to_string(),
            secret_key: secret_key.to_string(),
        };
        let response = self
            .service
            .generate_pin(&request)
            .await
            .map_err(|e| AccessError::PinGeneration(describe(&e)))?;

        let pin = match response.generated_pin {
            Some(serde_json::Value::String(s)) => Pin::parse(&s).map_err(AccessError::PinGeneration)?,
            Some(serde_json::Value::Number(n)) => n.as_u64().map(Pin::from_number).ok_or_else(|| {
                AccessError::PinGeneration(format!("PIN {} is not a whole number", n))
            })?,
            _ => {
                return Err(AccessError::PinGeneration(
                    "response did not include generated_pin".to_string(),
                ))
            }
        };

        if !pin.has_expected_length() {
            warn!("PIN for {} has {} digits", mac_address, pin.as_str().len());
        }
        info!("PIN issued for {} (guid {}, role {})", mac_address, guid, role);
        Ok(pin)
    }
}
