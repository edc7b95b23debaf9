//! reqwest-backed trust service client
//!
//! Every call is a JSON POST to `<base url><path>`. Any transport error
//! or non-2xx status is an error; bodies of failed responses are kept in
//! the error message for the operator.

use super::types::{
    DecryptRequest, DecryptResponse, PinRequest, PinResponse, SecretKeyRequest, SecretKeyResponse,
};
use super::TrustService;
use crate::config::TrustServiceConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

pub const SECRET_KEY_PATH: &str = "/get-secret-key";
pub const DECRYPT_PATH: &str = "/decrypt";
pub const GENERATE_PIN_PATH: &str = "/generate-pin";

/// HTTP client for the trust service
pub struct HttpTrustService {
    base_url: String,
    http: Client,
}

impl HttpTrustService {
    pub fn new(config: &TrustServiceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build reqwest client")?;

        info!(
            "Trust service client created for {} (timeout {:?})",
            config.url,
            config.timeout()
        );

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to send POST {}", path))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("POST {} failed with status {}: {}", path, status, body_text);
        }

        resp.json::<R>()
            .await
            .with_context(|| format!("invalid response body from POST {}", path))
    }
}

#[async_trait]
impl TrustService for HttpTrustService {
    async fn get_secret_key(&self, request: &SecretKeyRequest) -> Result<SecretKeyResponse> {
        self.post(SECRET_KEY_PATH, request).await
    }

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse> {
        self.post(DECRYPT_PATH, request).await
    }

    async fn generate_pin(&self, request: &PinRequest) -> Result<PinResponse> {
        self.post(GENERATE_PIN_PATH, request).await
    }
}
