//! Scriptable in-process trust service for tests

use super::types::{
    DecryptRequest, DecryptResponse, PinRequest, PinResponse, SecretKeyRequest, SecretKeyResponse,
};
use super::TrustService;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub(crate) struct FakeTrustService {
    secret_key: Option<String>,
    fail_secret_key: bool,
    decrypt_failures_left: AtomicUsize,
    pin: serde_json::Value,
    pin_failures_left: AtomicUsize,
    decrypt_gated: bool,
    pin_gated: bool,
    decrypt_gate: Notify,
    pin_gate: Notify,
    secret_key_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
    pin_calls: AtomicUsize,
    last_pin_request: Mutex<Option<PinRequest>>,
}

impl FakeTrustService {
    /// Key `K1`, decrypt `{D1, G1}`, PIN `483920`
    pub fn happy() -> Self {
        Self {
            secret_key: Some("K1".to_string()),
            fail_secret_key: false,
            decrypt_failures_left: AtomicUsize::new(0),
            pin: serde_json::json!("483920"),
            pin_failures_left: AtomicUsize::new(0),
            decrypt_gated: false,
            pin_gated: false,
            decrypt_gate: Notify::new(),
            pin_gate: Notify::new(),
            secret_key_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
            pin_calls: AtomicUsize::new(0),
            last_pin_request: Mutex::new(None),
        }
    }

    pub fn with_secret_key(mut self, key: Option<&str>) -> Self {
        self.secret_key = key.map(str::to_string);
        self
    }

    pub fn fail_secret_key(mut self) -> Self {
        self.fail_secret_key = true;
        self
    }

    pub fn fail_decrypt(self) -> Self {
        self.fail_next_decrypts(usize::MAX)
    }

    pub fn fail_next_decrypts(self, count: usize) -> Self {
        self.decrypt_failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_pin(mut self, pin: serde_json::Value) -> Self {
        self.pin = pin;
        self
    }

    pub fn fail_next_pins(self, count: usize) -> Self {
        self.pin_failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Hold every decrypt call until [`release_decrypt`](Self::release_decrypt)
    pub fn gate_decrypt(mut self) -> Self {
        self.decrypt_gated = true;
        self
    }

    /// Hold every PIN call until [`release_pin`](Self::release_pin)
    pub fn gate_pin(mut self) -> Self {
        self.pin_gated = true;
        self
    }

    pub fn release_decrypt(&self) {
        self.decrypt_gate.notify_one();
    }

    pub fn release_pin(&self) {
        self.pin_gate.notify_one();
    }

    pub fn secret_key_calls(&self) -> usize {
        self.secret_key_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    pub fn pin_calls(&self) -> usize {
        self.pin_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.secret_key_calls() + self.decrypt_calls() + self.pin_calls()
    }

    pub fn last_pin_request(&self) -> Option<PinRequest> {
        self.last_pin_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrustService for FakeTrustService {
    async fn get_secret_key(&self, _request: &SecretKeyRequest) -> Result<SecretKeyResponse> {
        self.secret_key_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_secret_key {
            anyhow::bail!("POST /get-secret-key failed with status 404 Not Found: unknown device");
        }
        Ok(SecretKeyResponse {
            secret_key: self.secret_key.clone(),
        })
    }

    async fn decrypt(&self, _request: &DecryptRequest) -> Result<DecryptResponse> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        if self.decrypt_gated {
            self.decrypt_gate.notified().await;
        }
        if take_failure(&self.decrypt_failures_left) {
            anyhow::bail!("POST /decrypt failed with status 400 Bad Request: key mismatch");
        }
        Ok(DecryptResponse {
            decrypted_data: Some(serde_json::json!("D1")),
            guid: Some("G1".to_string()),
        })
    }

    async fn generate_pin(&self, request: &PinRequest) -> Result<PinResponse> {
        self.pin_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pin_request.lock().unwrap() = Some(request.clone());
        if self.pin_gated {
            self.pin_gate.notified().await;
        }
        if take_failure(&self.pin_failures_left) {
            anyhow::bail!("POST /generate-pin failed with status 500 Internal Server Error");
        }
        Ok(PinResponse {
            generated_pin: Some(self.pin.clone()),
        })
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
