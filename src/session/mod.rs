//! Access session state machine
//!
//! ```text
//! Idle ──activate──▶ Scanning ──first well-formed decode──▶ Decoded
//!   Decoded ──(auto)──▶ Exchanging(Credentials): secret key, then decrypt
//!     ├─ both ok ──▶ Ready
//!     └─ either fails ──▶ Failed(err)
//!   Ready ──request_pin──▶ Exchanging(Pin)
//!     ├─ ok ──▶ PinIssued
//!     └─ fails ──▶ Ready (retry without rescanning)
//! any ──reset──▶ Scanning (session discarded)
//! ```
//!
//! Each exchange stage has its own busy flag; a second trigger while one is
//! outstanding is rejected with `ConcurrentOperationRejected`. In-flight
//! calls are never cancelled. Every reset bumps the epoch, and a response
//! whose epoch (or session id and GUID, for PINs) no longer matches is
//! dropped instead of applied.

pub mod notice;
pub mod phase;

use crate::acquisition::{DecodeEvent, DecodeOutcome, DecodeSource};
use crate::error::AccessError;
use crate::exchange::types::Decrypted;
use crate::exchange::ExchangeClient;
use crate::payload::{parse_access_request, AccessRequest, PayloadPolicy, NOT_AVAILABLE};
use crate::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use notice::{Notice, SessionSnapshot};
pub use phase::{ExchangeStage, Phase};

const NOTICE_CAPACITY: usize = 64;

/// The authenticated operator requesting PINs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    role: String,
}

impl OperatorContext {
    pub fn new(role: impl Into<String>) -> anyhow::Result<Self> {
        let role = role.into();
        if role.trim().is_empty() {
            anyhow::bail!("operator role must not be empty");
        }
        Ok(Self { role })
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

struct Session {
    id: Uuid,
    request: AccessRequest,
    secret_key: Option<String>,
    guid: Option<String>,
    decrypted_data: Option<String>,
    pin: Option<Pin>,
}

impl Session {
    fn new(request: AccessRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            secret_key: None,
            guid: None,
            decrypted_data: None,
            pin: None,
        }
    }
}

struct State {
    phase: Phase,
    epoch: u64,
    session: Option<Session>,
    credentials_busy: bool,
    pin_busy: bool,
}

struct Inner {
    state: Mutex<State>,
    exchange: ExchangeClient,
    operator: OperatorContext,
    policy: PayloadPolicy,
    notices: broadcast::Sender<Notice>,
}

impl Inner {
    fn set_phase(&self, state: &mut State, phase: Phase) {
        if state.phase == phase {
            return;
        }
        debug!("Phase {} -> {}", state.phase, phase);
        state.phase = phase.clone();
        self.notify(Notice::PhaseChanged(phase));
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

/// Handle to the single live access session; clones share it
#[derive(Clone)]
pub struct AccessSession {
    inner: Arc<Inner>,
}

impl AccessSession {
    pub fn new(exchange: ExchangeClient, operator: OperatorContext, policy: PayloadPolicy) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        info!("Access session created for role {}", operator.role());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    epoch: 0,
                    session: None,
                    credentials_busy: false,
                    pin_busy: false,
                }),
                exchange,
                operator,
                policy,
                notices,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.lock().epoch == epoch
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        let session = state.session.as_ref();
        SessionSnapshot {
            phase: state.phase.clone(),
            session_id: session.map(|s| s.id),
            mac_address: session.map(|s| s.request.mac_address().to_string()),
            guid: session.and_then(|s| s.guid.clone()),
            decrypted_data: session.and_then(|s| s.decrypted_data.clone()),
            has_secret_key: session.is_some_and(|s| s.secret_key.is_some()),
            pin: session.and_then(|s| s.pin.clone()),
        }
    }

    /// Arm acquisition: `Idle → Scanning`
    pub fn activate(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Idle {
            self.inner.set_phase(&mut state, Phase::Scanning);
        }
    }

    /// Discard the session, including any in-flight results, and re-arm
    pub fn reset(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.session = None;
        state.credentials_busy = false;
        state.pin_busy = false;
        info!("Session reset (epoch {})", state.epoch);
        self.inner.set_phase(&mut state, Phase::Scanning);
    }

    /// Apply one decode event. Only the first well-formed request per
    /// session is acted on; it immediately runs the credential exchange.
    pub async fn handle_decode(&self, event: DecodeEvent) -> Result<(), AccessError> {
        {
            let mut state = self.lock();
            if !state.phase.accepts_decodes() {
                debug!("Ignoring {:?} decode in phase {}", event.source, state.phase);
                return Err(AccessError::ConcurrentOperationRejected(
                    "session is not scanning",
                ));
            }

            let text = match event.outcome {
                DecodeOutcome::Text(text) => text,
                DecodeOutcome::NothingFound if event.source == DecodeSource::Image => {
                    info!("Uploaded image contains no QR code");
                    self.inner.notify(Notice::NoCodeDetected);
                    return Err(AccessError::NoCodeDetected);
                }
                DecodeOutcome::NothingFound => return Ok(()),
            };

            let request = match parse_access_request(&text, self.inner.policy) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Rejected QR payload from {:?}: {}", event.source, e);
                    self.inner.notify(Notice::Error(e.clone()));
                    return Err(e);
                }
            };

            if request.is_partial() {
                warn!("QR payload incomplete, substituted {:?}: {}", NOT_AVAILABLE, request);
            }
            info!("Accepted access request ({}) from {:?}", request, event.source);

            state.session = Some(Session::new(request));
            self.inner.set_phase(&mut state, Phase::Decoded);
        }

        self.exchange_credentials().await
    }

    /// `Decoded → Exchanging(Credentials) → Ready | Failed`
    async fn exchange_credentials(&self) -> Result<(), AccessError> {
        let (epoch, request) = {
            let mut state = self.lock();
            if state.credentials_busy {
                return Err(AccessError::ConcurrentOperationRejected(
                    "credential exchange already in flight",
                ));
            }
            let request = match (&state.phase, &state.session) {
                (Phase::Decoded, Some(session)) => session.request.clone(),
                _ => {
                    return Err(AccessError::ConcurrentOperationRejected(
                        "no decoded request to exchange",
                    ))
                }
            };
            state.credentials_busy = true;
            self.inner
                .set_phase(&mut state, Phase::Exchanging(ExchangeStage::Credentials));
            (state.epoch, request)
        };

        let result = self.run_credential_calls(epoch, &request).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            debug!("Discarding credential exchange result for a reset session");
            return Err(AccessError::ConcurrentOperationRejected("session was reset"));
        }
        state.credentials_busy = false;

        match result {
            Ok((secret_key, decrypted)) => {
                if let Some(session) = state.session.as_mut() {
                    session.secret_key = Some(secret_key);
                    session.guid = Some(decrypted.guid);
                    session.decrypted_data = decrypted.decrypted_data;
                }
                self.inner.set_phase(&mut state, Phase::Ready);
                Ok(())
            }
            Err(e) => {
                warn!("Credential exchange for {} failed: {}", request.mac_address(), e);
                self.inner.set_phase(&mut state, Phase::Failed(e.clone()));
                self.inner.notify(Notice::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn run_credential_calls(
        &self,
        epoch: u64,
        request: &AccessRequest,
    ) -> Result<(String, Decrypted), AccessError> {
        let exchange = &self.inner.exchange;
        let secret_key = exchange.fetch_secret_key(request.mac_address()).await?;
        if !self.is_current(epoch) {
            return Err(AccessError::ConcurrentOperationRejected("session was reset"));
        }
        let decrypted = exchange
            .decrypt(request.mac_address(), request.encrypted_payload())
            .await?;
        Ok((secret_key, decrypted))
    }

    /// Explicit operator action: `Ready → Exchanging(Pin) → PinIssued`.
    /// On failure the session returns to `Ready` so the PIN can be retried.
    pub async fn request_pin(&self) -> Result<Pin, AccessError> {
        let (epoch, session_id, mac_address, guid, session_key) = {
            let mut state = self.lock();
            if state.pin_busy {
                return Err(AccessError::ConcurrentOperationRejected(
                    "PIN generation already in flight",
                ));
            }
            if state.phase != Phase::Ready {
                return Err(AccessError::ConcurrentOperationRejected(
                    "session is not ready for a PIN",
                ));
            }
            let (session_id, mac_address, guid, session_key) = match state.session.as_ref() {
                Some(Session {
                    id,
                    request,
                    guid: Some(guid),
                    secret_key,
                    ..
                }) => (
                    *id,
                    request.mac_address().to_string(),
                    guid.clone(),
                    secret_key.clone(),
                ),
                _ => {
                    return Err(AccessError::ConcurrentOperationRejected(
                        "session has no decrypted guid",
                    ))
                }
            };
            state.pin_busy = true;
            self.inner
                .set_phase(&mut state, Phase::Exchanging(ExchangeStage::Pin));
            (state.epoch, session_id, mac_address, guid, session_key)
        };

        let result = self.issue_pin(&mac_address, &guid, session_key).await;

        let mut state = self.lock();
        let still_current = state.epoch == epoch
            && state
                .session
                .as_ref()
                .is_some_and(|s| s.id == session_id && s.guid.as_deref() == Some(guid.as_str()));
        if !still_current {
            debug!("Discarding PIN result for session {} (no longer current)", session_id);
            return Err(AccessError::ConcurrentOperationRejected("session was reset"));
        }
        state.pin_busy = false;

        match result {
            Ok(pin) => {
                if let Some(session) = state.session.as_mut() {
                    session.pin = Some(pin.clone());
                }
                self.inner.set_phase(&mut state, Phase::PinIssued);
                self.inner.notify(Notice::PinIssued(pin.clone()));
                Ok(pin)
            }
            Err(e) => {
                warn!("PIN generation for {} failed: {}", mac_address, e);
                self.inner.set_phase(&mut state, Phase::Ready);
                self.inner.notify(Notice::Error(e.clone()));
                Err(e)
            }
        }
    }

    async fn issue_pin(
        &self,
        mac_address: &str,
        guid: &str,
        session_key: Option<String>,
    ) -> Result<Pin, AccessError> {
        let exchange = &self.inner.exchange;
        let secret_key = match exchange.cache().get(mac_address).await {
            Some(record) => record.secret_key,
            None => session_key.ok_or_else(|| {
                AccessError::PinGeneration(format!("no secret key cached for {}", mac_address))
            })?,
        };
        exchange
            .generate_pin(mac_address, guid, self.inner.operator.role(), &secret_key)
            .await
    }

    /// Single consumer for decode events from every producer, processed in
    /// arrival order, each to completion before the next
    pub async fn run(self, mut events: mpsc::Receiver<DecodeEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_decode(event).await {
                debug!("Decode event not applied: {}", e);
            }
        }
        debug!("Decode channel closed");
    }
}
