//! What the session tells presentation

use super::phase::Phase;
use crate::error::AccessError;
use crate::pin::Pin;
use uuid::Uuid;

/// Pushed to subscribers as the session moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PhaseChanged(Phase),
    /// A still image held no QR code; the scanner stays active
    NoCodeDetected,
    /// A user-visible failure (malformed payload, exchange errors)
    Error(AccessError),
    PinIssued(Pin),
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub session_id: Option<Uuid>,
    pub mac_address: Option<String>,
    pub guid: Option<String>,
    pub decrypted_data: Option<String>,
    pub has_secret_key: bool,
    pub pin: Option<Pin>,
}
