//! Typed outcomes of the acquisition and exchange pipeline
//!
//! Every external-call failure is caught where it happens and translated
//! into one of these kinds before it reaches the session state machine.
//! None of them is fatal to the process.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Decoded QR text is not a usable access request
    #[error("malformed QR payload: {0}")]
    MalformedPayload(String),

    /// A still image was decoded but contained no QR code
    #[error("no QR code detected in image")]
    NoCodeDetected,

    /// The QR capability provider itself failed (not "nothing found")
    #[error("QR acquisition failed: {0}")]
    Acquisition(String),

    #[error("secret key exchange failed: {0}")]
    KeyExchange(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("PIN generation failed: {0}")]
    PinGeneration(String),

    /// An exchange of the same kind is already in flight, or the session
    /// is not in a phase that accepts the trigger. Callers ignore this.
    #[error("operation rejected: {0}")]
    ConcurrentOperationRejected(&'static str),
}

impl AccessError {
    /// Whether presentation should show this to the operator
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, AccessError::ConcurrentOperationRejected(_))
    }
}

/// Flatten an anyhow chain into a single line for user-facing messages
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_trip_is_not_user_visible() {
        assert!(!AccessError::ConcurrentOperationRejected("pin").is_user_visible());
        assert!(AccessError::NoCodeDetected.is_user_visible());
        assert!(AccessError::Decryption("bad key".into()).is_user_visible());
    }

    #[test]
    fn test_describe_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("POST /decrypt");
        assert_eq!(describe(&err), "POST /decrypt: connection refused");
    }
}
