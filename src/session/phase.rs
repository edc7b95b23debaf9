use crate::error::AccessError;
use std::fmt;

/// Which exchange is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    /// Secret key fetch followed by decrypt
    Credentials,
    /// PIN issuance
    Pin,
}

/// Where the access session is in the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    Decoded,
    Exchanging(ExchangeStage),
    Ready,
    PinIssued,
    Failed(AccessError),
}

impl Phase {
    /// Terminal phases only leave through reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::PinIssued | Phase::Failed(_))
    }

    pub fn accepts_decodes(&self) -> bool {
        matches!(self, Phase::Scanning)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Scanning => write!(f, "Scanning"),
            Phase::Decoded => write!(f, "Decoded"),
            Phase::Exchanging(ExchangeStage::Credentials) => write!(f, "Exchanging(credentials)"),
            Phase::Exchanging(ExchangeStage::Pin) => write!(f, "Exchanging(pin)"),
            Phase::Ready => write!(f, "Ready"),
            Phase::PinIssued => write!(f, "PinIssued"),
            Phase::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_scanning_accepts_decodes() {
        assert!(Phase::Scanning.accepts_decodes());
        for phase in [
            Phase::Idle,
            Phase::Decoded,
            Phase::Exchanging(ExchangeStage::Credentials),
            Phase::Ready,
            Phase::PinIssued,
        ] {
            assert!(!phase.accepts_decodes(), "{}", phase);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::Exchanging(ExchangeStage::Pin).to_string(), "Exchanging(pin)");
        assert_eq!(
            Phase::Failed(AccessError::NoCodeDetected).to_string(),
            "Failed(no QR code detected in image)"
        );
        assert!(Phase::Failed(AccessError::NoCodeDetected).is_terminal());
        assert!(!Phase::Ready.is_terminal());
    }
}
