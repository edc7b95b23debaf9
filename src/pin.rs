//! One-time access PIN

use std::fmt;

/// Number of digits an issued PIN is expected to have
pub const PIN_LENGTH: usize = 6;

/// A validated, all-digit PIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Validate a PIN string from the trust service
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty PIN".to_string());
        }
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("PIN {:?} contains non-digit characters", raw));
        }
        Ok(Pin(raw.to_string()))
    }

    /// A PIN delivered as a JSON number; leading zeros are restored
    pub fn from_number(n: u64) -> Self {
        Pin(format!("{:0width$}", n, width = PIN_LENGTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn digits(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars()
    }

    /// Digits separated by single spaces, e.g. `4 8 3 9 2 0`
    pub fn segmented(&self) -> String {
        self.digits()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_expected_length(&self) -> bool {
        self.0.len() == PIN_LENGTH
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmented_rendering() {
        let pin = Pin::parse("483920").unwrap();
        assert_eq!(pin.segmented(), "4 8 3 9 2 0");
        assert_eq!(pin.digits().count(), 6);
        assert!(pin.has_expected_length());
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(Pin::parse("").is_err());
        assert!(Pin::parse("   ").is_err());
        assert!(Pin::parse("12a456").is_err());
        assert!(Pin::parse("-12345").is_err());
    }

    #[test]
    fn test_numeric_pin_keeps_leading_zeros() {
        assert_eq!(Pin::from_number(42).as_str(), "000042");
        assert_eq!(Pin::from_number(483920).as_str(), "483920");
    }
}
