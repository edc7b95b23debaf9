//! Terminal front end: operator commands in, notices and PINs out

use crate::error::AccessError;
use crate::pin::Pin;
use crate::session::{ExchangeStage, Notice, Phase, SessionSnapshot};
use std::path::PathBuf;

/// Operator commands accepted on stdin during an interactive session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    Pin,
    Reset,
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "upload" | "u" if rest.is_empty() => Err("usage: upload <image path>".to_string()),
            "upload" | "u" => Ok(Command::Upload(PathBuf::from(rest))),
            "pin" | "p" => Ok(Command::Pin),
            "reset" | "r" => Ok(Command::Reset),
            "status" | "s" => Ok(Command::Status),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            "" => Err("type 'help' for commands".to_string()),
            other => Err(format!("unknown command {:?}; type 'help'", other)),
        }
    }
}

pub const HELP: &str = "\
Commands:
  upload <path>   decode a QR code from a still image
  pin             generate a PIN for the scanned device
  reset           discard this session and scan again
  status          show the current session
  quit            leave";

/// Large-format digit display for an issued PIN
pub fn render_pin(pin: &Pin) -> String {
    let cells: Vec<String> = pin.digits().map(|d| format!("[ {} ]", d)).collect();
    format!("PIN: {}\n     {}", pin.segmented(), cells.join(" "))
}

/// One line (or block) per notice; `None` for notices not worth showing
pub fn render_notice(notice: &Notice) -> Option<String> {
    match notice {
        Notice::PhaseChanged(phase) => match phase {
            Phase::Scanning => Some("Scanning for a QR code...".to_string()),
            Phase::Decoded => Some("QR code scanned successfully".to_string()),
            Phase::Exchanging(_) => None,
            Phase::Ready => Some("Device verified. Type 'pin' to generate a PIN.".to_string()),
            Phase::PinIssued => Some("Type 'reset' to scan another QR code.".to_string()),
            Phase::Idle | Phase::Failed(_) => None,
        },
        Notice::NoCodeDetected => Some("No QR code found in that image.".to_string()),
        Notice::Error(e) if !e.is_user_visible() => None,
        Notice::Error(e @ AccessError::PinGeneration(_)) => {
            Some(format!("Error: {}. Type 'pin' to try again.", e))
        }
        Notice::Error(e @ (AccessError::KeyExchange(_) | AccessError::Decryption(_))) => {
            Some(format!("Error: {}. Type 'reset' to start over.", e))
        }
        Notice::Error(e) => Some(format!("Error: {}", e)),
        Notice::PinIssued(pin) => Some(render_pin(pin)),
    }
}

/// Why a `pin` command cannot go ahead in `phase`, if it cannot
pub fn pin_unavailable(phase: &Phase) -> Option<&'static str> {
    match phase {
        Phase::Ready | Phase::Exchanging(ExchangeStage::Pin) => None,
        phase if phase.is_terminal() => Some("Nothing to do. Type 'reset' to scan another QR code."),
        Phase::Exchanging(ExchangeStage::Credentials) | Phase::Decoded => {
            Some("Still verifying the device, please wait.")
        }
        _ => Some("No device scanned yet. Scan a QR code or type 'upload <path>'."),
    }
}

pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let na = || "N/A".to_string();
    let mut out = format!("Phase:       {}\n", snapshot.phase);
    out.push_str(&format!(
        "MAC Address: {}\n",
        snapshot.mac_address.clone().unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "GUID:        {}\n",
        snapshot.guid.clone().unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "Decrypted:   {}\n",
        snapshot.decrypted_data.clone().unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "Secret key:  {}\n",
        if snapshot.has_secret_key { "obtained" } else { "none" }
    ));
    out.push_str(&format!(
        "PIN:         {}",
        snapshot
            .pin
            .as_ref()
            .map(|p| p.segmented())
            .unwrap_or_else(na)
    ));
    out
}
