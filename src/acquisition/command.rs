//! External-process QR decoders
//!
//! Defaults target the zbar tools:
//! - `zbarcam --raw --nodisplay` prints one decoded symbol per line for as
//!   long as it runs
//! - `zbarimg --raw -q <file>` prints the symbols in an image and exits
//!   with status 4 when it found none

use super::{DecodeOutcome, LiveScanner, LiveStream, StillImageDecoder};
use crate::error::AccessError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

/// Exit status `zbarimg` uses for "no symbols found"
const NO_SYMBOLS_EXIT_CODE: i32 = 4;

fn build_command(argv: &[String]) -> Result<Command, AccessError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| AccessError::Acquisition("decoder command is empty".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

/// Still-image decoder that runs a command with the image path appended
pub struct CommandImageDecoder {
    argv: Vec<String>,
}

impl CommandImageDecoder {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl StillImageDecoder for CommandImageDecoder {
    async fn decode(&self, path: &Path) -> Result<DecodeOutcome, AccessError> {
        let output = build_command(&self.argv)?
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AccessError::Acquisition(format!("failed to run {:?}: {}", self.argv[0], e))
            })?;

        if output.status.code() == Some(NO_SYMBOLS_EXIT_CODE) {
            debug!("No QR code in {:?}", path);
            return Ok(DecodeOutcome::NothingFound);
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AccessError::Acquisition(format!(
                "image decoder exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // One symbol per line; the first one wins
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(text) => Ok(DecodeOutcome::Text(text.to_string())),
            None => Ok(DecodeOutcome::NothingFound),
        }
    }
}

/// Live scanner that spawns a long-running capture command
pub struct CommandLiveScanner {
    argv: Vec<String>,
}

impl CommandLiveScanner {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl LiveScanner for CommandLiveScanner {
    async fn open(&self) -> Result<Box<dyn LiveStream>, AccessError> {
        let mut child = build_command(&self.argv)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AccessError::Acquisition(format!("failed to start {:?}: {}", self.argv[0], e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AccessError::Acquisition("capture has no stdout".to_string()))?;

        debug!("Capture process started (pid {:?})", child.id());
        Ok(Box::new(CommandLiveStream {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

/// Holds the capture process; `kill_on_drop` releases the camera
struct CommandLiveStream {
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl LiveStream for CommandLiveStream {
    async fn next_outcome(&mut self) -> Option<DecodeOutcome> {
        match self.lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    Some(DecodeOutcome::NothingFound)
                } else {
                    Some(DecodeOutcome::Text(line.to_string()))
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Capture stream read failed: {}", e);
                None
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_image_decoder_reads_first_symbol() {
        let decoder = CommandImageDecoder::new(sh(
            r#"printf '{"macAddress":"AA","encryptedData":"c"}\nsecond\n'"#,
        ));
        let outcome = decoder.decode(Path::new("qr.png")).await.unwrap();
        assert_eq!(
            outcome,
            DecodeOutcome::Text(r#"{"macAddress":"AA","encryptedData":"c"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_image_decoder_receives_path() {
        let decoder = CommandImageDecoder::new(sh(r#"echo "$1""#));
        let outcome = decoder.decode(Path::new("/tmp/upload.png")).await.unwrap();
        assert_eq!(outcome, DecodeOutcome::Text("/tmp/upload.png".to_string()));
    }

    #[tokio::test]
    async fn test_image_decoder_exit_four_is_nothing_found() {
        let decoder = CommandImageDecoder::new(sh("exit 4"));
        let outcome = decoder.decode(Path::new("blank.png")).await.unwrap();
        assert_eq!(outcome, DecodeOutcome::NothingFound);
    }

    #[tokio::test]
    async fn test_image_decoder_empty_output_is_nothing_found() {
        let decoder = CommandImageDecoder::new(sh("true"));
        let outcome = decoder.decode(Path::new("blank.png")).await.unwrap();
        assert_eq!(outcome, DecodeOutcome::NothingFound);
    }

    #[tokio::test]
    async fn test_image_decoder_failure_is_acquisition_error() {
        let decoder = CommandImageDecoder::new(sh("echo broken >&2; exit 2"));
        let err = decoder.decode(Path::new("x.png")).await.unwrap_err();
        assert!(matches!(err, AccessError::Acquisition(ref m) if m.contains("broken")));

        let missing = CommandImageDecoder::new(vec!["definitely-not-a-qr-tool".to_string()]);
        assert!(matches!(
            missing.decode(Path::new("x.png")).await,
            Err(AccessError::Acquisition(_))
        ));

        let empty = CommandImageDecoder::new(Vec::new());
        assert!(matches!(
            empty.decode(Path::new("x.png")).await,
            Err(AccessError::Acquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_live_stream_yields_lines_then_ends() {
        let scanner = CommandLiveScanner::new(sh(r#"printf 'one\n\ntwo\n'"#));
        let mut stream = scanner.open().await.unwrap();

        assert_eq!(
            stream.next_outcome().await,
            Some(DecodeOutcome::Text("one".to_string()))
        );
        assert_eq!(stream.next_outcome().await, Some(DecodeOutcome::NothingFound));
        assert_eq!(
            stream.next_outcome().await,
            Some(DecodeOutcome::Text("two".to_string()))
        );
        assert_eq!(stream.next_outcome().await, None);
    }

    #[tokio::test]
    async fn test_live_scanner_is_restartable() {
        let scanner = CommandLiveScanner::new(sh("echo frame"));
        for _ in 0..2 {
            let mut stream = scanner.open().await.unwrap();
            assert_eq!(
                stream.next_outcome().await,
                Some(DecodeOutcome::Text("frame".to_string()))
            );
        }
    }
}
