mod acquisition;
mod cache;
mod config;
mod console;
mod error;
mod exchange;
mod payload;
mod pin;
mod session;

use acquisition::{
    CommandImageDecoder, CommandLiveScanner, DecodeEvent, DecodeOutcome, LiveScanControl,
    LiveScanner, StillImageDecoder,
};
use cache::SecretCache;
use clap::{Parser, Subcommand};
use exchange::{ExchangeClient, HttpTrustService};
use payload::PayloadPolicy;
use session::{AccessSession, Notice, OperatorContext, Phase};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qr-access")]
#[command(about = "Scan a device QR code, exchange it with the trust service, issue an access PIN")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Operator role sent with PIN requests (overrides operator.role)
    #[arg(long)]
    role: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session: live camera scan plus operator commands on stdin
    Run,
    /// Decode one payload, exchange it and print the PIN
    Exchange {
        /// Decoded QR text
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        payload: Option<String>,
        /// Still image containing the QR code
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        config::Config::default()
    });

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("qr-access v{}", env!("CARGO_PKG_VERSION"));

    let role = cli
        .role
        .clone()
        .or_else(|| config.operator.role.clone())
        .ok_or_else(|| anyhow::anyhow!("no operator role: pass --role or set operator.role"))?;
    let operator = OperatorContext::new(role)?;

    let cache = match &config.cache.path {
        Some(path) => SecretCache::open(path.clone()).await?,
        None => {
            info!("No cache path configured, secret keys are kept in memory");
            SecretCache::in_memory()
        }
    };

    let service = HttpTrustService::new(&config.trust_service)?;
    let exchange = ExchangeClient::new(Arc::new(service), cache);
    let policy = PayloadPolicy::from_strict_flag(config.scanner.strict_payload);
    let session = AccessSession::new(exchange, operator, policy);

    let decoder: Arc<dyn StillImageDecoder> =
        Arc::new(CommandImageDecoder::new(config.scanner.image_command.clone()));

    match cli.command {
        Commands::Run => {
            let scanner: Arc<dyn LiveScanner> =
                Arc::new(CommandLiveScanner::new(config.scanner.camera_command.clone()));
            run_interactive_task(session, scanner, decoder).await
        }
        Commands::Exchange { payload, image } => {
            run_exchange_once(session, decoder, payload, image).await
        }
    }
}

/// One-shot: a single decode, the credential exchange, then the PIN
async fn run_exchange_once(
    session: AccessSession,
    decoder: Arc<dyn StillImageDecoder>,
    payload: Option<String>,
    image: Option<PathBuf>,
) -> anyhow::Result<()> {
    session.activate();

    let outcome = match (payload, image) {
        (Some(text), _) => DecodeOutcome::Text(text),
        (None, Some(path)) => decoder.decode(&path).await?,
        (None, None) => anyhow::bail!("either --payload or --image is required"),
    };

    session.handle_decode(DecodeEvent::image(outcome)).await?;
    let pin = session.request_pin().await?;

    println!("{}", console::render_pin(&pin));
    Ok(())
}

/// The camera runs only while the session is scanning: it is opened on
/// entry to `Scanning` and released on any other phase
fn follow_phase(camera: &mut LiveScanControl, notice: &Notice) {
    if let Notice::PhaseChanged(phase) = notice {
        debug!("Camera follows phase {}", phase);
        camera.set_scanning(*phase == Phase::Scanning);
    }
}

/// Interactive session
///
/// Image uploads are a second producer into the same channel as the camera.
async fn run_interactive_task(
    session: AccessSession,
    scanner: Arc<dyn LiveScanner>,
    decoder: Arc<dyn StillImageDecoder>,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<DecodeEvent>(32);
    let consumer = tokio::spawn(session.clone().run(rx));

    let mut notices = session.subscribe();
    let mut camera = LiveScanControl::new(scanner, tx.clone());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", console::HELP);
    session.activate();

    loop {
        tokio::select! {
            notice = notices.recv() => {
                let notice = match notice {
                    Ok(notice) => notice,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} session notice(s)", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if let Some(text) = console::render_notice(&notice) {
                    println!("{}", text);
                }
                follow_phase(&mut camera, &notice);
            }
            line = stdin.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };

                match console::Command::parse(&line) {
                    Ok(console::Command::Upload(path)) => {
                        let decoder = decoder.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            match decoder.decode(&path).await {
                                Ok(outcome) => {
                                    if tx.send(DecodeEvent::image(outcome)).await.is_err() {
                                        debug!("Decode channel closed before upload was delivered");
                                    }
                                }
                                Err(e) => error!("Failed to decode {:?}: {}", path, e),
                            }
                        });
                    }
                    Ok(console::Command::Pin) => {
                        if let Some(reason) = console::pin_unavailable(&session.phase()) {
                            println!("{}", reason);
                            continue;
                        }
                        let session = session.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session.request_pin().await {
                                if !e.is_user_visible() {
                                    debug!("PIN request ignored: {}", e);
                                }
                            }
                        });
                    }
                    Ok(console::Command::Reset) => session.reset(),
                    Ok(console::Command::Status) => {
                        println!("{}", console::render_snapshot(&session.snapshot()));
                        println!(
                            "Camera:      {}",
                            if camera.is_running() { "on" } else { "off" }
                        );
                    }
                    Ok(console::Command::Help) => println!("{}", console::HELP),
                    Ok(console::Command::Quit) => break,
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    info!("Shutting down...");
    drop(camera);
    consumer.abort();
    Ok(())
}
