use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camgrid::config::ConfigError;
use camgrid::page::PopupContent;
use camgrid::slots::SlotError;
use camgrid::{
    AlertSound, AudioError, Backend, BackendError, ControllerConfig, HttpBackend, PageHost, SessionController,
    SlotRegistry, SourceRef, UploadPayload,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Time given to the fire-and-forget stop calls before the process exits.
const TEARDOWN_FLUSH: Duration = Duration::from_millis(250);
const WATCH_EVERY: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("slot registry error: {0}")]
    Slots(#[from] SlotError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("signal handler failed: {0}")]
    Signal(#[source] io::Error),
    #[error("upload rejected: another upload is in flight")]
    UploadBusy,
    #[error("{0}")]
    UploadFailed(String),
    #[error("controller stopped without reporting an outcome")]
    HostClosed,
}

#[derive(Parser, Debug)]
#[command(name = "camgrid", about = "Camera grid session controller")]
struct Cli {
    #[arg(long, env = "CAMGRID_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the slot registry with each slot's stream path.
    Slots,
    /// Start every feed and report detections until Ctrl-C.
    Live {
        #[arg(long, help = "Stop after this many seconds")]
        for_secs: Option<u64>,
    },
    /// Upload a video and follow its processing to completion.
    Upload { file: PathBuf },
}

// =============================================================================
// TERMINAL HOST
// =============================================================================

#[derive(Debug)]
enum HostEvent {
    Alert(String),
    Reload,
}

struct TerminalHost {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl PageHost for TerminalHost {
    fn alert(&self, message: &str) {
        eprintln!("! {message}");
        if self.events.send(HostEvent::Alert(message.to_string())).is_err() {
            debug!("host event dropped: receiver closed");
        }
    }

    fn reload(&self) {
        if self.events.send(HostEvent::Reload).is_err() {
            debug!("host event dropped: receiver closed");
        }
    }
}

/// Alert sound mapped onto the terminal bell. Muted plays are silent.
struct TerminalBell {
    volume_millis: AtomicU32,
}

impl TerminalBell {
    fn new() -> Self {
        Self { volume_millis: AtomicU32::new(1000) }
    }
}

impl AlertSound for TerminalBell {
    fn set_source(&self, src: &str) {
        debug!(src, "alert sound source");
    }

    fn set_volume(&self, volume: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (volume.clamp(0.0, 1.0) * 1000.0) as u32;
        self.volume_millis.store(millis, Ordering::Relaxed);
    }

    fn play(&self) -> Result<(), AudioError> {
        if self.volume_millis.load(Ordering::Relaxed) == 0 {
            return Ok(());
        }
        let mut stderr = io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|()| stderr.flush())
            .map_err(|e| AudioError::Unavailable(e.to_string()))
    }

    fn pause(&self) {}

    fn rewind(&self) {}
}

// =============================================================================
// COMMANDS
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ControllerConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    let registry = config.load_registry()?;

    match cli.command {
        Command::Slots => {
            print_slots(&registry);
            Ok(())
        }
        Command::Live { for_secs } => run_live(&config, registry, for_secs).await,
        Command::Upload { file } => run_upload(&config, registry, file).await,
    }
}

fn build_session(
    config: &ControllerConfig,
    registry: SlotRegistry,
) -> Result<(SessionController, mpsc::UnboundedReceiver<HostEvent>), CliError> {
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::from_config(config)?);
    let (events, rx) = mpsc::unbounded_channel();
    let session = SessionController::build(
        Arc::new(registry),
        backend,
        Arc::new(TerminalHost { events }),
        Arc::new(TerminalBell::new()),
        config.timings,
    );
    Ok((session, rx))
}

fn print_slots(registry: &SlotRegistry) {
    for slot in registry.iter() {
        let path = slot.source.as_ref().map_or_else(|| "-".to_string(), SourceRef::stream_path);
        println!("{:>2}  {:<16} {path}", slot.index, slot.name);
    }
    println!("{} of {} slots bound", registry.bound_count(), registry.len());
}

async fn run_live(config: &ControllerConfig, registry: SlotRegistry, for_secs: Option<u64>) -> Result<(), CliError> {
    let (session, _events) = build_session(config, registry)?;
    session.enter_live();
    info!(base_url = %config.base_url, "live session started; Ctrl-C to stop");

    let deadline = async {
        match for_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut watch = tokio::time::interval(WATCH_EVERY);
    let mut last_popup: Option<PopupContent> = None;
    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::Signal),
            () = &mut deadline => break Ok(()),
            _ = watch.tick() => {
                let popup = session.page().snapshot().popup.content;
                if popup != last_popup {
                    if let Some(content) = &popup {
                        println!("{}", content.to_html());
                    }
                    last_popup = popup;
                }
            }
        }
    };

    session.on_page_hide();
    tokio::time::sleep(TEARDOWN_FLUSH).await;
    outcome
}

async fn run_upload(config: &ControllerConfig, registry: SlotRegistry, file: PathBuf) -> Result<(), CliError> {
    let payload = UploadPayload::from_path(&file).await?;
    let (session, mut events) = build_session(config, registry)?;
    if !session.begin_upload(payload) {
        return Err(CliError::UploadBusy);
    }

    let mut watch = tokio::time::interval(WATCH_EVERY);
    let mut last_line = String::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(HostEvent::Reload) => {
                    println!("processing complete");
                    return Ok(());
                }
                Some(HostEvent::Alert(message)) => return Err(CliError::UploadFailed(message)),
                None => return Err(CliError::HostClosed),
            },
            _ = watch.tick() => {
                let progress = session.page().snapshot().progress;
                let line = format!("{:>3}% {}", progress.bar_percent, progress.text.unwrap_or_default());
                if progress.bar_visible && line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
        }
    }
}
