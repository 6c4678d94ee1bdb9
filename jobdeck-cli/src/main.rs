mod transports;
mod ui;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use jobdeck_core::config::JobdeckConfig;
use jobdeck_core::session::SyncSession;
use jobdeck_core::transport::{Transport, TransportEvent, transport_channel};
use jobdeck_core::view::ViewEvent;

use transports::{FakeServer, WsTransport};
use ui::App;

#[derive(Parser)]
#[command(name = "jobdeck")]
#[command(about = "Follow server-side job trees and their logs live", long_about = None)]
struct Cli {
    /// Use the built-in scripted server instead of a live channel
    #[arg(long)]
    demo: bool,

    /// Path to jobdeck.yaml (defaults to searching upward from cwd)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive tree + log view for one root job
    Watch {
        /// Root job id to mirror (defaults to the scripted root with --demo)
        root: Option<String>,
    },
    /// Print one job's log to stdout
    Logs {
        job: String,
        #[arg(short, long, default_value = "true")]
        follow: bool,
    },
}

fn load_config(cli: &Cli) -> Option<JobdeckConfig> {
    if cli.demo {
        return None;
    }
    let result = match &cli.config {
        Some(path) => JobdeckConfig::load(path).map(|c| (path.clone(), c)),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            JobdeckConfig::discover(&cwd)
        }
    };
    match result {
        Ok((_, config)) => Some(config),
        Err(e) => {
            eprintln!("config error: {}", e);
            std::process::exit(1);
        }
    }
}

fn build_transport(cli: &Cli, config: Option<&JobdeckConfig>) -> Box<dyn Transport> {
    if cli.demo {
        return Box::new(FakeServer::new());
    }
    match config {
        Some(config) => Box::new(WsTransport::new(
            config.server.url.clone(),
            Duration::from_millis(config.server.reconnect_min_ms),
            Duration::from_millis(config.server.reconnect_max_ms),
        )),
        None => {
            eprintln!("no config loaded and --demo not set");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_config(&cli);
    let log_buffer = config
        .as_ref()
        .map(|c| c.logs.buffer_lines)
        .unwrap_or(10_000);

    let mut transport = build_transport(&cli, config.as_ref());
    let (handle, outbound_rx) = transport_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move { transport.run(outbound_rx, inbound_tx).await });

    let (session, view_rx) = SyncSession::with_log_capacity(handle, log_buffer);

    match cli.command {
        Commands::Watch { root } => {
            let root = match (root, cli.demo) {
                (Some(root), _) => root,
                (None, true) => transports::DEMO_ROOT.to_string(),
                (None, false) => {
                    eprintln!("watch requires a root job id");
                    std::process::exit(1);
                }
            };
            let app = App::new(session, root);
            if let Err(e) = app.run(inbound_rx, view_rx).await {
                eprintln!("terminal error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Logs { job, follow } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();
            follow_log(session, inbound_rx, view_rx, &job, follow).await;
        }
    }
}

/// Stream one job's log to stdout. Without `--follow`, exits once the
/// stream has been idle long enough to consider the backlog drained.
async fn follow_log(
    mut session: SyncSession,
    mut inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut view_rx: jobdeck_core::view::ViewReceiver,
    job: &str,
    follow: bool,
) {
    session.open_log(job);

    loop {
        tokio::select! {
            maybe_event = inbound_rx.recv() => {
                match maybe_event {
                    Some(event) => session.handle_event(event),
                    None => break,
                }
            }

            maybe_view = view_rx.recv() => {
                match maybe_view {
                    Some(ViewEvent::LogAppended { job_id, text }) if job_id == job => {
                        print!("{}", text);
                        let _ = std::io::stdout().flush();
                    }
                    Some(ViewEvent::LogEmpty { job_id }) if job_id == job => {
                        eprintln!("(log is empty)");
                        if !follow {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }

            _ = tokio::time::sleep(Duration::from_millis(800)), if !follow => {
                break;
            }
        }
    }
}
