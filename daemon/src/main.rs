use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserd::config::Config;
use browserd::orchestrator::Daemon;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: browserd <MODE> [OPTIONS]");
    eprintln!();
    eprintln!("Modes:");
    eprintln!("  serve [--config <path>]   Run the daemon in the foreground");
    eprintln!("  query                     Run a single host-messaging query (internal use)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --version   Print version and exit");
    eprintln!("  --help      Print this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--version" => {
            println!("browserd {}", VERSION);
            Ok(())
        }
        "--help" => {
            print_usage();
            Ok(())
        }
        "serve" => run_serve(&args[2..]).await,
        "query" => run_query(&args[2..]).await,
        other => {
            eprintln!("Unknown mode: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn run_serve(args: &[String]) -> anyhow::Result<()> {
    let config_path = find_flag_value(args, "--config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    init_tracing(&config.log_level);
    let shutdown = setup_shutdown_signal();

    info!(version = VERSION, "browserd starting");
    let daemon = Daemon::build(config);
    daemon.run(shutdown).await?;
    info!("browserd stopped");
    Ok(())
}

/// Runs a single host-messaging query: one length-prefixed request on
/// stdin, one length-prefixed reply on stdout, exit code reflects success.
///
/// Tracing is deliberately not initialized here — a native messaging host
/// only reads the one reply frame from stdout and nothing from stderr, so
/// log noise would just be discarded, not harmful, but there is nothing
/// useful to say in a process this short-lived.
async fn run_query(args: &[String]) -> anyhow::Result<()> {
    let config_path = find_flag_value(args, "--config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let socket_path = PathBuf::from(&config.local_socket_path);

    let (payload, success) = match browserd::query::run(&socket_path).await {
        Ok(payload) => (payload, true),
        Err(message) => (serde_json::json!({ "error": message }), false),
    };

    let mut stdout = tokio::io::stdout();
    browserd_protocol::codec::write_len_prefixed_frame(&mut stdout, &payload).await?;
    stdout.flush().await?;

    if success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn find_flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn init_tracing(configured_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(configured_level.to_string())),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Listens for SIGTERM and SIGINT (Ctrl+C) and triggers the returned
/// `CancellationToken` when either is received.
fn setup_shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT, initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}
