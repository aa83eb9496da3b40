//! dhtshell binary entry point.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use dht_shell::backend::{Backend, MemoryBackend};
use dht_shell::cli::{self, Args};
use dht_shell::command::CommandRegistry;
use dht_shell::config::Config;
use dht_shell::logging;
use dht_shell::security::AccessController;
use dht_shell::server::{InterruptCoordinator, InterruptSignal, ShellServer};
use dht_shell::session::Transport;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("dhtshell: {}", err);
            eprintln!("Try 'dhtshell --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let (config, listen) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("dhtshell: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init_with_filter(config.log_filter()) {
        eprintln!("dhtshell: failed to initialize logging: {}", err);
    }
    info!("dhtshell v{}", env!("CARGO_PKG_VERSION"));

    match run(config, listen).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "dhtshell failed");
            eprintln!("dhtshell: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<(Config, Option<SocketAddr>), dht_shell::config::ConfigError> {
    let config = Config::load(args)?;
    let listen = config.listen_address()?;
    Ok((config, listen))
}

async fn run(config: Config, listen: Option<SocketAddr>) -> dht_shell::Result<()> {
    let access = AccessController::from_path(config.acl_path())?;
    if access.is_enabled() {
        info!(path = ?config.acl_path(), "access list loaded");
    }

    let backend = Arc::new(MemoryBackend::new(config.backend_config()));
    if let Some(contact) = config.backend.bootstrap.as_deref() {
        backend.join(contact)?;
        info!(%contact, "joined overlay");
    }

    let registry = Arc::new(CommandRegistry::builtin()?);
    let server = ShellServer::new(backend, registry, access);

    let signal = InterruptSignal::new();
    server.add_interruptible(signal.clone())?;
    let _ctrl_c = InterruptCoordinator::new(signal.clone()).spawn_ctrl_c();

    let console = if config.shell.disable_stdin {
        None
    } else {
        Some(Transport::console(!config.shell.batch)?.with_interrupt(signal.clone()))
    };

    let mut running = server.start(console, listen).await?;
    if let Some(addr) = running.local_addr() {
        info!(%addr, "remote shell enabled");
    }

    match running.take_console() {
        Some(console) => {
            let end = console.wait().await;
            debug!(?end, "console session ended");

            if running.local_addr().is_some() && !signal.is_raised() && !server.is_halted()? {
                info!("console closed, serving remote sessions until halt or interrupt");
                park(&server, &signal).await;
            }
        }
        None => {
            info!("console disabled, waiting for halt or interrupt");
            park(&server, &signal).await;
        }
    }

    server.shutdown().await?;
    running.join_acceptor().await;
    info!("dhtshell stopped");
    Ok(())
}

async fn park(server: &ShellServer, signal: &InterruptSignal) {
    tokio::select! {
        _ = signal.raised() => {}
        _ = server.wait_halted() => {}
    }
}
