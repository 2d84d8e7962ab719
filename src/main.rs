//! session-vault binary entry point.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use session_vault::cli::{self, Command};
use session_vault::config::Config;
use session_vault::{
    logging, HandlerRegistry, JsonEncoder, NamespaceStore, SessionId, StorageHandler,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'session-vault --help' for more information.");
            return ExitCode::from(2);
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

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let _ = logging::init_with_filter(config.log_filter());

    info!("session-vault v{}", env!("CARGO_PKG_VERSION"));

    let registry = HandlerRegistry::with_defaults();
    let command = args.command.clone().unwrap_or(Command::Probe);

    if command == Command::Probe {
        for (name, supported) in registry.available() {
            println!("{:<10} {}", name, if supported { "available" } else { "unavailable" });
        }
        return ExitCode::SUCCESS;
    }

    let handler = match registry.resolve_shared(&config.session.backend, &config.handler) {
        Ok(handler) => handler,
        Err(e) => {
            error!(error = %e, "cannot use storage backend");
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let session = config.to_session_config();
    if let Err(e) = handler.open(&session.save_path, &session.name) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match command {
        Command::Probe => Ok(()),
        Command::Gc => {
            let max_lifetime = args.max_lifetime.unwrap_or(config.handler.ttl);
            match args.watch {
                Some(every) => watch_gc(Arc::clone(&handler), max_lifetime, every).await,
                None => run_gc(handler.as_ref(), max_lifetime),
            }
        }
        Command::Show(id) => show(handler.as_ref(), &id),
        Command::Destroy(id) => id
            .parse::<SessionId>()
            .and_then(|id| handler.destroy(id.as_str()))
            .map(|()| println!("destroyed {}", id)),
    };

    let _ = handler.close();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_gc(handler: &dyn StorageHandler, max_lifetime: u64) -> session_vault::Result<()> {
    let removed = handler.gc(max_lifetime)?;
    info!(backend = handler.name(), removed, max_lifetime, "garbage collection finished");
    println!("removed {} record(s)", removed);
    Ok(())
}

async fn watch_gc(
    handler: Arc<dyn StorageHandler>,
    max_lifetime: u64,
    every: u64,
) -> session_vault::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(every.max(1)));
    info!(every, "running garbage collection until interrupted");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // A failed sweep is retried on the next tick.
                if let Err(e) = run_gc(handler.as_ref(), max_lifetime) {
                    error!(error = %e, "garbage collection failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

fn show(handler: &dyn StorageHandler, id: &str) -> session_vault::Result<()> {
    let id: SessionId = id.parse()?;
    let raw = handler.read(id.as_str())?;
    if raw.is_empty() {
        println!("no record for {}", id);
        return Ok(());
    }

    let store = NamespaceStore::decode_or_empty(&JsonEncoder, &raw);
    let pretty = serde_json::to_string_pretty(store.as_map())
        .map_err(|e| session_vault::SessionError::Encode(e.to_string()))?;
    println!("{}", pretty);
    Ok(())
}
