//! minisession - drive authenticated requests from the terminal.
//!
//! The host platform is simulated: the one-time login code is pasted in with
//! `--code` or `MINISESSION_LOGIN_CODE`. The session token is kept between
//! runs in the cache directory or the OS keychain.

mod cli;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use minisession_core::api::{RequestSpec, UploadSpec};
use minisession_core::auth::{
    JsonFileStore, KeyValueStore, KeyringStore, SessionManager, StaticPlatform,
};
use minisession_core::config::Config;

use cli::{payload, Cli, Commands, StoreKind};

/// Keychain service name the token is filed under
const KEYRING_SERVICE: &str = "minisession";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "minisession.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so its values back the env-driven flags
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref());

    let mut config = Config::load()?;
    if let Some(host) = cli.api_host {
        config.api_host = host;
    }
    let store: Arc<dyn KeyValueStore> = match cli.store {
        StoreKind::Keyring => Arc::new(KeyringStore::new(KEYRING_SERVICE)),
        StoreKind::File => Arc::new(JsonFileStore::new(config.cache_dir()?)),
    };
    let platform = Arc::new(StaticPlatform::new(cli.code));
    let session = SessionManager::with_reqwest(config, platform, store)?;
    info!(command = ?cli.command, "minisession starting");

    match cli.command {
        Commands::Get { url, fields } => {
            let spec = RequestSpec::get(url).data(payload(fields));
            print_json(&session.request_authenticated(&spec).await?)
        }
        Commands::Post { url, fields } => {
            let spec = RequestSpec::post(url).data(payload(fields));
            print_json(&session.request_authenticated(&spec).await?)
        }
        Commands::Upload {
            url,
            file,
            field,
            fields,
        } => {
            let spec = fields
                .into_iter()
                .fold(UploadSpec::new(url, file, field), |spec, (key, value)| {
                    spec.field(key, value)
                });
            print_json(&session.upload_authenticated(&spec).await?)
        }
        Commands::Login { fields } => {
            session.login(&payload(fields)).await?;
            eprintln!("Logged in.");
            Ok(())
        }
        Commands::Status => {
            let cached = if session.credential().is_some() {
                "cached"
            } else {
                "none"
            };
            eprintln!("State: {:?}\nToken: {}", session.state(), cached);
            Ok(())
        }
    }
}
