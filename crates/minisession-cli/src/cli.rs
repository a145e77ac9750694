//! Command-line interface definition for minisession.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use minisession_core::api::Payload;

/// minisession - drive authenticated requests from the terminal
///
/// The host platform is simulated: the one-time login code is passed with
/// `--code` or `MINISESSION_LOGIN_CODE`. The session token is kept between
/// runs in the selected store.
#[derive(Parser, Debug, Clone)]
#[command(name = "minisession")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// One-time login code handed to the login exchange
    #[arg(long, env = "MINISESSION_LOGIN_CODE", global = true)]
    pub code: Option<String>,

    /// Override api_host from the config file
    #[arg(long, env = "MINISESSION_API_HOST", global = true)]
    pub api_host: Option<String>,

    /// Where the session token is kept
    #[arg(
        long,
        env = "MINISESSION_STORE",
        value_enum,
        default_value_t = StoreKind::File,
        global = true
    )]
    pub store: StoreKind,

    /// Also write logs to this file (RUST_LOG sets the filter, default warn)
    #[arg(long, env = "MINISESSION_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// JSON file in the cache directory
    File,
    /// OS keychain
    Keyring,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Authenticated GET; fields go in the query string
    Get {
        url: String,

        /// Request fields as key=value
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Authenticated POST with a JSON body
    Post {
        url: String,

        /// Body fields as key=value
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Authenticated multipart upload
    Upload {
        url: String,

        /// Local file to send
        file: PathBuf,

        /// Form field the file is sent under
        field: String,

        /// Extra form fields as key=value
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Exchange the login code for a token
    Login {
        /// Extra login fields as key=value
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Show the cached session
    Status,
}

/// Parse one `key=value` argument. Values that parse as JSON keep their
/// type, anything else is sent as a string.
pub fn parse_field(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", arg))?;
    if key.is_empty() {
        return Err(format!("missing key in {:?}", arg));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn payload(fields: Vec<(String, Value)>) -> Payload {
    fields.into_iter().collect()
}
