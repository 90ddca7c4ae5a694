use clap::Parser;
use parking_lot::RwLock;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
    pub diagnostics: bool,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args(Args::parse_or_panic());
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args(args: Args) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
            diagnostics: args.diagnostics,
        }
    }

    fn validate(&self) {
        if let Some(path) = &self.config_file_location {
            must_exist_file(path, "--config / ROOMCRAB_CONFIG_FILE");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "roomcrab", version, about = "WebSocket session relay")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "ROOMCRAB_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    // Required via CLI or ENV.
    #[arg(long = "port", short = 'p', env = "ROOMCRAB_PORT")]
    port: u16,

    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", env = "ROOMCRAB_LOG", default_value = "info")]
    log_level: LogLevel,

    // Exposes /debug/stats.
    #[arg(long = "diagnostics", env = "ROOMCRAB_DIAGNOSTICS")]
    diagnostics: bool,

    // Optional; built-in limits apply without it. Must exist when given.
    #[arg(long = "config", env = "ROOMCRAB_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl Args {
    fn parse_or_panic() -> Self {
        Self::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"))
    }
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call Config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
