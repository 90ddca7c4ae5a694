use parking_lot::RwLock;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use super::{cli::CliConfig, file::FileConfig, types::LogLevel};
use crate::session::Limits;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub diagnostics: bool,
    pub limits: Limits,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the limits file is read with non-blocking IO.
    /// Panics on any error; the process must not start with a bad config.
    pub async fn init() {
        CliConfig::init();

        Self::load().await;
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    async fn load() {
        let cli = CliConfig::snapshot();

        let file = match &cli.config_file_location {
            Some(path) => FileConfig::from_file_async(path)
                .await
                .unwrap_or_else(|e| panic!("failed to load config from {path:?}: {e}")),
            None => FileConfig::default(),
        };

        let next = Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            diagnostics: cli.diagnostics,
            limits: file.limits,
        };

        if let Some(handle) = ROOT_CONFIG.get() {
            *handle.write() = next;
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
