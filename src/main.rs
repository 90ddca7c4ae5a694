use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use roomcrab::{AppState, Config, SessionRegistry, admin, server};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "🦀 roomcrab";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.directive())
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> std::io::Result<()> {
    let config = Config::snapshot();

    let socket = if config.listen_addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(config.listen_addr)?;

    let listener: TcpListener = socket.listen(1024)?;

    info!("{} listening on {}", APP_NAME, config.listen_addr);

    let registry = SessionRegistry::new(config.limits.clone());
    let state = AppState::new(registry.clone(), config.diagnostics);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
        info!("{} shutting down", APP_NAME);
    };

    if let Err(e) = server::serve(listener, state, shutdown).await {
        error!("serve error: {e}");
        return Err(e);
    }

    let stats = admin::registry_stats(&registry);
    info!("final registry state\n{}", admin::format_registry_stats(stats));

    Ok(())
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
