use std::{future::Future, sync::Arc};

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::admin::{self, RegistryStats};
use crate::connection::Transport;
use crate::session::SessionRegistry;

// -----------------------------------------------------------------------------
// ----- AppState --------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,

    // Mounts /debug/stats.
    pub diagnostics: bool,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, diagnostics: bool) -> Self {
        Self {
            registry,
            diagnostics,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Router ----------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/new-session/{session_name}", get(new_session))
        .route("/join-session/{session_code}", get(join_session));

    if state.diagnostics {
        router = router.route("/debug/stats", get(stats));
    }

    router.with_state(state)
}

/// Serves until `shutdown` resolves. Live WebSocket connections are not
/// drained; they end with the runtime.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// -----------------------------------------------------------------------------
// ----- Handlers --------------------------------------------------------------

async fn new_session(
    State(state): State<AppState>,
    Path(session_name): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!("rejected upgrade on /new-session/{session_name}: {rejection}");
            return rejection.into_response();
        }
    };

    let registry = state.registry;

    upgrade
        .on_failed_upgrade(|e| warn!("websocket upgrade failed: {e}"))
        .on_upgrade(move |socket: WebSocket| async move {
            let creator = registry.connection(Transport::from_websocket(socket));
            let handshake = registry.create_session(&session_name, creator).await;
            if handshake.is_success() {
                debug!("created '{session_name}' as {:?}", handshake.session_code);
            } else {
                debug!("create '{session_name}' refused: {}", handshake.status_code);
            }
        })
}

async fn join_session(
    State(state): State<AppState>,
    Path(session_code): Path<String>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!("rejected upgrade on /join-session/{session_code}: {rejection}");
            return rejection.into_response();
        }
    };

    let registry = state.registry;

    upgrade
        .on_failed_upgrade(|e| warn!("websocket upgrade failed: {e}"))
        .on_upgrade(move |socket: WebSocket| async move {
            let joiner = registry.connection(Transport::from_websocket(socket));
            let handshake = registry.join_session(&session_code, joiner).await;
            if !handshake.is_success() {
                debug!("join {session_code} refused: {}", handshake.status_code);
            }
        })
}

async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(admin::registry_stats(&state.registry))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
