use serde::Serialize;

use crate::session::SessionRegistry;

// -----------------------------------------------------------------------------
// ----- RegistryStats ---------------------------------------------------------

/// Point-in-time view of a registry, served on `/debug/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub live_sessions: usize,
    pub max_sessions: usize,
    pub max_members_per_session: usize,
}

pub fn registry_stats(registry: &SessionRegistry) -> RegistryStats {
    let limits = registry.limits();

    RegistryStats {
        live_sessions: registry.size(),
        max_sessions: limits.max_sessions,
        max_members_per_session: limits.max_members_per_session,
    }
}

pub fn format_registry_stats(stats: RegistryStats) -> String {
    format!(
        "live_sessions={}\nmax_sessions={}\nmax_members_per_session={}",
        stats.live_sessions, stats.max_sessions, stats.max_members_per_session
    )
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
