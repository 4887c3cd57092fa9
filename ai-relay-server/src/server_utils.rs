use std::time::Duration;
use tokio::signal;
use tracing::{debug, info};

use crate::state::AppState;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Drop refilled rate limit buckets and closed circuits with no failures.
///
/// Returns how many buckets and circuits were removed.
pub fn sweep_idle(state: &AppState) -> (usize, usize) {
    let buckets = state.rate_limiter().cleanup_idle();
    if buckets > 0 {
        debug!(
            removed = buckets,
            remaining = state.rate_limiter().tracked_keys(),
            "Swept idle rate limit buckets"
        );
    }
    let circuits = state.circuit_breaker().cleanup_idle();
    if circuits > 0 {
        debug!(
            removed = circuits,
            remaining = state.circuit_breaker().tracked_keys(),
            "Swept idle circuits"
        );
    }
    (buckets, circuits)
}

/// Run [`sweep_idle`] every minute.
pub fn spawn_idle_sweep(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep_idle(&state);
        }
    })
}

#[allow(
    clippy::expect_used,
    reason = "Signal handlers are critical infrastructure, panic is appropriate on failure"
)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("🛑 Received Ctrl+C, shutting down..."),
        () = terminate => info!("🛑 Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::test_helpers::{relay_config, test_app_state, test_settings};

    #[test]
    fn test_sweep_forgets_idle_circuits_only() {
        let state = test_app_state(relay_config("http://127.0.0.1:1/v1"), &test_settings());
        let breaker = state.circuit_breaker();
        for i in 0..20 {
            breaker.should_allow(&format!("label-{i}")).unwrap();
        }
        let permit = breaker.should_allow("generate-quiz").unwrap();
        breaker.record_failure("generate-quiz", permit, "connect refused");

        let (_, circuits) = sweep_idle(&state);

        assert_eq!(circuits, 20);
        assert_eq!(breaker.tracked_keys(), 1);
        assert_eq!(breaker.snapshot()[0].consecutive_failures, 1);
    }
}
