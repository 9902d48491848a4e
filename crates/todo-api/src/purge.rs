use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use todo_db::models::PurgeReport;

use crate::state::AppState;

/// Owned background task that expires sessions and reclaims unreachable
/// lists on a fixed period.
pub struct PurgeTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PurgeTicker {
    /// First pass after `first_run`, then every `period`.
    pub fn start(state: AppState, first_run: Duration, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + first_run, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        run_once(&state).await;
                    }
                }
            }
            debug!("Purge ticker stopped");
        });

        info!(
            "Purge scheduled: first in {}s, then every {}s",
            first_run.as_secs(),
            period.as_secs()
        );
        Self { cancel, handle }
    }

    /// Cancel the ticker and wait for an in-flight pass to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Purge ticker task failed: {}", e);
        }
    }
}

/// One purge pass. Failures are logged and reported as `None`; purging is
/// maintenance and never takes the server down.
pub async fn run_once(state: &AppState) -> Option<PurgeReport> {
    let state = Arc::clone(state);
    let result =
        tokio::task::spawn_blocking(move || state.db.purge(Utc::now().timestamp_millis())).await;

    match result {
        Ok(Ok(report)) => {
            if report != PurgeReport::default() {
                info!(
                    "Purge: removed {} expired sessions and {} orphaned lists",
                    report.sessions, report.lists
                );
            }
            Some(report)
        }
        Ok(Err(e)) => {
            warn!("Purge error: {}", e);
            None
        }
        Err(e) => {
            warn!("Purge task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppStateInner;
    use todo_crypto::keys::generate_secret_key;
    use todo_crypto::{HashParams, Hasher, TokenCipher};
    use todo_db::models::NewUser;
    use todo_db::{Database, queries};

    fn state() -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            cipher: TokenCipher::new(&generate_secret_key().unwrap()),
            hasher: Hasher::new(HashParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            })
            .unwrap(),
            session_ttl: chrono::Duration::hours(1),
        })
    }

    fn seed(state: &AppState) {
        state
            .db
            .with_conn(|conn| {
                let user = queries::insert_user(
                    conn,
                    &NewUser {
                        username: "alice",
                        password_hash: &[1u8; 64],
                        salt: &[2u8; 16],
                        first_name: None,
                        last_name: None,
                    },
                )?;
                let now = Utc::now().timestamp_millis();
                queries::insert_session(conn, "stale", user, now - 60_000)?;
                queries::insert_session(conn, "live", user, now + 60_000)?;

                let kept = queries::insert_list_with_owner(conn, "Kept", Some(user))?;
                let orphan = queries::insert_list_with_owner(conn, "Orphan", Some(user))?;
                queries::delete_permission(conn, Some(user), orphan)?;
                assert!(queries::find_list(conn, kept)?.is_some());
                Ok::<_, todo_db::DbError>(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn run_once_reports_counts_and_is_idempotent() {
        let state = state();
        seed(&state);

        let report = run_once(&state).await.unwrap();
        assert_eq!(report, PurgeReport { sessions: 1, lists: 1 });

        let again = run_once(&state).await.unwrap();
        assert_eq!(again, PurgeReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_runs_after_first_delay_and_stops() {
        let state = state();
        seed(&state);

        let ticker = PurgeTicker::start(
            Arc::clone(&state),
            Duration::from_secs(10),
            Duration::from_secs(3600),
        );

        // nothing happens before the first deadline
        tokio::time::sleep(Duration::from_secs(5)).await;
        let live = state
            .db
            .with_conn(|conn| queries::find_live_session(conn, "stale", 0))
            .unwrap();
        assert!(live.is_some());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut purged = false;
        for _ in 0..100 {
            let stale = state
                .db
                .with_conn(|conn| queries::find_live_session(conn, "stale", 0))
                .unwrap();
            if stale.is_none() {
                purged = true;
                break;
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(purged);

        ticker.stop().await;
    }
}
