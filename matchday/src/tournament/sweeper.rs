//! Periodic lifecycle sweep.
//!
//! A timer-driven safety net behind the match-completion trigger: every
//! active tournament gets a `check_and_finalize` pass, so a missed trigger
//! (crash between save and decision, operator fixing data by hand) only
//! delays progression until the next sweep. A tournament busy under another
//! writer is skipped quietly; the per-tournament lock already serializes the
//! two triggers.

use super::lifecycle::{LifecycleError, TournamentLifecycle};
use super::store::TournamentStore;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically drives lifecycle decisions over all active tournaments.
pub struct LifecycleSweeper {
    lifecycle: Arc<TournamentLifecycle>,
    store: Arc<dyn TournamentStore>,
    interval: Duration,
}

impl LifecycleSweeper {
    pub fn new(
        lifecycle: Arc<TournamentLifecycle>,
        store: Arc<dyn TournamentStore>,
        interval: Duration,
    ) -> Self {
        Self {
            lifecycle,
            store,
            interval,
        }
    }

    /// Run until the shutdown signal flips.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("lifecycle sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("lifecycle sweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("lifecycle sweeper shutdown complete");
    }

    /// One pass over every active tournament. Failures are logged per
    /// tournament and never stop the sweep.
    pub async fn sweep_once(&self) -> usize {
        let ids = match self.store.active_tournament_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("sweep could not list active tournaments: {e}");
                return 0;
            }
        };

        let mut swept = 0;
        for id in ids {
            match self.lifecycle.check_and_finalize(id).await {
                Ok(outcome) => {
                    swept += 1;
                    if outcome.is_actionable() {
                        info!(
                            "sweep advanced tournament {id}: finalized={} next_round={} manual_draw={} manual_qualification={}",
                            outcome.tournament_finalized,
                            outcome.next_round_generated,
                            outcome.manual_draw_required,
                            outcome.manual_qualification_required
                        );
                    }
                }
                Err(LifecycleError::Busy(_)) => {
                    // A match-end trigger (or another instance) holds the
                    // lock; it will run the same decision.
                    debug!("sweep skipped busy tournament {id}");
                }
                Err(e) => error!("sweep failed for tournament {id}: {e}"),
            }
        }
        swept
    }
}
