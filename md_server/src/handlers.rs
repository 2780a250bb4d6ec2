//! Event handlers subscribed to the outbox dispatcher.
//!
//! These are the in-process collaborators living outside the core: a
//! notification stand-in and an analytics recorder. Both must be idempotent —
//! outbox delivery is at-least-once.

use crate::metrics;
use async_trait::async_trait;
use matchday::events::DomainEvent;
use matchday::outbox::EventHandler;
use tracing::info;

/// Logs the notifications this deployment would send. A real deployment
/// replaces this with push/email senders.
pub struct NotificationLogger;

#[async_trait]
impl EventHandler for NotificationLogger {
    fn name(&self) -> &str {
        "notification_logger"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        match event {
            DomainEvent::TournamentFinalized(e) => info!(
                tournament_id = e.tournament_id,
                winner_team_id = e.winner_team_id,
                "notify: tournament finished"
            ),
            DomainEvent::ManualDrawRequired(e) => info!(
                tournament_id = e.tournament_id,
                round_number = e.round_number,
                "notify organiser: draw required"
            ),
            DomainEvent::ManualQualificationRequired(e) => info!(
                tournament_id = e.tournament_id,
                "notify organiser: qualification picks required"
            ),
            DomainEvent::MatchesGenerated(e) => info!(
                tournament_id = e.tournament_id,
                stage = %e.stage,
                round_number = e.round_number,
                match_count = e.match_count,
                "notify teams: schedule published"
            ),
            _ => {}
        }
        Ok(())
    }
}

/// Feeds published events into the Prometheus counters.
pub struct AnalyticsRecorder;

#[async_trait]
impl EventHandler for AnalyticsRecorder {
    fn name(&self) -> &str {
        "analytics_recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        metrics::events_published_total(event.type_tag());
        if matches!(event, DomainEvent::TournamentFinalized(_)) {
            metrics::tournaments_finalized_total();
        }
        Ok(())
    }
}
