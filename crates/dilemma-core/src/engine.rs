//! Deal engine: propose, await the counterpart, settle.
//!
//! The engine drives one deal at a time for the logged-in player. Waiting
//! for the counterpart is a poll loop with a hard timeout; a counterpart who
//! never answers is treated as having cheated. Settlement goes through a
//! single-assignment guard so a late genuine response and the timeout
//! default can never both apply deltas.

use crate::backend::{Backend, BackendError};
use crate::limits;
use crate::model::{Choice, Deal, DealId, DealStatus, PlayerCode};
use crate::payoff::payoff;
use crate::roster::{self, RosterEntry};
use crate::session::Session;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timing knobs for the deal protocol.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// How often the pending deal is re-read while waiting.
    pub poll_interval: Duration,
    /// How long the counterpart has before non-response is punished.
    pub response_timeout: Duration,
    /// How recently a player must have been seen to receive proposals.
    pub recency_window: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            response_timeout: Duration::from_secs(60),
            recency_window: chrono::Duration::minutes(5),
        }
    }
}

struct ActiveDeal {
    id: DealId,
    settled: bool,
}

/// Per-session deal orchestrator.
pub struct DealEngine {
    backend: Arc<dyn Backend>,
    session: Session,
    config: EngineConfig,
    active: Mutex<Option<ActiveDeal>>,
}

impl DealEngine {
    pub fn new(backend: Arc<dyn Backend>, session: Session, config: EngineConfig) -> Self {
        Self {
            backend,
            session,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The deal currently in flight for this session, if any.
    pub fn active_deal(&self) -> Option<DealId> {
        self.active.lock().unwrap().as_ref().map(|a| a.id)
    }

    /// Propose a deal to `counterpart`, recording our `choice`.
    ///
    /// The local gates are advisory (the backend re-checks all of them);
    /// they exist so an obviously doomed proposal never leaves the client.
    pub async fn propose_deal(
        &self,
        counterpart: &PlayerCode,
        choice: Choice,
    ) -> Result<Deal, BackendError> {
        if self.active.lock().unwrap().is_some() {
            return Err(BackendError::DealAlreadyActive);
        }

        let partner = self.backend.fetch_player(counterpart).await?;
        if !roster::is_available(&partner, self.config.recency_window) {
            return Err(BackendError::CounterpartUnavailable);
        }

        let balance = roster::refresh_balance(self.backend.as_ref(), &self.session.code).await?;
        if balance <= 0 {
            return Err(BackendError::InsufficientFunds);
        }

        if !limits::can_deal(self.backend.as_ref(), &self.session.code, counterpart).await? {
            return Err(BackendError::RateLimitExceeded);
        }

        let deal = self
            .backend
            .create_deal(&self.session.code, counterpart, choice)
            .await?;

        let mut active = self.active.lock().unwrap();
        *active = Some(ActiveDeal {
            id: deal.id,
            settled: false,
        });

        tracing::info!(deal = %deal.id, counterpart = %counterpart, %choice, "deal proposed");
        Ok(deal)
    }

    /// Poll until the counterpart has answered or the timeout elapses.
    ///
    /// Only call this for the deal returned by `propose_deal`. On timeout
    /// the counterpart's choice defaults to cheat and the deal is settled
    /// with that default. A remote failure abandons the wait: the local
    /// slot is cleared and the error surfaced, leaving no partial state.
    pub async fn await_counterpart(&self, deal_id: DealId) -> Result<Deal, BackendError> {
        let deadline = tokio::time::Instant::now() + self.config.response_timeout;
        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            ticker.tick().await;

            let deal = match self.backend.fetch_deal(deal_id).await {
                Ok(deal) => deal,
                Err(e) => {
                    self.clear_active(deal_id);
                    return Err(e);
                }
            };

            match deal.status {
                // The counterpart's response already settled it remotely.
                DealStatus::Completed | DealStatus::Cancelled => {
                    self.clear_active(deal_id);
                    return Ok(deal);
                }
                DealStatus::Pending => {}
            }

            if let Some(choice) = deal.counterpart_choice {
                return self.settle(deal, choice).await;
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::info!(deal = %deal_id, "no response before timeout, defaulting to cheat");
                return self.settle(deal, Choice::Cheat).await;
            }
        }
    }

    /// Counterpart side: record our choice on an incoming deal and trigger
    /// settlement. The initiator's poll loop may win the settlement race;
    /// either way the deltas are applied exactly once.
    pub async fn respond_to_deal(
        &self,
        deal_id: DealId,
        choice: Choice,
    ) -> Result<Deal, BackendError> {
        let deal = self.backend.submit_choice(deal_id, choice).await?;
        let (initiator_delta, counterpart_delta) = payoff(deal.initiator_choice, choice);

        match self
            .backend
            .complete_deal(deal_id, choice, initiator_delta, counterpart_delta)
            .await
        {
            Ok(done) => Ok(done),
            Err(BackendError::AlreadyResolved) => self.backend.fetch_deal(deal_id).await,
            Err(e) => Err(e),
        }
    }

    /// Cancel the in-flight proposal, if one exists and is still open.
    pub async fn cancel_active(&self) -> Result<Option<Deal>, BackendError> {
        let id = {
            let active = self.active.lock().unwrap();
            match active.as_ref() {
                Some(a) if !a.settled => a.id,
                _ => return Ok(None),
            }
        };

        match self.backend.cancel_deal(id).await {
            Ok(deal) => {
                self.clear_active(id);
                Ok(Some(deal))
            }
            Err(BackendError::AlreadyResolved) => {
                // Finished while we were cancelling; nothing left to undo.
                self.clear_active(id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Other active players, annotated with pair deal counts.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, BackendError> {
        roster::list_active_players(
            self.backend.as_ref(),
            &self.session.code,
            self.config.recency_window,
        )
        .await
    }

    /// Authoritative own balance.
    pub async fn balance(&self) -> Result<i64, BackendError> {
        roster::refresh_balance(self.backend.as_ref(), &self.session.code).await
    }

    async fn settle(&self, deal: Deal, counterpart_choice: Choice) -> Result<Deal, BackendError> {
        if !self.mark_settled(deal.id) {
            return Err(BackendError::AlreadyResolved);
        }

        let (initiator_delta, counterpart_delta) = payoff(deal.initiator_choice, counterpart_choice);
        let result = self
            .backend
            .complete_deal(deal.id, counterpart_choice, initiator_delta, counterpart_delta)
            .await;
        self.clear_active(deal.id);

        if let Ok(done) = &result {
            tracing::info!(
                deal = %done.id,
                initiator_delta,
                counterpart_delta,
                "deal settled"
            );
        }
        result
    }

    /// Single-assignment settlement guard. Returns false if this deal is
    /// not the open slot or was already claimed by another settlement path.
    fn mark_settled(&self, id: DealId) -> bool {
        let mut active = self.active.lock().unwrap();
        match active.as_mut() {
            Some(a) if a.id == id && !a.settled => {
                a.settled = true;
                true
            }
            _ => false,
        }
    }

    fn clear_active(&self, id: DealId) {
        let mut active = self.active.lock().unwrap();
        if active.as_ref().map(|a| a.id) == Some(id) {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use chrono::Utc;

    fn engine_for(backend: &MockBackend, code: &str, name: &str) -> DealEngine {
        DealEngine::new(
            Arc::new(backend.clone()),
            Session {
                code: code.into(),
                name: name.to_string(),
            },
            EngineConfig::default(),
        )
    }

    fn classroom() -> MockBackend {
        let backend = MockBackend::new();
        backend.register_player("A-1", "Ada", "7B", "#e74c3c", 100);
        backend.register_player("B-2", "Ben", "7B", "#3498db", 100);
        backend
    }

    #[tokio::test]
    async fn test_propose_creates_pending_deal() {
        let backend = classroom();
        let engine = engine_for(&backend, "A-1", "Ada");

        let deal = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        assert_eq!(deal.status, DealStatus::Pending);
        assert_eq!(deal.initiator_choice, Choice::Cooperate);
        assert_eq!(engine.active_deal(), Some(deal.id));
    }

    #[tokio::test]
    async fn test_propose_rejects_second_proposal() {
        let backend = classroom();
        backend.register_player("C-3", "Cleo", "7B", "#2ecc71", 100);
        let engine = engine_for(&backend, "A-1", "Ada");

        engine.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        let second = engine.propose_deal(&"C-3".into(), Choice::Cheat).await;
        assert!(matches!(second, Err(BackendError::DealAlreadyActive)));
    }

    #[tokio::test]
    async fn test_propose_rejects_stale_counterpart() {
        let backend = classroom();
        backend.set_last_active(&"B-2".into(), Utc::now() - chrono::Duration::minutes(10));
        let engine = engine_for(&backend, "A-1", "Ada");

        let result = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await;
        assert!(matches!(result, Err(BackendError::CounterpartUnavailable)));
    }

    #[tokio::test]
    async fn test_propose_rejects_broke_initiator() {
        let backend = MockBackend::new();
        backend.register_player("A-1", "Ada", "7B", "#e74c3c", 0);
        backend.register_player("B-2", "Ben", "7B", "#3498db", 100);
        let engine = engine_for(&backend, "A-1", "Ada");

        let result = engine.propose_deal(&"B-2".into(), Choice::Cheat).await;
        assert!(matches!(result, Err(BackendError::InsufficientFunds)));
    }

    #[tokio::test]
    async fn test_propose_rejects_sixth_deal() {
        let backend = classroom();
        for _ in 0..limits::DEAL_CAP {
            backend.seed_completed_deal(&"A-1".into(), &"B-2".into());
        }
        let engine = engine_for(&backend, "A-1", "Ada");

        let result = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await;
        assert!(matches!(result, Err(BackendError::RateLimitExceeded)));
        // No deal record was created
        assert_eq!(
            backend.deals_between(&"A-1".into(), &"B-2".into()).await.unwrap().len(),
            limits::DEAL_CAP as usize
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_defaults_to_cheat() {
        let backend = classroom();
        let engine = engine_for(&backend, "A-1", "Ada");

        let deal = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        let done = engine.await_counterpart(deal.id).await.unwrap();

        assert_eq!(done.status, DealStatus::Completed);
        assert_eq!(done.counterpart_choice, Some(Choice::Cheat));
        // Cooperate vs cheat: initiator loses 1, silent counterpart gains 3
        assert_eq!(done.initiator_delta, Some(-1));
        assert_eq!(done.counterpart_delta, Some(3));
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 99);
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 103);
        assert_eq!(engine.active_deal(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_picks_up_response() {
        let backend = classroom();
        let engine = Arc::new(engine_for(&backend, "A-1", "Ada"));

        let deal = engine.propose_deal(&"B-2".into(), Choice::Cheat).await.unwrap();

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.await_counterpart(deal.id).await })
        };
        tokio::task::yield_now().await;

        backend.submit_choice(deal.id, Choice::Cooperate).await.unwrap();
        let done = waiter.await.unwrap().unwrap();

        assert_eq!(done.status, DealStatus::Completed);
        assert_eq!(done.initiator_delta, Some(3));
        assert_eq!(done.counterpart_delta, Some(-1));
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 103);
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_deal_is_not_reapplied() {
        let backend = classroom();
        let engine = engine_for(&backend, "A-1", "Ada");

        let deal = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        engine.await_counterpart(deal.id).await.unwrap();
        let balance_after = backend.fetch_player(&"A-1".into()).await.unwrap().coins;

        // A second wait observes the terminal record without reapplying it
        let again = engine.await_counterpart(deal.id).await.unwrap();
        assert_eq!(again.status, DealStatus::Completed);
        assert_eq!(
            backend.fetch_player(&"A-1".into()).await.unwrap().coins,
            balance_after
        );
    }

    #[tokio::test]
    async fn test_respond_settles_for_both_sides() {
        let backend = classroom();
        let initiator = engine_for(&backend, "A-1", "Ada");
        let counterpart = engine_for(&backend, "B-2", "Ben");

        let deal = initiator.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        let done = counterpart.respond_to_deal(deal.id, Choice::Cheat).await.unwrap();

        assert_eq!(done.status, DealStatus::Completed);
        assert_eq!(backend.fetch_player(&"A-1".into()).await.unwrap().coins, 99);
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 103);

        // A duplicate response is a rejection, not a second payout
        let again = counterpart.respond_to_deal(deal.id, Choice::Cooperate).await;
        assert!(matches!(again, Err(BackendError::AlreadyResolved)));
        assert_eq!(backend.fetch_player(&"B-2".into()).await.unwrap().coins, 103);
    }

    #[tokio::test]
    async fn test_cancel_active_frees_the_slot() {
        let backend = classroom();
        let engine = engine_for(&backend, "A-1", "Ada");

        let deal = engine.propose_deal(&"B-2".into(), Choice::Cooperate).await.unwrap();
        let cancelled = engine.cancel_active().await.unwrap().unwrap();
        assert_eq!(cancelled.id, deal.id);
        assert_eq!(cancelled.status, DealStatus::Cancelled);
        assert_eq!(engine.active_deal(), None);

        // Cancelled proposals do not consume the pair budget
        assert!(limits::can_deal(&backend, &"A-1".into(), &"B-2".into()).await.unwrap());
        engine.propose_deal(&"B-2".into(), Choice::Cheat).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_without_active_deal_is_noop() {
        let backend = classroom();
        let engine = engine_for(&backend, "A-1", "Ada");
        assert!(engine.cancel_active().await.unwrap().is_none());
    }
}
