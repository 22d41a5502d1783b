//! Deposit resolution.
//!
//! A deposit is settled once, by a countdown task that fires at `end_time`.
//! The profit rule is a pure function of the deposit kind, the amount and a
//! single uniform draw, so both branches of the risky rule are testable.

use crate::backend::{Backend, BackendError};
use crate::model::{Deposit, DepositKind};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Probability that a risky deposit pays out.
pub const RISKY_WIN_PROBABILITY: f64 = 0.40;
/// Gain on the lucky branch, percent of the amount.
pub const RISKY_WIN_PERCENT: i64 = 20;
/// Loss on the unlucky branch, percent of the amount.
pub const RISKY_LOSS_PERCENT: i64 = 10;

/// Profit for a deposit given a uniform draw in `[0, 1)`.
///
/// Fixed deposits ignore the draw. Risky deposits win 20% of the amount
/// when the draw lands under 0.40, otherwise lose 10%.
pub fn deposit_profit(kind: DepositKind, amount: i64, draw: f64) -> i64 {
    match kind {
        DepositKind::Fixed { rate_percent } => amount * rate_percent / 100,
        DepositKind::Risky => {
            if draw < RISKY_WIN_PROBABILITY {
                amount * RISKY_WIN_PERCENT / 100
            } else {
                -(amount * RISKY_LOSS_PERCENT / 100)
            }
        }
    }
}

/// Settle an expired deposit: one draw, one credit, terminal.
pub async fn resolve_deposit(
    backend: &dyn Backend,
    deposit: &Deposit,
) -> Result<Deposit, BackendError> {
    let draw = rand::random::<f64>();
    let profit = deposit_profit(deposit.kind, deposit.amount, draw);
    backend.complete_deposit(deposit.id, profit).await
}

/// Spawn the countdown task for an open deposit. Resolution failures are
/// logged, not retried; a deposit the backend already settled stays settled.
pub fn spawn_deposit_timer(backend: Arc<dyn Backend>, deposit: Deposit) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wait = (deposit.end_time - Utc::now())
            .to_std()
            .unwrap_or_default();
        tokio::time::sleep(wait).await;

        match resolve_deposit(backend.as_ref(), &deposit).await {
            Ok(settled) => {
                tracing::info!(
                    deposit = %settled.id.0,
                    profit = settled.profit.unwrap_or(0),
                    "deposit settled"
                );
            }
            Err(e) => {
                tracing::warn!(deposit = %deposit.id.0, error = %e, "deposit settlement failed");
            }
        }
    })
}
