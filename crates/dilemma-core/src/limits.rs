//! Per-pair deal rate limiting.
//!
//! Counters are derived from the persisted deal log on every check. Nothing
//! is cached locally, so the count cannot drift from what the backend holds.

use crate::backend::{Backend, BackendError};
use crate::model::{DealStatus, Direction, PlayerCode};

/// Deals allowed between any pair of players, both directions combined.
pub const DEAL_CAP: u32 = 5;

/// How many deals exist from `a` to `b` (`Outgoing`) or `b` to `a`
/// (`Incoming`). Cancelled proposals do not count.
pub async fn deal_count(
    backend: &dyn Backend,
    a: &PlayerCode,
    b: &PlayerCode,
    direction: Direction,
) -> Result<u32, BackendError> {
    let deals = backend.deals_between(a, b).await?;
    let count = deals
        .iter()
        .filter(|d| d.status != DealStatus::Cancelled)
        .filter(|d| match direction {
            Direction::Outgoing => &d.initiator == a,
            Direction::Incoming => &d.initiator == b,
        })
        .count();
    Ok(count as u32)
}

/// Whether a new deal between `a` and `b` is still allowed.
pub async fn can_deal(
    backend: &dyn Backend,
    a: &PlayerCode,
    b: &PlayerCode,
) -> Result<bool, BackendError> {
    let outgoing = deal_count(backend, a, b, Direction::Outgoing).await?;
    let incoming = deal_count(backend, a, b, Direction::Incoming).await?;
    Ok(outgoing + incoming < DEAL_CAP)
}
