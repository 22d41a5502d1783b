//! Roster and balance views.

use crate::backend::{Backend, BackendError};
use crate::limits::DEAL_CAP;
use crate::model::{PlayerCode, PlayerProfile};
use chrono::{Duration, Utc};
use serde::Serialize;

/// A roster row: another player plus the pair's deal budget.
#[derive(Clone, Debug, Serialize)]
pub struct RosterEntry {
    pub profile: PlayerProfile,
    /// Deals already used against this player, both directions.
    pub deals_used: u32,
    pub can_deal: bool,
}

/// Players other than `self_code` whose `last_active` falls within `window`,
/// each annotated with the re-derived pair deal count.
pub async fn list_active_players(
    backend: &dyn Backend,
    self_code: &PlayerCode,
    window: Duration,
) -> Result<Vec<RosterEntry>, BackendError> {
    let cutoff = Utc::now() - window;
    let players = backend.list_players().await?;

    let mut roster = Vec::new();
    for profile in players {
        if &profile.code == self_code || profile.last_active < cutoff {
            continue;
        }
        let deals = backend.deals_between(self_code, &profile.code).await?;
        let deals_used = deals.len() as u32;
        roster.push(RosterEntry {
            can_deal: deals_used < DEAL_CAP,
            deals_used,
            profile,
        });
    }
    roster.sort_by(|a, b| a.profile.name.cmp(&b.profile.name));
    Ok(roster)
}

/// Re-read the authoritative coin balance.
pub async fn refresh_balance(
    backend: &dyn Backend,
    code: &PlayerCode,
) -> Result<i64, BackendError> {
    Ok(backend.fetch_player(code).await?.coins)
}

/// Whether the player has been seen within the window.
pub fn is_available(profile: &PlayerProfile, window: Duration) -> bool {
    profile.last_active >= Utc::now() - window
}
