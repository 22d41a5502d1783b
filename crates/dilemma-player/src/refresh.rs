//! The shared refresh loop.
//!
//! One poll per tick feeds every panel through the snapshot channel. A
//! failed tick is logged and skipped; the next tick starts clean.

use crate::state::{AppState, Snapshot};
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub fn spawn_refresh_task(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;

            let Some(engine) = state.engine() else {
                continue;
            };
            let code = engine.session().code.clone();

            if let Err(e) = state.backend.touch(&code).await {
                tracing::warn!(error = %e, "heartbeat failed");
                continue;
            }

            let profile = state.backend.fetch_player(&code).await;
            let roster = engine.roster().await;
            match (profile, roster) {
                (Ok(profile), Ok(roster)) => {
                    state.publish(Snapshot {
                        profile: Some(profile),
                        roster,
                        refreshed_at: Some(Utc::now()),
                    });
                }
                (profile, roster) => {
                    if let Err(e) = profile {
                        tracing::warn!(error = %e, "profile refresh failed");
                    }
                    if let Err(e) = roster {
                        tracing::warn!(error = %e, "roster refresh failed");
                    }
                }
            }
        }
    })
}
