//! Live Feed Example
//!
//! Polls a simulated scoreboard, printing each applied update and the
//! interval the scheduler picks. Run with `RUST_LOG`-style verbosity by
//! editing the subscriber level below.

use scoresync::prelude::*;
use scoresync::{ScheduleConfig, TracingMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Game {
    id: String,
    home: u32,
    away: u32,
    phase: Phase,
}

impl Entity for Game {
    fn entity_id(&self) -> String {
        self.id.clone()
    }

    fn signature(&self) -> String {
        format!("{}:{}:{}:{}", self.id, self.home, self.away, self.phase.as_str())
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SyncError::Internal(e.to_string()))?;

    // Compressed schedule so the demo finishes quickly
    let schedule = ScheduleConfig::default()
        .intervals(Duration::from_secs(1), Duration::from_secs(5))
        .debounce(Duration::from_millis(200));
    let ctx = SyncContext::with_config(
        scoresync::TieredStore::in_memory(),
        SyncConfig::default().with_schedule(schedule),
    )
    .with_metrics(TracingMetrics::new().with_service_name("live-feed"));

    let tick = Arc::new(AtomicU32::new(0));
    let fetch = move || {
        let tick = tick.fetch_add(1, Ordering::SeqCst);
        async move {
            // A touchdown every third poll, final after the ninth
            let phase = if tick >= 9 { Phase::Final } else { Phase::InProgress };
            Ok(vec![
                Game {
                    id: "g1".into(),
                    home: 7 * (tick / 3),
                    away: 3,
                    phase,
                },
                Game {
                    id: "g2".into(),
                    home: 0,
                    away: 0,
                    phase: Phase::Scheduled,
                },
            ])
        }
    };

    let poller = Arc::new(FeedPoller::new(
        ctx,
        ResourceKey::new("nfl", "scoreboard").param("week", 7),
        fetch,
    ));

    let mut updates = poller.subscribe();
    let printer = {
        let poller = poller.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                for game in &snapshot.entities {
                    println!(
                        "{} {}-{} ({})",
                        game.id,
                        game.home,
                        game.away,
                        game.phase.as_str()
                    );
                }
                println!(
                    "  changed: {:?}, next poll in {:?}\n",
                    snapshot.diff.changed,
                    poller.current_interval()
                );
            }
        })
    };

    let runner = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.run(tokio::time::sleep(Duration::from_secs(15))).await })
    };

    runner
        .await
        .map_err(|e| SyncError::Internal(e.to_string()))?;
    printer.abort();
    Ok(())
}
