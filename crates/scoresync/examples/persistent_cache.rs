//! Persistent Cache Example
//!
//! Metadata lands in the file tier and is served from disk by a second
//! context, as it would be after an app restart.

use scoresync::prelude::*;
use scoresync::{FileConfig, StoreConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Team {
    id: u32,
    name: String,
}

async fn teams() -> Result<Vec<Team>> {
    println!("  (fetching teams from upstream)");
    Ok(vec![
        Team {
            id: 12,
            name: "Kansas City".into(),
        },
        Team {
            id: 2,
            name: "Buffalo".into(),
        },
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = SyncConfig {
        store: StoreConfig::default().with_persistent(FileConfig::new(dir.path())),
        ..Default::default()
    };
    let key = ResourceKey::new("nfl", "teams");

    let session = SyncContext::from_config(config.clone()).await?;
    let first = session
        .fetch_with_cache(&key, teams, DataClass::Metadata)
        .await?;
    println!("session 1: {:?}, {} teams", first.freshness, first.data.len());

    let restarted = SyncContext::from_config(config).await?;
    let second: Fetched<Vec<Team>> = restarted
        .fetch_with_cache(&key, teams, DataClass::Metadata)
        .await?;
    println!("session 2: {:?}, {} teams", second.freshness, second.data.len());

    for entry in std::fs::read_dir(dir.path())? {
        println!("  on disk: {}", entry?.file_name().to_string_lossy());
    }

    let stats = restarted.store().stats().await?;
    println!("stats: {} hits, {} misses", stats.hits, stats.misses);

    Ok(())
}
