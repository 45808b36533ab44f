//! Stale-While-Revalidate Example
//!
//! Demonstrates serving an expired value immediately while the refreshed
//! one is fetched in the background.

use scoresync::prelude::*;
use std::time::Duration;

async fn standings(version: u32) -> Result<String> {
    tokio::time::sleep(Duration::from_millis(300)).await;
    Ok(format!("Standings v{version}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let ctx = SyncContext::in_memory();
    let key = ResourceKey::new("nba", "standings");
    let opts = CacheOpts::new().ttl_secs(1);

    println!("=== Stale-While-Revalidate Demo ===\n");

    let first = ctx
        .fetch_with_cache(&key, || standings(1), opts.clone())
        .await?;
    println!("T+0s: {:?} - {}", first.freshness, first.data);

    let cached = ctx
        .fetch_with_cache(&key, || standings(2), opts.clone())
        .await?;
    println!("T+0s: {:?} - {}", cached.freshness, cached.data);

    println!("\nWaiting 2 seconds for TTL to expire...\n");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut changes = ctx.subscribe(&key);
    let stale = ctx
        .fetch_with_cache(&key, || standings(2), opts.clone())
        .await?;
    println!("T+2s: {:?} - {} (returned without waiting)", stale.freshness, stale.data);

    if let Some(event) = changes.recv().await {
        println!("Background refresh landed: {}", event.decode::<String>()?);
    }

    let fresh = ctx.fetch_with_cache(&key, || standings(3), opts).await?;
    println!("T+2.3s: {:?} - {}", fresh.freshness, fresh.data);

    Ok(())
}
