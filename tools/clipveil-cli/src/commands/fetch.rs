//! Fetch a remote video through the playback cache.

use clipveil_common::config::AppConfig;
use clipveil_playback_cache::PlaybackCache;

pub async fn run(
    config: &AppConfig,
    key: Option<String>,
    clear: bool,
    stats: bool,
) -> anyhow::Result<()> {
    let remote = clipveil_storage::remote_from_config(config)?;
    let cache = PlaybackCache::from_app_config(config, remote)?;

    if clear {
        cache.clear().await;
        println!("Cleared {}", cache.dir().display());
    }

    if let Some(key) = key {
        let path = cache.get(&key).await?;
        println!("{}", path.display());
    } else if !clear && !stats {
        return Err(anyhow::anyhow!("Pass a key, --clear, or --stats"));
    }

    if stats {
        let s = cache.stats();
        println!("Playback cache: {}", cache.dir().display());
        println!("  Entries: {}", s.entries);
        println!("  Size: {} / {} bytes", s.total_bytes, s.cap_bytes);
        println!("  Hits: {}  Misses: {}  Evictions: {}", s.hits, s.misses, s.evictions);
    }
    Ok(())
}
