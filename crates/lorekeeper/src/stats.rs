//! `lore stats`: what is indexed and cached.

use anyhow::Result;

use crate::config::Config;
use crate::context::{IndexStats, Lorekeeper};

pub async fn run_stats(config: &Config) -> Result<()> {
    let lore = Lorekeeper::open(config).await?;
    let stats = lore.stats().await;
    lore.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    print_stats(config, &stats, db_size);
    Ok(())
}

fn print_stats(config: &Config, s: &IndexStats, db_size: u64) {
    println!("Lorekeeper: Index Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Cache:       {}", config.cache.path.display());
    println!("  Collection:  {}", s.collection);
    println!("  Model:       {}", s.model);
    println!();
    println!("  Chunks:      {}", s.entries);
    println!("  Sources:     {}", s.sources);
    println!("  Cached:      {} files", s.cached_files);
    match s.last_commit {
        Some(ts) => println!("  Last sync:   {}", format_ts_relative(ts, chrono::Utc::now().timestamp())),
        None => println!("  Last sync:   never"),
    }
    match s.dims {
        Some(d) => println!("  Dimensions:  {}", d),
        None => println!("  Dimensions:  (empty)"),
    }
    if s.cache_degraded {
        println!();
        println!("  warning: cache file is unreadable; next sync reprocesses everything");
    }
    println!();
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_relative(ts: i64, now: i64) -> String {
    let delta = now - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        plural(delta / 60, "min")
    } else if delta < 86400 {
        plural(delta / 3600, "hour")
    } else if delta < 86400 * 30 {
        plural(delta / 86400, "day")
    } else {
        format_ts_iso(ts)
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
