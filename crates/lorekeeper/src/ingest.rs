//! `lore sync`: bring the index in line with the corpus and print a report.

use anyhow::Result;

use lorekeeper_core::loader::SyncReport;

use crate::config::Config;
use crate::context::Lorekeeper;

pub async fn run_sync(config: &Config, full: bool) -> Result<()> {
    let lore = Lorekeeper::open(config).await?;
    let result = lore.sync(full).await;
    lore.close().await;
    let report = result?;

    print_report(config, &report, full);
    Ok(())
}

fn print_report(config: &Config, report: &SyncReport, full: bool) {
    println!("sync {}{}", config.corpus.root.display(), if full { " (full)" } else { "" });
    if report.cache_degraded {
        println!("  warning: cache file was unreadable, all files reprocessed");
    }
    println!("  files seen: {}", report.files_seen);
    println!("  unchanged: {}", report.unchanged);
    println!("  reindexed: {}", report.reindexed);
    println!("  removed: {}", report.removed);
    println!("  chunks written: {}", report.chunks_written);
    if config.embedding.is_enabled() {
        println!("  embeddings computed: {}", report.embeddings_computed);
        println!("  embeddings reused: {}", report.embeddings_reused);
    }
    if report.failures.is_empty() {
        println!("ok");
        return;
    }

    println!("  failures: {}", report.failures.len());
    for f in &report.failures {
        match &f.chunk_id {
            Some(id) => println!("    {} [{}]: {}", f.path, id, f.reason),
            None => println!("    {}: {}", f.path, f.reason),
        }
    }
}
