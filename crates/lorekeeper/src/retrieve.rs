//! `lore retrieve`: print the passages the retriever ranks for a query.

use anyhow::{bail, Result};

use lorekeeper_core::models::{Passage, RetrievalResult, RetrievalStatus};
use lorekeeper_core::progression::{Act, ProgressionState};

use crate::config::Config;
use crate::context::Lorekeeper;

const EXCERPT_CHARS: usize = 240;

/// Progression flags as given on the command line.
#[derive(Debug, Default, Clone)]
pub struct StateArgs {
    pub act: Option<String>,
    pub arc: Option<String>,
    pub location: Option<String>,
    pub branch: Option<String>,
}

impl StateArgs {
    /// `None` when no act was given. Arc, location and branch only make
    /// sense relative to an act.
    pub fn to_state(&self) -> Result<Option<ProgressionState>> {
        let act = match &self.act {
            Some(raw) => raw.parse::<Act>()?,
            None => {
                if self.arc.is_some() || self.location.is_some() || self.branch.is_some() {
                    bail!("--arc, --location and --branch require --act");
                }
                return Ok(None);
            }
        };
        Ok(Some(ProgressionState {
            act,
            arc: self.arc.clone(),
            location: self.location.clone(),
            branch: self.branch.clone(),
        }))
    }
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    state: &StateArgs,
    limit: Option<usize>,
    explain: bool,
    json: bool,
) -> Result<()> {
    let state = state.to_state()?;
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if state.is_none() {
        eprintln!("note: no --act given, results are not filtered by campaign progression");
    }

    let k = limit.unwrap_or(config.retrieval.final_limit);
    let lore = Lorekeeper::open(config).await?;
    let result = lore.retrieve(query, state.as_ref(), k).await;
    lore.close().await;
    let result = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    print_result(&result, explain);
    Ok(())
}

fn print_result(result: &RetrievalResult, explain: bool) {
    if let RetrievalStatus::Failed { reason } = &result.status {
        eprintln!("query could not be embedded: {}", reason);
    }
    if result.is_empty() {
        println!("No results.");
        return;
    }
    if explain {
        println!("intent: {}", result.intent.primary().as_str());
        println!();
    }

    for (i, p) in result.passages.iter().enumerate() {
        match &p.section {
            Some(section) => println!("{}. [{:.3}] {} § {}", i + 1, p.score, p.source_path, section),
            None => println!("{}. [{:.3}] {}", i + 1, p.score, p.source_path),
        }
        println!("    {} / {}", p.tag.label(), p.tag.kind);
        if explain {
            print_explain(p);
        }
        println!("    excerpt: \"{}\"", excerpt(&p.text));
        println!();
    }
}

fn print_explain(p: &Passage) {
    println!(
        "    similarity: {:.3}  adjustment: {:+.3}",
        p.similarity,
        p.score - p.similarity
    );
    let t = &p.tag;
    let mut flags = Vec::new();
    if let Some(arc) = &t.arc {
        flags.push(format!("arc={}", arc));
    }
    if let Some(location) = &t.location {
        flags.push(format!("location={}", location));
    }
    if let Some(branch) = &t.branch {
        flags.push(format!("branch={}", branch));
    }
    if !t.characters.is_empty() {
        flags.push(format!("characters={}", t.characters.join(",")));
    }
    if t.spoiler {
        flags.push("spoiler".to_string());
    }
    if t.foreshadowing {
        flags.push("foreshadowing".to_string());
    }
    if !flags.is_empty() {
        println!("    tags: {}", flags.join("; "));
    }
    println!("    id: {}", p.chunk_id);
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}
