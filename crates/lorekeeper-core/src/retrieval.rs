//! Progression-aware context retrieval.
//!
//! # Pipeline
//!
//! ```text
//! query ──► embed ──► index.query(k × overfetch)
//!                          │
//!                          ▼
//!            drop candidates from later acts        (hard filter)
//!                          │
//!                          ▼
//!            score = similarity + boosts − penalties
//!                          │
//!                          ▼
//!            stable sort by score, truncate to k
//! ```
//!
//! Boosts and penalties are additive and independent: a current-act
//! spoiler receives both the act boost and the spoiler penalty.
//!
//! Without a progression state nothing is filtered and only the
//! query-relative boosts (location named in the query, character,
//! lore) apply. The result is marked [`RetrievalStatus::Unfiltered`].

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::EmbeddingManager;
use crate::intent::{contains_phrase, QueryIntent};
use crate::models::{Passage, RetrievalResult, RetrievalStatus};
use crate::progression::{same_label, ContentKind, ProgressionState, ProgressionTag};
use crate::store::{ScoredEntry, VectorIndex};

/// Ranking weights. All values are added to or subtracted from the raw
/// cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalWeights {
    pub current_act_boost: f32,
    pub current_arc_boost: f32,
    pub location_boost: f32,
    pub character_boost: f32,
    pub lore_boost: f32,
    pub branch_penalty: f32,
    pub spoiler_penalty: f32,
    pub foreshadow_penalty: f32,
    /// Candidates fetched per requested passage.
    pub overfetch_factor: usize,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            current_act_boost: 0.15,
            current_arc_boost: 0.05,
            location_boost: 0.10,
            character_boost: 0.10,
            lore_boost: 0.05,
            branch_penalty: 0.20,
            spoiler_penalty: 0.25,
            foreshadow_penalty: 0.10,
            overfetch_factor: 3,
        }
    }
}

pub struct Retriever {
    embeddings: Arc<EmbeddingManager>,
    index: Arc<dyn VectorIndex>,
    weights: RetrievalWeights,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<EmbeddingManager>,
        index: Arc<dyn VectorIndex>,
        weights: RetrievalWeights,
    ) -> Self {
        Self {
            embeddings,
            index,
            weights,
        }
    }

    /// Return up to `k` passages ranked for `state`.
    ///
    /// A query that cannot be embedded yields an empty result with
    /// [`RetrievalStatus::Failed`]; index errors are returned as `Err`.
    pub async fn retrieve(
        &self,
        query: &str,
        state: Option<&ProgressionState>,
        k: usize,
    ) -> Result<RetrievalResult> {
        let intent = QueryIntent::analyze(query);
        let status = match state {
            Some(_) => RetrievalStatus::Ranked,
            None => {
                debug!("no progression state supplied, retrieving unfiltered");
                RetrievalStatus::Unfiltered
            }
        };

        if k == 0 {
            return Ok(RetrievalResult {
                passages: Vec::new(),
                intent,
                status,
            });
        }

        let query_vec = match self.embeddings.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(%reason, "query embedding failed");
                return Ok(RetrievalResult {
                    passages: Vec::new(),
                    intent,
                    status: RetrievalStatus::Failed { reason },
                });
            }
        };

        let fetch = k.saturating_mul(self.weights.overfetch_factor.max(1));
        let candidates = self.index.query(&query_vec, fetch).await?;
        let fetched = candidates.len();
        let passages = rank(candidates, state, &intent, query, &self.weights, k);
        debug!(
            fetched,
            returned = passages.len(),
            intent = intent.primary().as_str(),
            "retrieved passages"
        );

        Ok(RetrievalResult {
            passages,
            intent,
            status,
        })
    }
}

/// Filter, score, and order candidates. Pure; exposed for testing the
/// ranking rules without an index.
pub fn rank(
    candidates: Vec<ScoredEntry>,
    state: Option<&ProgressionState>,
    intent: &QueryIntent,
    query: &str,
    weights: &RetrievalWeights,
    k: usize,
) -> Vec<Passage> {
    let query_lower = query.to_lowercase();
    let mut passages: Vec<Passage> = candidates
        .into_iter()
        .filter(|c| state.map_or(true, |s| s.admits(&c.entry.tag)))
        .map(|c| {
            let score = c.similarity + adjustment(&c.entry.tag, state, intent, &query_lower, weights);
            Passage {
                chunk_id: c.entry.chunk_id,
                source_path: c.entry.source_path,
                section: c.entry.section,
                text: c.entry.text,
                score,
                similarity: c.similarity,
                tag: c.entry.tag,
            }
        })
        .collect();
    passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    passages.truncate(k);
    passages
}

/// Sum of every boost and penalty that applies to one candidate.
pub fn adjustment(
    tag: &ProgressionTag,
    state: Option<&ProgressionState>,
    intent: &QueryIntent,
    query_lower: &str,
    w: &RetrievalWeights,
) -> f32 {
    let mut delta = 0.0;

    let location_named = intent.location
        && tag
            .location
            .as_deref()
            .is_some_and(|loc| contains_phrase(query_lower, &loc.to_lowercase()));

    if let Some(s) = state {
        if tag.act == Some(s.act) {
            let mut boost = w.current_act_boost;
            if intent.lore {
                boost *= 0.5;
            }
            if intent.session_recall {
                boost *= 1.5;
            }
            delta += boost;
            if matches!((&tag.arc, &s.arc), (Some(a), Some(b)) if same_label(a, b)) {
                delta += w.current_arc_boost;
            }
        }

        let location_current =
            matches!((&tag.location, &s.location), (Some(a), Some(b)) if same_label(a, b));
        if location_current || location_named {
            delta += location_weight(intent, w);
        }

        if matches!((&tag.branch, &s.branch), (Some(a), Some(b)) if !same_label(a, b)) {
            delta -= w.branch_penalty;
        }

        let future_scale = if intent.seeks_future_info { 2.0 } else { 1.0 };
        if tag.spoiler {
            delta -= w.spoiler_penalty * future_scale;
        }
        if tag.foreshadowing {
            let planning_scale = if intent.dm_planning { 0.5 } else { 1.0 };
            delta -= w.foreshadow_penalty * future_scale * planning_scale;
        }
    } else if location_named {
        delta += location_weight(intent, w);
    }

    if intent.character {
        let named = tag
            .characters
            .iter()
            .any(|c| contains_phrase(query_lower, &c.to_lowercase()));
        if named || tag.kind == ContentKind::CharacterReference {
            delta += w.character_boost;
        }
    }

    if intent.lore && tag.kind == ContentKind::Lore {
        delta += w.lore_boost;
    }

    delta
}

fn location_weight(intent: &QueryIntent, w: &RetrievalWeights) -> f32 {
    if intent.location {
        w.location_boost * 2.0
    } else {
        w.location_boost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexEntry;
    use crate::progression::Act;

    fn candidate(id: &str, similarity: f32, tag: ProgressionTag) -> ScoredEntry {
        ScoredEntry {
            entry: IndexEntry {
                chunk_id: id.to_string(),
                source_path: format!("{}.md", id),
                ordinal: 0,
                text: id.to_string(),
                section: None,
                tag,
                embedding: vec![1.0],
                model: "m".to_string(),
                content_hash: "h".to_string(),
            },
            similarity,
        }
    }

    fn act(n: u32) -> ProgressionTag {
        ProgressionTag {
            act: Some(Act(n)),
            ..Default::default()
        }
    }

    fn ids(passages: &[Passage]) -> Vec<&str> {
        passages.iter().map(|p| p.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_future_acts_are_excluded() {
        let state = ProgressionState::at_act(Act(2));
        let out = rank(
            vec![
                candidate("a3", 0.99, act(3)),
                candidate("a1", 0.5, act(1)),
                candidate("general", 0.4, ProgressionTag::default()),
            ],
            Some(&state),
            &QueryIntent::default(),
            "q",
            &RetrievalWeights::default(),
            10,
        );
        assert_eq!(ids(&out), vec!["a1", "general"]);
    }

    #[test]
    fn test_current_act_boost_reorders_near_ties() {
        let state = ProgressionState::at_act(Act(2));
        let out = rank(
            vec![candidate("a1", 0.80, act(1)), candidate("a2", 0.78, act(2))],
            Some(&state),
            &QueryIntent::default(),
            "q",
            &RetrievalWeights::default(),
            10,
        );
        assert_eq!(ids(&out), vec!["a2", "a1"]);
        assert!((out[0].score - 0.93).abs() < 1e-5);
        assert!((out[0].similarity - 0.78).abs() < 1e-6);
    }

    #[test]
    fn test_no_state_is_unfiltered() {
        let out = rank(
            vec![candidate("a3", 0.9, act(3)), candidate("a1", 0.8, act(1))],
            None,
            &QueryIntent::default(),
            "q",
            &RetrievalWeights::default(),
            10,
        );
        assert_eq!(ids(&out), vec!["a3", "a1"]);
        assert_eq!(out[0].score, out[0].similarity);
    }

    #[test]
    fn test_boost_and_penalty_are_additive() {
        let w = RetrievalWeights::default();
        let state = ProgressionState::at_act(Act(2));
        let tag = ProgressionTag {
            act: Some(Act(2)),
            spoiler: true,
            ..Default::default()
        };
        let delta = adjustment(&tag, Some(&state), &QueryIntent::default(), "q", &w);
        assert!((delta - (w.current_act_boost - w.spoiler_penalty)).abs() < 1e-6);
    }

    #[test]
    fn test_branch_mismatch_penalized() {
        let w = RetrievalWeights::default();
        let state = ProgressionState {
            branch: Some("Tser Pool".into()),
            ..ProgressionState::at_act(Act(1))
        };
        let other = ProgressionTag {
            branch: Some("tser pool".into()),
            ..Default::default()
        };
        let mismatch = ProgressionTag {
            branch: Some("wizard of wines".into()),
            ..Default::default()
        };
        let intent = QueryIntent::default();
        assert_eq!(adjustment(&other, Some(&state), &intent, "q", &w), 0.0);
        assert!((adjustment(&mismatch, Some(&state), &intent, "q", &w) + w.branch_penalty).abs() < 1e-6);
    }

    #[test]
    fn test_intent_scales_weights() {
        let w = RetrievalWeights::default();
        let state = ProgressionState::at_act(Act(1));
        let tag = ProgressionTag {
            foreshadowing: true,
            spoiler: true,
            ..Default::default()
        };
        let plain = adjustment(&tag, Some(&state), &QueryIntent::default(), "q", &w);
        let future = QueryIntent {
            seeks_future_info: true,
            ..Default::default()
        };
        let seeking = adjustment(&tag, Some(&state), &future, "q", &w);
        assert!((seeking - 2.0 * plain).abs() < 1e-6);

        let fore = ProgressionTag {
            foreshadowing: true,
            ..Default::default()
        };
        let planning = QueryIntent {
            dm_planning: true,
            ..Default::default()
        };
        let delta = adjustment(&fore, Some(&state), &planning, "q", &w);
        assert!((delta + w.foreshadow_penalty * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_location_and_character_boosts() {
        let w = RetrievalWeights::default();
        let tag = ProgressionTag {
            location: Some("Vallaki".into()),
            characters: vec!["Ireena".into()],
            ..Default::default()
        };
        let query = "where in vallaki is ireena hiding? who protects her?";
        let intent = QueryIntent::analyze(query);
        assert!(intent.location && intent.character);
        let delta = adjustment(&tag, None, &intent, query, &w);
        assert!((delta - (w.location_boost * 2.0 + w.character_boost)).abs() < 1e-6);

        let state = ProgressionState {
            location: Some("vallaki".into()),
            ..ProgressionState::at_act(Act(1))
        };
        let delta = adjustment(&tag, Some(&state), &QueryIntent::default(), "q", &w);
        assert!((delta - w.location_boost).abs() < 1e-6);
    }

    #[test]
    fn test_ties_keep_index_order_and_truncate() {
        let state = ProgressionState::at_act(Act(1));
        let out = rank(
            vec![
                candidate("first", 0.5, act(1)),
                candidate("second", 0.5, act(1)),
                candidate("third", 0.5, act(1)),
            ],
            Some(&state),
            &QueryIntent::default(),
            "q",
            &RetrievalWeights::default(),
            2,
        );
        assert_eq!(ids(&out), vec!["first", "second"]);
    }

    #[test]
    fn test_everything_filtered_is_empty() {
        let state = ProgressionState::at_act(Act(1));
        let out = rank(
            vec![candidate("a2", 0.9, act(2)), candidate("a3", 0.8, act(3))],
            Some(&state),
            &QueryIntent::default(),
            "q",
            &RetrievalWeights::default(),
            5,
        );
        assert!(out.is_empty());
    }
}
