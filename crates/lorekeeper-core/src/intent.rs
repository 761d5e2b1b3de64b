//! Keyword-based query intent analysis.
//!
//! The retriever scales its boosts and penalties by what the query seems
//! to be after: a location, a character, background lore, a recap of
//! earlier play, DM preparation, or information about how the story ends.
//! Matching is case-insensitive and whole-word.

use serde::Serialize;

const CHARACTER_TERMS: &[&str] = &[
    "who", "whom", "npc", "npcs", "character", "characters", "personality", "motivation",
    "motivations", "backstory", "relationship", "relationships", "ally", "allies", "villain",
];

const LOCATION_TERMS: &[&str] = &[
    "where", "location", "locations", "place", "places", "castle", "village", "town", "city",
    "map", "room", "rooms", "dungeon", "tavern", "inn", "road", "travel", "area", "building",
];

const LORE_TERMS: &[&str] = &[
    "history", "historical", "lore", "legend", "legends", "origin", "origins", "ancient", "myth",
    "myths", "background",
];

const RECALL_PHRASES: &[&str] = &[
    "last session", "previous session", "what happened", "recap", "remind me", "last time",
    "so far", "earlier",
];

const PLANNING_PHRASES: &[&str] = &[
    "prepare", "preparing", "prep", "next session", "next encounter", "upcoming", "should i run",
    "plan", "planning",
];

const FUTURE_PHRASES: &[&str] = &[
    "final", "ending", "outcome", "what will happen", "eventually", "later in the campaign",
    "future", "spoil", "spoilers", "how does it end",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryIntent {
    pub character: bool,
    pub location: bool,
    pub lore: bool,
    pub session_recall: bool,
    pub dm_planning: bool,
    pub seeks_future_info: bool,
}

/// The single intent used for display and for choosing which
/// query-relative boost applies first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryIntent {
    Location,
    Character,
    Lore,
    General,
}

impl PrimaryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryIntent::Location => "location",
            PrimaryIntent::Character => "character",
            PrimaryIntent::Lore => "lore",
            PrimaryIntent::General => "general",
        }
    }
}

impl QueryIntent {
    pub fn analyze(query: &str) -> Self {
        let q = query.to_lowercase();
        Self {
            character: any_term(&q, CHARACTER_TERMS),
            location: any_term(&q, LOCATION_TERMS),
            lore: any_term(&q, LORE_TERMS),
            session_recall: any_term(&q, RECALL_PHRASES),
            dm_planning: any_term(&q, PLANNING_PHRASES),
            seeks_future_info: any_term(&q, FUTURE_PHRASES),
        }
    }

    pub fn primary(&self) -> PrimaryIntent {
        if self.location {
            PrimaryIntent::Location
        } else if self.character {
            PrimaryIntent::Character
        } else if self.lore {
            PrimaryIntent::Lore
        } else {
            PrimaryIntent::General
        }
    }
}

fn any_term(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| contains_phrase(haystack, t))
}

/// True when `phrase` occurs in `haystack` bounded by non-word characters.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(found) = haystack[from..].find(phrase) {
        let start = from + found;
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
