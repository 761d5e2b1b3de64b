//! Narrative progression types.
//!
//! An [`Act`] is totally ordered, which makes the eligibility rule a plain
//! comparison: content tagged with an act strictly greater than the
//! caller's current act is future content. Content without an act
//! (`ProgressionTag::act == None`) is act-agnostic reference material and
//! is always eligible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A campaign act, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Act(pub u32);

impl Act {
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Act {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match to_roman(self.0) {
            Some(r) => write!(f, "Act {}", r),
            None => write!(f, "Act {}", self.0),
        }
    }
}

impl FromStr for Act {
    type Err = anyhow::Error;

    /// Accepts `"2"`, `"II"`, `"Act II"`, `"act 2"`, `"act_2"` and `"Act-ii"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let rest = lower
            .strip_prefix("act")
            .map(|r| r.trim_start_matches([' ', '_', '-']))
            .unwrap_or(&lower);
        parse_ordinal(rest)
            .filter(|n| *n > 0)
            .map(Act)
            .ok_or_else(|| anyhow::anyhow!("invalid act: '{}'", trimmed))
    }
}

/// Parse an arabic or roman numeral (case-insensitive).
pub fn parse_ordinal(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok();
    }
    parse_roman(s)
}

fn roman_value(c: u8) -> Option<u32> {
    Some(match c.to_ascii_lowercase() {
        b'i' => 1,
        b'v' => 5,
        b'x' => 10,
        b'l' => 50,
        b'c' => 100,
        b'd' => 500,
        b'm' => 1000,
        _ => return None,
    })
}

fn parse_roman(s: &str) -> Option<u32> {
    let values: Option<Vec<u32>> = s.bytes().map(roman_value).collect();
    let values = values?;
    let mut total = 0i64;
    for (i, v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > v => total -= i64::from(*v),
            _ => total += i64::from(*v),
        }
    }
    let total = u32::try_from(total).ok()?;
    // Reject non-canonical spellings such as "IIII" or "IC".
    if to_roman(total)?.eq_ignore_ascii_case(s) {
        Some(total)
    } else {
        None
    }
}

fn to_roman(mut n: u32) -> Option<String> {
    if n == 0 || n >= 4000 {
        return None;
    }
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, sym) in TABLE {
        while n >= value {
            out.push_str(sym);
            n -= value;
        }
    }
    Some(out)
}

/// Classification of a corpus file, derived from its path and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Reference,
    DmGuide,
    CharacterReference,
    Lore,
    Introduction,
    Adventure,
    Appendix,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Reference => "reference",
            ContentKind::DmGuide => "dm_guide",
            ContentKind::CharacterReference => "character_reference",
            ContentKind::Lore => "lore",
            ContentKind::Introduction => "introduction",
            ContentKind::Adventure => "adventure",
            ContentKind::Appendix => "appendix",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "reference" => ContentKind::Reference,
            "dm_guide" => ContentKind::DmGuide,
            "character_reference" => ContentKind::CharacterReference,
            "lore" => ContentKind::Lore,
            "introduction" => ContentKind::Introduction,
            "adventure" => ContentKind::Adventure,
            "appendix" => ContentKind::Appendix,
            other => anyhow::bail!("unknown content kind: '{}'", other),
        })
    }
}

/// Progression metadata attached to every chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressionTag {
    /// `None` marks act-agnostic content.
    pub act: Option<Act>,
    pub arc: Option<String>,
    pub location: Option<String>,
    /// Storyline branch this content belongs to, if it is branch-specific.
    pub branch: Option<String>,
    pub spoiler: bool,
    /// Forward-looking text ("if the characters...") that hints at what may come.
    pub foreshadowing: bool,
    pub kind: ContentKind,
    pub characters: Vec<String>,
}

impl ProgressionTag {
    /// Short label used as embedding context, e.g. `Act II` or `General`.
    pub fn label(&self) -> String {
        match self.act {
            Some(act) => act.to_string(),
            None => "General".to_string(),
        }
    }
}

/// Caller-supplied marker of how far the campaign has advanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub act: Act,
    pub arc: Option<String>,
    pub location: Option<String>,
    pub branch: Option<String>,
}

impl ProgressionState {
    pub fn at_act(act: Act) -> Self {
        Self {
            act,
            arc: None,
            location: None,
            branch: None,
        }
    }

    /// Content is eligible unless it belongs to a later act.
    pub fn admits(&self, tag: &ProgressionTag) -> bool {
        match tag.act {
            Some(act) => act <= self.act,
            None => true,
        }
    }
}

/// Case-insensitive comparison for free-text tag fields.
pub fn same_label(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_act_parses_common_spellings() {
        for s in ["2", "II", "ii", "Act II", "act 2", "act_2", "Act-ii", " Act 2 "] {
            assert_eq!(s.parse::<Act>().unwrap(), Act(2), "input: {:?}", s);
        }
        assert_eq!("Act XIV".parse::<Act>().unwrap(), Act(14));
    }

    #[test]
    fn test_act_rejects_garbage() {
        for s in ["", "Act", "zero", "0", "IIII", "Act Q"] {
            assert!(s.parse::<Act>().is_err(), "input: {:?}", s);
        }
    }

    #[test]
    fn test_act_display_is_roman() {
        assert_eq!(Act(1).to_string(), "Act I");
        assert_eq!(Act(4).to_string(), "Act IV");
        assert_eq!(Act(9).to_string(), "Act IX");
    }

    #[test]
    fn test_act_total_order() {
        assert!(Act(1) < Act(2));
        assert!(Act(10) > Act(9));
    }

    #[test]
    fn test_admits_past_current_and_agnostic() {
        let state = ProgressionState::at_act(Act(2));
        let tagged = |act| ProgressionTag {
            act,
            ..Default::default()
        };
        assert!(state.admits(&tagged(Some(Act(1)))));
        assert!(state.admits(&tagged(Some(Act(2)))));
        assert!(!state.admits(&tagged(Some(Act(3)))));
        assert!(state.admits(&tagged(None)));
    }

    #[test]
    fn test_content_kind_string_roundtrip() {
        for kind in [
            ContentKind::Reference,
            ContentKind::DmGuide,
            ContentKind::CharacterReference,
            ContentKind::Lore,
            ContentKind::Introduction,
            ContentKind::Adventure,
            ContentKind::Appendix,
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }
}
