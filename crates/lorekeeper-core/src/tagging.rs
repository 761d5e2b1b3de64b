//! Derive a file's [`ProgressionTag`] from its path and content.
//!
//! Three sources are consulted, later ones overriding earlier ones:
//!
//! 1. **Path tokens.** The first path component containing an `act`
//!    token followed by a numeral (`Act II - Vallaki/`, `act3.txt`,
//!    `act_2`) sets the act; `arc` tokens set the arc the same way.
//! 2. **Classification.** Filename, path, and content cues decide the
//!    [`ContentKind`] and the spoiler and foreshadowing flags.
//! 3. **Markers.** A line of the form
//!    `<!-- lore: act=2; arc=B; location=Vallaki; spoiler -->`
//!    sets fields explicitly.

use crate::progression::{parse_ordinal, Act, ContentKind, ProgressionTag};

/// Phrases that describe what *could* happen, rather than what did.
const FORESHADOW_PHRASES: &[&str] = &[
    "if the characters",
    "when the party",
    "the characters might",
    "if they choose",
    "depending on",
    "the party can",
];

const MARKER_OPEN: &str = "<!--";
const MARKER_CLOSE: &str = "-->";
const MARKER_KEY: &str = "lore:";

/// Build the tag for a corpus file.
pub fn derive_tag(rel_path: &str, content: &str) -> ProgressionTag {
    let components: Vec<&str> = rel_path.split('/').filter(|c| !c.is_empty()).collect();
    let file_name = components.last().copied().unwrap_or(rel_path);
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    let mut searchable: Vec<&str> = components[..components.len().saturating_sub(1)].to_vec();
    searchable.push(stem);

    let act = searchable
        .iter()
        .find_map(|c| numbered_token(c, "act"))
        .and_then(|n| if n > 0 { Some(Act(n)) } else { None });
    let arc = searchable.iter().find_map(|c| arc_token(c));

    let mut tag = ProgressionTag {
        act,
        arc,
        ..Default::default()
    };
    classify(&mut tag, stem, rel_path, content);
    apply_markers(&mut tag, content);
    tag
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Largest Roman numeral accepted in a path. Above it, ordinary words
/// such as "mix" or "did" would read as numbers.
const MAX_PATH_ROMAN: u32 = 50;

/// Find `<word> <numeral>` or `<word><numeral>` in a path component.
fn numbered_token(component: &str, word: &str) -> Option<u32> {
    let toks = tokens(component);
    for (i, tok) in toks.iter().enumerate() {
        if tok == word {
            if let Some(n) = toks.get(i + 1).and_then(|next| path_numeral(next)) {
                return Some(n);
            }
        } else if let Some(rest) = tok.strip_prefix(word) {
            if rest.bytes().all(|b| b.is_ascii_digit()) {
                if let Some(n) = parse_ordinal(rest) {
                    return Some(n);
                }
            }
        }
    }
    None
}

fn path_numeral(tok: &str) -> Option<u32> {
    let n = parse_ordinal(tok)?;
    if tok.bytes().all(|b| b.is_ascii_digit()) || n <= MAX_PATH_ROMAN {
        Some(n)
    } else {
        None
    }
}

/// Arcs are labelled by a number or a single letter (`Arc A`, `arc2`).
fn arc_token(component: &str) -> Option<String> {
    let toks = tokens(component);
    for (i, tok) in toks.iter().enumerate() {
        let label = if tok == "arc" {
            toks.get(i + 1).map(String::as_str)
        } else {
            tok.strip_prefix("arc")
                .filter(|rest| rest.bytes().all(|b| b.is_ascii_digit()))
        };
        match label {
            Some(l) if !l.is_empty() && (l.len() == 1 || l.bytes().all(|b| b.is_ascii_digit())) => {
                return Some(l.to_uppercase());
            }
            _ => {}
        }
    }
    None
}

fn classify(tag: &mut ProgressionTag, stem: &str, rel_path: &str, content: &str) {
    let name = stem.to_lowercase();
    let name_tokens = tokens(stem);
    let path = rel_path.to_lowercase();
    let body = content.to_lowercase();

    let mut kind = ContentKind::Reference;
    let mut dm_only = false;
    if name_tokens.iter().any(|t| t == "dm") || name.contains("guide") {
        kind = ContentKind::DmGuide;
        dm_only = true;
    }
    if name.contains("character") {
        kind = ContentKind::CharacterReference;
    }
    if name.contains("history") || name.contains("lore") {
        kind = ContentKind::Lore;
    }
    if path.contains("introduction") {
        kind = ContentKind::Introduction;
        dm_only = true;
    }
    if tag.act.is_some() {
        kind = ContentKind::Adventure;
        tag.foreshadowing = FORESHADOW_PHRASES.iter().any(|p| body.contains(p));
    }
    if path.contains("appendix") || path.contains("appendices") {
        kind = ContentKind::Appendix;
    }
    if body.contains("running the") || body.contains("as a dm") {
        dm_only = true;
        if kind == ContentKind::Reference {
            kind = ContentKind::DmGuide;
        }
    }

    tag.kind = kind;
    tag.spoiler = dm_only || body.contains("spoiler");
}

fn apply_markers(tag: &mut ProgressionTag, content: &str) {
    for line in content.lines() {
        let Some(body) = marker_body(line) else {
            continue;
        };
        for field in body.split(';') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let (key, value) = match field.split_once('=') {
                Some((k, v)) => (k.trim().to_lowercase(), Some(v.trim())),
                None => (field.to_lowercase(), None),
            };
            match (key.as_str(), value) {
                ("act", Some(v)) => match v.parse::<Act>() {
                    Ok(act) => tag.act = Some(act),
                    Err(_) if v.eq_ignore_ascii_case("none") => tag.act = None,
                    Err(_) => {}
                },
                ("arc", Some(v)) => tag.arc = non_empty(v),
                ("location", Some(v)) => tag.location = non_empty(v),
                ("branch", Some(v)) => tag.branch = non_empty(v),
                ("kind", Some(v)) => {
                    if let Ok(kind) = v.parse() {
                        tag.kind = kind;
                    }
                }
                ("characters", Some(v)) => {
                    tag.characters = v
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                ("spoiler", v) => tag.spoiler = flag(v),
                ("foreshadowing", v) => tag.foreshadowing = flag(v),
                _ => {}
            }
        }
    }
}

fn marker_body(line: &str) -> Option<&str> {
    let line = line.trim();
    let inner = line.strip_prefix(MARKER_OPEN)?.strip_suffix(MARKER_CLOSE)?;
    inner.trim().strip_prefix(MARKER_KEY)
}

fn non_empty(v: &str) -> Option<String> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn flag(v: Option<&str>) -> bool {
    !matches!(v.map(str::to_lowercase).as_deref(), Some("false" | "no" | "0"))
}

/// True for a marker line.
pub fn is_marker_line(line: &str) -> bool {
    marker_body(line).is_some()
}

/// Blank out marker lines with spaces so they are never indexed while
/// byte offsets into the original text stay valid.
pub fn mask_markers(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let body = line.strip_suffix('\n').unwrap_or(line);
        if is_marker_line(body) {
            out.extend(std::iter::repeat(' ').take(body.len()));
            out.push_str(&line[body.len()..]);
        } else {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_act_from_directory() {
        let tag = derive_tag("Act II - Vallaki/town.md", "The town is quiet.");
        assert_eq!(tag.act, Some(Act(2)));
        assert_eq!(tag.kind, ContentKind::Adventure);
    }

    #[test]
    fn test_act_from_file_stem() {
        assert_eq!(derive_tag("act3.txt", "x").act, Some(Act(3)));
        assert_eq!(derive_tag("notes/act_1.md", "x").act, Some(Act(1)));
    }

    #[test]
    fn test_act_ignores_words_containing_act() {
        let tag = derive_tag("characters/actions.md", "Strahd acts.");
        assert_eq!(tag.act, None);
        let tag = derive_tag("character_notes.md", "x");
        assert_eq!(tag.act, None);
        assert_eq!(tag.kind, ContentKind::CharacterReference);
    }

    #[test]
    fn test_act_ignores_words_that_spell_large_numerals() {
        assert_eq!(derive_tag("notes/last act mix.md", "x").act, None);
        assert_eq!(derive_tag("act di.md", "x").act, None);
        assert_eq!(derive_tag("Act XII/finale.md", "x").act, Some(Act(12)));
        assert_eq!(derive_tag("act 120.md", "x").act, Some(Act(120)));
    }

    #[test]
    fn test_arc_from_path() {
        let tag = derive_tag("Act I/Arc B/death house.md", "x");
        assert_eq!(tag.act, Some(Act(1)));
        assert_eq!(tag.arc.as_deref(), Some("B"));
        assert_eq!(derive_tag("arc2.md", "x").arc.as_deref(), Some("2"));
        assert_eq!(derive_tag("arcane lore.md", "x").arc, None);
    }

    #[test]
    fn test_classification_rules() {
        assert_eq!(derive_tag("dm_tips.md", "x").kind, ContentKind::DmGuide);
        assert_eq!(derive_tag("admin.md", "x").kind, ContentKind::Reference);
        assert_eq!(derive_tag("barovia history.md", "x").kind, ContentKind::Lore);
        assert_eq!(
            derive_tag("Introduction/hooks.md", "x").kind,
            ContentKind::Introduction
        );
        assert_eq!(
            derive_tag("Appendices/monsters.md", "x").kind,
            ContentKind::Appendix
        );
        assert_eq!(
            derive_tag("misc.md", "Running the adventure takes care.").kind,
            ContentKind::DmGuide
        );
    }

    #[test]
    fn test_foreshadowing_only_for_act_content() {
        let text = "If the characters open the crypt, the vampire wakes.";
        assert!(derive_tag("act2.md", text).foreshadowing);
        assert!(!derive_tag("bestiary.md", text).foreshadowing);
    }

    #[test]
    fn test_spoiler_flag() {
        assert!(derive_tag("secrets.md", "SPOILER: the abbot is a deva").spoiler);
        assert!(derive_tag("dm_guide.md", "x").spoiler);
        assert!(!derive_tag("Act I/village.md", "A quiet village.").spoiler);
    }

    #[test]
    fn test_markers_override_path() {
        let content = "<!-- lore: act=III; arc=c; location=Castle Ravenloft; branch=tser-pool; characters=Ireena, Ismark -->\n\
                       <!-- lore: spoiler; foreshadowing=false -->\nBody.";
        let tag = derive_tag("Act I/x.md", content);
        assert_eq!(tag.act, Some(Act(3)));
        assert_eq!(tag.arc.as_deref(), Some("c"));
        assert_eq!(tag.location.as_deref(), Some("Castle Ravenloft"));
        assert_eq!(tag.branch.as_deref(), Some("tser-pool"));
        assert_eq!(tag.characters, vec!["Ireena", "Ismark"]);
        assert!(tag.spoiler);
        assert!(!tag.foreshadowing);
    }

    #[test]
    fn test_marker_can_clear_act() {
        let tag = derive_tag("act2.md", "<!-- lore: act=none -->\nTimeless.");
        assert_eq!(tag.act, None);
    }

    #[test]
    fn test_marker_line_detection() {
        assert!(is_marker_line("  <!-- lore: act=1 -->"));
        assert!(!is_marker_line("<!-- an ordinary comment -->"));
        assert!(!is_marker_line("lore: act=1"));
    }

    #[test]
    fn test_mask_markers_preserves_length() {
        let text = "<!-- lore: act=2 -->\nThe castle looms.\n";
        let masked = mask_markers(text);
        assert_eq!(masked.len(), text.len());
        assert!(!masked.contains("lore"));
        assert!(masked.ends_with("The castle looms.\n"));
    }
}
