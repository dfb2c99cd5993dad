//! Track comparison shared by library lookups and audio source resolution.
//!
//! Everything is compared on normalized text: NFKC folded, accents stripped,
//! lowercased, punctuation dropped. Exact comparison is tried first, then a
//! strict fuzzy fallback.

use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;
use unicode_normalization::UnicodeNormalization;

/// Markers that make a recording a different thing to listen to.
/// Both sides must agree on these before a fuzzy match is accepted.
const DISTINCT_VERSIONS: &[&str] = &[
    "live",
    "remix",
    "acoustic",
    "unplugged",
    "instrumental",
    "karaoke",
    "demo",
    "extended",
    "cover",
    "sped up",
    "slowed",
];

/// Splits an artist credit before the first collaborator.
const ARTIST_SEPARATORS: &[&str] = &[
    ",", ";", " & ", " feat. ", " feat ", " ft. ", " featuring ", " / ", " x ", " • ",
];

/// `Song feat. Someone` and friends; everything from the credit on is dropped.
const FEATURING_PATTERN: &str = r"(?i)\s(feat\.?|ft\.|featuring)(\s|$)";

static FEATURING: LazyLock<Option<Regex>> =
    LazyLock::new(|| match Regex::new(FEATURING_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(error = %e, "Invalid featuring pattern, credits stay in titles");
            None
        }
    });

/// Normalize a string for comparison.
pub fn normalize_string(s: &str) -> String {
    let composed: String = s.nfkc().collect();

    unaccent(&composed)
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                Some(c)
            } else if c == '\'' || c == '’' {
                // don't -> dont
                None
            } else {
                Some(' ')
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First credited artist of a credit string such as `"A, B & C"`.
pub fn primary_artist(artist: &str) -> &str {
    let lower = artist.to_lowercase();
    let cut = ARTIST_SEPARATORS
        .iter()
        .filter_map(|sep| lower.find(sep))
        .min()
        .unwrap_or(artist.len());
    // Lowercasing can change byte lengths for some scripts.
    let cut = if artist.is_char_boundary(cut) {
        cut
    } else {
        artist.len()
    };
    artist[..cut].trim()
}

/// Title with bracketed suffixes and featuring credits removed, plus the
/// distinct version marker if any.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleParts {
    pub base: String,
    pub version: Option<&'static str>,
}

pub fn split_title(title: &str) -> TitleParts {
    let mut base = String::new();
    let mut bracketed = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in title.chars() {
        match c {
            '(' | '[' | '【' => {
                depth += 1;
                if depth == 1 {
                    current.clear();
                    continue;
                }
                current.push(c);
            }
            ')' | ']' | '】' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    bracketed.push(current.clone());
                    continue;
                }
                current.push(c);
            }
            _ if depth > 0 => current.push(c),
            _ => base.push(c),
        }
    }

    // " - Live at Wembley" style suffixes
    if let Some((head, tail)) = base.clone().split_once(" - ") {
        bracketed.push(tail.to_string());
        base = head.to_string();
    }

    let credit = FEATURING
        .as_ref()
        .and_then(|re| re.find(&base))
        .map(|m| m.start());
    if let Some(start) = credit {
        base.truncate(start);
    }

    let version = bracketed.iter().find_map(|content| {
        let normalized = normalize_string(content);
        DISTINCT_VERSIONS
            .iter()
            .find(|marker| contains_word(&normalized, marker))
            .copied()
    });

    TitleParts {
        base: normalize_string(&base),
        version,
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack == needle
        || haystack.starts_with(&format!("{needle} "))
        || haystack.ends_with(&format!(" {needle}"))
        || haystack.contains(&format!(" {needle} "))
}

/// Tunables for [`compare_tracks`].
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Minimum Jaro-Winkler similarity for both title and artist in the fuzzy pass.
    pub fuzzy_threshold: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.92,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchQuality {
    Exact,
    Fuzzy(f64),
}

impl MatchQuality {
    pub fn score(self) -> f64 {
        match self {
            MatchQuality::Exact => 1.0,
            MatchQuality::Fuzzy(score) => score,
        }
    }

    /// Exact always wins; fuzzy matches compare by score.
    pub fn beats(self, other: MatchQuality) -> bool {
        match (self, other) {
            (MatchQuality::Exact, MatchQuality::Exact) => false,
            (MatchQuality::Exact, MatchQuality::Fuzzy(_)) => true,
            (MatchQuality::Fuzzy(_), MatchQuality::Exact) => false,
            (MatchQuality::Fuzzy(a), MatchQuality::Fuzzy(b)) => a > b,
        }
    }
}

/// Compare a wanted (title, artist) against a found one.
pub fn compare_tracks(
    wanted_title: &str,
    wanted_artist: &str,
    found_title: &str,
    found_artist: &str,
    policy: MatchPolicy,
) -> Option<MatchQuality> {
    let wanted_norm_title = normalize_string(wanted_title);
    let found_norm_title = normalize_string(found_title);
    let wanted_primary = normalize_string(primary_artist(wanted_artist));
    let found_primary = normalize_string(primary_artist(found_artist));

    if wanted_norm_title.is_empty() || wanted_primary.is_empty() {
        return None;
    }

    if wanted_norm_title == found_norm_title
        && (normalize_string(wanted_artist) == normalize_string(found_artist)
            || wanted_primary == found_primary)
    {
        return Some(MatchQuality::Exact);
    }

    let wanted_parts = split_title(wanted_title);
    let found_parts = split_title(found_title);
    if wanted_parts.version != found_parts.version || wanted_parts.base.is_empty() {
        return None;
    }

    let title_similarity = jaro_winkler::jaro_winkler(&wanted_parts.base, &found_parts.base);
    let artist_similarity = jaro_winkler::jaro_winkler(&wanted_primary, &found_primary);

    tracing::trace!(
        wanted = %format!("{wanted_artist} - {wanted_title}"),
        found = %format!("{found_artist} - {found_title}"),
        title_similarity,
        artist_similarity,
        "Fuzzy comparison"
    );

    if title_similarity >= policy.fuzzy_threshold && artist_similarity >= policy.fuzzy_threshold {
        Some(MatchQuality::Fuzzy((title_similarity + artist_similarity) / 2.0))
    } else {
        None
    }
}

/// Containment score used when picking an audio source result.
///
/// Both the title and the artist have to be contained in (or contain) the
/// result's; exact equality scores 2 per field, containment 1. Returns `None`
/// when either field doesn't match at all.
pub fn containment_score(
    wanted_title: &str,
    wanted_artist: &str,
    found_title: &str,
    found_artist: &str,
) -> Option<u8> {
    let wanted_title = normalize_string(wanted_title);
    let wanted_artist = normalize_string(wanted_artist);
    let found_title = normalize_string(found_title);
    let found_artist = normalize_string(found_artist);

    if wanted_title.is_empty() || wanted_artist.is_empty() {
        return None;
    }

    let field_score = |wanted: &str, found: &str| -> Option<u8> {
        if wanted == found {
            Some(2)
        } else if !found.is_empty() && (found.contains(wanted) || wanted.contains(found)) {
            Some(1)
        } else {
            None
        }
    };

    // Video titles often carry the artist ("Queen - Bohemian Rhapsody").
    let artist_score = field_score(&wanted_artist, &found_artist)
        .or_else(|| found_title.contains(&wanted_artist).then_some(1))?;
    let title_score = field_score(&wanted_title, &found_title)?;

    Some(artist_score + title_score)
}
