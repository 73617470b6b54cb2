use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

/// Episode number inferred from a filename. `Unranked` sorts after every number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum EpisodeNumber {
    Number(u64),
    Unranked,
}

impl fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Unranked => f.write_str("unranked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Resolution {
    P360,
    P480,
    P720,
    P1080,
    K4,
    Unknown,
}

impl Resolution {
    pub(crate) const KNOWN: [Resolution; 5] = [
        Resolution::P360,
        Resolution::P480,
        Resolution::P720,
        Resolution::P1080,
        Resolution::K4,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::K4 => "4k",
            Self::Unknown => "unknown",
        }
    }

    /// Position in [`Resolution::KNOWN`], `None` for `Unknown`.
    pub(crate) fn known_index(self) -> Option<usize> {
        Self::KNOWN.iter().position(|known| *known == self)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::KNOWN
            .into_iter()
            .chain([Self::Unknown])
            .find(|res| res.as_str() == normalized)
            .ok_or_else(|| format!("unrecognized resolution '{raw}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FilenameFeatures {
    pub(crate) episode: EpisodeNumber,
    pub(crate) resolution: Resolution,
}

impl FilenameFeatures {
    pub(crate) fn from_filename(filename: &str) -> Self {
        Self {
            episode: extract_episode(filename),
            resolution: extract_resolution(filename),
        }
    }
}

// Evaluated top to bottom; the first rule that matches anywhere wins, even when a
// later rule would find something that looks more plausible.
const EPISODE_RULES: [(&str, &str); 8] = [
    ("marker-dash", r"(?i)\b(?:EP|E)-?([0-9]{1,3})\b"),
    ("marker", r"(?i)\b(?:EP|E)([0-9]{1,3})\b"),
    ("season-episode", r"(?i)S([0-9]+)(?:EP|E)([0-9]+)"),
    ("season-dash-episode", r"(?i)S([0-9]+)\s*-?\s*(?:EP|E)([0-9]+)"),
    (
        "bracketed-marker",
        r"(?i)[(\[<{]?\s*(?:EP|E)\s*([0-9]+)\s*[)\]>}]?",
    ),
    ("loose", r"(?i)(?:\b(?:EP|E)-?|\b)([0-9]{1,3})\b"),
    ("season-gap", r"(?i)S([0-9]+)[^0-9]*([0-9]+)"),
    ("first-digits", r"([0-9]+)"),
];

struct EpisodeRule {
    name: &'static str,
    pattern: Regex,
}

static EPISODE_PATTERNS: LazyLock<Vec<EpisodeRule>> = LazyLock::new(|| {
    EPISODE_RULES
        .iter()
        .map(|&(name, pattern)| EpisodeRule {
            name,
            pattern: Regex::new(pattern).expect("episode rule patterns are valid"),
        })
        .collect()
});

static RESOLUTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]{3,4}p|4k)").expect("resolution pattern is valid")
});

pub(crate) fn extract_episode(filename: &str) -> EpisodeNumber {
    match matching_episode_rule(filename) {
        Some((_, episode)) => episode,
        None => EpisodeNumber::Unranked,
    }
}

/// Name of the rule that decided the episode, alongside the episode itself.
pub(crate) fn matching_episode_rule(filename: &str) -> Option<(&'static str, EpisodeNumber)> {
    EPISODE_PATTERNS.iter().find_map(|rule| {
        let captures = rule.pattern.captures(filename)?;
        let digits = captures.get(captures.len() - 1)?.as_str();
        Some((rule.name, EpisodeNumber::Number(parse_episode_digits(digits))))
    })
}

// Digit runs longer than u64 saturate instead of failing; they still sort before Unranked.
fn parse_episode_digits(digits: &str) -> u64 {
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

/// Only the first resolution-looking token counts; tags outside the known set
/// (e.g. `2160p`) are treated as `Unknown`.
pub(crate) fn extract_resolution(filename: &str) -> Resolution {
    RESOLUTION_PATTERN
        .find(filename)
        .and_then(|found| found.as_str().parse::<Resolution>().ok())
        .unwrap_or(Resolution::Unknown)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_updated_at_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}
