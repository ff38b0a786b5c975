//! Removal of generation artifacts from decoded text.
//!
//! The model emits decorative runs of punctuation ("chain stitches"),
//! leftover boundary bars, words glued to a stray leading period and
//! replacement glyphs from failed byte decoding. [`cleanup`] repairs all of
//! them with an ordered table of substitutions.

use crate::text::stage::TextStage;
use regex::Regex;
use std::sync::LazyLock;

/// One substitution: every match of `pattern` becomes `replacement`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

/// Applied top to bottom, each rule to the previous rule's output.
///
/// Ordering constraints:
/// - `replacement-char` runs first so a removed glyph can never join two
///   symbols into a new run or leave a dot behind at a word start.
/// - `chain-stitch` runs before `leading-dot`: a run of two or more dots is
///   a stitch, only a lone dot is a glued prefix.
/// - `whitespace-run` runs after every rule that inserts or exposes spaces.
pub const CLEANUP_RULES: &[CleanupRule] = &[
    CleanupRule {
        name: "replacement-char",
        pattern: "\u{FFFD}",
        replacement: "",
    },
    CleanupRule {
        name: "chain-stitch",
        pattern: r"[|+\-=~*^#@<>{}\[\]\\/:;,.!?]{2,}",
        replacement: " ",
    },
    CleanupRule {
        name: "stray-bar",
        pattern: r"\|",
        replacement: "",
    },
    CleanupRule {
        name: "leading-dot",
        pattern: r"(\s|^)\.(\w)",
        replacement: "${1}${2}",
    },
    CleanupRule {
        name: "whitespace-run",
        pattern: r"\s{2,}",
        replacement: " ",
    },
];

static COMPILED_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    CLEANUP_RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(rule.pattern)
                .unwrap_or_else(|e| panic!("cleanup rule {} does not compile: {e}", rule.name));
            (regex, rule.replacement)
        })
        .collect()
});

/// Strip generation artifacts and surrounding whitespace.
pub fn cleanup(text: &str) -> String {
    let mut current = text.to_string();
    for (regex, replacement) in COMPILED_RULES.iter() {
        current = regex.replace_all(&current, *replacement).into_owned();
    }
    current.trim().to_string()
}

/// [`cleanup`] as a chain stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleanup;

impl TextStage for Cleanup {
    fn apply(&self, text: &str) -> String {
        cleanup(text)
    }

    fn name(&self) -> &'static str {
        "cleanup"
    }
}
