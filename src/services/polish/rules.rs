//! Deterministic Polish Rules
//!
//! Each rule rewrites the whole text and reports how many fixes it made.
//! Rules never fail. No rule adds a `[` or an insufficient-evidence
//! sentinel; every change removes a `[`, removes a sentinel, or shortens the
//! text without adding either. Running the rules to a fixed point therefore
//! terminates.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use report_narrator_core::{dangling_fragments, marker_regex, remove_fence_lines, MARKER_PREFIX};

/// Neutral text substituted for the insufficient-evidence sentinel
pub const NEUTRAL_EVIDENCE_TEXT: &str = "Insufficient evidence was available for this item.";

/// Default sentences keyed by a substring of the field name, first match wins
const DEFAULT_SENTENCES: &[(&str, &str)] = &[
    ("risk", "Risk exposure for this area is pending further review."),
    ("summary", "A summary for this section will be provided after review."),
    ("finding", "Findings for this area are pending validation."),
    ("recommend", "Recommendations will be finalized following review."),
    ("fix", "A remediation approach is under evaluation."),
    ("solution", "A remediation approach is under evaluation."),
    ("title", "Business Assessment Report"),
    ("impact", "The expected impact is being quantified."),
    ("action", "Next actions will be confirmed with the team."),
    ("metric", "Supporting metrics are being collected."),
];

const GENERIC_SENTENCE: &str = "Details for this section are pending review.";

/// Deterministic stand-in text for an unresolved field.
pub fn default_sentence(field_name: &str) -> &'static str {
    let lowered = field_name.to_lowercase();
    DEFAULT_SENTENCES
        .iter()
        .find(|(key, _)| lowered.contains(key))
        .map(|(_, sentence)| *sentence)
        .unwrap_or(GENERIC_SENTENCE)
}

/// One named cleanup step
pub struct PolishRule {
    /// Change-log type
    pub kind: &'static str,
    pub reason: &'static str,
    pub apply: fn(&str) -> (String, usize),
}

/// Rules in application order
pub const RULES: &[PolishRule] = &[
    PolishRule {
        kind: "strip_code_fences",
        reason: "Removed residual code-fence artifacts",
        apply: strip_fences,
    },
    PolishRule {
        kind: "replace_sentinel",
        reason: "Replaced insufficient-evidence sentinels with neutral text",
        apply: replace_sentinel,
    },
    PolishRule {
        kind: "fix_placeholders",
        reason: "Replaced unresolved markers with default sentences",
        apply: fix_placeholders,
    },
    PolishRule {
        kind: "fix_dangling_markers",
        reason: "Replaced truncated markers with default sentences",
        apply: fix_dangling_markers,
    },
    PolishRule {
        kind: "replace_template_tokens",
        reason: "Replaced template bracket tokens with generic phrases",
        apply: replace_template_tokens,
    },
    PolishRule {
        kind: "normalize_punctuation",
        reason: "Normalized sentence punctuation",
        apply: normalize_punctuation,
    },
    PolishRule {
        kind: "collapse_whitespace",
        reason: "Collapsed excess whitespace",
        apply: collapse_whitespace,
    },
];

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn inline_fence_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&PATTERN, r"```[A-Za-z0-9_-]*")
}

fn sentinel_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&PATTERN, r"\[?INSUFFICIENT_EVIDENCE\]?")
}

fn template_token_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(
        &PATTERN,
        r"(?i)\[(specific [^\[\]]*|insert [^\[\]]*|company name|client name|client|date|x|n|number|percentage|amount)\]",
    )
}

fn dots_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&PATTERN, r"\.{2,}")
}

fn space_before_punct_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&PATTERN, r"([A-Za-z0-9)])[ \t]+([,;!?]|\.(?:\s|$))")
}

fn repeated_mark_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&PATTERN, r"([!?])[!?]+")
}

/// Replace every match of `pattern`, counting the replacements that changed text.
fn replace_counted(
    text: &str,
    pattern: Option<&Regex>,
    mut replacement: impl FnMut(&Captures) -> String,
) -> (String, usize) {
    let Some(pattern) = pattern else {
        return (text.to_string(), 0);
    };
    let mut count = 0;
    let replaced = pattern.replace_all(text, |caps: &Captures| {
        let new = replacement(caps);
        if new != caps[0] {
            count += 1;
        }
        new
    });
    (replaced.into_owned(), count)
}

/// Reapply `step` until it stops changing the text.
///
/// Used by rules whose every replacement removes a `[`, so nested tokens
/// resolve in one application.
fn settle(text: &str, step: fn(&str) -> (String, usize)) -> (String, usize) {
    let mut current = text.to_string();
    let mut total = 0;
    loop {
        let (next, count) = step(&current);
        if count == 0 || next == current {
            return (current, total);
        }
        total += count;
        current = next;
    }
}

fn strip_fences(text: &str) -> (String, usize) {
    let (without_lines, lines) = remove_fence_lines(text);
    let (cleaned, inline) = replace_counted(&without_lines, inline_fence_regex(), |_| String::new());
    (cleaned, lines + inline)
}

fn replace_sentinel(text: &str) -> (String, usize) {
    replace_counted(text, sentinel_regex(), |_| NEUTRAL_EVIDENCE_TEXT.to_string())
}

fn fix_placeholders(text: &str) -> (String, usize) {
    settle(text, fix_placeholders_once)
}

fn fix_placeholders_once(text: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut last = 0;
    for caps in marker_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let field = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        out.push_str(&text[last..whole.start()]);
        out.push_str(&sentence_before(default_sentence(field), &text[whole.end()..]));
        last = whole.end();
        count += 1;
    }
    if count == 0 {
        return (text.to_string(), 0);
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Drop the sentence's own period when the text already ends the sentence.
fn sentence_before(sentence: &str, following: &str) -> String {
    let ends_sentence = following.starts_with(['.', '!', '?']);
    match sentence.strip_suffix('.') {
        Some(trimmed) if ends_sentence => trimmed.to_string(),
        _ => sentence.to_string(),
    }
}

fn fix_dangling_markers(text: &str) -> (String, usize) {
    let fragments = dangling_fragments(text);
    if fragments.is_empty() {
        return (text.to_string(), 0);
    }
    let mut cleaned = text.to_string();
    for fragment in &fragments {
        let field = fragment[MARKER_PREFIX.len()..].trim();
        cleaned = cleaned.replacen(fragment.as_str(), default_sentence(field), 1);
    }
    (cleaned, fragments.len())
}

fn replace_template_tokens(text: &str) -> (String, usize) {
    settle(text, replace_template_tokens_once)
}

fn replace_template_tokens_once(text: &str) -> (String, usize) {
    replace_counted(text, template_token_regex(), |caps| {
        let token = caps[1].to_lowercase();
        if token == "x" && is_task_checkbox(text, caps) {
            return caps[0].to_string();
        }
        let phrase = if token.starts_with("specific ") || token.starts_with("insert ") {
            "the relevant detail"
        } else {
            match token.as_str() {
                "company name" | "client name" | "client" => "the client",
                "date" => "the reporting period",
                _ => "a measurable amount",
            }
        };
        phrase.to_string()
    })
}

/// `[x]` opening a markdown list item, as in `- [x] Done`
fn is_task_checkbox(text: &str, caps: &Captures) -> bool {
    let Some(whole) = caps.get(0) else {
        return false;
    };
    if !text[whole.end()..].starts_with(' ') {
        return false;
    }
    let line_start = text[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..whole.start()];
    if !prefix.ends_with(' ') {
        return false;
    }
    let bullet = prefix.trim();
    matches!(bullet, "-" | "*" | "+")
        || bullet
            .strip_suffix(['.', ')'])
            .is_some_and(|number| !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
}

fn normalize_punctuation(text: &str) -> (String, usize) {
    // A run of exactly three dots is an ellipsis and stays, as does `../`
    let (text, dots) = replace_counted(text, dots_regex(), |caps| {
        let relative_path = caps
            .get(0)
            .is_some_and(|m| caps[0].len() == 2 && text[m.end()..].starts_with('/'));
        if caps[0].len() == 3 || relative_path {
            caps[0].to_string()
        } else {
            ".".to_string()
        }
    });
    let (text, repeated) = replace_counted(&text, repeated_mark_regex(), |caps| caps[1].to_string());
    let (text, spaced) = replace_counted(&text, space_before_punct_regex(), |caps| {
        format!("{}{}", &caps[1], &caps[2])
    });
    (text, dots + repeated + spaced)
}

fn collapse_whitespace(text: &str) -> (String, usize) {
    let mut count = 0;
    let mut lines = Vec::new();
    for line in text.split('\n') {
        let body_start = line.len() - line.trim_start_matches([' ', '\t']).len();
        let (indent, body) = line.split_at(body_start);
        let mut collapsed = String::with_capacity(line.len());
        collapsed.push_str(indent);
        let mut previous_space = false;
        for c in body.trim_end().chars() {
            if c == ' ' || c == '\t' {
                if !previous_space {
                    collapsed.push(' ');
                }
                previous_space = true;
            } else {
                collapsed.push(c);
                previous_space = false;
            }
        }
        if body.trim().is_empty() {
            collapsed.clear();
        }
        if collapsed != line {
            count += 1;
        }
        lines.push(collapsed);
    }

    // At most one blank line between blocks
    let mut result: Vec<String> = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for line in lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                count += 1;
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push(line);
    }
    (result.join("\n"), count)
}
