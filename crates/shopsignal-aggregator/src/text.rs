//! Assistant message cleanup and normalization.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Cleaned messages at or below this length are dropped.
const MIN_MESSAGE_LEN: usize = 20;

static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(Get\s*Plus|Introducing\s+GPT|ChatGPT\s+now\s+has|Temporary\s+Chat)",
        r"(?i)(ChatGPT can make mistakes|Cookie Preferences)",
        r"(?i)(window\.__oai|__SSR_|requestAnimationFrame)",
        r"(?i)^Share$",
        r"(?i)^You said:",
        r"(?i)^Searching the web$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_MONEY_OR_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[₹$0-9]").unwrap());
static RE_STARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{2605}\x{2729}\x{2730}\x{2736}\x{2737}]").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Length in UTF-16 code units, the unit the page measures text in.
pub fn js_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// UI chrome, boilerplate and empty lines.
pub fn is_noise_line(line: &str) -> bool {
    let l = line.trim();
    l.is_empty() || NOISE_PATTERNS.iter().any(|rx| rx.is_match(l))
}

/// Drop noise, one-character filler and case-insensitive repeats from one
/// message, keeping line order.
pub fn clean_message(raw: &str) -> String {
    let mut seen = HashSet::new();
    let mut out: Vec<&str> = Vec::new();

    for line in raw.split('\n').map(str::trim) {
        if is_noise_line(line) {
            continue;
        }
        if js_len(line) < 2 && !RE_MONEY_OR_DIGIT.is_match(line) {
            continue;
        }
        if seen.insert(line.to_lowercase()) {
            out.push(line);
        }
    }
    out.join("\n")
}

/// Cleaned text of every assistant message long enough to keep.
pub fn collect_assistant_texts<S: AsRef<str>>(messages: &[S]) -> Vec<String> {
    messages
        .iter()
        .map(|m| clean_message(m.as_ref()))
        .filter(|cleaned| js_len(cleaned) > MIN_MESSAGE_LEN)
        .collect()
}

/// Fold star glyphs to `*`, collapse whitespace runs, trim.
pub fn normalize_text(s: &str) -> String {
    let starred = RE_STARS.replace_all(s, "*");
    RE_WHITESPACE.replace_all(&starred, " ").trim().to_string()
}
