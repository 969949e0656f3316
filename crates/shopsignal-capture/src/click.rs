use regex::Regex;
use std::sync::LazyLock;

const HINT_LINES: usize = 3;
const HINT_MAX_CHARS: usize = 200;
const MIN_HINT_CHARS: usize = 5;

static RE_CAROUSEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)carousel|Explore|cards|slider|horizontal").unwrap());

/// The element a click resolved to. Element lookup stays with the caller.
#[derive(Debug, Clone, Default)]
pub struct ClickTarget {
    /// Closest ancestor matched an interactive role (link, button, card item).
    pub interactive: bool,
    /// Outer markup of that element.
    pub markup: String,
    /// Element carries an explicit carousel-item marker.
    pub carousel_item: bool,
    /// Rendered text of that element.
    pub text: String,
}

impl ClickTarget {
    /// First three lines of the text, space-joined, bounded to 200 characters.
    pub fn hint(&self) -> String {
        let joined = self
            .text
            .trim()
            .split('\n')
            .take(HINT_LINES)
            .collect::<Vec<_>>()
            .join(" ");
        joined.chars().take(HINT_MAX_CHARS).collect()
    }

    pub fn looks_like_carousel(&self) -> bool {
        self.carousel_item || RE_CAROUSEL.is_match(&self.markup)
    }

    pub fn qualifies(&self) -> bool {
        self.interactive
            && (self.looks_like_carousel() || self.hint().chars().count() >= MIN_HINT_CHARS)
    }
}
