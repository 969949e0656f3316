use regex::Regex;
use std::sync::LazyLock;

/// Conversation id used when the page URL carries none.
pub const NO_CONVERSATION_ID: &str = "no-id";

static RE_CONVERSATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:c|conversation)/([a-zA-Z0-9-]+)").unwrap());

/// Extract the conversation id from a page path (`/c/<id>` or `/conversation/<id>`).
pub fn conversation_id_from_path(path: &str) -> Option<String> {
    RE_CONVERSATION
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
