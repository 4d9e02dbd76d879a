//! Markup stripping for text received from the planning service
//!
//! Plan text is rendered by the chat UI, so nothing that looks like HTML may
//! survive: tags are removed, the bodies of script-like elements are dropped
//! entirely, and any stray angle brackets are escaped.

use regex::Regex;
use std::sync::LazyLock;

/// Elements whose content is code or markup, not text
static NON_TEXT_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?(?:</script\s*>|\z)|<style\b[^>]*>.*?(?:</style\s*>|\z)|<textarea\b[^>]*>.*?(?:</textarea\s*>|\z)|<noscript\b[^>]*>.*?(?:</noscript\s*>|\z)|<iframe\b[^>]*>.*?(?:</iframe\s*>|\z)",
    )
    .expect("non-text element pattern is valid")
});

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(?:-->|\z)").expect("comment pattern is valid"));

/// Anything shaped like an opening, closing or declaration tag
static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?[A-Za-z!?][^>]*(?:>|\z)").expect("tag pattern is valid")
});

/// Remove all markup from `input`, keeping its text
#[must_use]
pub fn sanitize_html(input: &str) -> String {
    let without_blocks = NON_TEXT_ELEMENTS.replace_all(input, "");
    let without_comments = COMMENTS.replace_all(&without_blocks, "");
    let text = TAGS.replace_all(&without_comments, "");
    text.replace('<', "&lt;").replace('>', "&gt;")
}
