//! Display helpers for request text.
//!
//! Request text only ever reaches the logs and the status board in its
//! shortened form; synthesis always receives the full text.

/// Default display length used for log lines and status updates.
pub const DISPLAY_LEN: usize = 30;

/// Number of trailing characters kept by [`ellipsize_middle`].
const TAIL_LEN: usize = 5;

const MARKER: &str = "...";

/// Shorten `text` to its first `max_len - 5` and last 5 characters joined by `...`.
///
/// Text of at most `max_len` characters is returned unchanged. Counts chars,
/// not bytes, so multi-byte text is never split inside a code point. With a
/// `max_len` below 5 the head is empty and the tail holds up to 5 chars.
pub fn ellipsize_middle(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        return text.to_string();
    }

    let head_len = max_len.saturating_sub(TAIL_LEN);
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(len.saturating_sub(TAIL_LEN)).collect();
    format!("{head}{MARKER}{tail}")
}

/// Shorthand for [`ellipsize_middle`] with [`DISPLAY_LEN`].
pub fn display_text(text: &str) -> String {
    ellipsize_middle(text, DISPLAY_LEN)
}
