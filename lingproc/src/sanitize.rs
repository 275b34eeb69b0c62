//! Text cleanup applied before speech synthesis.
//!
//! Language models like to narrate actions ("*smiles*", "(giggles)") and sprinkle
//! emoji through their replies. None of that should reach the TTS engine, so
//! [`sanitize`] strips it and [`is_speakable`] decides whether anything worth
//! saying is left.

use once_cell::sync::Lazy;
use regex::Regex;

/// Cleaned text shorter than this is discarded instead of synthesized.
pub const MIN_SPEAKABLE_LEN: usize = 2;

static STAGE_DIRECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*?\)|\[.*?\]").expect("stage direction pattern"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*.*?\*").expect("emphasis pattern"));
static UNSPEAKABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s.,!?']").expect("speakable alphabet pattern"));

/// Remove stage directions, emphasised actions and unspeakable characters.
///
/// Whitespace runs left behind are collapsed to single spaces and the result
/// is trimmed. Applying `sanitize` twice yields the same text as applying it
/// once.
///
/// ```
/// use lingproc::sanitize;
///
/// assert_eq!(sanitize("Hi there! (giggles) *waves* 😊"), "Hi there!");
/// ```
pub fn sanitize(text: &str) -> String {
    let text = STAGE_DIRECTION.replace_all(text, "");
    let text = EMPHASIS.replace_all(&text, "");
    let text = UNSPEAKABLE.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether sanitized `text` is long enough to be worth synthesizing.
pub fn is_speakable(text: &str) -> bool {
    text.chars().count() >= MIN_SPEAKABLE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_parenthetical_actions() {
        assert_eq!(sanitize("(Eyes sparkling) Of course!"), "Of course!");
        assert_eq!(sanitize("Sure [pauses] thing."), "Sure thing.");
    }

    #[test]
    fn strips_emphasis_and_emoji() {
        assert_eq!(sanitize("*smiles* Hello 👋 friend"), "Hello friend");
    }

    #[test]
    fn keeps_apostrophes_and_commas() {
        assert_eq!(sanitize("I'm fine, thanks."), "I'm fine, thanks.");
    }

    #[test]
    fn stage_direction_alone_is_not_speakable() {
        let cleaned = sanitize("(laughs)");
        assert!(cleaned.chars().count() < MIN_SPEAKABLE_LEN);
        assert!(!is_speakable(&cleaned));
    }

    #[test]
    fn parentheses_do_not_span_lines() {
        assert_eq!(sanitize("Well (hmm\nokay) then"), "Well hmm okay then");
    }
}
