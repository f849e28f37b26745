use std::sync::OnceLock;

use regex::Regex;

static SOUND_TAG: OnceLock<Regex> = OnceLock::new();

/// Strips `[sound:...]` audio-reference tags from a field value. Anki manages
/// these markers itself; they must not reach the pair generator as text.
pub fn strip_sound_tags(text: &str) -> String {
    let re = SOUND_TAG.get_or_init(|| Regex::new(r"\[sound:[^\]]*\]").unwrap());
    re.replace_all(text, "").trim().to_string()
}
