//! Instruction text sent to the model. The exact wording is tuned in the
//! field; the service only relies on the structured output shape.

pub const EXTRACT_TEXT: &str = "You are given study text. Extract the vocabulary worth \
learning and produce Anki card pairs. Front: one example sentence using the target \
word or phrase, followed by a short definition. Back: 1-3 short synonyms or \
near-phrases, comma-separated. Return JSON matching the provided schema.";

pub const EXTRACT_IMAGE: &str = "You are given a photo or screenshot containing text \
(book page, subtitles, notes). Extract the vocabulary worth learning and produce Anki \
card pairs. Front: one example sentence using the target word or phrase, followed by a \
short definition. Back: 1-3 short synonyms or near-phrases, comma-separated. Return \
JSON matching the provided schema.";

pub const CHANGE_PAIRS: &str = "You are given existing Anki card pairs that a learner \
flagged as unsatisfying. For each input pair, return a list of improved replacement \
pairs: an empty list if no improvement is warranted, one pair for a direct rewrite, or \
several pairs when the card conflates multiple meanings and should be split. The outer \
list must have exactly one entry per input pair, in input order. Return JSON matching \
the provided schema.";
