use std::collections::BTreeSet;

use common::ARTIST_JOINER;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Characters dropped from every search token.
const IGNORED_CHARS: &[char] = &[
    '“', '”', '‘', '’', '\'', '"', '[', ']', '(', ')', '{', '}', ',',
];

/// Folds names into one search field: lowercase, no accents, no quotes or
/// brackets, each word once, words sorted.
pub fn sanitize_strings<I, S>(texts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut words = BTreeSet::new();
    for text in texts {
        let folded = strip_accents(&text.as_ref().to_lowercase());
        for word in folded.split_whitespace() {
            let word: String = word.chars().filter(|ch| !IGNORED_CHARS.contains(ch)).collect();
            if !word.is_empty() {
                words.insert(word);
            }
        }
    }
    words.into_iter().collect::<Vec<_>>().join(" ")
}

/// Turns `"Alice · Bob"` into `"Alice Bob"` so both names become tokens.
pub fn split_collaboration(name: &str) -> String {
    name.replace(ARTIST_JOINER, " ")
}

fn strip_accents(value: &str) -> String {
    value.nfd().filter(|ch| !is_combining_mark(*ch)).collect()
}
