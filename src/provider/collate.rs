//! Human-friendly ordering of directory entry names.
//!
//! Approximates root-locale collation: whitespace, then punctuation and
//! symbols, then digits, then letters. Names are compared in canonical
//! decomposition at three levels. Base characters compare case-insensitively
//! first, so `é` sits beside `e` rather than after `z`. Ties fall to accents
//! (unaccented first), then case (lowercase first), then code point order so
//! the result is total.

use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn class(c: char) -> u8 {
    if c.is_whitespace() {
        0
    } else if c.is_numeric() {
        2
    } else if c.is_alphabetic() {
        3
    } else {
        1
    }
}

/// Collation levels of one name, one slot per base character.
#[derive(Debug, Default)]
struct SortKey {
    primary: Vec<(u8, char)>,
    accents: Vec<Vec<char>>,
    upper: Vec<bool>,
}

impl SortKey {
    fn new(name: &str) -> Self {
        let mut key = Self::default();

        for c in name.nfd() {
            if is_combining_mark(c) {
                // A leading mark has no base to attach to.
                if let Some(marks) = key.accents.last_mut() {
                    marks.push(c);
                }
                continue;
            }

            key.primary
                .push((class(c), c.to_lowercase().next().unwrap_or(c)));
            key.accents.push(Vec::new());
            key.upper.push(c.is_uppercase());
        }

        key
    }
}

/// Compare two names for display ordering.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let (ka, kb) = (SortKey::new(a), SortKey::new(b));

    ka.primary
        .cmp(&kb.primary)
        .then_with(|| ka.accents.cmp(&kb.accents))
        .then_with(|| ka.upper.cmp(&kb.upper))
        .then_with(|| a.cmp(b))
}
