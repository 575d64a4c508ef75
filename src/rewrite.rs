//! Reference rewriting.
//!
//! Replaces occurrences of original asset paths with their fingerprinted
//! names. A match only counts when it sits on a path boundary: the character
//! before it and the character after it must not be part of a file name.
//! That keeps `img/logo.png` from matching inside `img/logo.png.bak` or
//! `myimg/logo.png`, while still matching `../img/logo.png`,
//! `url("/img/logo.png")` and `src=img/logo.png`.
//!
//! Keys are applied longest first so that a longer path is never broken up
//! by a shorter key it contains. Rewriting twice gives the same result as
//! rewriting once.

use crate::fingerprint::RevManifest;

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Rewrite every boundary-delimited occurrence of each manifest key.
pub fn rewrite_references(text: &str, manifest: &RevManifest) -> String {
    let mut entries: Vec<(&String, &String)> = manifest.iter().collect();
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut current = text.to_string();
    for (from, to) in entries {
        if from.is_empty() || from == to || !current.contains(from.as_str()) {
            continue;
        }
        current = replace_on_boundaries(&current, from, to);
    }
    current
}

fn replace_on_boundaries(text: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(from) {
        let end = start + from.len();
        let before_ok = text[..start].chars().next_back().is_none_or(|c| !is_name_char(c));
        let after_ok = text[end..].chars().next().is_none_or(|c| !is_name_char(c));
        if before_ok && after_ok {
            out.push_str(&text[last..start]);
            out.push_str(to);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}
