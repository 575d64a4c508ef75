//! Vendor prefixing.
//!
//! For every declaration whose property is listed in `[autoprefixer]`, a
//! prefixed copy is inserted right before it, unless the block already
//! declares that prefixed property:
//!
//! ```css
//! .a { transform: rotate(45deg); }
//! /* becomes */
//! .a { -webkit-transform: rotate(45deg); -ms-transform: rotate(45deg); transform: rotate(45deg); }
//! ```
//!
//! Only values are copied; prefixed values (`display: -webkit-box`) are not
//! generated. Running the transformation twice changes nothing.

use crate::config::AutoprefixerConfig;
use std::collections::{BTreeMap, HashSet};

/// Property name → vendor prefixes to add, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PrefixRules {
    by_property: BTreeMap<String, Vec<&'static str>>,
}

impl PrefixRules {
    pub fn from_config(config: &AutoprefixerConfig) -> Self {
        let mut by_property: BTreeMap<String, Vec<&'static str>> = BTreeMap::new();
        for (prefix, properties) in [
            ("-webkit-", &config.webkit),
            ("-moz-", &config.moz),
            ("-ms-", &config.ms),
        ] {
            for property in properties {
                by_property
                    .entry(property.to_ascii_lowercase())
                    .or_default()
                    .push(prefix);
            }
        }
        Self { by_property }
    }

    fn prefixes(&self, property: &str) -> &[&'static str] {
        self.by_property
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub fn prefix_css(css: &str, rules: &PrefixRules) -> String {
    let mut out = String::with_capacity(css.len());
    let mut cursor = 0;
    let mut open: Option<usize> = None;
    for (i, c) in css.char_indices() {
        match c {
            '{' => open = Some(i),
            '}' => {
                if let Some(start) = open.take() {
                    out.push_str(&css[cursor..=start]);
                    out.push_str(&prefix_block(&css[start + 1..i], rules));
                    cursor = i;
                }
            }
            _ => {}
        }
    }
    out.push_str(&css[cursor..]);
    out
}

fn property_of(declaration: &str) -> Option<String> {
    let (name, _) = declaration.trim_start().split_once(':')?;
    let name = name.trim();
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then(|| name.to_ascii_lowercase())
}

fn prefix_block(body: &str, rules: &PrefixRules) -> String {
    let pieces: Vec<&str> = body.split_inclusive(';').collect();
    let declared: HashSet<String> = pieces.iter().filter_map(|p| property_of(p)).collect();

    let mut out = String::with_capacity(body.len());
    for piece in pieces {
        if let Some(property) = property_of(piece) {
            let trimmed = piece.trim_start();
            let indent = &piece[..piece.len() - trimmed.len()];
            let after_name = trimmed
                .split_once(':')
                .map(|(_, rest)| rest)
                .unwrap_or_default();
            for prefix in rules.prefixes(&property) {
                let prefixed = format!("{prefix}{property}");
                if declared.contains(&prefixed) {
                    continue;
                }
                out.push_str(indent);
                out.push_str(&prefixed);
                out.push(':');
                if after_name.ends_with(';') {
                    out.push_str(after_name);
                } else {
                    out.push_str(after_name.trim_end());
                    out.push(';');
                }
            }
        }
        out.push_str(piece);
    }
    out
}
