//! Anchor ids for rendered headings.
//!
//! Generic slugification comes from the `slug` crate. [`HeadingSlugger`] layers
//! per-document de-duplication and a fixed compatibility prefix on top, in
//! that order, so ids stay unique once the prefix is applied.

use std::collections::HashSet;

use slug::slugify;

/// Prefix carried by every generated heading id (`markdown-header-intro`).
pub const DEFAULT_SLUG_PREFIX: &str = "markdown-header-";
pub const DEFAULT_SEPARATOR: &str = "-";

/// Derive a URL-safe slug from heading text. May return an empty string when
/// the text has no representable characters.
pub fn derive_slug(input: &str, separator: &str) -> String {
    let candidate = slugify(input);
    if separator == DEFAULT_SEPARATOR {
        candidate
    } else {
        candidate.replace(DEFAULT_SEPARATOR, separator)
    }
}

/// Deterministically generate unique heading ids within a single document.
///
/// Duplicates receive `_1`, `_2`, ... suffixes on the bare slug; the prefix
/// is prepended afterwards (`markdown-header-a`, `markdown-header-a_1`).
/// Create one slugger per document.
#[derive(Debug, Clone)]
pub struct HeadingSlugger {
    prefix: String,
    separator: String,
    used: HashSet<String>,
}

impl Default for HeadingSlugger {
    fn default() -> Self {
        Self::new(DEFAULT_SLUG_PREFIX, DEFAULT_SEPARATOR)
    }
}

impl HeadingSlugger {
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            used: HashSet::new(),
        }
    }

    /// Produce the id for the next heading with the given text.
    pub fn anchor_for(&mut self, heading: &str) -> String {
        let base = derive_slug(heading, &self.separator);
        let unique = self.claim(base);
        format!("{}{unique}", self.prefix)
    }

    /// Record an id assigned explicitly by the author so that later
    /// generated ids do not collide with it.
    pub fn reserve(&mut self, explicit_id: &str) {
        if let Some(bare) = explicit_id.strip_prefix(self.prefix.as_str()) {
            self.used.insert(bare.to_string());
        }
    }

    fn claim(&mut self, base: String) -> String {
        let mut candidate = base;
        // A bare prefix is a valid id; an empty id is not.
        while (candidate.is_empty() && self.prefix.is_empty()) || self.used.contains(&candidate) {
            candidate = next_candidate(&candidate);
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

fn next_candidate(id: &str) -> String {
    if let Some((stem, counter)) = id.rsplit_once('_')
        && !counter.is_empty()
        && counter.bytes().all(|byte| byte.is_ascii_digit())
        && let Ok(value) = counter.parse::<u64>()
    {
        return format!("{stem}_{}", value.saturating_add(1));
    }
    format!("{id}_1")
}
