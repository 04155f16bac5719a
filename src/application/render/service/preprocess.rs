//! Line-oriented source rewrites applied before the markdown parser runs.
//!
//! Each stage receives the full markdown text and returns the rewritten text
//! together with whatever it extracted. Fenced code regions are left alone.

use std::collections::BTreeMap;

use crate::util::html::escape_html;

/// Document metadata: lower-cased key to one value per header line.
pub type Metadata = BTreeMap<String, Vec<String>>;

const FRONT_MATTER_DELIMITER: &str = "---";
const ADMONITION_MARKER: &str = "!!!";
const INDENT: &str = "    ";

/// Tracks whether line-by-line processing is inside a fenced code block.
///
/// Fences open with three or more backticks or tildes; the closing fence must
/// use the same character and be at least as long.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    fence_char: Option<char>,
    fence_len: usize,
}

impl FenceTracker {
    pub(crate) fn in_fence(&self) -> bool {
        self.fence_char.is_some()
    }

    /// Feed one line. Returns `true` when the line opens or closes a fence.
    pub(crate) fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();

        match self.fence_char {
            Some(expected) => {
                let closes = fence_run(trimmed).is_some_and(|(ch, len, rest)| {
                    ch == expected && len >= self.fence_len && rest.trim().is_empty()
                });
                if closes {
                    self.fence_char = None;
                    self.fence_len = 0;
                }
                closes
            }
            None => match fence_run(trimmed) {
                Some((ch, len, _)) => {
                    self.fence_char = Some(ch);
                    self.fence_len = len;
                    true
                }
                None => false,
            },
        }
    }
}

fn fence_run(trimmed: &str) -> Option<(char, usize, &str)> {
    let first = trimmed.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&ch| ch == first).count();
    (len >= 3).then(|| (first, len, &trimmed[len..]))
}

/// Remove the leading `Key: value` header block and collect it as metadata.
///
/// The block ends at the first blank line (which is consumed) or at the first
/// line that is neither a header nor a continuation. Continuation lines are
/// indented by four or more spaces and append a value to the previous key.
/// When the document starts with a `---` front matter block the text is left
/// for the parser, but its simple `key: value` lines are still recorded.
pub(crate) fn extract_meta(text: &str) -> (String, Metadata) {
    let mut metadata = Metadata::new();
    let mut lines = text.lines().peekable();

    if lines.peek().map(|line| line.trim_end()) == Some(FRONT_MATTER_DELIMITER) {
        lines.next();
        for line in lines {
            if line.trim_end() == FRONT_MATTER_DELIMITER {
                break;
            }
            if let Some((key, value)) = split_header(line) {
                metadata.entry(key).or_default().push(value);
            }
        }
        return (text.to_string(), metadata);
    }

    let mut consumed = 0usize;
    let mut current_key: Option<String> = None;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            if current_key.is_some() {
                consumed += line.len();
            }
            break;
        }

        if let Some((key, value)) = split_header(content) {
            metadata.entry(key.clone()).or_default().push(value);
            current_key = Some(key);
        } else if let Some(key) = current_key.as_ref()
            && content.starts_with(INDENT)
        {
            metadata
                .entry(key.clone())
                .or_default()
                .push(content.trim().to_string());
        } else {
            break;
        }

        consumed += line.len();
    }

    (text[consumed..].to_string(), metadata)
}

fn split_header(line: &str) -> Option<(String, String)> {
    let leading = line.len() - line.trim_start_matches(' ').len();
    if leading > 3 {
        return None;
    }
    let (key, value) = line.trim_start().split_once(':')?;
    let valid_key = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    valid_key.then(|| (key.to_ascii_lowercase(), value.trim().to_string()))
}

/// An abbreviation definition such as `*[HTML]: Hyper Text Markup Language`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Abbreviation {
    pub(crate) term: String,
    pub(crate) title: String,
}

/// Strip abbreviation definition lines and return the definitions found.
///
/// A later definition of the same term replaces the earlier one. A definition
/// with an empty title removes the term.
pub(crate) fn extract_abbreviations(text: &str) -> (String, Vec<Abbreviation>) {
    let mut output = String::with_capacity(text.len());
    let mut definitions: Vec<Abbreviation> = Vec::new();
    let mut fence = FenceTracker::default();

    for line in text.split_inclusive('\n') {
        if fence.update(line) || fence.in_fence() {
            output.push_str(line);
            continue;
        }

        match parse_abbreviation(line.trim_end()) {
            Some((term, title)) => {
                definitions.retain(|existing| existing.term != term);
                if !title.is_empty() {
                    definitions.push(Abbreviation { term, title });
                }
            }
            None => output.push_str(line),
        }
    }

    (output, definitions)
}

fn parse_abbreviation(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("*[")?;
    let close = rest.find("]:")?;
    let term = &rest[..close];
    if term.is_empty() || term.contains('\\') || term.contains(']') {
        return None;
    }
    let title = rest[close + 2..].trim();
    Some((term.to_string(), title.to_string()))
}

/// Expand `!!! type "Title"` blocks into admonition containers.
///
/// The body is every following line indented by four spaces, including blank
/// lines that are followed by more indented content. Bodies are expanded
/// recursively, so admonitions nest.
pub(crate) fn expand_admonitions(text: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut output = String::with_capacity(text.len());
    let mut fence = FenceTracker::default();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if fence.update(line) || fence.in_fence() {
            output.push_str(line);
            index += 1;
            continue;
        }

        let Some(header) = AdmonitionHeader::parse(line.trim_end()) else {
            output.push_str(line);
            index += 1;
            continue;
        };

        index += 1;
        let body_start = index;
        let mut body_end = index;
        while index < lines.len() {
            let candidate = lines[index];
            if candidate.trim().is_empty() {
                index += 1;
                continue;
            }
            if !candidate.starts_with(INDENT) && !candidate.starts_with('\t') {
                break;
            }
            index += 1;
            body_end = index;
        }
        index = body_end;

        let body: String = lines[body_start..body_end]
            .iter()
            .map(|line| dedent(line))
            .collect();
        output.push_str(&header.render(&expand_admonitions(&body)));
    }

    output
}

fn dedent(line: &str) -> &str {
    line.strip_prefix(INDENT)
        .or_else(|| line.strip_prefix('\t'))
        .unwrap_or_else(|| line.trim_start_matches(' '))
}

#[derive(Debug, PartialEq, Eq)]
struct AdmonitionHeader {
    classes: Vec<String>,
    title: Option<String>,
}

impl AdmonitionHeader {
    fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix(ADMONITION_MARKER)?;
        let rest = rest.trim();

        let (class_part, title) = match rest.find('"') {
            Some(open) => {
                let quoted = &rest[open + 1..];
                let close = quoted.rfind('"')?;
                if !quoted[close + 1..].trim().is_empty() {
                    return None;
                }
                (&rest[..open], Some(quoted[..close].to_string()))
            }
            None => (rest, None),
        };

        let classes: Vec<String> = class_part
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        let well_formed = classes.iter().all(|class| {
            class
                .chars()
                .all(|ch| ch.is_alphanumeric() || ch == '-' || ch == '_')
        });
        if classes.is_empty() || !well_formed {
            return None;
        }

        let title = match title {
            Some(explicit) if explicit.is_empty() => None,
            Some(explicit) => Some(explicit),
            None => Some(capitalize(&classes[0])),
        };

        Some(Self { classes, title })
    }

    fn render(&self, body: &str) -> String {
        let mut html = format!(
            "<div class=\"admonition {}\">\n",
            escape_html(&self.classes.join(" "))
        );
        if let Some(title) = &self.title {
            html.push_str("<p class=\"admonition-title\">");
            html.push_str(&escape_html(title));
            html.push_str("</p>\n");
        }
        html.push('\n');
        html.push_str(body.trim_end_matches('\n'));
        html.push_str("\n\n</div>\n");
        html
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_tracker_requires_matching_closer() {
        let mut tracker = FenceTracker::default();

        assert!(tracker.update("````rust"));
        assert!(!tracker.update("```"));
        assert!(!tracker.update("~~~~"));
        assert!(tracker.in_fence());
        assert!(tracker.update("  `````  "));
        assert!(!tracker.in_fence());
        assert!(!tracker.update("``inline``"));
    }

    #[test]
    fn meta_block_is_removed_and_collected() {
        let text = "Title: My Document\nAuthors: Ann\n    Bob\n\n# Heading\n";

        let (rest, metadata) = extract_meta(text);

        assert_eq!(rest, "# Heading\n");
        assert_eq!(metadata["title"], ["My Document"]);
        assert_eq!(metadata["authors"], ["Ann", "Bob"]);
    }

    #[test]
    fn documents_without_meta_are_unchanged() {
        let text = "# Heading\n\nTitle: not metadata\n";

        let (rest, metadata) = extract_meta(text);

        assert_eq!(rest, text);
        assert!(metadata.is_empty());
    }

    #[test]
    fn front_matter_is_recorded_but_kept_for_the_parser() {
        let text = "---\ntitle: Notes\ntags: a\n---\nBody\n";

        let (rest, metadata) = extract_meta(text);

        assert_eq!(rest, text);
        assert_eq!(metadata["title"], ["Notes"]);
        assert_eq!(metadata["tags"], ["a"]);
    }

    #[test]
    fn abbreviation_definitions_are_stripped() {
        let text = "The HTML spec.\n\n*[HTML]: Hyper Text Markup Language\n*[W3C]:  World Wide Web Consortium\n";

        let (rest, definitions) = extract_abbreviations(text);

        assert_eq!(rest, "The HTML spec.\n\n");
        assert_eq!(
            definitions,
            [
                Abbreviation {
                    term: "HTML".to_string(),
                    title: "Hyper Text Markup Language".to_string(),
                },
                Abbreviation {
                    term: "W3C".to_string(),
                    title: "World Wide Web Consortium".to_string(),
                },
            ]
        );
    }

    #[test]
    fn abbreviation_lines_inside_fences_are_kept() {
        let text = "```\n*[HTML]: kept\n```\n";

        let (rest, definitions) = extract_abbreviations(text);

        assert_eq!(rest, text);
        assert!(definitions.is_empty());
    }

    #[test]
    fn empty_abbreviation_title_removes_term() {
        let (_, definitions) = extract_abbreviations("*[A]: First\n*[A]:\n");
        assert!(definitions.is_empty());
    }

    #[test]
    fn admonition_with_default_title() {
        let html = expand_admonitions("!!! note\n    Body text.\n\nAfter.\n");

        assert!(html.starts_with(
            "<div class=\"admonition note\">\n<p class=\"admonition-title\">Note</p>\n\nBody text.\n\n</div>\n"
        ));
        assert!(html.ends_with("\nAfter.\n"));
    }

    #[test]
    fn admonition_with_explicit_and_empty_titles() {
        let titled = expand_admonitions("!!! danger highlight \"Don't <panic>\"\n    x\n");
        assert!(titled.contains("<div class=\"admonition danger highlight\">"));
        assert!(titled.contains("<p class=\"admonition-title\">Don&#39;t &lt;panic&gt;</p>"));

        let untitled = expand_admonitions("!!! tip \"\"\n    x\n");
        assert!(!untitled.contains("admonition-title"));
    }

    #[test]
    fn admonitions_nest() {
        let html = expand_admonitions("!!! note\n    !!! warning\n        inner\n");

        assert!(html.contains("<div class=\"admonition note\">"));
        assert!(html.contains("<div class=\"admonition warning\">"));
        assert!(html.contains("\ninner\n"));
    }

    #[test]
    fn admonition_markers_inside_fences_are_ignored() {
        let text = "```\n!!! note\n    body\n```\n";
        assert_eq!(expand_admonitions(text), text);
    }
}
