//! `{: #id .class key=value}` attribute blocks.

use crate::util::html::escape_html;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AttrList {
    pub(crate) id: Option<String>,
    pub(crate) classes: Vec<String>,
    pub(crate) pairs: Vec<(String, String)>,
}

impl AttrList {
    /// Parse the inside of a `{...}` block. The leading colon is optional.
    /// Returns `None` when any token is not an id, class or key/value pair.
    pub(crate) fn parse(inner: &str) -> Option<Self> {
        let inner = inner.trim();
        let inner = inner.strip_prefix(':').unwrap_or(inner);
        let mut attrs = Self::default();

        for token in tokenize(inner)? {
            if let Some(id) = token.strip_prefix('#') {
                if id.is_empty() {
                    return None;
                }
                attrs.id = Some(id.to_string());
            } else if let Some(class) = token.strip_prefix('.') {
                if class.is_empty() {
                    return None;
                }
                attrs.classes.push(class.to_string());
            } else {
                let (key, value) = token.split_once('=')?;
                if key.is_empty() || !key.chars().all(is_key_char) {
                    return None;
                }
                attrs
                    .pairs
                    .push((key.to_string(), unquote(value).to_string()));
            }
        }

        (!attrs.is_empty()).then_some(attrs)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.id.is_none() && self.classes.is_empty() && self.pairs.is_empty()
    }

    /// Split a trailing `{...}` block off `text`, returning the remaining text
    /// and the parsed attributes.
    pub(crate) fn split_trailing(text: &str) -> Option<(&str, Self)> {
        let trimmed = text.trim_end();
        let body = trimmed.strip_suffix('}')?;
        let open = body.rfind('{')?;
        let attrs = Self::parse(&body[open + 1..])?;
        Some((&trimmed[..open], attrs))
    }

    /// Split a leading `{...}` block off `text`.
    pub(crate) fn split_leading(text: &str) -> Option<(Self, &str)> {
        let body = text.strip_prefix('{')?;
        let close = body.find('}')?;
        let attrs = Self::parse(&body[..close])?;
        Some((attrs, &body[close + 1..]))
    }

    /// Render as ` id="..." class="..." key="..."`, with a leading space.
    pub(crate) fn to_html(&self) -> String {
        let mut html = String::new();
        if let Some(id) = &self.id {
            html.push_str(&format!(" id=\"{}\"", escape_html(id)));
        }
        if !self.classes.is_empty() {
            html.push_str(&format!(
                " class=\"{}\"",
                escape_html(&self.classes.join(" "))
            ));
        }
        for (key, value) in &self.pairs {
            html.push_str(&format!(" {key}=\"{}\"", escape_html(value)));
        }
        html
    }
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == ':'
}

/// Quote style of an attribute value. Smart punctuation may already have
/// replaced straight quotes with typographic ones, so both forms count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
}

impl Quote {
    fn of(ch: char) -> Option<Self> {
        match ch {
            '"' | '\u{201c}' | '\u{201d}' | '\u{201e}' => Some(Self::Double),
            '\'' | '\u{2018}' | '\u{2019}' => Some(Self::Single),
            _ => None,
        }
    }
}

fn unquote(value: &str) -> &str {
    let mut chars = value.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last))
            if Quote::of(first).is_some() && Quote::of(first) == Quote::of(last) =>
        {
            chars.as_str()
        }
        _ => value,
    }
}

fn tokenize(input: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<Quote> = None;

    for ch in input.chars() {
        match quote {
            Some(open) => {
                current.push(ch);
                if Quote::of(ch) == Some(open) {
                    quote = None;
                }
            }
            None => match Quote::of(ch) {
                Some(opened) => {
                    current.push(ch);
                    quote = Some(opened);
                }
                None if ch.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                None => current.push(ch),
            },
        }
    }

    if quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Some(tokens)
}
