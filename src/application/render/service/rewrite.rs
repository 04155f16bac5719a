use comrak::{
    format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
};
use syntect::parsing::SyntaxSet;

use crate::{
    application::render::types::RenderError, domain::slug::HeadingSlugger,
    util::html::escape_html,
};

use super::{
    attrs::AttrList,
    config::{Extension, ExtensionPlan},
    emoji, highlight, magiclink,
    preprocess::Abbreviation,
};

/// A piece of inline content produced by a text transform. `Text` is still
/// raw and may be transformed further; `Html` is final markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Html(String),
}

/// Id and extra attributes for one markdown heading, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeadingSlot {
    pub(crate) id: Option<String>,
    pub(crate) attrs: AttrList,
}

#[derive(Debug, Default)]
pub(crate) struct RewriteOutcome {
    pub(crate) headings: Vec<HeadingSlot>,
}

/// Immutable inputs of the rewrite walk.
pub(crate) struct RewriteContext<'a> {
    pub(crate) plan: &'a ExtensionPlan,
    pub(crate) syntax_set: &'a SyntaxSet,
    pub(crate) highlight_class: &'a str,
    pub(crate) abbreviations: &'a [Abbreviation],
}

pub(crate) fn rewrite_ast<'a>(
    root: &'a AstNode<'a>,
    context: &RewriteContext<'_>,
) -> Result<RewriteOutcome, RenderError> {
    let mut walker = RewriteWalker::new(context);
    walker.visit_nodes(root, false)?;
    Ok(walker.outcome)
}

struct RewriteWalker<'c, 'a> {
    context: &'c RewriteContext<'a>,
    outcome: RewriteOutcome,
    slugger: Option<HeadingSlugger>,
    text_stages: Vec<Extension>,
}

impl<'c, 'a> RewriteWalker<'c, 'a> {
    fn new(context: &'c RewriteContext<'a>) -> Self {
        let plan = context.plan;
        let slugger = plan
            .toc
            .as_ref()
            .map(|toc| HeadingSlugger::new(toc.slug_prefix.as_str(), toc.separator.as_str()));
        let text_stages = plan
            .order
            .iter()
            .copied()
            .filter(|extension| match extension {
                Extension::Abbr => !context.abbreviations.is_empty(),
                Extension::MagicLink => plan
                    .magiclink
                    .as_ref()
                    .is_some_and(|config| config.repo_url_shorthand),
                Extension::Emoji => plan.emoji.is_some(),
                _ => false,
            })
            .collect();

        Self {
            context,
            outcome: RewriteOutcome::default(),
            slugger,
            text_stages,
        }
    }

    fn visit_nodes(&mut self, node: &AstNode<'_>, in_link: bool) -> Result<(), RenderError> {
        let mut in_link = in_link;
        let kind = NodeKind::of(node);

        match kind {
            NodeKind::Heading => self.process_heading(node),
            NodeKind::FencedCode => self.process_code_block(node)?,
            NodeKind::Image => {
                self.process_image(node);
                return Ok(());
            }
            NodeKind::Link => {
                if self.shorten_autolink(node) {
                    return Ok(());
                }
                in_link = true;
            }
            NodeKind::WikiLink => {
                self.process_wikilink(node);
                in_link = true;
            }
            NodeKind::ShortCode => self.process_shortcode(node),
            NodeKind::Text => self.process_text(node, in_link),
            NodeKind::Subscript | NodeKind::Other => {}
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit_nodes(next, in_link)?;
            child = next.next_sibling();
        }

        if kind == NodeKind::Subscript && self.context.plan.literal_single_tilde {
            self.restore_single_tilde(node)?;
        }

        Ok(())
    }

    fn process_heading(&mut self, node: &AstNode<'_>) {
        let mut attrs = if self.context.plan.enabled(Extension::AttrList) {
            take_trailing_attrs(node).unwrap_or_default()
        } else {
            AttrList::default()
        };

        let explicit = attrs.id.take();
        let id = match (explicit, self.slugger.as_mut()) {
            (Some(id), Some(slugger)) => {
                slugger.reserve(&id);
                Some(id)
            }
            (Some(id), None) => Some(id),
            (None, Some(slugger)) => {
                let text = collect_inline_text(node);
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                Some(slugger.anchor_for(&normalized))
            }
            (None, None) => None,
        };

        self.outcome.headings.push(HeadingSlot { id, attrs });
    }

    fn process_code_block(&mut self, node: &AstNode<'_>) -> Result<(), RenderError> {
        let Some(fences) = self.context.plan.fences.as_ref() else {
            return Ok(());
        };
        let Some((info, literal)) = extract_fenced_code(node) else {
            return Ok(());
        };

        let language = info.split_whitespace().next();
        let html = match language.and_then(|lang| fences.custom_class(lang)) {
            Some(class) => highlight::custom_fence(class, &literal),
            None => highlight::highlight_code(
                language,
                &literal,
                self.context.syntax_set,
                self.context.highlight_class,
            )?,
        };

        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        Ok(())
    }

    fn process_image(&mut self, node: &AstNode<'_>) {
        let (src, title) = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Image(link) => (link.url.clone(), link.title.clone()),
                _ => return,
            }
        };

        let attrs = if self.context.plan.enabled(Extension::AttrList) {
            take_leading_attrs(node.next_sibling())
        } else {
            None
        };

        let alt = collect_inline_text(node);
        let html = build_image_html(&src, alt.trim(), &title, attrs.as_ref());

        {
            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlInline(html);
        }
        while let Some(child) = node.first_child() {
            child.detach();
        }
    }

    fn shorten_autolink(&mut self, node: &AstNode<'_>) -> bool {
        let shortener_enabled = self
            .context
            .plan
            .magiclink
            .as_ref()
            .is_some_and(|config| config.repo_url_shortener);
        if !shortener_enabled {
            return false;
        }

        let url = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Link(link) => link.url.clone(),
                _ => return false,
            }
        };
        if !is_autolink(node, &url) {
            return false;
        }
        let Some(link) = magiclink::shorten_url(&url) else {
            return false;
        };

        {
            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlInline(link.to_html());
        }
        while let Some(child) = node.first_child() {
            child.detach();
        }
        true
    }

    fn process_wikilink(&mut self, node: &AstNode<'_>) {
        let Some(config) = self.context.plan.wikilinks.as_ref() else {
            return;
        };
        let mut data = node.data.borrow_mut();
        if let NodeValue::WikiLink(link) = &mut data.value {
            link.url = config.url_for(&link.url);
        }
    }

    fn process_shortcode(&mut self, node: &AstNode<'_>) {
        let Some(config) = self.context.plan.emoji.as_ref() else {
            return;
        };
        let mut data = node.data.borrow_mut();
        let html = match &data.value {
            NodeValue::ShortCode(shortcode) => {
                emoji::unicode_image(config, &shortcode.code, &shortcode.emoji)
            }
            _ => return,
        };
        data.value = NodeValue::HtmlInline(html);
    }

    /// Turn a `~x~` span back into the literal text it was written as.
    fn restore_single_tilde(&mut self, node: &AstNode<'_>) -> Result<(), RenderError> {
        let mut html = String::from("~");
        let mut child = node.first_child();
        while let Some(next) = child {
            format_html(next, &self.context.plan.options, &mut html).map_err(|err| {
                RenderError::Markdown {
                    message: err.to_string(),
                }
            })?;
            child = next.next_sibling();
        }
        html.push('~');

        while let Some(child) = node.first_child() {
            child.detach();
        }
        node.data.borrow_mut().value = NodeValue::HtmlInline(html);
        Ok(())
    }

    fn process_text(&mut self, node: &AstNode<'_>, in_link: bool) {
        if self.text_stages.is_empty() {
            return;
        }

        let original = {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => text.to_string(),
                _ => return,
            }
        };

        let mut segments = vec![Segment::Text(original)];
        for stage in &self.text_stages {
            segments = match stage {
                Extension::Abbr => {
                    transform(segments, |text| wrap_abbreviations(text, self.context.abbreviations))
                }
                Extension::MagicLink if !in_link => transform(segments, magiclink::expand_shorthand),
                Extension::Emoji => match self.context.plan.emoji.as_ref() {
                    Some(config) => transform(segments, |text| emoji::expand_custom(config, text)),
                    None => segments,
                },
                _ => segments,
            };
        }

        if segments
            .iter()
            .all(|segment| matches!(segment, Segment::Text(_)))
        {
            return;
        }

        let html: String = segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => escape_html(text),
                Segment::Html(html) => html.clone(),
            })
            .collect();

        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlInline(html);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Heading,
    FencedCode,
    Image,
    Link,
    WikiLink,
    ShortCode,
    Text,
    Subscript,
    Other,
}

impl NodeKind {
    fn of(node: &AstNode<'_>) -> Self {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Heading(_) => Self::Heading,
            NodeValue::CodeBlock(block) if block.fenced => Self::FencedCode,
            NodeValue::Image(_) => Self::Image,
            NodeValue::Link(_) => Self::Link,
            NodeValue::WikiLink(_) => Self::WikiLink,
            NodeValue::ShortCode(_) => Self::ShortCode,
            NodeValue::Text(_) => Self::Text,
            NodeValue::Subscript => Self::Subscript,
            _ => Self::Other,
        }
    }
}

fn transform(segments: Vec<Segment>, mut apply: impl FnMut(&str) -> Vec<Segment>) -> Vec<Segment> {
    let mut output = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => output.extend(apply(&text)),
            html => output.push(html),
        }
    }
    output
}

fn wrap_abbreviations(text: &str, abbreviations: &[Abbreviation]) -> Vec<Segment> {
    let mut ordered: Vec<&Abbreviation> = abbreviations.iter().collect();
    ordered.sort_by(|a, b| b.term.len().cmp(&a.term.len()));

    let mut segments = Vec::new();
    let mut plain_start = 0;
    let mut index = 0;

    while index < text.len() {
        let at_boundary = text[..index].chars().next_back().is_none_or(|prev| !is_word_char(prev));
        let matched = at_boundary
            .then(|| {
                ordered.iter().find(|abbr| {
                    text[index..].starts_with(abbr.term.as_str())
                        && text[index + abbr.term.len()..]
                            .chars()
                            .next()
                            .is_none_or(|next| !is_word_char(next))
                })
            })
            .flatten();

        if let Some(abbr) = matched {
            if plain_start < index {
                segments.push(Segment::Text(text[plain_start..index].to_string()));
            }
            segments.push(Segment::Html(format!(
                "<abbr title=\"{}\">{}</abbr>",
                escape_html(&abbr.title),
                escape_html(&abbr.term)
            )));
            index += abbr.term.len();
            plain_start = index;
            continue;
        }

        index += text[index..].chars().next().map_or(1, char::len_utf8);
    }

    if plain_start < text.len() {
        segments.push(Segment::Text(text[plain_start..].to_string()));
    }
    segments
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// An autolink's visible text is its URL, possibly without the scheme that
/// the autolinker added.
fn is_autolink(node: &AstNode<'_>, url: &str) -> bool {
    let Some(child) = node.first_child() else {
        return false;
    };
    if child.next_sibling().is_some() {
        return false;
    }
    let data = child.data.borrow();
    let NodeValue::Text(text) = &data.value else {
        return false;
    };
    let text: &str = text;
    text == url
        || url.strip_prefix("http://") == Some(text)
        || url.strip_prefix("mailto:") == Some(text)
}

fn take_trailing_attrs<'a>(node: &AstNode<'a>) -> Option<AttrList> {
    let mut run = Vec::new();
    let mut cursor = node.last_child();
    while let Some(current) = cursor.filter(|candidate| is_text(candidate)) {
        run.push(current);
        cursor = current.previous_sibling();
    }
    run.reverse();

    let joined = join_text(&run);
    let (remaining, attrs) = AttrList::split_trailing(&joined)?;
    replace_text_run(&run, remaining.trim_end().to_string());
    Some(attrs)
}

fn take_leading_attrs<'a>(sibling: Option<&'a AstNode<'a>>) -> Option<AttrList> {
    let mut run = Vec::new();
    let mut cursor = sibling;
    while let Some(current) = cursor.filter(|candidate| is_text(candidate)) {
        run.push(current);
        cursor = current.next_sibling();
    }

    let joined = join_text(&run);
    let (attrs, remaining) = AttrList::split_leading(&joined)?;
    replace_text_run(&run, remaining.to_string());
    Some(attrs)
}

fn is_text(node: &AstNode<'_>) -> bool {
    matches!(node.data.borrow().value, NodeValue::Text(_))
}

/// Smart punctuation splits text around quotes, so an attribute block may
/// span several adjacent text nodes.
fn join_text(run: &[&AstNode<'_>]) -> String {
    run.iter()
        .map(|node| match &node.data.borrow().value {
            NodeValue::Text(text) => text.to_string(),
            _ => String::new(),
        })
        .collect()
}

fn replace_text_run(run: &[&AstNode<'_>], text: String) {
    let Some((first, rest)) = run.split_first() else {
        return;
    };
    if let NodeValue::Text(existing) = &mut first.data.borrow_mut().value {
        *existing = text.into();
    }
    for node in rest {
        node.detach();
    }
}

fn build_image_html(src: &str, alt: &str, title: &str, attrs: Option<&AttrList>) -> String {
    let mut html = String::with_capacity(src.len() + alt.len() + 32);
    html.push_str("<img alt=\"");
    html.push_str(&escape_html(alt));
    html.push_str("\" src=\"");
    html.push_str(&escape_html(src));
    html.push('"');

    if !title.is_empty() {
        html.push_str(" title=\"");
        html.push_str(&escape_html(title));
        html.push('"');
    }
    if let Some(attrs) = attrs {
        html.push_str(&attrs.to_html());
    }

    html.push_str(" />");
    html
}

fn extract_fenced_code(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::CodeBlock(block) if block.fenced => {
            Some((block.info.trim().to_string(), block.literal.clone()))
        }
        _ => None,
    }
}

fn collect_inline_text(node: &AstNode<'_>) -> String {
    fn walk(node: &AstNode<'_>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, &mut text);
        child = next.next_sibling();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use comrak::{Arena, format_html, parse_document};
    use serde_json::json;

    use crate::domain::extensions::{default_extensions, normalize};

    fn render(markdown: &str, abbreviations: &[Abbreviation]) -> (String, RewriteOutcome) {
        let plan = ExtensionPlan::compile(&normalize(&default_extensions())).expect("plan");
        render_with(&plan, markdown, abbreviations)
    }

    fn render_with(
        plan: &ExtensionPlan,
        markdown: &str,
        abbreviations: &[Abbreviation],
    ) -> (String, RewriteOutcome) {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let context = RewriteContext {
            plan,
            syntax_set: &syntax_set,
            highlight_class: "highlight",
            abbreviations,
        };
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &plan.options);
        let outcome = rewrite_ast(root, &context).expect("rewrite");
        let mut html = String::new();
        format_html(root, &plan.options, &mut html).expect("html");
        (html, outcome)
    }

    #[test]
    fn headings_receive_prefixed_unique_ids() {
        let (_, outcome) = render("# A\n\n## A\n\n### A {: #custom .wide }\n\n#### A\n", &[]);

        let ids: Vec<Option<&str>> = outcome
            .headings
            .iter()
            .map(|slot| slot.id.as_deref())
            .collect();
        assert_eq!(
            ids,
            [
                Some("markdown-header-a"),
                Some("markdown-header-a_1"),
                Some("custom"),
                Some("markdown-header-a_2"),
            ]
        );
        assert_eq!(outcome.headings[2].attrs.classes, ["wide"]);
    }

    #[test]
    fn custom_fences_pass_through_verbatim() {
        let (html, _) = render("```mermaid\ngraph TD;\nA-->B;\n```\n", &[]);
        assert!(html.contains("<pre class=\"mermaid\"><code>graph TD;\nA--&gt;B;\n</code></pre>"));
    }

    #[test]
    fn fenced_code_is_highlighted() {
        let (html, _) = render("```python\nprint('hi')\n```\n", &[]);
        assert!(html.contains("<div class=\"highlight\"><pre><code class=\"language-python\">"));
        assert!(html.contains("hl-"));
    }

    #[test]
    fn images_keep_alt_title_and_attributes() {
        let (html, _) = render("![A cat](cat.png \"Cat\"){: .small width=40}\n", &[]);
        assert!(html.contains(
            "<img alt=\"A cat\" src=\"cat.png\" title=\"Cat\" class=\"small\" width=\"40\" />"
        ));
    }

    #[test]
    fn emoji_shortcodes_become_images() {
        let (html, _) = render("Nice :smile: and :octocat:\n", &[]);

        assert!(html.contains("class=\"emoji\""));
        assert!(html.contains("/unicode/1f604.png"));
        assert!(html.contains("https://github.githubassets.com/images/icons/emoji/octocat.png"));
    }

    #[test]
    fn abbreviations_are_wrapped() {
        let abbreviations = [Abbreviation {
            term: "HTML".to_string(),
            title: "Hyper Text Markup Language".to_string(),
        }];

        let (html, _) = render("HTML and XHTML\n", &abbreviations);

        assert!(html.contains("<abbr title=\"Hyper Text Markup Language\">HTML</abbr> and XHTML"));
    }

    #[test]
    fn autolinked_repository_urls_are_shortened() {
        let (html, _) = render("See https://github.com/rust-lang/rust/issues/1 now.\n", &[]);
        assert!(html.contains(">rust-lang/rust#1</a>"));
        assert!(html.contains("magiclink-issue"));
    }

    #[test]
    fn explicit_links_are_not_shortened() {
        let (html, _) = render("[tracker](https://github.com/a/b/issues/1)\n", &[]);
        assert!(html.contains(">tracker</a>"));
        assert!(!html.contains("magiclink"));
    }

    #[test]
    fn headings_without_toc_have_no_ids() {
        let plan = ExtensionPlan::compile(&normalize(&[json!("tables")])).expect("plan");
        let (_, outcome) = render_with(&plan, "# Title\n", &[]);

        assert_eq!(outcome.headings, [HeadingSlot::default()]);
    }

    #[test]
    fn single_tildes_are_literal_unless_subscript_is_enabled() {
        let (html, _) = render("H~2~O and ~~gone~~\n", &[]);
        assert!(html.contains(">H~2~O and <del"));
        assert!(html.contains(">gone</del>"));

        let plan = ExtensionPlan::compile(&normalize(&[json!({ "tilde": { "subscript": true } })]))
            .expect("plan");
        let (html, _) = render_with(&plan, "H~2~O\n", &[]);
        assert!(html.contains(">2</sub>O"));
    }

    #[test]
    fn quoted_heading_attributes_do_not_leak_into_slug() {
        let (html, outcome) = render("# Head {: data-x=\"a b\" .note }\n", &[]);

        let slot = &outcome.headings[0];
        assert_eq!(slot.id.as_deref(), Some("markdown-header-head"));
        assert_eq!(slot.attrs.classes, ["note"]);
        assert_eq!(
            slot.attrs.pairs,
            [("data-x".to_string(), "a b".to_string())]
        );
        assert!(!html.contains("{:"));
    }

    #[test]
    fn quoted_image_attributes_are_applied() {
        let (html, _) = render("![a](x.png){: title=\"hi there\" .wide}\n", &[]);

        assert!(html.contains("<img alt=\"a\" src=\"x.png\" class=\"wide\" title=\"hi there\" />"));
        assert!(!html.contains("{:"));
    }
}
