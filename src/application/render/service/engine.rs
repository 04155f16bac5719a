//! Markdown to HTML fragment conversion driven by an extension plan.

use comrak::{Arena, format_html, nodes::AstNode, parse_document};
use once_cell::sync::Lazy;
use syntect::parsing::SyntaxSet;
use tracing::debug;

use crate::{
    application::render::types::{CompilerError, RenderError},
    domain::extensions::ExtensionSet,
    infra::assets::DEFAULT_HIGHLIGHT_CLASS,
};

use super::{
    config::{Extension, ExtensionPlan},
    headings::finish_html,
    preprocess::{self, Abbreviation, Metadata},
    rewrite::{RewriteContext, RewriteOutcome, rewrite_ast},
};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Output of a single parse: the HTML fragment and the document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub html: String,
    pub metadata: Metadata,
}

/// Grammar engine compiled once from an extension set.
///
/// The engine holds only immutable configuration. Slug counters, abbreviation
/// tables and metadata are created per call to [`MarkdownEngine::parse`].
#[derive(Debug, Clone)]
pub struct MarkdownEngine {
    plan: ExtensionPlan,
    highlight_class: String,
}

impl MarkdownEngine {
    pub fn new(extensions: &ExtensionSet) -> Result<Self, CompilerError> {
        let plan = ExtensionPlan::compile(extensions)?;
        debug!(
            target = "application::render::engine",
            extensions = ?extensions.names(),
            "Compiled markdown extension plan"
        );
        Ok(Self {
            plan,
            highlight_class: DEFAULT_HIGHLIGHT_CLASS.to_string(),
        })
    }

    /// CSS class list of the wrapper around highlighted code blocks.
    pub fn with_highlight_class(mut self, class: impl Into<String>) -> Self {
        self.highlight_class = class.into();
        self
    }

    pub fn highlight_class(&self) -> &str {
        &self.highlight_class
    }

    pub fn parse(&self, markdown: &str) -> Result<ParsedDocument, RenderError> {
        let (text, metadata, abbreviations) = self.preprocess_stage(markdown);

        let arena = Arena::new();
        let root = parse_document(&arena, &text, &self.plan.options);

        let outcome = self.rewrite_stage(root, &abbreviations)?;
        let html = render_html_stage(root, &self.plan.options)?;
        let html = finish_html(&html, &outcome.headings, &self.plan)?;

        Ok(ParsedDocument { html, metadata })
    }

    /// Source-level rewrites, applied in the order the extensions were
    /// declared.
    fn preprocess_stage(&self, markdown: &str) -> (String, Metadata, Vec<Abbreviation>) {
        let mut text = markdown.to_string();
        let mut metadata = Metadata::new();
        let mut abbreviations = Vec::new();

        for extension in &self.plan.order {
            match extension {
                Extension::Meta => {
                    let (rest, found) = preprocess::extract_meta(&text);
                    text = rest;
                    metadata = found;
                }
                Extension::Abbr => {
                    let (rest, found) = preprocess::extract_abbreviations(&text);
                    text = rest;
                    abbreviations = found;
                }
                Extension::Admonition => {
                    text = preprocess::expand_admonitions(&text);
                }
                _ => {}
            }
        }

        (text, metadata, abbreviations)
    }

    fn rewrite_stage<'a>(
        &self,
        root: &'a AstNode<'a>,
        abbreviations: &[Abbreviation],
    ) -> Result<RewriteOutcome, RenderError> {
        let context = RewriteContext {
            plan: &self.plan,
            syntax_set: &SYNTAX_SET,
            highlight_class: &self.highlight_class,
            abbreviations,
        };
        rewrite_ast(root, &context)
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}
