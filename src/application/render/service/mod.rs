mod attrs;
mod config;
mod document;
mod embed;
mod emoji;
mod engine;
mod headings;
mod highlight;
mod magiclink;
mod paths;
mod preprocess;
mod rewrite;

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::{
    application::render::types::{
        CompilerError, RenderError, RenderRequest, RenderResult, Renderer,
    },
    domain::extensions::{default_extensions, normalize},
    infra::assets::{
        DEFAULT_HIGHLIGHT_CLASS, DEFAULT_HIGHLIGHT_STYLE, StyleAssets, default_asset_dir,
    },
};

pub use document::{ARTICLE_ID, DocumentOptions, UNTITLED, assemble, document_title};
pub use embed::{DEFAULT_MAX_EMBED_BYTES, EmbedLimits, EmbedOutcome, embed_images};
pub use engine::{MarkdownEngine, ParsedDocument};
pub use paths::{PathMode, PostprocessorConfig, TagScope, resolve_paths};
pub use preprocess::Metadata;

/// Construction options of a [`MarkdownCompiler`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    /// Inline the theme and highlighting stylesheets into the document head.
    pub embed_stylesheets: bool,
    /// Replace local image references with `data:` URIs.
    pub convert_images_to_base64: bool,
    /// Directory holding `markdown.css` and `highlight-<style>.css`.
    pub asset_dir: PathBuf,
    pub highlight_style: String,
    /// Class list of the wrapper around highlighted code; also the scope of
    /// the highlighting stylesheet.
    pub highlight_class: String,
    pub max_embed_bytes: u64,
    /// Raw extension list, normalized when the compiler is built.
    pub extensions: Vec<Value>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            embed_stylesheets: true,
            convert_images_to_base64: false,
            asset_dir: default_asset_dir(),
            highlight_style: DEFAULT_HIGHLIGHT_STYLE.to_string(),
            highlight_class: DEFAULT_HIGHLIGHT_CLASS.to_string(),
            max_embed_bytes: DEFAULT_MAX_EMBED_BYTES,
            extensions: default_extensions(),
        }
    }
}

/// Local compiler: markdown text in, standalone HTML document out.
///
/// Everything held here is immutable after construction, so one instance can
/// serve concurrent callers.
#[derive(Debug, Clone)]
pub struct MarkdownCompiler {
    engine: MarkdownEngine,
    assets: StyleAssets,
    options: CompilerOptions,
}

impl MarkdownCompiler {
    pub fn new(options: CompilerOptions) -> Result<Self, CompilerError> {
        let extensions = normalize(&options.extensions);
        let engine =
            MarkdownEngine::new(&extensions)?.with_highlight_class(options.highlight_class.clone());

        let assets = StyleAssets::load(
            &options.asset_dir,
            &options.highlight_style,
            &options.highlight_class,
        )?;

        debug!(
            target = "application::render::compiler",
            extensions = extensions.names().len(),
            dropped_extensions = extensions.dropped(),
            embed_stylesheets = options.embed_stylesheets,
            convert_images_to_base64 = options.convert_images_to_base64,
            "Markdown compiler ready"
        );

        Ok(Self {
            engine,
            assets,
            options,
        })
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn engine(&self) -> &MarkdownEngine {
        &self.engine
    }

    /// Render `text` into a full document and its body fragment.
    ///
    /// With a `source_path`, relative references are resolved against its
    /// directory and, when enabled, local images are inlined. Without one both
    /// steps are skipped and the title is [`UNTITLED`].
    pub fn render_markdown(
        &self,
        text: &str,
        source_path: Option<&Path>,
    ) -> Result<RenderResult, RenderError> {
        let parsed = self.engine.parse(text)?;
        let mut body = parsed.html;
        let mut warnings = Vec::new();

        if let Some(source) = source_path {
            let config = PostprocessorConfig::for_source(source);
            body = resolve_paths(&body, &config)?;

            if self.options.convert_images_to_base64 {
                let limits = EmbedLimits {
                    max_bytes: self.options.max_embed_bytes,
                };
                let outcome = embed_images(&body, &config.base_path, limits)?;
                body = outcome.html;
                warnings = outcome.warnings;
            }
        }

        let title = document_title(source_path);
        let full_document_html = assemble(
            &body,
            &DocumentOptions {
                title: &title,
                styles: self.options.embed_stylesheets.then_some(&self.assets),
            },
        );

        debug!(
            target = "application::render::compiler",
            title = %title,
            body_bytes = body.len(),
            warnings = warnings.len(),
            "Rendered markdown document"
        );

        Ok(RenderResult {
            full_document_html,
            body_html: body,
            metadata: parsed.metadata,
            warnings,
        })
    }
}

impl Renderer for MarkdownCompiler {
    fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        self.render_markdown(&request.markdown, request.source_path())
    }
}
