//! Markdown rendering pipeline.
//!
//! The pipeline is pure apart from reading stylesheets at construction and
//! image files during embedding: it accepts markdown input, produces
//! deterministic HTML output, and surfaces structured errors.

mod service;
mod types;

pub use service::{
    ARTICLE_ID, CompilerOptions, DEFAULT_MAX_EMBED_BYTES, DocumentOptions, EmbedLimits,
    EmbedOutcome, MarkdownCompiler, MarkdownEngine, Metadata, ParsedDocument, PathMode,
    PostprocessorConfig, TagScope, UNTITLED, assemble, document_title, embed_images,
    resolve_paths,
};
pub use types::{
    CompilerError, RenderError, RenderRequest, RenderResult, RenderWarning, Renderer,
};
