//! Offline GitHub-flavoured Markdown compiler.
//!
//! [`MarkdownCompiler`] turns markdown text into a self-contained HTML
//! document: the fragment is produced by a grammar engine configured from an
//! ordered extension list, relative references are resolved against the
//! source file, local images may be inlined as `data:` URIs, and the bundled
//! stylesheets are embedded into the document head.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;

pub use application::render::{
    CompilerError, CompilerOptions, MarkdownCompiler, RenderError, RenderRequest, RenderResult,
    RenderWarning, Renderer,
};
