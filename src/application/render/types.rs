use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::error::InfraError;

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Markdown source text.
    pub markdown: String,
    /// Location of the source file. Its parent directory anchors relative
    /// references and its file stem becomes the document title.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

impl RenderRequest {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, source_path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

/// A recoverable failure tied to a single reference in the document, such as
/// an image that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderWarning {
    pub reference: String,
    pub message: String,
}

impl RenderWarning {
    pub fn new(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

/// Deterministic rendering result returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    /// Complete standalone document. Always contains `body_html` verbatim.
    pub full_document_html: String,
    /// Postprocessed HTML fragment.
    pub body_html: String,
    /// Document metadata headers, keyed by lower-cased name.
    #[serde(default)]
    pub metadata: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub warnings: Vec<RenderWarning>,
}

/// Structured errors surfaced by a single render call. Only internal engine
/// faults end up here; per-reference problems are reported as warnings.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown parsing failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("{stage} postprocessing failed: {message}")]
    Postprocess {
        stage: &'static str,
        message: String,
    },
}

impl RenderError {
    pub(crate) fn postprocess(stage: &'static str, message: impl ToString) -> Self {
        Self::Postprocess {
            stage,
            message: message.to_string(),
        }
    }
}

/// Errors raised while constructing a compiler. These are configuration
/// problems and are fatal.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error(transparent)]
    Asset(#[from] InfraError),
    #[error("unknown markdown extension `{name}`")]
    UnknownExtension { name: String },
    #[error("invalid configuration for extension `{name}`: {message}")]
    InvalidExtensionConfig { name: String, message: String },
    #[error("custom fence `{name}` is declared more than once")]
    DuplicateFence { name: String },
}

impl CompilerError {
    pub(crate) fn invalid_config(name: &str, message: impl ToString) -> Self {
        Self::InvalidExtensionConfig {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Trait exposed by the rendering pipeline. Implementations must be pure and
/// deterministic: given the same input, they return identical outputs or errors.
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderResult, RenderError>;
}
