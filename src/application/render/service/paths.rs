//! Rewrites relative resource references so the document still works when
//! opened away from its source directory.

use std::{
    cell::RefCell,
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use lol_html::{RewriteStrSettings, element, rewrite_str};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    application::render::types::RenderError,
    util::html::{escape_html, unescape_html},
};

const STAGE: &str = "paths";

/// Characters escaped when a filesystem path is written as a URL path.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// How resolved references are written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Absolute filesystem path in URL form: `/home/me/docs/img.png`.
    #[default]
    Absolute,
    /// Fully resolved `file://` URL.
    FileUrl,
}

/// Which tags have their references rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagScope {
    /// `<img src>`.
    pub images: bool,
    /// `<a href>`, `<link href>` and `<script src>`.
    pub files: bool,
}

impl TagScope {
    pub const ALL: Self = Self {
        images: true,
        files: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.images && !self.files
    }
}

impl Default for TagScope {
    fn default() -> Self {
        Self::ALL
    }
}

/// Per-call settings for [`resolve_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessorConfig {
    pub base_path: PathBuf,
    pub mode: PathMode,
    pub tags: TagScope,
}

impl PostprocessorConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            mode: PathMode::default(),
            tags: TagScope::default(),
        }
    }

    /// Settings for a document read from `source`: references resolve against
    /// the absolute form of its parent directory.
    pub fn for_source(source: &Path) -> Self {
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        let base = std::path::absolute(parent).unwrap_or_else(|_| parent.to_path_buf());
        Self::new(normalize_lexically(&base))
    }

    pub fn with_mode(mut self, mode: PathMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tags(mut self, tags: TagScope) -> Self {
        self.tags = tags;
        self
    }
}

/// Rewrite relative `src`/`href` references in `html`.
///
/// References with a scheme, protocol-relative or rooted references, pure
/// fragments and empty values are left alone. Every rewritten reference is
/// rooted or carries a scheme, so running the pass twice yields the same
/// output as running it once.
pub fn resolve_paths(html: &str, config: &PostprocessorConfig) -> Result<String, RenderError> {
    if config.base_path.as_os_str().is_empty() || config.tags.is_empty() {
        return Ok(html.to_string());
    }

    let config = Rc::new(config.clone());
    let error_slot = Rc::new(RefCell::new(None));
    let mut handlers = Vec::new();

    let mut targets: Vec<(&str, &str)> = Vec::new();
    if config.tags.images {
        targets.push(("img[src]", "src"));
    }
    if config.tags.files {
        targets.extend([("a[href]", "href"), ("link[href]", "href"), ("script[src]", "src")]);
    }

    for (selector, attribute) in targets {
        handlers.push(element!(selector, {
            let config = Rc::clone(&config);
            let error_slot = Rc::clone(&error_slot);
            move |el| {
                let Some(raw) = el.get_attribute(attribute) else {
                    return Ok(());
                };
                let reference = unescape_html(&raw);
                match resolve_reference(&reference, &config) {
                    Ok(Some(resolved)) => el.set_attribute(attribute, &escape_html(&resolved))?,
                    Ok(None) => {}
                    Err(err) => *error_slot.borrow_mut() = Some(err),
                }
                Ok(())
            }
        }));
    }

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::postprocess(STAGE, err))?;

    if let Some(err) = error_slot.borrow_mut().take() {
        return Err(err);
    }

    Ok(rewritten)
}

/// Whether a reference must be left untouched by path resolution.
pub(crate) fn is_external(reference: &str) -> bool {
    reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with('/')
        || reference.starts_with('\\')
        || has_drive_prefix(reference)
        || has_scheme(reference)
}

/// `C:\` or `C:/`.
fn has_drive_prefix(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/')
}

/// A URL scheme is a letter followed by letters, digits, `+`, `.` or `-`, then
/// a colon. Single-letter schemes are treated as drive letters instead.
pub(crate) fn has_scheme(reference: &str) -> bool {
    let Some(colon) = reference.find(':') else {
        return false;
    };
    let scheme = &reference[..colon];
    let mut chars = scheme.chars();
    scheme.len() > 1
        && chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '.' | '-'))
}

/// Split `path?query#fragment` into the path and the untouched suffix.
pub(crate) fn split_suffix(reference: &str) -> (&str, &str) {
    match reference.find(['?', '#']) {
        Some(index) => reference.split_at(index),
        None => (reference, ""),
    }
}

/// Percent-decode a URL path, keeping the raw text when it is not UTF-8.
pub(crate) fn decode_path(path: &str) -> String {
    percent_decode_str(path)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

fn resolve_reference(
    reference: &str,
    config: &PostprocessorConfig,
) -> Result<Option<String>, RenderError> {
    if is_external(reference) {
        return Ok(None);
    }

    let (path, suffix) = split_suffix(reference);
    if path.is_empty() {
        return Ok(None);
    }

    let joined = normalize_lexically(&config.base_path.join(decode_path(path)));
    let written = match config.mode {
        PathMode::Absolute => absolute_url_path(&joined),
        PathMode::FileUrl => Url::from_file_path(&joined)
            .map(String::from)
            .unwrap_or_else(|()| absolute_url_path(&joined)),
    };

    Ok(Some(format!("{written}{suffix}")))
}

fn absolute_url_path(path: &Path) -> String {
    let slashed = slash_path(path);
    let rooted = if slashed.starts_with('/') {
        slashed
    } else {
        format!("/{slashed}")
    };
    utf8_percent_encode(&rooted, PATH_ENCODE_SET).to_string()
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Fold `.` and `..` components without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
