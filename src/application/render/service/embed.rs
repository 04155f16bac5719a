//! Inlines local images as base64 `data:` URIs.
//!
//! Failures are per image: the `src` is left unchanged and a warning is
//! recorded. Nothing in this stage aborts a render.

use std::{
    cell::RefCell,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    rc::Rc,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::warn;
use url::Url;

use crate::{
    application::render::types::{RenderError, RenderWarning},
    util::{
        bytes::format_bytes,
        html::{escape_html, unescape_html},
    },
};

use super::paths::{decode_path, has_scheme, split_suffix};

const STAGE: &str = "embed";

/// Largest image that is inlined: 10 MiB.
pub const DEFAULT_MAX_EMBED_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedLimits {
    pub max_bytes: u64,
}

impl Default for EmbedLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_EMBED_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOutcome {
    pub html: String,
    pub embedded: usize,
    pub warnings: Vec<RenderWarning>,
}

#[derive(Default)]
struct EmbedState {
    embedded: usize,
    warnings: Vec<RenderWarning>,
}

/// Replace the `src` of every local `<img>` with a `data:` URI.
///
/// Relative sources resolve against `base_path`; rooted paths and `file://`
/// URLs are read as-is. Remote and `data:` sources are skipped.
pub fn embed_images(
    html: &str,
    base_path: &Path,
    limits: EmbedLimits,
) -> Result<EmbedOutcome, RenderError> {
    let state = Rc::new(RefCell::new(EmbedState::default()));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", {
                let state = Rc::clone(&state);
                move |el| {
                    let Some(raw) = el.get_attribute("src") else {
                        return Ok(());
                    };
                    let reference = unescape_html(&raw);
                    let Some(path) = local_image_path(&reference, base_path) else {
                        return Ok(());
                    };

                    match encode_image(&path, limits) {
                        Ok(data_uri) => {
                            el.set_attribute("src", &escape_html(&data_uri))?;
                            state.borrow_mut().embedded += 1;
                        }
                        Err(message) => {
                            warn!(
                                target = "application::render::embed",
                                reference = %reference,
                                path = %path.display(),
                                error = %message,
                                "Leaving image reference unchanged"
                            );
                            state
                                .borrow_mut()
                                .warnings
                                .push(RenderWarning::new(reference, message));
                        }
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::postprocess(STAGE, err))?;

    let state = state.take();
    Ok(EmbedOutcome {
        html: rewritten,
        embedded: state.embedded,
        warnings: state.warnings,
    })
}

/// Map an image reference to a file on disk, or `None` when it does not name
/// a local file.
fn local_image_path(reference: &str, base_path: &Path) -> Option<PathBuf> {
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("//") {
        return None;
    }

    if has_scheme(reference) {
        let url = Url::parse(reference).ok()?;
        return (url.scheme() == "file")
            .then(|| url.to_file_path().ok())
            .flatten();
    }

    let (path, _) = split_suffix(reference);
    let decoded = PathBuf::from(decode_path(path));
    if decoded.has_root() || decoded.is_absolute() {
        Some(decoded)
    } else {
        Some(base_path.join(decoded))
    }
}

fn encode_image(path: &Path, limits: EmbedLimits) -> Result<String, String> {
    let mime = mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| "unsupported image type".to_string())?;

    let file = File::open(path).map_err(|err| format!("cannot read image: {err}"))?;
    let metadata = file
        .metadata()
        .map_err(|err| format!("cannot read image: {err}"))?;
    if !metadata.is_file() {
        return Err("not a regular file".to_string());
    }
    if metadata.len() > limits.max_bytes {
        return Err(too_large(metadata.len(), limits));
    }

    // The file may grow after the metadata check; never read past the limit.
    let mut bytes = Vec::new();
    file.take(limits.max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| format!("cannot read image: {err}"))?;
    if bytes.len() as u64 > limits.max_bytes {
        return Err(too_large(bytes.len() as u64, limits));
    }

    Ok(format!(
        "data:{};base64,{}",
        mime.essence_str(),
        STANDARD.encode(bytes)
    ))
}

fn too_large(size: u64, limits: EmbedLimits) -> String {
    format!(
        "image is {}, above the {} embedding limit",
        format_bytes(size),
        format_bytes(limits.max_bytes)
    )
}
