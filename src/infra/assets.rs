//! Stylesheet assets inlined into assembled documents.
//!
//! Two files are read from the asset directory: the theme stylesheet
//! (`markdown.css`) and a syntax-highlighting stylesheet named after the
//! highlight style (`highlight-github.css`). The highlighting stylesheet is a
//! template whose `{{scope}}` token is replaced by the selector built from the
//! configured CSS class list.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::error::InfraError;

pub const THEME_STYLESHEET: &str = "markdown.css";
pub const SCOPE_TOKEN: &str = "{{scope}}";
pub const DEFAULT_HIGHLIGHT_STYLE: &str = "github";
pub const DEFAULT_HIGHLIGHT_CLASS: &str = "highlight";

/// Directory holding the stylesheets shipped with the crate.
pub fn default_asset_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("static")
}

/// File name of the highlighting stylesheet for a named style.
pub fn highlight_stylesheet(style: &str) -> String {
    format!("highlight-{style}.css")
}

/// Build a compound class selector: `"highlight"` → `.highlight`,
/// `"a b"` → `.a.b`.
pub fn scope_selector(css_class: &str) -> String {
    css_class
        .split_whitespace()
        .map(|class| format!(".{class}"))
        .collect()
}

/// Theme and highlighting stylesheets, loaded once and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleAssets {
    theme_css: String,
    highlight_css: String,
}

impl StyleAssets {
    /// Read both stylesheets from `dir`. A missing or unreadable file is an
    /// error.
    pub fn load(dir: &Path, highlight_style: &str, css_class: &str) -> Result<Self, InfraError> {
        let theme_css = read_asset(&dir.join(THEME_STYLESHEET))?;
        let template = read_asset(&dir.join(highlight_stylesheet(highlight_style)))?;
        let highlight_css = template.replace(SCOPE_TOKEN, &scope_selector(css_class));

        debug!(
            target = "infra::assets",
            dir = %dir.display(),
            highlight_style,
            theme_bytes = theme_css.len(),
            highlight_bytes = highlight_css.len(),
            "Loaded stylesheet assets"
        );

        Ok(Self {
            theme_css,
            highlight_css,
        })
    }

    pub fn theme_css(&self) -> &str {
        &self.theme_css
    }

    pub fn highlight_css(&self) -> &str {
        &self.highlight_css
    }
}

fn read_asset(path: &Path) -> Result<String, InfraError> {
    fs::read_to_string(path).map_err(|err| InfraError::asset(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_assets(dir: &Path) {
        fs::write(dir.join(THEME_STYLESHEET), "body { margin: 0; }").expect("theme");
        fs::write(
            dir.join(highlight_stylesheet("github")),
            "{{scope}} .hl-comment { color: #6a737d; }",
        )
        .expect("highlight");
    }

    #[test]
    fn scope_selector_joins_classes() {
        assert_eq!(scope_selector("highlight"), ".highlight");
        assert_eq!(scope_selector(" code  block "), ".code.block");
        assert_eq!(scope_selector(""), "");
    }

    #[test]
    fn load_substitutes_scope_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let assets = StyleAssets::load(dir.path(), "github", "highlight").expect("assets load");

        assert_eq!(assets.theme_css(), "body { margin: 0; }");
        assert_eq!(
            assets.highlight_css(),
            ".highlight .hl-comment { color: #6a737d; }"
        );
    }

    #[test]
    fn missing_highlight_style_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let err = StyleAssets::load(dir.path(), "monokai", "highlight").expect_err("missing style");

        match err {
            InfraError::Asset { path, .. } => {
                assert!(path.ends_with("highlight-monokai.css"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bundled_assets_are_present() {
        let assets = StyleAssets::load(
            &default_asset_dir(),
            DEFAULT_HIGHLIGHT_STYLE,
            DEFAULT_HIGHLIGHT_CLASS,
        )
        .expect("bundled assets");

        assert!(assets.theme_css().contains(".markdown-body"));
        assert!(assets.highlight_css().contains(".highlight"));
        assert!(!assets.highlight_css().contains(SCOPE_TOKEN));
    }
}
