//! Wraps a rendered fragment into a standalone HTML document.

use std::path::Path;

use crate::{infra::assets::StyleAssets, util::html::escape_html};

pub const UNTITLED: &str = "untitled";
pub const ARTICLE_ID: &str = "md2html_0";

#[derive(Debug, Clone, Copy)]
pub struct DocumentOptions<'a> {
    pub title: &'a str,
    /// Inlined as `<style>` blocks when present.
    pub styles: Option<&'a StyleAssets>,
}

/// File stem of the source path, or [`UNTITLED`].
pub fn document_title(source_path: Option<&Path>) -> String {
    source_path
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

pub fn assemble(body: &str, options: &DocumentOptions<'_>) -> String {
    let styles_len = options
        .styles
        .map_or(0, |styles| styles.theme_css().len() + styles.highlight_css().len());
    let mut html = String::with_capacity(body.len() + styles_len + 512);

    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
    );
    if let Some(styles) = options.styles {
        html.push_str("<style>");
        html.push_str(styles.theme_css());
        html.push_str("</style><style>");
        html.push_str(styles.highlight_css());
        html.push_str("</style>");
    }
    html.push_str("<title>");
    html.push_str(&escape_html(options.title));
    html.push_str("</title></head><body><article class=\"markdown-body\" id=\"");
    html.push_str(ARTICLE_ID);
    html.push_str("\">");
    html.push_str(body);
    html.push_str("</article></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_comes_from_the_file_stem() {
        assert_eq!(
            document_title(Some(Path::new("/docs/My Report.md"))),
            "My Report"
        );
        assert_eq!(document_title(Some(Path::new("notes"))), "notes");
        assert_eq!(document_title(Some(Path::new("/"))), UNTITLED);
        assert_eq!(document_title(None), UNTITLED);
    }

    #[test]
    fn assembles_without_styles() {
        let html = assemble(
            "<p>Hi</p>",
            &DocumentOptions {
                title: "a <b>",
                styles: None,
            },
        );

        assert_eq!(
            html,
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
             <title>a &lt;b&gt;</title></head><body>\
             <article class=\"markdown-body\" id=\"md2html_0\"><p>Hi</p></article>\
             </body></html>"
        );
    }

    #[test]
    fn styles_precede_the_title() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("markdown.css"), ".markdown-body{}").expect("theme");
        std::fs::write(dir.path().join("highlight-plain.css"), "{{scope}} pre{}")
            .expect("highlight");
        let styles = StyleAssets::load(dir.path(), "plain", "highlight").expect("assets");

        let html = assemble(
            "",
            &DocumentOptions {
                title: "t",
                styles: Some(&styles),
            },
        );

        assert!(html.contains(
            "<style>.markdown-body{}</style><style>.highlight pre{}</style><title>t</title>"
        ));
    }
}
