use std::{fs, path::Path, sync::Arc, thread};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use mdpress::{
    CompilerError, CompilerOptions, MarkdownCompiler, RenderRequest, Renderer,
    application::render::{PathMode, PostprocessorConfig, resolve_paths},
    config::{self, LogFormat},
};
use serde_json::json;

const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d,
];

fn load_markdown() -> &'static str {
    include_str!("fixtures/features.md")
}

fn compiler() -> MarkdownCompiler {
    MarkdownCompiler::new(CompilerOptions::default()).expect("default compiler")
}

fn compiler_with(options: CompilerOptions) -> MarkdownCompiler {
    MarkdownCompiler::new(options).expect("compiler")
}

#[test]
fn full_document_wraps_body() {
    let result = compiler()
        .render_markdown(load_markdown(), Some(Path::new("/docs/tour/Feature Tour.md")))
        .expect("render succeeds");

    let html = &result.full_document_html;
    assert!(html.starts_with(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><style>"
    ));
    assert!(html.contains("<title>Feature Tour</title></head><body>"));
    assert!(html.contains("<article class=\"markdown-body\" id=\"md2html_0\">"));
    assert!(html.ends_with("</article></body></html>"));
    assert!(html.contains(&result.body_html));
    assert!(html.contains(".markdown-body"));
    assert!(!html.contains("{{scope}}"));
}

#[test]
fn fixture_exercises_every_default_extension() {
    let result = compiler()
        .render_markdown(load_markdown(), Some(Path::new("/docs/tour/features.md")))
        .expect("render succeeds");
    let body = &result.body_html;

    assert!(body.contains("<h1 id=\"markdown-header-feature-tour\">"));
    assert!(body.contains("<h2 id=\"markdown-header-setup\">"));
    assert!(body.contains("<h2 id=\"markdown-header-setup_1\">"));
    assert!(body.contains("class=\"headerlink\" href=\"#markdown-header-setup_1\""));
    assert!(body.contains("<del>old</del>"));
    assert!(body.contains("footnote-ref"));
    assert!(body.contains("<table>"));
    assert!(body.contains("task-list-item"));
    assert!(body.contains("<dl>"));
    assert!(body.contains("<div class=\"admonition warning\">"));
    assert!(body.contains("<p class=\"admonition-title\">Careful</p>"));
    assert!(body.contains("<div class=\"highlight\"><pre><code class=\"language-python\">"));
    assert!(body.contains("<pre class=\"mermaid\"><code>graph TD;\nA--&gt;B;\n</code></pre>"));
    assert!(body.contains("<abbr title=\"Hyper Text Markup Language\">HTML</abbr>"));
    assert!(body.contains(">rust-lang/rust#42</a>"));
    assert!(body.contains("class=\"emoji\""));
    assert!(body.contains("1f389.png"));
    assert!(body.contains("href=\"/Home_Page/\""));
    assert!(body.contains("class=\"wikilink\""));
    assert!(!body.contains("data-sourcepos"));
    assert!(!body.contains("*[HTML]"));
    assert!(!body.contains("Docs Team"));

    assert_eq!(result.metadata["title"], ["Feature Tour"]);
    assert_eq!(result.metadata["author"], ["Docs Team"]);
    assert!(result.warnings.is_empty());
}

#[test]
fn snapshot_fixture_matches_expected_html() {
    let result = compiler()
        .render_markdown(include_str!("fixtures/snapshot.md"), None)
        .expect("render succeeds");

    let expected = include_str!("fixtures/snapshot.html");
    assert_eq!(expected.trim_end(), result.body_html.trim_end());
}

#[test]
fn single_tildes_stay_literal_with_default_extensions() {
    let result = compiler()
        .render_markdown("H~2~O and ~~gone~~\n", None)
        .expect("render succeeds");

    assert_eq!(result.body_html.trim_end(), "<p>H~2~O and <del>gone</del></p>");
}

#[test]
fn quoted_attribute_values_survive_smart_punctuation() {
    let result = compiler()
        .render_markdown(
            "# Head {: data-x=\"a b\" }\n\n![a](x.png){: title=\"hi there\" .wide}\n",
            None,
        )
        .expect("render succeeds");
    let body = &result.body_html;

    assert!(body.contains("<h1 id=\"markdown-header-head\" data-x=\"a b\">Head<a "));
    assert!(body.contains("<img alt=\"a\" src=\"x.png\" class=\"wide\" title=\"hi there\" />"));
    assert!(!body.contains("{:"));
}

#[test]
fn relative_references_resolve_against_source_directory() {
    let result = compiler()
        .render_markdown(load_markdown(), Some(Path::new("/docs/tour/features.md")))
        .expect("render succeeds");

    assert!(result.body_html.contains("src=\"/docs/tour/images/diagram.png\""));
    assert!(result.body_html.contains("href=\"/docs/tour/guide/intro.md#start\""));
    assert!(result.body_html.contains("href=\"https://github.com/rust-lang/rust/issues/42\""));
}

#[test]
fn path_resolution_is_idempotent() {
    let result = compiler()
        .render_markdown(load_markdown(), Some(Path::new("/docs/tour/features.md")))
        .expect("render succeeds");

    for mode in [PathMode::Absolute, PathMode::FileUrl] {
        let config = PostprocessorConfig::new("/docs/tour").with_mode(mode);
        let once = resolve_paths(&result.body_html, &config).expect("first pass");
        let twice = resolve_paths(&once, &config).expect("second pass");
        assert_eq!(once, twice, "mode {mode:?} is not idempotent");
    }
}

#[test]
fn render_without_source_is_untitled_and_unresolved() {
    let result = compiler()
        .render_markdown("![x](images/x.png)\n", None)
        .expect("render succeeds");

    assert!(result.full_document_html.contains("<title>untitled</title>"));
    assert!(result.body_html.contains("src=\"images/x.png\""));
}

#[test]
fn images_are_embedded_when_enabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("img")).expect("image dir");
    fs::write(dir.path().join("img/dot.png"), PNG_BYTES).expect("write image");
    let source = dir.path().join("page.md");

    let compiler = compiler_with(CompilerOptions {
        convert_images_to_base64: true,
        ..CompilerOptions::default()
    });
    let result = compiler
        .render_markdown("![dot](img/dot.png)\n\n![gone](img/missing.png)\n", Some(&source))
        .expect("render succeeds");

    let expected = format!("src=\"data:image/png;base64,{}\"", STANDARD.encode(PNG_BYTES));
    assert!(result.body_html.contains(&expected));
    assert!(result.body_html.contains("img/missing.png"));
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].reference.ends_with("img/missing.png"));
}

#[test]
fn images_keep_resolved_paths_when_embedding_is_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("dot.png"), PNG_BYTES).expect("write image");
    let source = dir.path().join("page.md");

    let result = compiler()
        .render_markdown("![dot](dot.png)\n", Some(&source))
        .expect("render succeeds");

    assert!(!result.body_html.contains("data:image/png"));
    assert!(result.body_html.contains("dot.png\""));
    assert!(result.warnings.is_empty());
}

#[test]
fn oversized_images_are_left_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("big.png"), vec![0u8; 2048]).expect("write image");
    let source = dir.path().join("page.md");

    let compiler = compiler_with(CompilerOptions {
        convert_images_to_base64: true,
        max_embed_bytes: 1024,
        ..CompilerOptions::default()
    });
    let result = compiler
        .render_markdown("![big](big.png)\n", Some(&source))
        .expect("render succeeds");

    assert!(!result.body_html.contains("data:"));
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].message.contains("2 KiB"));
}

#[test]
fn stylesheets_can_be_left_out() {
    let compiler = compiler_with(CompilerOptions {
        embed_stylesheets: false,
        ..CompilerOptions::default()
    });

    let result = compiler.render_markdown("text\n", None).expect("render");

    assert!(!result.full_document_html.contains("<style>"));
    assert!(
        result
            .full_document_html
            .contains("initial-scale=1\"><title>untitled</title>")
    );
}

#[test]
fn highlight_class_scopes_stylesheet_and_wrapper() {
    let compiler = compiler_with(CompilerOptions {
        highlight_class: "code sample".to_string(),
        ..CompilerOptions::default()
    });

    let result = compiler
        .render_markdown("```rust\nlet x = 1;\n```\n", None)
        .expect("render");

    assert!(result.body_html.contains("<div class=\"code sample\">"));
    assert!(result.full_document_html.contains(".code.sample .hl-"));
}

#[test]
fn missing_assets_fail_construction() {
    let dir = tempfile::tempdir().expect("tempdir");

    let err = MarkdownCompiler::new(CompilerOptions {
        asset_dir: dir.path().to_path_buf(),
        ..CompilerOptions::default()
    })
    .expect_err("assets are required");

    assert!(matches!(err, CompilerError::Asset(_)));
}

#[test]
fn duplicate_custom_fences_fail_construction() {
    let err = MarkdownCompiler::new(CompilerOptions {
        embed_stylesheets: false,
        extensions: vec![json!({
            "superfences": {
                "custom_fences": [
                    { "name": "flow", "class": "a" },
                    { "name": "FLOW", "class": "b" }
                ]
            }
        })],
        ..CompilerOptions::default()
    })
    .expect_err("duplicate fence");

    assert!(matches!(err, CompilerError::DuplicateFence { .. }));
}

#[test]
fn malformed_extension_entries_are_dropped() {
    let compiler = compiler_with(CompilerOptions {
        embed_stylesheets: false,
        extensions: vec![json!("tables"), json!(42), json!({ "footnotes": {} })],
        ..CompilerOptions::default()
    });

    let result = compiler
        .render_markdown("| a |\n|---|\n| 1 |\n\nx[^n]\n\n[^n]: note\n", None)
        .expect("render");

    assert!(result.body_html.contains("<table>"));
    assert!(result.body_html.contains("footnote"));
}

#[test]
fn repeated_renders_are_identical() {
    let compiler = compiler();
    let source = Path::new("/docs/tour/features.md");

    let first = compiler
        .render_markdown(load_markdown(), Some(source))
        .expect("first render");
    let second = compiler
        .render_markdown(load_markdown(), Some(source))
        .expect("second render");

    assert_eq!(first, second);
}

#[test]
fn shared_compiler_renders_from_many_threads() {
    let compiler = Arc::new(compiler());
    let expected = compiler
        .render(&RenderRequest::new(load_markdown()).with_source_path("/docs/tour/features.md"))
        .expect("baseline render");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let compiler = Arc::clone(&compiler);
            thread::spawn(move || {
                compiler
                    .render(
                        &RenderRequest::new(load_markdown())
                            .with_source_path("/docs/tour/features.md"),
                    )
                    .expect("threaded render")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("thread joins"), expected);
    }
}

#[test]
fn settings_map_onto_compiler_options() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        "[logging]\njson = true\n\n[render]\nembed_stylesheets = false\nmax_embed_bytes = 2048\n",
    )
    .expect("write config");

    let settings = config::load(Some(&path)).expect("settings");
    let options = CompilerOptions::from(&settings.render);

    assert!(matches!(settings.logging.format, LogFormat::Json));
    assert!(!options.embed_stylesheets);
    assert_eq!(options.max_embed_bytes, 2048);
    assert!(MarkdownCompiler::new(options).is_ok());
}
