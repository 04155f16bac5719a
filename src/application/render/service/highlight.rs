use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use crate::{application::render::types::RenderError, util::html::escape_html};

/// Prefix of every CSS class emitted for highlighted tokens. The bundled
/// highlighting stylesheets are written against it.
pub(crate) const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Highlight a fenced code block into a `<div class="{wrapper_class}">`
/// wrapper holding `<pre><code>` with classed token spans.
pub(crate) fn highlight_code(
    language: Option<&str>,
    code: &str,
    syntax_set: &SyntaxSet,
    wrapper_class: &str,
) -> Result<String, RenderError> {
    let lang_token = language.unwrap_or("text");
    let syntax =
        find_syntax(syntax_set, lang_token).unwrap_or_else(|| syntax_set.find_syntax_plain_text());

    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, syntax_set, CLASS_STYLE);

    for line in LinesWithEndings::from(code_with_newline.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|err| RenderError::Highlighting {
                language: lang_token.to_string(),
                message: err.to_string(),
            })?;
    }

    let highlighted = generator.finalize();
    let code_class = language
        .map(|lang| {
            format!(
                " class=\"language-{}\"",
                escape_html(&lang.to_ascii_lowercase())
            )
        })
        .unwrap_or_default();

    Ok(format!(
        "<div class=\"{}\"><pre><code{code_class}>{highlighted}</code></pre></div>",
        escape_html(wrapper_class)
    ))
}

/// Render a custom fence: the content is kept verbatim apart from escaping so
/// client-side diagram scripts can pick it up by class.
pub(crate) fn custom_fence(class: &str, code: &str) -> String {
    format!(
        "<pre class=\"{}\"><code>{}</code></pre>",
        escape_html(class),
        escape_html(code)
    )
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}
