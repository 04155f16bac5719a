//! Emoji shortcodes rendered as GitHub emoji images.

use crate::util::html::escape_html;

use super::{
    config::{EmojiAlt, EmojiConfig},
    rewrite::Segment,
};

/// GitHub emoji that have no Unicode code point and are served by name.
const GITHUB_CUSTOM_EMOJI: [&str; 23] = [
    "atom",
    "basecamp",
    "basecampy",
    "bowtie",
    "electron",
    "feelsgood",
    "finnadie",
    "fishsticks",
    "goberserk",
    "godmode",
    "hurtrealbad",
    "neckbeard",
    "octocat",
    "rage1",
    "rage2",
    "rage3",
    "rage4",
    "shipit",
    "suspect",
    "trollface",
    "dependabot",
    "copilot",
    "accessibility",
];

const VARIATION_SELECTOR: char = '\u{fe0f}';

/// Image for a standard emoji, addressed by its code points.
pub(crate) fn unicode_image(config: &EmojiConfig, shortcode: &str, emoji: &str) -> String {
    let src = format!("{}{}.png", config.image_path, code_points(emoji));
    let alt = match config.alt {
        EmojiAlt::Short => format!(":{shortcode}:"),
        EmojiAlt::Unicode => emoji.to_string(),
    };
    render_image(config, &alt, &src, shortcode)
}

/// Replace `:name:` occurrences of GitHub's custom emoji.
pub(crate) fn expand_custom(config: &EmojiConfig, text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut plain_start = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(':') {
        let open = cursor + offset;
        let rest = &text[open + 1..];
        let Some(close) = rest.find(':') else {
            break;
        };
        let name = &rest[..close];
        if GITHUB_CUSTOM_EMOJI.contains(&name) {
            if plain_start < open {
                segments.push(Segment::Text(text[plain_start..open].to_string()));
            }
            segments.push(Segment::Html(custom_image(config, name)));
            cursor = open + close + 2;
            plain_start = cursor;
        } else {
            cursor = open + 1;
        }
    }

    if plain_start < text.len() {
        segments.push(Segment::Text(text[plain_start..].to_string()));
    }
    segments
}

fn custom_image(config: &EmojiConfig, name: &str) -> String {
    let src = format!("{}{name}.png", config.non_standard_image_path);
    render_image(config, &format!(":{name}:"), &src, name)
}

fn render_image(config: &EmojiConfig, alt: &str, src: &str, shortcode: &str) -> String {
    let mut html = format!(
        "<img alt=\"{}\" class=\"emoji\" src=\"{}\" title=\":{}:\"",
        escape_html(alt),
        escape_html(src),
        escape_html(shortcode)
    );
    for (name, value) in &config.attributes {
        html.push_str(&format!(" {}=\"{}\"", escape_html(name), escape_html(value)));
    }
    html.push_str(" />");
    html
}

fn code_points(emoji: &str) -> String {
    emoji
        .chars()
        .filter(|&ch| ch != VARIATION_SELECTOR)
        .map(|ch| format!("{:04x}", u32::from(ch)))
        .collect::<Vec<_>>()
        .join("-")
}
