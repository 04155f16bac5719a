//! Compiles a normalized extension set into parser options and stage settings.

use std::collections::{BTreeMap, HashSet};

use comrak::options::Options;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    application::render::types::CompilerError,
    domain::{
        extensions::{ExtensionConfig, ExtensionSet},
        slug::{DEFAULT_SEPARATOR, DEFAULT_SLUG_PREFIX},
    },
};

const FRONT_MATTER_DELIMITER: &str = "---";
const NAMESPACE_PREFIXES: [&str; 2] = ["markdown.extensions.", "pymdownx."];

/// Every grammar extension the engine knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Extension {
    Footnotes,
    AttrList,
    DefList,
    Tables,
    Abbr,
    MdInHtml,
    BetterEm,
    Toc,
    Meta,
    SaneLists,
    Smarty,
    WikiLinks,
    Admonition,
    SuperFences,
    MagicLink,
    TaskList,
    Tilde,
    Emoji,
}

impl Extension {
    /// Resolve a registry name. Fully qualified names such as
    /// `markdown.extensions.toc` or `pymdownx.tilde` are accepted too.
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let short = NAMESPACE_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name);

        let extension = match short {
            "footnotes" => Self::Footnotes,
            "attr_list" => Self::AttrList,
            "def_list" => Self::DefList,
            "tables" => Self::Tables,
            "abbr" => Self::Abbr,
            "md_in_html" => Self::MdInHtml,
            "betterem" => Self::BetterEm,
            "toc" => Self::Toc,
            "meta" => Self::Meta,
            "sane_lists" => Self::SaneLists,
            "smarty" => Self::Smarty,
            "wikilinks" => Self::WikiLinks,
            "admonition" => Self::Admonition,
            "superfences" => Self::SuperFences,
            "magiclink" => Self::MagicLink,
            "tasklist" => Self::TaskList,
            "tilde" => Self::Tilde,
            "emoji" => Self::Emoji,
            _ => return None,
        };
        Some(extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Permalink {
    Enabled(bool),
    Symbol(String),
}

impl Permalink {
    pub(crate) fn symbol(&self) -> Option<&str> {
        match self {
            Self::Enabled(true) => Some("\u{b6}"),
            Self::Enabled(false) => None,
            Self::Symbol(symbol) => Some(symbol.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TocConfig {
    pub(crate) permalink: Permalink,
    pub(crate) permalink_class: String,
    pub(crate) permalink_title: String,
    pub(crate) slug_prefix: String,
    pub(crate) separator: String,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            permalink: Permalink::Enabled(false),
            permalink_class: "headerlink".to_string(),
            permalink_title: "Permanent link".to_string(),
            slug_prefix: DEFAULT_SLUG_PREFIX.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CustomFence {
    pub(crate) name: String,
    pub(crate) class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FenceConfig {
    pub(crate) custom_fences: Vec<CustomFence>,
}

impl FenceConfig {
    pub(crate) fn custom_class(&self, language: &str) -> Option<&str> {
        self.custom_fences
            .iter()
            .find(|fence| fence.name.eq_ignore_ascii_case(language))
            .map(|fence| fence.class.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MagicLinkConfig {
    pub(crate) repo_url_shortener: bool,
    pub(crate) repo_url_shorthand: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TildeConfig {
    pub(crate) subscript: bool,
    pub(crate) delete: bool,
}

impl Default for TildeConfig {
    fn default() -> Self {
        Self {
            subscript: true,
            delete: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EmojiAlt {
    #[default]
    Short,
    Unicode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct EmojiConfig {
    pub(crate) alt: EmojiAlt,
    pub(crate) attributes: BTreeMap<String, String>,
    pub(crate) image_path: String,
    pub(crate) non_standard_image_path: String,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            alt: EmojiAlt::Short,
            attributes: BTreeMap::new(),
            image_path: "https://github.githubassets.com/images/icons/emoji/unicode/".to_string(),
            non_standard_image_path: "https://github.githubassets.com/images/icons/emoji/"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WikiLinkConfig {
    pub(crate) base_url: String,
    pub(crate) end_url: String,
    pub(crate) html_class: String,
}

impl Default for WikiLinkConfig {
    fn default() -> Self {
        Self {
            base_url: "/".to_string(),
            end_url: "/".to_string(),
            html_class: "wikilink".to_string(),
        }
    }
}

impl WikiLinkConfig {
    pub(crate) fn url_for(&self, label: &str) -> String {
        let page = label.trim().replace(' ', "_");
        format!("{}{page}{}", self.base_url, self.end_url)
    }
}

/// Immutable result of compiling an extension set. Holds no per-document
/// state.
#[derive(Debug, Clone)]
pub(crate) struct ExtensionPlan {
    pub(crate) order: Vec<Extension>,
    pub(crate) options: Options<'static>,
    pub(crate) toc: Option<TocConfig>,
    pub(crate) fences: Option<FenceConfig>,
    pub(crate) magiclink: Option<MagicLinkConfig>,
    pub(crate) emoji: Option<EmojiConfig>,
    pub(crate) wikilinks: Option<WikiLinkConfig>,
    /// Single-tilde spans are parsed as subscript only so they can be put
    /// back as literal text; `~~x~~` alone strikes through.
    pub(crate) literal_single_tilde: bool,
}

impl ExtensionPlan {
    pub(crate) fn compile(set: &ExtensionSet) -> Result<Self, CompilerError> {
        let mut plan = Self {
            order: Vec::with_capacity(set.names().len()),
            options: base_options(),
            toc: None,
            fences: None,
            magiclink: None,
            emoji: None,
            wikilinks: None,
            literal_single_tilde: false,
        };

        for (name, config) in set.iter() {
            let extension =
                Extension::from_name(name).ok_or_else(|| CompilerError::UnknownExtension {
                    name: name.to_string(),
                })?;
            plan.enable(extension, name, config)?;
            plan.order.push(extension);
        }

        Ok(plan)
    }

    pub(crate) fn enabled(&self, extension: Extension) -> bool {
        self.order.contains(&extension)
    }

    fn enable(
        &mut self,
        extension: Extension,
        name: &str,
        config: &ExtensionConfig,
    ) -> Result<(), CompilerError> {
        let ext = &mut self.options.extension;
        match extension {
            Extension::Footnotes => {
                reject_options(name, config)?;
                ext.footnotes = true;
            }
            Extension::DefList => {
                reject_options(name, config)?;
                ext.description_lists = true;
            }
            Extension::Tables => {
                reject_options(name, config)?;
                ext.table = true;
            }
            Extension::MdInHtml => {
                reject_options(name, config)?;
                ext.tagfilter = false;
            }
            Extension::Meta => {
                reject_options(name, config)?;
                ext.front_matter_delimiter = Some(FRONT_MATTER_DELIMITER.to_string());
            }
            Extension::Smarty => {
                reject_options(name, config)?;
                self.options.parse.smart = true;
            }
            Extension::WikiLinks => {
                ext.wikilinks_title_after_pipe = true;
                self.wikilinks = Some(parse_options(name, config)?);
            }
            Extension::Admonition => {
                reject_options(name, config)?;
                ext.alerts = true;
            }
            Extension::MagicLink => {
                ext.autolink = true;
                self.magiclink = Some(parse_options(name, config)?);
            }
            Extension::TaskList => {
                reject_options(name, config)?;
                ext.tasklist = true;
                self.options.render.tasklist_classes = true;
            }
            Extension::Tilde => {
                let tilde: TildeConfig = parse_options(name, config)?;
                self.literal_single_tilde = tilde.delete && !tilde.subscript;
                ext.strikethrough = tilde.delete;
                ext.subscript = tilde.subscript || self.literal_single_tilde;
            }
            Extension::Emoji => {
                ext.shortcodes = true;
                self.emoji = Some(parse_options(name, config)?);
            }
            Extension::Toc => {
                self.toc = Some(parse_options(name, config)?);
            }
            Extension::SuperFences => {
                let fences: FenceConfig = parse_options(name, config)?;
                let mut seen = HashSet::new();
                for fence in &fences.custom_fences {
                    if !seen.insert(fence.name.to_ascii_lowercase()) {
                        return Err(CompilerError::DuplicateFence {
                            name: fence.name.clone(),
                        });
                    }
                }
                self.fences = Some(fences);
            }
            Extension::AttrList | Extension::Abbr | Extension::BetterEm | Extension::SaneLists => {
                reject_options(name, config)?;
            }
        }
        Ok(())
    }
}

/// Options shared by every plan. Raw HTML always passes through, and block
/// source positions are emitted so the finishing pass can tell markdown
/// headings apart from raw HTML ones.
fn base_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.tagfilter = true;
    options.render.r#unsafe = true;
    options.render.sourcepos = true;
    options
}

fn parse_options<T: DeserializeOwned>(
    name: &str,
    config: &ExtensionConfig,
) -> Result<T, CompilerError> {
    serde_json::from_value(Value::Object(config.clone()))
        .map_err(|err| CompilerError::invalid_config(name, err))
}

fn reject_options(name: &str, config: &ExtensionConfig) -> Result<(), CompilerError> {
    match config.keys().next() {
        None => Ok(()),
        Some(key) => Err(CompilerError::invalid_config(
            name,
            format!("unexpected option `{key}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::extensions::{default_extensions, normalize};

    fn plan_for(entries: &[Value]) -> Result<ExtensionPlan, CompilerError> {
        ExtensionPlan::compile(&normalize(entries))
    }

    #[test]
    fn default_registry_compiles() {
        let plan = plan_for(&default_extensions()).expect("default plan");

        assert_eq!(plan.order.len(), 18);
        assert!(plan.options.extension.footnotes);
        assert!(plan.options.extension.table);
        assert!(plan.options.extension.strikethrough);
        assert!(plan.options.extension.subscript);
        assert!(plan.literal_single_tilde);
        assert!(!plan.options.extension.tagfilter);
        assert!(plan.options.extension.shortcodes);
        assert!(plan.options.parse.smart);

        let toc = plan.toc.expect("toc");
        assert_eq!(toc.slug_prefix, "markdown-header-");
        assert_eq!(toc.permalink.symbol(), Some("\u{e157}"));

        let fences = plan.fences.expect("fences");
        assert_eq!(fences.custom_class("Mermaid"), Some("mermaid"));
        assert_eq!(fences.custom_class("flow"), Some("uml-flowchart"));
        assert_eq!(fences.custom_class("rust"), None);
    }

    #[test]
    fn qualified_names_resolve() {
        assert_eq!(
            Extension::from_name("markdown.extensions.toc"),
            Some(Extension::Toc)
        );
        assert_eq!(Extension::from_name("pymdownx.tilde"), Some(Extension::Tilde));
        assert_eq!(Extension::from_name("pymdownx.unknown"), None);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = plan_for(&[json!("tables"), json!("smileys")]).expect_err("unknown");
        assert!(matches!(err, CompilerError::UnknownExtension { name } if name == "smileys"));
    }

    #[test]
    fn options_on_option_less_extension_are_rejected() {
        let err = plan_for(&[json!({ "footnotes": { "X": 1 } })]).expect_err("invalid");
        assert!(matches!(
            err,
            CompilerError::InvalidExtensionConfig { name, .. } if name == "footnotes"
        ));
    }

    #[test]
    fn unknown_option_keys_are_rejected() {
        let err = plan_for(&[json!({ "tilde": { "subscrip": true } })]).expect_err("typo");
        assert!(matches!(err, CompilerError::InvalidExtensionConfig { .. }));
    }

    #[test]
    fn duplicate_custom_fences_are_rejected() {
        let entries = [json!({
            "superfences": {
                "custom_fences": [
                    { "name": "flow", "class": "a" },
                    { "name": "FLOW", "class": "b" }
                ]
            }
        })];

        let err = plan_for(&entries).expect_err("duplicate");
        assert!(matches!(err, CompilerError::DuplicateFence { name } if name == "FLOW"));
    }

    #[test]
    fn tagfilter_applies_without_md_in_html() {
        let plan = plan_for(&[json!("tables")]).expect("plan");
        assert!(plan.options.extension.tagfilter);
        assert!(!plan.enabled(Extension::MdInHtml));
    }

    #[test]
    fn permalink_accepts_boolean_or_symbol() {
        let plan = plan_for(&[json!({ "toc": { "permalink": true } })]).expect("plan");
        assert_eq!(
            plan.toc.as_ref().and_then(|toc| toc.permalink.symbol()),
            Some("\u{b6}")
        );

        let plan = plan_for(&[json!("toc")]).expect("plan");
        assert_eq!(plan.toc.as_ref().and_then(|toc| toc.permalink.symbol()), None);
    }

    #[test]
    fn wikilink_urls_follow_base_and_end() {
        let config = WikiLinkConfig::default();
        assert_eq!(config.url_for("Page Name"), "/Page_Name/");
    }
}
