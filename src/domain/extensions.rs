//! Declarative grammar-extension descriptors.
//!
//! Extension lists are written the way they appear in configuration files:
//! every entry is either a bare extension name or a single-key object mapping
//! the name to its options. [`normalize`] turns such a list into an ordered
//! name sequence plus a per-name option table. Order is significant: it is the
//! order in which the render pipeline applies extension stages.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::warn;

/// Options attached to a single extension.
pub type ExtensionConfig = Map<String, Value>;

/// A single normalized entry of an extension list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub config: ExtensionConfig,
}

impl ExtensionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ExtensionConfig::new(),
        }
    }

    /// Interpret one raw list entry. Returns `None` for anything that is not a
    /// non-empty name or a single-key `{ name: options }` object.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => {
                let name = name.trim();
                (!name.is_empty()).then(|| Self::new(name))
            }
            Value::Object(entry) if entry.len() == 1 => {
                let (name, config) = entry.iter().next()?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let config = match config {
                    Value::Null => ExtensionConfig::new(),
                    Value::Object(options) => options.clone(),
                    _ => return None,
                };
                Some(Self {
                    name: name.to_string(),
                    config,
                })
            }
            _ => None,
        }
    }
}

/// Ordered extension names plus their options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionSet {
    names: Vec<String>,
    configs: BTreeMap<String, ExtensionConfig>,
    dropped: usize,
}

impl ExtensionSet {
    /// Extension names in application order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn config(&self, name: &str) -> Option<&ExtensionConfig> {
        self.configs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// Number of malformed entries skipped during normalization.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(name, options)` pairs in application order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtensionConfig)> {
        self.names.iter().filter_map(|name| {
            self.configs
                .get(name)
                .map(|config| (name.as_str(), config))
        })
    }

    fn insert(&mut self, descriptor: ExtensionDescriptor) {
        if !self.configs.contains_key(&descriptor.name) {
            self.names.push(descriptor.name.clone());
        }
        self.configs.insert(descriptor.name, descriptor.config);
    }
}

impl FromIterator<ExtensionDescriptor> for ExtensionSet {
    fn from_iter<I: IntoIterator<Item = ExtensionDescriptor>>(iter: I) -> Self {
        let mut set = Self::default();
        for descriptor in iter {
            set.insert(descriptor);
        }
        set
    }
}

/// Normalize a heterogeneous extension list.
///
/// Malformed entries are skipped rather than rejected; each one is logged and
/// counted in [`ExtensionSet::dropped`]. A repeated name keeps its first
/// position and takes the options of its last occurrence.
pub fn normalize(entries: &[Value]) -> ExtensionSet {
    let mut set = ExtensionSet::default();

    for (index, entry) in entries.iter().enumerate() {
        match ExtensionDescriptor::from_value(entry) {
            Some(descriptor) => set.insert(descriptor),
            None => {
                set.dropped += 1;
                warn!(
                    target = "domain::extensions",
                    index,
                    entry = %entry,
                    "Dropping malformed extension descriptor"
                );
            }
        }
    }

    set
}

/// The built-in extension list reproducing GitHub's rendering conventions.
pub fn default_extensions() -> Vec<Value> {
    vec![
        json!("footnotes"),
        json!("attr_list"),
        json!("def_list"),
        json!("tables"),
        json!("abbr"),
        json!("md_in_html"),
        json!("betterem"),
        json!({
            "toc": {
                "permalink": "\u{e157}",
                "slug_prefix": "markdown-header-"
            }
        }),
        json!("meta"),
        json!("sane_lists"),
        json!("smarty"),
        json!("wikilinks"),
        json!("admonition"),
        json!({
            "superfences": {
                "custom_fences": [
                    { "name": "flow", "class": "uml-flowchart" },
                    { "name": "sequence", "class": "uml-sequence-diagram" },
                    { "name": "mermaid", "class": "mermaid" }
                ]
            }
        }),
        json!({
            "magiclink": {
                "repo_url_shortener": true,
                "repo_url_shorthand": true
            }
        }),
        json!("tasklist"),
        json!({ "tilde": { "subscript": false } }),
        json!({
            "emoji": {
                "alt": "short",
                "attributes": {
                    "align": "absmiddle",
                    "height": "20px",
                    "width": "20px"
                },
                "image_path": "https://github.githubassets.com/images/icons/emoji/unicode/",
                "non_standard_image_path": "https://github.githubassets.com/images/icons/emoji/"
            }
        }),
    ]
}
