//! Configuration layer: typed settings with layered precedence
//! (default file → local file → explicit file → environment).

use std::{
    num::NonZeroU64,
    path::{Path, PathBuf},
    str::FromStr,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::render::{CompilerOptions, DEFAULT_MAX_EMBED_BYTES},
    domain::extensions::default_extensions,
    infra::assets::{DEFAULT_HIGHLIGHT_CLASS, DEFAULT_HIGHLIGHT_STYLE, default_asset_dir},
    util::bytes::parse_bytes,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mdpress";
const ENV_PREFIX: &str = "MDPRESS";

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub embed_stylesheets: bool,
    pub convert_images_to_base64: bool,
    pub asset_dir: PathBuf,
    pub highlight_style: String,
    pub highlight_class: String,
    pub max_embed_bytes: NonZeroU64,
    pub extensions: Vec<Value>,
}

impl From<&RenderSettings> for CompilerOptions {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            embed_stylesheets: settings.embed_stylesheets,
            convert_images_to_base64: settings.convert_images_to_base64,
            asset_dir: settings.asset_dir.clone(),
            highlight_style: settings.highlight_style.clone(),
            highlight_class: settings.highlight_class.clone(),
            max_embed_bytes: settings.max_embed_bytes.get(),
            extensions: settings.extensions.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings. `config_file`, when given, must exist; environment
/// variables such as `MDPRESS__RENDER__HIGHLIGHT_STYLE` override every file.
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, render } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;

        Ok(Self { logging, render })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let asset_dir = render.asset_dir.unwrap_or_else(default_asset_dir);
    if asset_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.asset_dir",
            "path must not be empty",
        ));
    }

    let highlight_style = render
        .highlight_style
        .map(|style| style.trim().to_string())
        .unwrap_or_else(|| DEFAULT_HIGHLIGHT_STYLE.to_string());
    if highlight_style.is_empty() {
        return Err(LoadError::invalid(
            "render.highlight_style",
            "must not be empty",
        ));
    }
    if highlight_style.contains(['/', '\\']) || highlight_style.contains("..") {
        return Err(LoadError::invalid(
            "render.highlight_style",
            format!("`{highlight_style}` is not a style name"),
        ));
    }

    let highlight_class = render
        .highlight_class
        .unwrap_or_else(|| DEFAULT_HIGHLIGHT_CLASS.to_string());
    if highlight_class.split_whitespace().next().is_none() {
        return Err(LoadError::invalid(
            "render.highlight_class",
            "must name at least one class",
        ));
    }

    let max_embed_bytes = match render.max_embed_bytes {
        None => DEFAULT_MAX_EMBED_BYTES,
        Some(RawByteSize::Bytes(bytes)) => bytes,
        Some(RawByteSize::Text(text)) => parse_bytes(&text).ok_or_else(|| {
            LoadError::invalid(
                "render.max_embed_bytes",
                format!("`{text}` is not a byte size"),
            )
        })?,
    };
    let max_embed_bytes = NonZeroU64::new(max_embed_bytes).ok_or_else(|| {
        LoadError::invalid("render.max_embed_bytes", "must be greater than zero")
    })?;

    let extensions = match render.extensions {
        Some(extensions) if extensions.is_empty() => {
            return Err(LoadError::invalid(
                "render.extensions",
                "list must not be empty; omit it to use the defaults",
            ));
        }
        Some(extensions) => extensions,
        None => default_extensions(),
    };

    Ok(RenderSettings {
        embed_stylesheets: render.embed_stylesheets.unwrap_or(true),
        convert_images_to_base64: render.convert_images_to_base64.unwrap_or(false),
        asset_dir,
        highlight_style,
        highlight_class,
        max_embed_bytes,
        extensions,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    embed_stylesheets: Option<bool>,
    convert_images_to_base64: Option<bool>,
    asset_dir: Option<PathBuf>,
    highlight_style: Option<String>,
    highlight_class: Option<String>,
    max_embed_bytes: Option<RawByteSize>,
    extensions: Option<Vec<Value>>,
}

/// A size given either as a plain number of bytes or as text like `"5 MiB"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawByteSize {
    Bytes(u64),
    Text(String),
}
