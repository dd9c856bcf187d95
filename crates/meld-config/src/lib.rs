//! Configuration for the meld tools.
//!
//! Parses `meld.toml` with serde and discovers it in the current directory
//! or its parents. Command-line overrides are applied through
//! [`CliSettings`] after loading.
//!
//! ## Environment Variable Expansion
//!
//! String values support:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `renderer.default_namespace`
//! - `renderer.namespaces.*`
//! - `parse.encoding`
//! - `output.method`
//! - `output.encoding`

mod expand;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "meld.toml";

/// Encoding labels understood by the parser and the serializer.
pub const SUPPORTED_ENCODINGS: [&str; 4] = ["utf-8", "utf8", "us-ascii", "ascii"];

/// Output methods understood by the serializer.
pub const OUTPUT_METHODS: [&str; 3] = ["xml", "html", "text"];

/// Overrides taken from the command line.
///
/// Only `Some` values replace what was loaded.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Encoding for both parsing and output.
    pub encoding: Option<String>,
    /// Indent the output.
    pub pretty_print: Option<bool>,
    /// Write an XML declaration.
    pub xml_declaration: Option<bool>,
    /// Enforce attribute whitelists.
    pub check_attributes: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node factory settings.
    pub renderer: RendererConfig,
    /// Input settings.
    pub parse: ParseConfig,
    /// Output settings.
    pub output: OutputConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// `[renderer]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Reject attributes outside a tag's declared whitelist.
    pub check_attributes: bool,
    /// Prefix, declared in `namespaces`, qualifying every created element.
    pub default_namespace: Option<String>,
    /// Prefix to URI table.
    pub namespaces: BTreeMap<String, String>,
}

/// `[parse]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Encoding of byte input.
    pub encoding: String,
    /// Drop text before the first element of a fragment.
    pub no_leading_text: bool,
    /// Timeout for remote sources, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_owned(),
            no_leading_text: false,
            fetch_timeout_secs: 30,
        }
    }
}

impl ParseConfig {
    /// Fetch timeout as a [`Duration`].
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// `[output]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `xml`, `html` or `text`.
    pub method: String,
    /// Output encoding label.
    pub encoding: String,
    /// Write `<?xml ...?>` first.
    pub xml_declaration: bool,
    /// Indent element-only content.
    pub pretty_print: bool,
    /// Keep `meld:id` markers in the output.
    pub pipeline: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            method: "xml".to_owned(),
            encoding: "utf-8".to_owned(),
            xml_declaration: false,
            pretty_print: false,
            pipeline: true,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`output.encoding`").
        field: String,
        /// Error message (e.g., "${`MELD_ENCODING`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_one_of(value: &str, allowed: &[&str], field: &str) -> Result<(), ConfigError> {
    if !allowed.contains(&value.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "{field} must be one of {}, got {value:?}",
            allowed.join(", ")
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration with optional CLI overrides.
    ///
    /// An explicit `config_path` must exist. Without one, `meld.toml` is
    /// searched in the current directory and its parents; defaults are used
    /// when none is found.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing, cannot be read or
    /// parsed, references an unset variable, or fails validation.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = std::env::current_dir()
            .ok()
            .and_then(|cwd| discover_config(&cwd))
        {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(encoding) = &settings.encoding {
            self.parse.encoding.clone_from(encoding);
            self.output.encoding.clone_from(encoding);
        }
        if let Some(pretty_print) = settings.pretty_print {
            self.output.pretty_print = pretty_print;
        }
        if let Some(xml_declaration) = settings.xml_declaration {
            self.output.xml_declaration = xml_declaration;
        }
        if let Some(check_attributes) = settings.check_attributes {
            self.renderer.check_attributes = check_attributes;
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());
        config.validate()?;

        Ok(config)
    }

    /// Check option values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_renderer()?;

        require_one_of(&self.parse.encoding, &SUPPORTED_ENCODINGS, "parse.encoding")?;
        if self.parse.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "parse.fetch_timeout_secs must be greater than 0".to_owned(),
            ));
        }

        require_one_of(&self.output.method, &OUTPUT_METHODS, "output.method")?;
        require_one_of(&self.output.encoding, &SUPPORTED_ENCODINGS, "output.encoding")?;
        Ok(())
    }

    fn validate_renderer(&self) -> Result<(), ConfigError> {
        for (prefix, uri) in &self.renderer.namespaces {
            require_non_empty(prefix, "renderer.namespaces prefix")?;
            require_non_empty(uri, &format!("renderer.namespaces.{prefix}"))?;
        }
        if let Some(prefix) = &self.renderer.default_namespace
            && !self.renderer.namespaces.contains_key(prefix)
        {
            return Err(ConfigError::Validation(format!(
                "renderer.default_namespace {prefix:?} is not declared in [renderer.namespaces]"
            )));
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.renderer.default_namespace {
            self.renderer.default_namespace =
                Some(expand::expand_env(prefix, "renderer.default_namespace")?);
        }
        for (prefix, uri) in &mut self.renderer.namespaces {
            *uri = expand::expand_env(uri, &format!("renderer.namespaces.{prefix}"))?;
        }

        self.parse.encoding = expand::expand_env(&self.parse.encoding, "parse.encoding")?;
        self.output.method = expand::expand_env(&self.output.method, "output.method")?;
        self.output.encoding = expand::expand_env(&self.output.encoding, "output.encoding")?;

        Ok(())
    }
}

/// Search `start` and its parents for the config file.
fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}
