//! Global flags and their translation into core option structs.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use meld_config::{CliSettings, Config};
use meld_xml::{Method, Node, ParseOptions, Renderer, RendererOptions, SerializeOptions, Source};

use crate::error::CliError;

/// Flags accepted by every command.
#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Path to configuration file (default: auto-discover meld.toml).
    #[arg(short, long, global = true, env = "MELD_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Log at info level.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,

    /// Input and output encoding (overrides config).
    #[arg(long, global = true)]
    pub(crate) encoding: Option<String>,

    /// Indent the output.
    #[arg(long, global = true)]
    pub(crate) pretty: bool,

    /// Write an XML declaration.
    #[arg(long, global = true)]
    pub(crate) xml_declaration: bool,
}

impl GlobalArgs {
    /// Load the configuration with these flags applied on top.
    pub(crate) fn settings(&self) -> Result<Settings, CliError> {
        let cli_settings = CliSettings {
            encoding: self.encoding.clone(),
            pretty_print: self.pretty.then_some(true),
            xml_declaration: self.xml_declaration.then_some(true),
            check_attributes: None,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            tracing::info!(path = %path.display(), "Loaded configuration");
        }
        Settings::from_config(&config)
    }
}

/// Resolved options for one run.
#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) renderer: RendererOptions,
    pub(crate) parse: ParseOptions,
    pub(crate) serialize: SerializeOptions,
}

impl Settings {
    pub(crate) fn from_config(config: &Config) -> Result<Self, CliError> {
        let method = config
            .output
            .method
            .parse::<Method>()
            .map_err(CliError::Validation)?;

        Ok(Self {
            renderer: RendererOptions {
                check_attributes: config.renderer.check_attributes,
                namespaces: config.renderer.namespaces.clone(),
                default_namespace: config.renderer.default_namespace.clone(),
            },
            parse: ParseOptions::default()
                .encoding(config.parse.encoding.as_str())
                .no_leading_text(config.parse.no_leading_text)
                .fetch_timeout(config.parse.fetch_timeout()),
            serialize: SerializeOptions::default()
                .method(method)
                .encoding(config.output.encoding.as_str())
                .xml_declaration(config.output.xml_declaration)
                .pretty_print(config.output.pretty_print)
                .pipeline(config.output.pipeline),
        })
    }

    /// Parse the document at `location`, a path or URL.
    pub(crate) fn load(&self, location: &str) -> Result<Node, CliError> {
        let renderer = Renderer::with_options(self.renderer.clone())?;
        let root = renderer.parse(Source::locate(location), &self.parse)?;
        tracing::info!(location, "Parsed template");
        Ok(root)
    }
}

/// Write `bytes` to `path`, or to stdout without one.
pub(crate) fn write_output(bytes: &[u8], path: Option<&Path>) -> Result<(), CliError> {
    match path {
        Some(path) => std::fs::write(path, bytes)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
