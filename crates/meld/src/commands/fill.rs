//! `meld fill` command implementation.

use std::path::PathBuf;

use clap::Args;

use super::locate;
use crate::error::CliError;
use crate::output::Output;
use crate::settings::{GlobalArgs, write_output};

/// Arguments for the fill command.
#[derive(Args)]
pub(crate) struct FillArgs {
    /// Template path or URL.
    source: String,

    /// Slot assignment, repeatable.
    #[arg(long = "set", value_name = "ID=TEXT", value_parser = parse_assignment, required = true)]
    assignments: Vec<(String, String)>,

    /// Remove `meld:id` markers from the output.
    #[arg(long)]
    strip: bool,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Split `ID=TEXT` at the first `=`.
fn parse_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((id, _)) if id.is_empty() => Err(format!("missing slot id in {value:?}")),
        Some((id, text)) => Ok((id.to_owned(), text.to_owned())),
        None => Err(format!("expected ID=TEXT, got {value:?}")),
    }
}

impl FillArgs {
    pub(crate) fn execute(self, global: &GlobalArgs, output: &Output) -> Result<(), CliError> {
        let settings = global.settings()?;
        let root = settings.load(&self.source)?;

        for (id, text) in &self.assignments {
            locate(&root, id)?.fill(text.as_str())?;
            tracing::info!(id, "Filled slot");
        }

        let mut options = settings.serialize;
        if self.strip {
            options = options.pipeline(false);
        }
        let bytes = root.serialize(&options)?;
        write_output(&bytes, self.output.as_deref())?;

        if let Some(path) = &self.output {
            output.success(&format!(
                "Filled {} slot(s) into {}",
                self.assignments.len(),
                path.display()
            ));
        }
        Ok(())
    }
}
