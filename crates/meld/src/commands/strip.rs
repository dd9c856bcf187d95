//! `meld strip` command implementation.

use std::path::PathBuf;

use clap::Args;

use crate::error::CliError;
use crate::output::Output;
use crate::settings::{GlobalArgs, write_output};

/// Arguments for the strip command.
#[derive(Args)]
pub(crate) struct StripArgs {
    /// Template path or URL.
    source: String,

    /// Output file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl StripArgs {
    pub(crate) fn execute(self, global: &GlobalArgs, output: &Output) -> Result<(), CliError> {
        let settings = global.settings()?;
        let root = settings.load(&self.source)?;

        let options = settings.serialize.pipeline(false);
        let bytes = root.serialize(&options)?;
        write_output(&bytes, self.output.as_deref())?;

        if let Some(path) = &self.output {
            output.success(&format!("Wrote {}", path.display()));
        }
        Ok(())
    }
}
