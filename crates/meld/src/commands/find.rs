//! `meld find` command implementation.

use clap::Args;

use super::locate;
use crate::error::CliError;
use crate::output::Output;
use crate::settings::{GlobalArgs, write_output};

/// Arguments for the find command.
#[derive(Args)]
pub(crate) struct FindArgs {
    /// Template path or URL.
    source: String,

    /// Value of the `meld:id` attribute to look for.
    id: String,
}

impl FindArgs {
    pub(crate) fn execute(self, global: &GlobalArgs, output: &Output) -> Result<(), CliError> {
        let settings = global.settings()?;
        let root = settings.load(&self.source)?;
        let node = locate(&root, &self.id)?;

        let options = settings.serialize.pipeline(true);
        let mut bytes = node.serialize(&options)?;
        if !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }
        write_output(&bytes, None)?;

        output.info(&format!(
            "{} children under {:?}",
            node.len(),
            node.local_name().unwrap_or_default()
        ));
        Ok(())
    }
}
