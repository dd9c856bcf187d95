//! CLI command implementations.

mod fill;
mod find;
mod strip;

pub(crate) use fill::FillArgs;
pub(crate) use find::FindArgs;
pub(crate) use strip::StripArgs;

use meld_xml::{MeldError, Node};

/// The node carrying `id`, the root included.
fn locate(root: &Node, id: &str) -> Result<Node, MeldError> {
    if root.meld_id_value().as_deref() == Some(id) {
        return Ok(root.clone());
    }
    root.find_meld(id)
        .ok_or_else(|| MeldError::MeldNotFound(id.to_owned()))
}
