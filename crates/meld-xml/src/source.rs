//! Where markup comes from: in-memory text or bytes, a file, or a URL.

use std::path::PathBuf;
use std::time::Duration;

use ureq::Agent;

use crate::error::ParseError;

/// Default timeout for remote sources, in seconds.
pub const DEFAULT_FETCH_TIMEOUT: u64 = 30;

/// Markup to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Already decoded text.
    Text(String),
    /// Raw bytes, decoded with the parse encoding.
    Bytes(Vec<u8>),
    /// Local file.
    Path(PathBuf),
    /// Remote document fetched over HTTP(S).
    Url(String),
}

impl Source {
    /// Classify a location string: `http://`, `https://` and `ftp://`
    /// prefixes make a URL, anything else a file path.
    #[must_use]
    pub fn locate(location: &str) -> Self {
        if is_url(location) {
            Self::Url(location.to_owned())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// Load the raw content. Text sources are returned as UTF-8 bytes.
    pub(crate) fn load(self, timeout: Duration) -> Result<Loaded, ParseError> {
        match self {
            Self::Text(text) => Ok(Loaded::Text(text)),
            Self::Bytes(bytes) => Ok(Loaded::Bytes(bytes)),
            Self::Path(path) => {
                let bytes = std::fs::read(&path)?;
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "Read source file");
                Ok(Loaded::Bytes(bytes))
            }
            Self::Url(url) => fetch(&url, timeout).map(Loaded::Bytes),
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&std::path::Path> for Source {
    fn from(path: &std::path::Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

pub(crate) enum Loaded {
    Text(String),
    Bytes(Vec<u8>),
}

fn is_url(location: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| location.starts_with(scheme))
}

fn fetch(url: &str, timeout: Duration) -> Result<Vec<u8>, ParseError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        let scheme = url.split_once("://").map_or(url, |(scheme, _)| scheme);
        return Err(ParseError::UnsupportedScheme(scheme.to_owned()));
    }

    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into();

    let response = agent.get(url).call()?;
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(ParseError::Http {
            url: url.to_owned(),
            status,
        });
    }
    let bytes = response.into_body().read_to_vec()?;
    tracing::debug!(url, status, bytes = bytes.len(), "Fetched remote source");
    Ok(bytes)
}
