//! `workspace/executeCommand` commands

use serde_json::Value;
use thiserror::Error;
use tower_lsp::lsp_types::Url;

pub const CLEAR_CACHE: &str = "docstrings.clearCache";
pub const CACHE_STATS: &str = "docstrings.cacheStats";
pub const SUPPORTED_LANGUAGES: &str = "docstrings.supportedLanguages";
pub const LIST_BLOCKS: &str = "docstrings.listBlocks";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ClearCache,
    CacheStats,
    SupportedLanguages,
    ListBlocks(Url),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Command names advertised in server capabilities
pub fn command_names() -> Vec<String> {
    [CLEAR_CACHE, CACHE_STATS, SUPPORTED_LANGUAGES, LIST_BLOCKS]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl Command {
    pub fn parse(name: &str, arguments: &[Value]) -> Result<Self, CommandError> {
        match name {
            CLEAR_CACHE => Ok(Command::ClearCache),
            CACHE_STATS => Ok(Command::CacheStats),
            SUPPORTED_LANGUAGES => Ok(Command::SupportedLanguages),
            LIST_BLOCKS => {
                let uri = arguments
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| CommandError::InvalidArguments(format!("{LIST_BLOCKS} expects a document URI")))?;
                Url::parse(uri)
                    .map(Command::ListBlocks)
                    .map_err(|e| CommandError::InvalidArguments(format!("'{uri}' is not a URI: {e}")))
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
