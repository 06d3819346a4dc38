pub mod cache;
pub mod config;
pub mod docstrings;
pub mod logging;
pub mod lsp;
