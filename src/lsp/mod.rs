pub mod backend;
pub mod commands;
pub mod document;
pub mod folding;
pub mod hover;

pub use backend::DocstringBackend;
