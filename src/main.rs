use anyhow::{Context, Result};
use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::info;

use docstring_language_server::logging::init_logger;
use docstring_language_server::lsp::DocstringBackend;

/// Language server exposing documentation comments as folding ranges and hovers
#[derive(Parser, Debug)]
#[command(name = "docstring-language-server", version, about)]
struct Args {
    /// Log level for stderr output (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors in stderr output
    #[arg(long)]
    no_color: bool,

    /// Do not write a session log to the cache directory
    #[arg(long)]
    no_file_logging: bool,

    /// Communicate over stdio (the only transport; accepted for client compatibility)
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_logging)
        .context("failed to initialize logging")?;

    info!("Starting docstring-language-server {}", env!("CARGO_PKG_VERSION"));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(DocstringBackend::new);

    Server::new(stdin, stdout, socket).serve(service).await;

    info!("Server stopped");
    Ok(())
}
