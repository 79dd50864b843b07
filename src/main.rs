//! Command line REPL for the web reader.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use webreader::browser::StaticBrowser;
use webreader::config::ReaderConfig;
use webreader::llm::OllamaClient;
use webreader::session::ReaderSession;
use webreader::speech::ConsoleSpeech;

#[derive(Parser, Debug)]
#[command(
    name = "webreader",
    version,
    about = "Natural-language screen reader agent for the web"
)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the model endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the model name.
    #[arg(long)]
    model: Option<String>,

    /// Open this address before reading commands.
    #[arg(long)]
    open: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ReaderConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.llm.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    let config = Arc::new(config);

    let llm = Arc::new(OllamaClient::new(&config.llm)?);
    let driver = Arc::new(StaticBrowser::with_sample_site());
    let speech = Arc::new(ConsoleSpeech::new());
    let mut session = ReaderSession::new(driver, llm, speech, config);
    info!(session = %session.id(), "reader session started");

    println!("Web reader ready. Try: 'go to example.com', 'list headings', 'next'.");
    println!("Say 'stop' to silence speech, 'quit' to exit.");

    // Responses are printed by the console speech sink.
    if let Some(address) = cli.open {
        session.handle_command(&format!("go to {address}")).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input.to_lowercase().as_str() {
            "quit" | "exit" | "q" => break,
            "stop" => {
                session.stop_speaking();
                continue;
            }
            _ => {}
        }
        session.handle_command(input).await;
    }

    session.cleanup().await?;
    info!("reader session closed");
    Ok(())
}
