//! SchemaForge terminal client.
//!
//! Chat with the schema design agent, watch the schema take shape and export
//! the results, all from the terminal.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use schemaforge_core::{Config, Exporter, HttpAgentClient};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "schemaforge")]
#[command(version, about = "Design database schemas by chatting with the SchemaForge agent")]
struct Cli {
    /// Base URL of the SchemaForge agent
    #[arg(long, env = "SCHEMAFORGE_SERVER_URL")]
    server: Option<String>,

    /// Conversation session id sent with every request
    #[arg(long)]
    session: Option<String>,

    /// Directory exported files are saved to
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Start with the schema panel hidden
    #[arg(long)]
    no_diagram: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log file (the terminal is taken by the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("schemaforge")
        .join("schemaforge.log")
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("schemaforge=info"));

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    loaded.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not load config, using defaults");
        Config::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = cli.log_file.clone().unwrap_or_else(default_log_path);
    init_logging(&log_path)?;

    let config = load_config(cli.config.as_deref());

    let server_url = cli
        .server
        .clone()
        .unwrap_or_else(|| config.server_url().to_string());
    let session_id = cli.session.clone().or_else(|| config.session_id.clone());
    let export_dir = cli.export_dir.clone().unwrap_or_else(|| config.export_dir());

    let agent = HttpAgentClient::new(&server_url).with_session(session_id);
    let exporter = Exporter::new(export_dir);
    tracing::info!(
        server = agent.base_url(),
        export_dir = %exporter.dir().display(),
        "starting schemaforge"
    );

    let server_url = agent.base_url().to_string();
    let mut events = EventHandler::new();

    let mut app = App::new(Arc::new(agent), exporter, server_url, events.sender());
    app.conversation
        .set_show_diagram(!cli.no_diagram && config.show_diagram());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;

    if let Err(err) = &result {
        tracing::error!(error = %err, "schemaforge exited with an error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
