use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rivalscope_config::{AppConfig, ConfigLoader};
use rivalscope_db::SessionMemory;
use rivalscope_gateway::GatewayServer;
use rivalscope_gateway::bootstrap::build_agent_runtime;
use rivalscope_security::RedactingWriter;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Competitive-intelligence advisor backend.
#[derive(Parser)]
#[command(name = "rivalscope", version, about)]
struct Cli {
    /// Config file (default: ~/.rivalscope/config.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Inspect or maintain the stored conversation
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show configuration, memory mode and provider health
    Status,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the stored conversation
    Show {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored conversation
    Clear,
    /// Drop repeated records, keeping first occurrences
    Dedupe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ConfigLoader::new(cli.config.clone())
        .load()
        .context("failed to load configuration")?;
    info!(
        session_id = %config.memory.session_id,
        backend = ?config.memory.backend,
        providers = config.llm.len(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::History { action } => history(config, action).await,
        Commands::Status => status(config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    info!(
        "starting rivalscope {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.gateway.host,
        config.gateway.port
    );
    GatewayServer::new(config)
        .run()
        .await
        .context("gateway stopped with an error")
}

async fn history(config: AppConfig, action: HistoryAction) -> anyhow::Result<()> {
    let memory = SessionMemory::connect(&config.memory).await;
    info!(
        mode = memory.mode().as_str(),
        "history command on session '{}'",
        memory.session_id()
    );

    match action {
        HistoryAction::Show { json } => {
            let records = memory.get_messages().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No messages stored for session '{}'.", memory.session_id());
            } else {
                for record in &records {
                    println!("[{}] {}", record.role, record.content);
                }
            }
        }
        HistoryAction::Clear => {
            memory.clear().await;
            println!("Memory cleared for session '{}'.", memory.session_id());
        }
        HistoryAction::Dedupe => {
            let removed = memory.dedupe().await;
            println!("Removed {removed} duplicate message(s).");
        }
    }
    Ok(())
}

async fn status(config: AppConfig) -> anyhow::Result<()> {
    let memory = SessionMemory::connect(&config.memory).await;
    let runtime = build_agent_runtime(&config);

    println!("rivalscope {}", env!("CARGO_PKG_VERSION"));
    println!(
        "gateway:   {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "memory:    {} ({:?} backend, session '{}')",
        memory.mode().as_str(),
        config.memory.backend,
        memory.session_id()
    );

    let health = runtime.health_check_all().await;
    if health.is_empty() {
        println!("providers: none configured");
    }
    for (id, healthy) in health {
        println!(
            "provider:  {id} {}",
            if healthy { "reachable" } else { "unreachable" }
        );
    }

    let tools = runtime.tool_names();
    if tools.is_empty() {
        println!("tools:     none");
    } else {
        println!("tools:     {}", tools.join(", "));
    }
    Ok(())
}
