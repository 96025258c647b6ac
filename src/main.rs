use clap::{Parser, Subcommand};
use std::io::Write;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adk_stream::chat::collect_reply_with;
use adk_stream::config::ClientConfig;
use adk_stream::db::{Db, FAILED_TURN_NOTICE};
use adk_stream::devserver::{self, DevState};
use adk_stream::AgentClient;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "adk-stream", about = "Chat with an ADK agent backend over SSE")]
struct Cli {
    /// Backend base url, overrides ADK_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the local echo backend.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        /// Pause between streamed characters.
        #[arg(long, default_value_t = 10)]
        char_delay_ms: u64,
    },
    /// Send one message and stream the reply to stdout.
    Chat {
        message: String,
        /// Reuse an existing session instead of creating one.
        #[arg(long)]
        session: Option<String>,
        #[arg(long, env = "ADK_AGENT_ID")]
        agent: Option<String>,
    },
    /// List the agents the backend offers.
    Agents,
    /// List the configured user's sessions on the backend.
    Sessions,
    /// Print the transcript of a session.
    History {
        session: String,
        /// Ask the backend instead of the local database.
        #[arg(long)]
        remote: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command {
        Command::Serve {
            addr,
            char_delay_ms,
        } => {
            devserver::serve(addr, DevState::new(Duration::from_millis(char_delay_ms))).await?;
        }
        Command::Chat {
            message,
            session,
            agent,
        } => {
            let agent_id = agent.unwrap_or_else(|| config.agent_id.clone());
            chat(&config, &agent_id, session, &message).await?;
        }
        Command::Agents => {
            let client = AgentClient::new(&config)?;
            for agent in client.list_agents().await? {
                println!("{} {:<20} {}", agent.icon, agent.id, agent.description);
            }
        }
        Command::Sessions => {
            let client = AgentClient::new(&config)?;
            for session in client.list_sessions(&config.user_id).await? {
                println!("{}  {:<20} {}", session.id, session.agent_id, session.updated_at);
            }
        }
        Command::History { session, remote } if remote => {
            let client = AgentClient::new(&config)?;
            for message in client.get_messages(&session).await? {
                println!("[{}] {}", message.role.as_str(), message.content);
            }
        }
        Command::History { session, .. } => {
            let db = open_db(&config).await?.ok_or("DATABASE_URL is not set")?;
            for message in db.load_messages(&session).await? {
                println!("[{}] {}", message.role.as_str(), message.content);
            }
        }
    }
    Ok(())
}

async fn open_db(config: &ClientConfig) -> Result<Option<Db>, BoxError> {
    match &config.database_url {
        Some(url) => Ok(Some(Db::new(url).await?)),
        None => Ok(None),
    }
}

async fn chat(
    config: &ClientConfig,
    agent_id: &str,
    session_id: Option<String>,
    message: &str,
) -> Result<(), BoxError> {
    let client = AgentClient::new(config)?;
    let db = open_db(config).await?;

    let session = match session_id {
        Some(id) => client.get_session(&id).await?,
        None => client.create_session(&config.user_id, agent_id).await?,
    };
    if let Some(db) = &db {
        db.upsert_session(&session).await?;
    }

    let mut printed = String::new();
    let outcome = match client.open_stream(agent_id, &session.id, message).await {
        Ok(frames) => {
            let mut stdout = std::io::stdout();
            collect_reply_with(frames, |piece| {
                printed.push_str(piece);
                let _ = stdout.write_all(piece.as_bytes());
                let _ = stdout.flush();
            })
            .await
            .map_err(BoxError::from)
        }
        Err(e) => Err(e.into()),
    };
    println!();

    match outcome {
        Ok(reply) if reply.is_failed() => {
            if let Some(db) = &db {
                db.record_turn(&session.id, message, &reply).await?;
            }
            println!("[system] {}", FAILED_TURN_NOTICE);
            Err(format!("agent failed: {}", reply.agent_errors.join("; ")).into())
        }
        Ok(reply) => {
            if let Some(db) = &db {
                db.record_turn(&session.id, message, &reply).await?;
            }
            if !reply.completed_normally() {
                tracing::warn!(completion = ?reply.completion, "reply may be incomplete");
            }
            tracing::info!(session_id = %session.id, "turn complete");
            Ok(())
        }
        Err(e) => {
            if let Some(db) = &db {
                db.record_failed_turn(&session.id, message, &printed).await?;
            }
            println!("[system] {}", FAILED_TURN_NOTICE);
            Err(e)
        }
    }
}
