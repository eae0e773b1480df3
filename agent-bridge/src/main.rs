//! Bridge server: exposes a running game over HTTP for the agent.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agent_bridge::{AppState, serve};
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "agent-bridge")]
#[command(about = "HTTP bridge between the planning agent and the game")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3002")]
    port: u16,

    /// The game's world_data.txt
    #[arg(long, env = "BABA_WORLD_DATA")]
    world_data: PathBuf,

    /// Directory the game mod polls for command files
    #[arg(long, env = "BABA_COMMANDS_DIR")]
    commands_dir: PathBuf,

    /// Milliseconds to wait for the game to consume a command file (0 = don't wait)
    #[arg(long, default_value = "5000")]
    consume_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_bridge=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut state = AppState::new(args.world_data, args.commands_dir);
    if args.consume_timeout_ms > 0 {
        state = state.with_consume_timeout(Duration::from_millis(args.consume_timeout_ms));
    }
    state.commands.clear()?;
    info!(commands_dir = %state.commands.dir().display(), "starting agent-bridge");

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}
