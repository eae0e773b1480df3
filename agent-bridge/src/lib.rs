//! HTTP bridge between the agent and a running game.
//!
//! The game mod dumps the board to `world_data.txt` and executes `<k>.lua`
//! files dropped into a commands directory. The bridge serves the board as
//! grid text and turns requests into command files.

pub mod commands;
pub mod grid;
pub mod routes;
pub mod state;
pub mod world_data;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use crate::state::AppState;

/// Where the bridge listens and which game files it works on.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub addr: SocketAddr,
    pub world_data: PathBuf,
    pub commands_dir: PathBuf,
    pub consume_timeout: Option<Duration>,
}

impl BridgeConfig {
    fn state(&self) -> AppState {
        let state = AppState::new(&self.world_data, &self.commands_dir);
        match self.consume_timeout {
            Some(timeout) => state.with_consume_timeout(timeout),
            None => state,
        }
    }
}

/// The full application: API routes plus permissive CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    routes::api_router().layer(cors).with_state(state)
}

/// Serve `state` on an already bound listener until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().context("read listener address")?;
    info!(%addr, world_data = %state.world_data.display(), "bridge listening");
    axum::serve(listener, app(state))
        .await
        .context("serve bridge")
}

/// A bridge running on its own thread and runtime.
pub struct BridgeHandle {
    addr: SocketAddr,
    thread: JoinHandle<Result<()>>,
}

impl BridgeHandle {
    /// The bound address, with the real port when `:0` was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the server thread; only returns when the server failed.
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .map_err(|_| anyhow!("bridge thread panicked"))?
    }
}

/// Start the bridge on an auxiliary thread with a dedicated tokio runtime.
///
/// The socket is bound before this returns, so clients may connect at once.
/// Stale command files are removed first.
pub fn spawn(config: &BridgeConfig) -> Result<BridgeHandle> {
    let state = config.state();
    state.commands.clear()?;

    let listener = std::net::TcpListener::bind(config.addr)
        .with_context(|| format!("bind bridge to {}", config.addr))?;
    listener
        .set_nonblocking(true)
        .context("set bridge listener non-blocking")?;
    let addr = listener.local_addr().context("read bridge address")?;

    let thread = std::thread::Builder::new()
        .name("agent-bridge".to_string())
        .spawn(move || -> Result<()> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("build bridge runtime")?;
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)
                    .context("adopt bridge listener")?;
                serve(listener, state).await
            })
        })
        .context("spawn bridge thread")?;

    Ok(BridgeHandle { addr, thread })
}
