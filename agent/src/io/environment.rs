//! Client for the live game, reached through the bridge service.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::action::{Action, format_plan};
use crate::core::world::{Outcome, WorldState};
use crate::io::config::EnvironmentConfig;

/// Ground-truth world the agent acts in.
pub trait Environment {
    /// Observe the current layout. The outcome is `Win` once the level is won.
    fn get_state(&mut self) -> Result<WorldState>;

    fn send_actions(&mut self, actions: &[Action]) -> Result<()>;

    fn send_action(&mut self, action: Action) -> Result<()> {
        self.send_actions(&[action])
    }

    /// Revert the last `n` actions.
    fn undo(&mut self, n: u32) -> Result<()>;

    fn restart(&mut self) -> Result<()>;

    fn load_level(&mut self, level_id: u32) -> Result<()>;
}

/// HTTP client for the bridge endpoints.
pub struct HttpEnvironment {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    won: bool,
}

impl HttpEnvironment {
    pub fn from_config(config: &EnvironmentConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build environment http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .with_context(|| format!("POST /{path}"))?;
        check_status(response, path).map(drop)
    }

    fn level_won(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("status"))
            .send()
            .context("GET /status")?;
        let status: StatusResponse = check_status(response, "status")?
            .json()
            .context("parse /status response")?;
        Ok(status.won)
    }
}

fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        bail!("/{path} returned {status}: {text}");
    }
    Ok(response)
}

/// Remove the `<pre>` wrapper the bridge puts around the grid text.
pub fn strip_pre(body: &str) -> &str {
    let body = body.trim();
    let body = body.strip_prefix("<pre>").unwrap_or(body);
    body.strip_suffix("</pre>").unwrap_or(body)
}

impl Environment for HttpEnvironment {
    #[instrument(skip_all)]
    fn get_state(&mut self) -> Result<WorldState> {
        let response = self
            .client
            .get(self.url("game_state"))
            .send()
            .context("GET /game_state")?;
        let body = check_status(response, "game_state")?
            .text()
            .context("read /game_state body")?;
        let mut state = WorldState::from_grid_string(strip_pre(&body))
            .context("parse game state grid")?;
        if self.level_won()? {
            state.set_outcome(Outcome::Win);
        }
        debug!(rows = state.rows(), cols = state.cols(), outcome = state.outcome().as_str(), "observed state");
        Ok(state)
    }

    fn send_actions(&mut self, actions: &[Action]) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let commands = actions
            .iter()
            .map(|action| action.wire_name())
            .collect::<Vec<_>>()
            .join(",");
        debug!(actions = %format_plan(actions), "sending actions");
        self.post("execute_commands", json!({ "commands": commands }))
    }

    fn undo(&mut self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        debug!(n, "undoing actions");
        self.post("undo_multiple", json!({ "n": n }))
    }

    fn restart(&mut self) -> Result<()> {
        self.post("restart_level", json!({}))
    }

    fn load_level(&mut self, level_id: u32) -> Result<()> {
        debug!(level_id, "loading level");
        self.post("load_level", json!({ "level_id": level_id }))
    }
}
