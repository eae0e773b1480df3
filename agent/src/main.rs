//! Belief-revision planning agent.
//!
//! Plays a level through the game bridge, learning the game's rules as a
//! synthesized rule table. State lives under `<root>/.agent/`: the config,
//! the learned memory (`memory/beliefs.json`, `memory/physics.toml`) and one
//! directory per episode.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent::agents::critic::Critic;
use agent::agents::repair::ContradictoryBeliefError;
use agent::agents::transition::{RunnerSettings, TransitionRunner};
use agent::core::action::format_plan;
use agent::core::physics::{RuleTable, STANDARD_SOURCE};
use agent::core::world::WorldState;
use agent::exit_codes;
use agent::io::config::{AgentConfig, Algorithm, load_config, write_config};
use agent::io::environment::HttpEnvironment;
use agent::io::oracle::HttpOracle;
use agent::io::paths::AgentPaths;
use agent::logging;
use agent::planner::plan_to_win;
use agent::reconcile::{Agent, EpisodeLimitReachedError, LoopSettings, restore_memory};
use agent_bridge::BridgeConfig;
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Belief-revision planning agent for rule-rewriting grid puzzles"
)]
struct Cli {
    /// Project root holding `.agent/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.agent/config.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Play a level until it is won.
    Run(RunArgs),
    /// Plan offline on a grid snapshot with a fixed rule table.
    Plan {
        /// Grid text file, as served by the bridge.
        #[arg(long)]
        grid: PathBuf,
        /// Rule table to plan with (defaults to the standard rules).
        #[arg(long)]
        physics: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "bfs")]
        algorithm: Algorithm,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
    },
    /// Print the rules active in a grid snapshot.
    Rules {
        #[arg(long)]
        grid: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Level to load.
    #[arg(long)]
    level: u32,
    /// Config file (defaults to `.agent/config.toml` under the root).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore stored beliefs and rule table.
    #[arg(long)]
    fresh: bool,
    /// Host the bridge in-process instead of using `environment.base_url`.
    #[arg(long, requires_all = ["world_data", "commands_dir"])]
    serve_bridge: bool,
    /// The game's world_data.txt (with `--serve-bridge`).
    #[arg(long)]
    world_data: Option<PathBuf>,
    /// Directory the game mod polls for command files (with `--serve-bridge`).
    #[arg(long)]
    commands_dir: Option<PathBuf>,
    /// Address for the in-process bridge.
    #[arg(long, default_value = "127.0.0.1:0")]
    bridge_addr: SocketAddr,
    /// Milliseconds the in-process bridge waits for the game to run a command file.
    #[arg(long, default_value_t = 5_000)]
    consume_timeout_ms: u64,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ContradictoryBeliefError>().is_some() {
        exit_codes::CONTRADICTORY
    } else if err.downcast_ref::<EpisodeLimitReachedError>().is_some() {
        exit_codes::EPISODE_LIMIT
    } else {
        exit_codes::INVALID
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = AgentPaths::new(&cli.root);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Run(args) => cmd_run(&paths, &args),
        Command::Plan {
            grid,
            physics,
            algorithm,
            max_depth,
        } => cmd_plan(&grid, physics.as_deref(), algorithm, max_depth),
        Command::Rules { grid } => cmd_rules(&grid),
    }
}

fn cmd_init(paths: &AgentPaths, force: bool) -> Result<()> {
    if !force && paths.config_path.exists() {
        info!(path = %paths.config_path.display(), "config already exists");
        return Ok(());
    }
    write_config(&paths.config_path, &AgentConfig::default())
        .with_context(|| format!("write {}", paths.config_path.display()))?;
    println!("{}", paths.config_path.display());
    Ok(())
}

fn cmd_run(paths: &AgentPaths, args: &RunArgs) -> Result<()> {
    let config_path = args.config.as_ref().unwrap_or(&paths.config_path);
    let mut config = load_config(config_path)?;

    // Keeps the bridge thread alive for the whole run.
    let _bridge = if args.serve_bridge {
        let (Some(world_data), Some(commands_dir)) = (&args.world_data, &args.commands_dir) else {
            bail!("--serve-bridge needs --world-data and --commands-dir");
        };
        let handle = agent_bridge::spawn(&BridgeConfig {
            addr: args.bridge_addr,
            world_data: world_data.clone(),
            commands_dir: commands_dir.clone(),
            consume_timeout: (args.consume_timeout_ms > 0)
                .then_some(Duration::from_millis(args.consume_timeout_ms)),
        })?;
        config.environment.base_url = handle.base_url();
        info!(url = %config.environment.base_url, "serving bridge in-process");
        Some(handle)
    } else {
        None
    };

    let env = HttpEnvironment::from_config(&config.environment)?;
    let oracle = HttpOracle::from_config(&config.oracle)?;
    let mut runner = TransitionRunner::new(
        &oracle,
        RunnerSettings {
            temperature: config.oracle.synthesis_temperature,
            max_resynthesis_attempts: config.repair.max_resynthesis_attempts,
        },
    );
    let beliefs = restore_memory(paths, args.fresh, &mut runner)?;
    info!(beliefs = beliefs.len(), fresh = args.fresh, "memory ready");

    let mut agent = Agent::new(
        env,
        Critic::new(&oracle, config.oracle.inference_temperature),
        runner,
        beliefs,
        LoopSettings::from_config(&config),
    )
    .with_episode_log(paths.episodes_dir.clone());

    let outcome = agent.run(args.level)?;
    println!(
        "level {} won after {} episode(s): {}",
        outcome.level_id,
        outcome.episodes,
        format_plan(&outcome.plan)
    );
    Ok(())
}

fn read_grid(path: &Path) -> Result<WorldState> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    WorldState::from_grid_string(&text).with_context(|| format!("parse grid {}", path.display()))
}

fn cmd_plan(
    grid: &Path,
    physics: Option<&Path>,
    algorithm: Algorithm,
    max_depth: usize,
) -> Result<()> {
    let start = read_grid(grid)?;
    let source = match physics {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => STANDARD_SOURCE.to_string(),
    };
    let mut table = RuleTable::compile(&source).context("compile rule table")?;
    match plan_to_win(algorithm, &mut table, &start, Some(max_depth))? {
        Some(plan) => {
            println!("{}", format_plan(&plan));
            Ok(())
        }
        None => bail!("no plan within depth {max_depth}"),
    }
}

fn cmd_rules(grid: &Path) -> Result<()> {
    let state = read_grid(grid)?;
    println!("{}", state.rules_text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent::agents::transition::ResynthesisExhaustedError;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["agent", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_global_root() {
        let cli = Cli::parse_from(["agent", "run", "--level", "3", "--fresh", "--root", "/tmp/p"]);
        assert_eq!(cli.root, PathBuf::from("/tmp/p"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.level, 3);
        assert!(args.fresh);
        assert!(!args.serve_bridge);
        assert_eq!(args.bridge_addr.port(), 0);
    }

    #[test]
    fn serve_bridge_requires_game_paths() {
        let parsed = Cli::try_parse_from(["agent", "run", "--level", "1", "--serve-bridge"]);
        assert!(parsed.is_err());
        let cli = Cli::parse_from([
            "agent",
            "run",
            "--level",
            "1",
            "--serve-bridge",
            "--world-data",
            "w.txt",
            "--commands-dir",
            "cmds",
        ]);
        assert!(matches!(cli.command, Command::Run(RunArgs { serve_bridge: true, .. })));
    }

    #[test]
    fn parse_plan_options() {
        let cli = Cli::parse_from([
            "agent",
            "plan",
            "--grid",
            "level.txt",
            "--algorithm",
            "iw",
            "--max-depth",
            "4",
        ]);
        let Command::Plan {
            algorithm,
            max_depth,
            physics,
            ..
        } = cli.command
        else {
            panic!("expected plan");
        };
        assert_eq!(algorithm, Algorithm::Iw);
        assert_eq!(max_depth, 4);
        assert!(physics.is_none());
    }

    /// Verifies typed failures map to their stable exit codes, even when
    /// wrapped in context.
    #[test]
    fn exit_codes_follow_error_type() {
        let contradictory = anyhow::Error::new(ContradictoryBeliefError {
            belief: "{}".to_string(),
            attempts: 5,
        })
        .context("run level 1");
        assert_eq!(exit_code_for(&contradictory), exit_codes::CONTRADICTORY);

        let limit = anyhow::Error::new(EpisodeLimitReachedError {
            episodes: 2,
            max_episodes: 2,
        });
        assert_eq!(exit_code_for(&limit), exit_codes::EPISODE_LIMIT);

        let exhausted = anyhow::Error::new(ResynthesisExhaustedError {
            attempts: 3,
            kind: "syntax",
            message: "bad".to_string(),
        });
        assert_eq!(exit_code_for(&exhausted), exit_codes::INVALID);
        assert_eq!(exit_code_for(&anyhow::anyhow!("io")), exit_codes::INVALID);
    }

    #[test]
    fn init_writes_default_config_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AgentPaths::new(temp.path());
        cmd_init(&paths, false).expect("init");
        fs::write(&paths.config_path, "max_episodes = 4\n").expect("edit");
        cmd_init(&paths, false).expect("init again");
        assert_eq!(
            load_config(&paths.config_path).expect("load").max_episodes,
            Some(4)
        );
        cmd_init(&paths, true).expect("force");
        assert_eq!(load_config(&paths.config_path).expect("load"), AgentConfig::default());
    }

    #[test]
    fn plan_command_solves_snapshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let grid = temp.path().join("level.txt");
        fs::write(&grid, agent::test_support::one_step_from_win().to_grid_string()).expect("write");
        cmd_plan(&grid, None, Algorithm::Bfs, 3).expect("plan");
        let err = cmd_plan(&grid, None, Algorithm::Bfs, 0).expect_err("no plan");
        assert!(err.to_string().contains("no plan"));
    }
}
