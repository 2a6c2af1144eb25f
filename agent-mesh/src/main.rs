//! The `agent-mesh` binary: one-shot agent runs, health checks, the review
//! pipeline, and the MCP server.

use agent_mesh::config::{parse_agents, parse_env_pair, MeshConfig};
use agent_mesh::doctor::{run_doctor, DoctorOptions};
use agent_mesh::exit_codes;
use agent_mesh::logging;
use agent_mesh::pipeline::run_review;
use agent_mesh::setup::{run_setup, SetupConfig};
use agent_mesh_mcp::prelude::{serve_stdio, McpConfig, MeshToolServer, SERVER_NAME};
use agent_mesh_runner::{AgentKind, OutputMode, RunnerError};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "agent-mesh", author, version, about, long_about = None)]
struct Cli {
    /// Log at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the claude executable
    #[arg(long, global = true, value_name = "PATH")]
    claude_bin: Option<PathBuf>,

    /// Path to the codex executable
    #[arg(long, global = true, value_name = "PATH")]
    codex_bin: Option<PathBuf>,

    /// Path to the gemini executable
    #[arg(long, global = true, value_name = "PATH")]
    gemini_bin: Option<PathBuf>,

    /// Extra environment for agent processes (repeatable)
    #[arg(long = "env", global = true, value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version
    Version,
    /// Run one agent headlessly and print its result as JSON
    Run {
        /// Agent to run: claude, codex, or gemini
        #[arg(short, long)]
        agent: String,
        /// Prompt or task text
        #[arg(short, long)]
        prompt: String,
        /// Working directory for the agent
        #[arg(short = 'C', long, default_value = ".")]
        cwd: PathBuf,
        /// Timeout in seconds (1-7200)
        #[arg(short, long, default_value_t = agent_mesh::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
        /// Output format: json, text, or jsonl-events
        #[arg(long, value_parser = parse_output_mode)]
        output_format: Option<OutputMode>,
        /// Extra argument passed to the agent before the prompt (repeatable)
        #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Check executables, the MCP server, and optionally make real calls
    Doctor {
        #[command(flatten)]
        checks: CheckArgs,
        /// Check the MCP server (default)
        #[arg(long, overrides_with = "no_mcp")]
        mcp: bool,
        /// Skip the MCP server check
        #[arg(long)]
        no_mcp: bool,
        /// Also run a short prompt against each agent
        #[arg(long)]
        smoke: bool,
    },
    /// Run a short prompt against each agent
    Smoke {
        #[command(flatten)]
        checks: CheckArgs,
    },
    /// Multi-agent compositions
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommand,
    },
    /// Serve the agent tools over MCP on stdio
    Serve,
    /// Register the MCP server in Claude, Codex, and Gemini configs
    Setup {
        /// Show what would be done without modifying files
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Working directory for smoke calls
    #[arg(long, default_value = ".")]
    cwd: PathBuf,
    /// Agent to check (repeatable; default all)
    #[arg(long = "agent", value_name = "AGENT")]
    agents: Vec<String>,
    /// Timeout per smoke call in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum PipelineCommand {
    /// Claude implements the prompt, then Codex reviews the diff
    Review {
        /// Implementation prompt
        #[arg(short, long)]
        prompt: String,
        /// Working directory (a git work tree)
        #[arg(short = 'C', long, default_value = ".")]
        cwd: PathBuf,
    },
}

fn parse_output_mode(raw: &str) -> Result<OutputMode, String> {
    raw.parse().map_err(|e: RunnerError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_codes::FAILURE)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    let config = MeshConfig::default()
        .with_binary(AgentKind::Claude, cli.claude_bin)
        .with_binary(AgentKind::Codex, cli.codex_bin)
        .with_binary(AgentKind::Gemini, cli.gemini_bin)
        .with_env(cli.env);

    match cli.command {
        Commands::Version => {
            println!("agent-mesh {}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
        Commands::Run {
            agent,
            prompt,
            cwd,
            timeout,
            output_format,
            args,
        } => {
            let outcome = match config.run_configuration(
                &prompt,
                &cwd,
                Some(Duration::from_secs(timeout)),
                output_format,
                &args,
            ) {
                Ok(run) => config.mesh().run(&agent, &run).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(result) => {
                    println!("{}", result.to_json_pretty()?);
                    Ok(exit_codes::OK)
                }
                Err(e) => Ok(report_runner_error(&e)),
            }
        }
        Commands::Doctor {
            checks,
            mcp: _,
            no_mcp,
            smoke,
        } => {
            let mcp_program = if no_mcp {
                None
            } else {
                Some(std::env::current_exe().context("Could not locate the agent-mesh executable")?)
            };
            check(&config, checks, mcp_program, smoke).await
        }
        Commands::Smoke { checks } => check(&config, checks, None, true).await,
        Commands::Pipeline {
            command: PipelineCommand::Review { prompt, cwd },
        } => match run_review(&config.mesh(), &config, &prompt, &cwd).await {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(if report.success {
                    exit_codes::OK
                } else {
                    exit_codes::FAILURE
                })
            }
            Err(e) => Ok(report_runner_error(&e)),
        },
        Commands::Serve => {
            tracing::info!("Agent mesh MCP server starting over stdio");
            let server = MeshToolServer::new(config.mesh())?;
            serve_stdio(server).await?;
            Ok(exit_codes::OK)
        }
        Commands::Setup { dry_run } => {
            let server = server_registration(&config)?;
            let outcomes = run_setup(&SetupConfig::for_current_user(dry_run)?, &server)?;
            for outcome in &outcomes {
                println!("{outcome}");
            }
            if dry_run {
                println!("\n[DRY RUN] No files were modified.");
            }
            Ok(exit_codes::OK)
        }
    }
}

async fn check(
    config: &MeshConfig,
    checks: CheckArgs,
    mcp_program: Option<PathBuf>,
    smoke: bool,
) -> anyhow::Result<u8> {
    let agents = match parse_agents(&checks.agents) {
        Ok(agents) => agents,
        Err(e) => return Ok(report_runner_error(&e)),
    };
    let options = DoctorOptions {
        cwd: std::path::absolute(&checks.cwd)?,
        agents,
        mcp_program,
        smoke,
        timeout_secs: checks.timeout,
    };

    let report = run_doctor(config, &options).await;
    if checks.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render_text());
    }

    Ok(if report.ok() {
        exit_codes::OK
    } else {
        exit_codes::FAILURE
    })
}

/// The registration entry: `<exe> [--<agent>-bin PATH]... serve`, with the
/// shared environment.
fn server_registration(config: &MeshConfig) -> anyhow::Result<McpConfig> {
    let mut server = McpConfig::for_current_exe(SERVER_NAME).context("Could not locate the agent-mesh executable")?;
    let mut args: Vec<String> = config
        .binaries
        .iter()
        .flat_map(|(kind, path)| [format!("--{kind}-bin"), path.display().to_string()])
        .collect();
    args.append(&mut server.args);
    server.args = args;
    server.env.extend(config.env.iter().cloned());
    Ok(server)
}

fn report_runner_error(error: &RunnerError) -> u8 {
    eprintln!("error: {error}");
    exit_codes::for_runner_error(error)
}
