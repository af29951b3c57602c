use anyhow::{Context as AnyhowContext, Result};
use app::{App, Settings};
use clap::{Args, Parser, Subcommand};
use codeplay_unlock::{GameSession, PlayOutcome, UnlockState};
use log::info;
use report::{describe_state, print_stdout, render_status};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

mod app;
mod report;
mod watch;

#[derive(Parser)]
#[command(name = "codeplay")]
#[command(about = "Earn mini-game plays by writing code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// State file (default: <data dir>/codeplay/state.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file (default: <config dir>/codeplay/codeplay.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show lock state, credits and progress for every game
    Status(StatusArgs),

    /// Play a game session. Game messages are read from stdin as JSON lines
    /// unless --score is given
    Play(PlayArgs),

    /// Unlock a game with a fresh batch of credits
    Unlock(GameArgs),

    /// Lock a game and clear its progress
    Lock(GameArgs),

    /// Reset one game to its initial state and clear its statistics
    Reset(GameArgs),

    /// Clear all state, statistics and counters
    #[command(name = "reset-all")]
    ResetAll,

    /// Export all stored state as a JSON object
    Export(ExportArgs),

    /// Import state previously written by `export`
    Import(ImportArgs),

    /// Watch a directory and earn progress from saved code
    Watch(WatchArgs),
}

#[derive(Args)]
struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PlayArgs {
    /// Game id (see `codeplay status`)
    game: String,

    /// Finish the session immediately with this score
    #[arg(long)]
    score: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GameArgs {
    /// Game id (see `codeplay status`)
    game: String,
}

#[derive(Args)]
struct ExportArgs {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    /// JSON file produced by `codeplay export`
    file: PathBuf,
}

#[derive(Args)]
struct WatchArgs {
    /// Directory to watch
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only track these extensions (comma-separated, e.g. rs,py)
    #[arg(long, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Override the interim-edit debounce window
    #[arg(long)]
    debounce_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let settings = Settings::resolve(cli.store, cli.config)?;
    let app = App::open(&settings).await?;

    match cli.command {
        Commands::Status(args) => run_status(&app, args).await?,
        Commands::Play(args) => run_play(&app, args).await?,
        Commands::Unlock(args) => {
            let state = app.engine.force_unlock(&args.game).await?;
            print_state(&app, &args.game, &state)?;
        }
        Commands::Lock(args) => {
            let state = app.engine.force_lock(&args.game).await?;
            print_state(&app, &args.game, &state)?;
        }
        Commands::Reset(args) => {
            let state = app.engine.reset_state(&args.game).await?;
            print_state(&app, &args.game, &state)?;
        }
        Commands::ResetAll => {
            app.engine.reset_all_state().await?;
            print_stdout("All game state cleared")?;
        }
        Commands::Export(args) => run_export(&app, args).await?,
        Commands::Import(args) => run_import(&app, args).await?,
        Commands::Watch(args) => {
            watch::run(
                &app,
                watch::WatchOptions {
                    root: args.path,
                    extensions: args.extensions,
                    debounce_ms: args.debounce_ms,
                },
            )
            .await?
        }
    }

    Ok(())
}

fn print_state(app: &App, game_id: &str, state: &UnlockState) -> Result<()> {
    print_stdout(&format!(
        "{game_id}: {}",
        describe_state(state, app.config.unlock.lines_required_to_unlock)
    ))
}

async fn run_status(app: &App, args: StatusArgs) -> Result<()> {
    let total = app.engine.total_lines_written().await?;
    let statuses = app.engine.game_statuses().await?;
    if args.json {
        let body = json!({
            "total_lines_written": total,
            "state_scope": app.engine.scope(),
            "games": statuses,
        });
        print_stdout(&serde_json::to_string_pretty(&body)?)
    } else {
        print_stdout(&render_status(total, &statuses))
    }
}

async fn run_play(app: &App, args: PlayArgs) -> Result<()> {
    let mut session = match GameSession::begin(app.engine.clone(), &args.game).await {
        Ok(session) => session,
        Err(err) if err.is_expected() => {
            eprintln!("{err}");
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    };
    info!("Started {}", session.game_id());

    let outcome = match args.score {
        Some(score) => {
            let message = json!({"type": "gameOver", "score": score}).to_string();
            session.handle_message(&message).await?
        }
        None => read_game_messages(&mut session).await?,
    };

    let Some(outcome) = outcome else {
        let state = session.abort().await?;
        info!("Session ended without a game over; no play used");
        if args.json {
            return print_stdout(&json!({"completed": false, "state": state}).to_string());
        }
        return print_state(app, &args.game, &state);
    };
    print_outcome(app, &args, &outcome)
}

/// Feed JSON lines from stdin to the session until it reports a game over.
async fn read_game_messages(session: &mut GameSession) -> Result<Option<PlayOutcome>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read game messages from stdin")?
    {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(outcome) = session.handle_message(&line).await? {
            return Ok(Some(outcome));
        }
    }
    Ok(None)
}

fn print_outcome(app: &App, args: &PlayArgs, outcome: &PlayOutcome) -> Result<()> {
    if args.json {
        let mut body = serde_json::to_value(outcome)?;
        body["completed"] = json!(true);
        return print_stdout(&body.to_string());
    }
    print_stdout(&format!(
        "{}: high score {}, {}",
        args.game,
        outcome.stats.high_score,
        describe_state(&outcome.state, app.config.unlock.lines_required_to_unlock)
    ))?;
    if outcome.locked {
        print_stdout(&format!(
            "Out of plays. Write {} lines of code to unlock {} again",
            app.config.unlock.lines_required_to_unlock, args.game
        ))?;
    }
    Ok(())
}

async fn run_export(app: &App, args: ExportArgs) -> Result<()> {
    let exported = app.engine.export_state_json().await?;
    match args.out {
        Some(path) => {
            fs::write(&path, exported)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Exported state to {}", path.display());
            Ok(())
        }
        None => print_stdout(&exported),
    }
}

async fn run_import(app: &App, args: ImportArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let written = app.engine.import_state_json(&raw).await?;
    print_stdout(&format!("Imported {written} keys"))
}
