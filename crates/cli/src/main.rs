use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wanderer_protocol::{
    serialize_json_pretty, signature_schema, Signature, SIGNATURE_SCHEMA_VERSION,
};
use wanderer_signatures::{
    diff, merge, parse_batch, parse_clipboard, DiffOptions, EngineConfig, MemoryStore,
    PasteOutcome, SessionEvent, SignatureSession,
};

#[derive(Parser)]
#[command(name = "wanderer-sigs")]
#[command(about = "Reconcile scanner clipboard pastes with stored signatures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse clipboard text into signatures
    Parse(ParseArgs),

    /// Merge clipboard text into an existing signature set
    Merge(MergeArgs),

    /// Classify one signature set against another
    Diff(DiffArgs),

    /// Apply a paste to a stored system and run its pending lifecycle
    Paste(PasteArgs),

    /// Print the JSON Schema of a signature record
    Schema,
}

#[derive(Args)]
struct InputArgs {
    /// Clipboard text file (reads stdin when omitted)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
}

#[derive(Args)]
struct ParseArgs {
    #[command(flatten)]
    input: InputArgs,

    /// One record per row, without consolidating wormhole families
    #[arg(long)]
    raw: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// JSON array of the signatures already known
    #[arg(long)]
    existing: PathBuf,

    #[command(flatten)]
    input: InputArgs,
}

#[derive(Args)]
struct DiffArgs {
    /// JSON array of the stored signatures
    #[arg(long)]
    old: PathBuf,

    /// JSON array of the incoming signatures
    #[arg(long)]
    new: PathBuf,

    /// Absent records are not deletions
    #[arg(long)]
    update_only: bool,

    /// Leave out records whose group did not improve
    #[arg(long)]
    skip_unchanged: bool,
}

#[derive(Args)]
struct PasteArgs {
    /// JSON array of the system's stored signatures; a missing file is an empty system
    #[arg(long)]
    state: PathBuf,

    /// Solar system id used in logs and store errors
    #[arg(long, default_value = "cli")]
    system: String,

    #[command(flatten)]
    input: InputArgs,

    /// Wait out every grace window before reporting
    #[arg(long)]
    settle: bool,

    /// Write the resulting stored set back to --state
    #[arg(long)]
    write: bool,
}

#[derive(Serialize)]
struct PasteReport {
    #[serde(flatten)]
    outcome: PasteOutcome,
    events: Vec<SessionEvent>,
    visible: Vec<Signature>,
    stored: Vec<Signature>,
}

#[derive(Serialize)]
struct SchemaDocument {
    schema_version: u32,
    schema: serde_json::Value,
}

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
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

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse(args) => run_parse(args, &config)?,
        Commands::Merge(args) => run_merge(args, &config)?,
        Commands::Diff(args) => run_diff(args)?,
        Commands::Paste(args) => run_paste(args, config).await?,
        Commands::Schema => run_schema()?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(args: &InputArgs) -> Result<String> {
    if let Some(path) = &args.input {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read clipboard text from {}", path.display()));
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read clipboard text from stdin")?;
    Ok(buffer)
}

fn read_signatures(path: &Path) -> Result<Vec<Signature>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read signatures from {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of signatures", path.display()))
}

fn run_parse(args: ParseArgs, config: &EngineConfig) -> Result<()> {
    let text = read_input(&args.input)?;
    let signatures = if args.raw {
        parse_batch(&text, &config.enabled_kinds)
    } else {
        parse_clipboard(&text, &config.enabled_kinds)
    };
    print_stdout(&serialize_json_pretty(&signatures)?)
}

fn run_merge(args: MergeArgs, config: &EngineConfig) -> Result<()> {
    let existing = read_signatures(&args.existing)?;
    let text = read_input(&args.input)?;
    let incoming = parse_batch(&text, &config.enabled_kinds);
    print_stdout(&serialize_json_pretty(&merge(&existing, &incoming))?)
}

fn run_diff(args: DiffArgs) -> Result<()> {
    let old = read_signatures(&args.old)?;
    let new = read_signatures(&args.new)?;
    let options = DiffOptions::new(args.update_only, args.skip_unchanged);
    print_stdout(&serialize_json_pretty(&diff(&old, &new, options))?)
}

fn run_schema() -> Result<()> {
    let document = SchemaDocument {
        schema_version: SIGNATURE_SCHEMA_VERSION,
        schema: signature_schema()?,
    };
    print_stdout(&serialize_json_pretty(&document)?)
}

async fn run_paste(args: PasteArgs, config: EngineConfig) -> Result<()> {
    let stored = if args.state.exists() {
        read_signatures(&args.state)?
    } else {
        Vec::new()
    };
    let text = read_input(&args.input)?;

    let store = Arc::new(MemoryStore::with_system(args.system.clone(), stored));
    let mut session = SignatureSession::open(args.system.clone(), Arc::clone(&store), config)
        .await
        .context("Failed to open signature session")?;

    let outcome = session.paste(&text).await.context("Paste failed")?;
    let events = if args.settle {
        session.drive_until_idle().await
    } else {
        Vec::new()
    };

    let stored = store.snapshot(&args.system).await;
    if args.write {
        fs::write(&args.state, serialize_json_pretty(&stored)?)
            .with_context(|| format!("Failed to write {}", args.state.display()))?;
        log::info!("Wrote {} signatures to {}", stored.len(), args.state.display());
    }

    let report = PasteReport {
        outcome,
        events,
        visible: session.visible().to_vec(),
        stored,
    };
    print_stdout(&serialize_json_pretty(&report)?)
}
