#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use merchant_advisor::agent::{demo_agent, run_demo, AdvisorSession, DemoOptions};
use merchant_advisor::observability::{
    init_telemetry, RecordingSpanEmitter, SpanEmitter, SpanRecord,
};
use merchant_advisor::sessions::{
    extract_merchant_id, generate_thread_id, render_session_state, SessionExport,
    SessionManager, SessionState,
};
use merchant_advisor::{checkpoint, CheckpointCommands, Config};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `merchant-advisor` - session memory for single-merchant advisory conversations.
#[derive(Parser, Debug)]
#[command(name = "merchant-advisor")]
#[command(version)]
#[command(about = "Session memory for merchant advisory conversations.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted multi-turn session for one merchant
    #[command(long_about = "\
Run a scripted multi-turn session for one merchant.

Starts a session, asks four canned questions, records topics, cache \
entries, a recommendation, an advisor note and a pending question, \
then prints the resulting session state. Checkpoints and traces go to \
the backends named in config.toml.

Examples:
  merchant-advisor demo
  merchant-advisor demo --merchant 111111 --name ShopA --segment small_business
  merchant-advisor demo --detailed --export session.json --show-spans")]
    Demo {
        /// Advisor running the session
        #[arg(long, default_value = "adv_001")]
        advisor: String,

        /// Merchant id, with or without the mch_ prefix
        #[arg(long, default_value = "789456")]
        merchant: String,

        /// Merchant display name
        #[arg(long, default_value = "TechRetail")]
        name: String,

        /// Merchant segment (small_business, mid_market, enterprise)
        #[arg(long, default_value = "mid_market")]
        segment: String,

        /// Also list every recommendation and advisor note
        #[arg(long)]
        detailed: bool,

        /// Write the session export JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Print every trace span the session produced
        #[arg(long)]
        show_spans: bool,
    },

    /// Find a merchant id in free text
    #[command(long_about = "\
Find a merchant id in free text.

Recognizes mch_<digits>, 'merchant id <digits>', 'merchant <digits>' \
and m<digits>, in that order. Prints the normalized id, or exits \
with an error when none is found.

Examples:
  merchant-advisor extract \"How is merchant 789456 doing?\"")]
    Extract {
        /// Text to search
        text: String,
    },

    /// Print a fresh thread id for a merchant
    ThreadId {
        /// Merchant id, with or without the mch_ prefix
        merchant: String,
    },

    /// Render a saved session state file
    #[command(long_about = "\
Render a saved session state file.

Reads a SessionState JSON document, validates it, and prints the \
session report. With --export, prints the session export JSON instead.

Examples:
  merchant-advisor inspect state.json
  merchant-advisor inspect state.json --detailed
  merchant-advisor inspect state.json --export > summary.json")]
    Inspect {
        /// Path to the session state JSON
        path: PathBuf,

        /// Also list every recommendation and advisor note
        #[arg(long)]
        detailed: bool,

        /// Print the export JSON instead of the report
        #[arg(long)]
        export: bool,
    },

    /// Inspect or clear conversation checkpoints
    #[command(long_about = "\
Inspect or clear conversation checkpoints.

Lists threads, shows recent turns of a thread, and deletes \
checkpoints with confirmation.

Examples:
  merchant-advisor checkpoints list
  merchant-advisor checkpoints history merchant_mch_789456_20250109_143022 --limit 5
  merchant-advisor checkpoints clear merchant_mch_789456_20250109_143022 --yes")]
    Checkpoints {
        #[command(subcommand)]
        checkpoint_command: CheckpointCommands,
    },

    /// Show configuration status
    Status,

    /// Manage configuration
    #[command(long_about = "\
Manage merchant-advisor configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  merchant-advisor config schema
  merchant-advisor config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `merchant-advisor`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(merchant-advisor completions bash)
  merchant-advisor completions zsh > ~/.zfunc/_merchant-advisor
  merchant-advisor completions fish > ~/.config/fish/completions/merchant-advisor.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match &cli.config_dir {
        Some(dir) if dir.trim().is_empty() => bail!("--config-dir cannot be empty"),
        Some(dir) => Some(PathBuf::from(dir.trim())),
        None => None,
    };

    // Completions must remain stdout-only and should not load config or initialize logging.
    // This avoids warnings/log lines corrupting sourced completion scripts.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    // Pure id utilities need no config.
    match &cli.command {
        Commands::Extract { text } => {
            let Some(merchant_id) = extract_merchant_id(text) else {
                bail!("no merchant id found in '{text}'");
            };
            println!("{merchant_id}");
            return Ok(());
        }
        Commands::ThreadId { merchant } => {
            println!("{}", generate_thread_id(merchant, Utc::now())?);
            return Ok(());
        }
        Commands::Inspect {
            path,
            detailed,
            export,
        } => return inspect_state_file(path, *detailed, *export).await,
        _ => {}
    }

    // All other commands need config loaded first
    let config = Config::load_or_init(config_dir.as_deref()).await?;

    match cli.command {
        Commands::Completions { .. }
        | Commands::Extract { .. }
        | Commands::ThreadId { .. }
        | Commands::Inspect { .. } => unreachable!(),

        Commands::Demo {
            advisor,
            merchant,
            name,
            segment,
            detailed,
            export,
            show_spans,
        } => {
            let options = DemoOptions {
                advisor_id: advisor,
                merchant_id: merchant,
                merchant_name: non_empty(name),
                segment: non_empty(segment),
            };
            run_demo_command(&config, &options, detailed, export.as_deref(), show_spans).await
        }

        Commands::Checkpoints { checkpoint_command } => {
            checkpoint::handle_checkpoint_command(checkpoint_command, &config).await
        }

        Commands::Status => {
            print_status(&config);
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Schema => {
                let schema = schemars::schema_for!(Config);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&schema)
                        .context("failed to serialize JSON Schema")?
                );
                Ok(())
            }
        },
    }
}

async fn run_demo_command(
    config: &Config,
    options: &DemoOptions,
    detailed: bool,
    export: Option<&Path>,
    show_spans: bool,
) -> Result<()> {
    let telemetry = init_telemetry(&config.observability);
    let recorder = show_spans
        .then(|| Arc::new(RecordingSpanEmitter::forwarding_to(telemetry.emitter())));
    let emitter: Arc<dyn SpanEmitter> = match &recorder {
        Some(recorder) => Arc::clone(recorder) as Arc<dyn SpanEmitter>,
        None => telemetry.emitter(),
    };

    let manager = SessionManager::new(config.cache.clone()).with_emitter(emitter);
    let mut session = AdvisorSession::new(manager, Arc::new(demo_agent()));
    if let Some(store) = checkpoint::create_checkpoint_store(config)? {
        session = session.with_checkpoints(store, config.checkpoint.history_limit);
    }

    let result = async {
        println!("{}", "=".repeat(70));
        println!("SINGLE MERCHANT SESSION DEMO");
        println!("{}\n", "=".repeat(70));

        let outcome = run_demo(&session, options).await?;
        println!("{}", render_session_state(&outcome.state, detailed));

        if let Some(path) = export {
            let export = session.manager().export_session_summary(&outcome.state);
            tokio::fs::write(path, export.to_json_pretty()?)
                .await
                .with_context(|| format!("Failed to write session export: {}", path.display()))?;
            println!("Session export written to {}", path.display());
        }

        if let Some(recorder) = &recorder {
            print_spans(&recorder.spans());
        }
        anyhow::Ok(())
    }
    .await;

    telemetry.shutdown();
    result
}

async fn inspect_state_file(path: &Path, detailed: bool, export: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read session state: {}", path.display()))?;
    let state = SessionState::from_json(&raw)
        .with_context(|| format!("Invalid session state: {}", path.display()))?;

    if export {
        println!("{}", SessionExport::from_state(&state, Utc::now()).to_json_pretty()?);
    } else {
        println!("{}", render_session_state(&state, detailed));
    }
    Ok(())
}

fn print_status(config: &Config) {
    println!("merchant-advisor status");
    println!();
    println!("Version:        {}", env!("CARGO_PKG_VERSION"));
    println!("Config:         {}", config.config_path.display());
    println!();
    println!("Cache TTLs:");
    for (key, seconds) in config.cache.entries() {
        println!("  {key:<28} {seconds}s");
    }
    println!();
    println!("Observability:  {}", config.observability.backend);
    if config.observability.backend.eq_ignore_ascii_case("otel") {
        println!(
            "  Endpoint:     {}",
            config.observability.otel_endpoint.as_deref().unwrap_or("(unset)")
        );
        println!("  Service:      {}", config.observability.service_name());
    }
    println!();
    if config.checkpoint.enabled {
        println!("Checkpoints:    {}", config.checkpoint.backend);
        if !config.checkpoint.backend.eq_ignore_ascii_case("memory") {
            println!("  Path:         {}", config.checkpoint_path().display());
        }
        println!("  History:      {} turns", config.checkpoint.history_limit);
    } else {
        println!("Checkpoints:    disabled");
    }
}

fn print_spans(spans: &[SpanRecord]) {
    println!("\nTrace spans ({} total):", spans.len());
    for span in spans {
        let millis = (span.ended_at - span.started_at).num_milliseconds();
        let status = span.error.as_deref().map_or(String::new(), |e| format!(" ERROR: {e}"));
        println!("\n- {} ({millis} ms){status}", span.name);
        for (key, value) in &span.attributes {
            println!("    {key} = {value}");
        }
        for event in &span.events {
            println!("    event {} ({} attributes)", event.name, event.attributes.len());
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
