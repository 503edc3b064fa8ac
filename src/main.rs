use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nlsql::api::{self, AppState};
use nlsql::doctor;
use nlsql::finetune::{self, FinetunePlan};
use nlsql::{
    AppConfig, ConfigError, Database, DbError, GeminiClient, GeminiClientBuilder, NlqTranslator,
    TranslateError,
};
use tracing_subscriber::EnvFilter;

/// nlsql - ask questions of a SQL database in plain language
#[derive(Parser)]
#[command(name = "nlsql")]
#[command(about = "Natural-language-to-SQL service backed by Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeCommand),
    /// Translate a question to SQL and print the rows
    Ask(AskCommand),
    /// Test the database connection
    CheckDb,
    /// Test the Gemini API key with a one-word question
    CheckLlm,
    /// List models that support generateContent
    ListModels,
    /// Write LoRA fine-tuning data and configuration
    FinetunePrepare(FinetuneCommand),
}

#[derive(Parser)]
struct ServeCommand {
    /// Address to listen on (overrides NLSQL_BIND)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

#[derive(Parser)]
struct AskCommand {
    /// The question to answer
    #[arg(value_name = "QUESTION")]
    question: String,

    /// Print the generated SQL without running it
    #[arg(long)]
    sql_only: bool,
}

#[derive(Parser)]
struct FinetuneCommand {
    /// JSON or JSON Lines file of {instruction, input, output} pairs
    #[arg(short, long, value_name = "PATH", default_value = finetune::DEFAULT_DATASET_PATH)]
    dataset: PathBuf,

    /// Directory for train.jsonl and finetune_config.json
    #[arg(short, long, value_name = "DIR", default_value = "finetuned_sql_llm")]
    out: PathBuf,

    /// Base model to adapt
    #[arg(long, value_name = "MODEL")]
    base_model: Option<String>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(cmd) => handle_serve(cmd),
        Commands::Ask(cmd) => handle_ask(&cmd),
        Commands::CheckDb => handle_check_db(),
        Commands::CheckLlm => handle_check_llm(),
        Commands::ListModels => handle_list_models(),
        Commands::FinetunePrepare(cmd) => handle_finetune(cmd),
    };

    if let Err(e) = result {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nlsql=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are bad configuration or input; everything else is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause.is::<DbError>()
            || cause.is::<finetune::FinetuneError>()
            || matches!(
                cause.downcast_ref::<TranslateError>(),
                Some(TranslateError::EmptyQuestion)
            )
    })
}

fn load_config() -> Result<AppConfig> {
    AppConfig::from_env().context("Failed to load configuration")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let location = config.database_location()?;
    Database::connect(&location).context("Failed to open database")
}

fn build_client(config: &AppConfig) -> Result<GeminiClient> {
    GeminiClientBuilder::from_config(config)
        .build()
        .context("Failed to create Gemini client")
}

fn handle_serve(cmd: ServeCommand) -> Result<()> {
    let config = load_config()?;
    let addr = cmd.bind.unwrap_or(config.bind_addr);

    let db = open_database(&config)?;
    // The blocking HTTP client must be created outside the async runtime
    let client = build_client(&config)?;
    if !client.has_api_key() {
        tracing::warn!("GOOGLE_API_KEY is not set; question endpoints will fail");
    }
    tracing::info!(model = client.model(), "using Gemini model");

    let state = AppState::new(db, NlqTranslator::new(Arc::new(client)));

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(api::serve(addr, state))
}

fn handle_ask(cmd: &AskCommand) -> Result<()> {
    let config = load_config()?;
    let translator = NlqTranslator::new(Arc::new(build_client(&config)?));

    if cmd.sql_only {
        println!("{}", translator.generate_sql(&cmd.question)?);
        return Ok(());
    }

    let db = open_database(&config)?;
    let answer = translator.answer(&cmd.question, &db)?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

fn handle_check_db() -> Result<()> {
    let config = load_config()?;
    let status = doctor::check_database(&config);
    doctor::print_status("Database", &status);
    anyhow::ensure!(status.is_ok(), "database check failed");
    Ok(())
}

fn handle_check_llm() -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let status = doctor::check_llm(&client);
    doctor::print_status("Gemini API", &status);
    anyhow::ensure!(status.is_ok(), "Gemini API check failed");
    Ok(())
}

fn handle_list_models() -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let models = doctor::list_generation_models(&client).context("Failed to list models")?;
    doctor::print_models(client.base_url(), &models);
    Ok(())
}

fn handle_finetune(cmd: FinetuneCommand) -> Result<()> {
    let mut plan = FinetunePlan::default();
    if let Some(base_model) = cmd.base_model {
        plan.base_model = base_model;
    }
    plan.training.output_dir = cmd.out.display().to_string();

    let summary = finetune::prepare(&cmd.dataset, &cmd.out, &plan)?;

    println!(
        "Prepared {} training pairs for {} ({} optimizer steps)",
        summary.pairs, plan.base_model, summary.total_steps
    );
    println!("  data:   {}", summary.train_file.display());
    println!("  config: {}", summary.config_file.display());
    Ok(())
}
