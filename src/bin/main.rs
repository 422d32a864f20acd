use cfo_assistant::{
    agents::Assistant,
    config::Settings,
    llm::GeminiClient,
    store::{format_currency, seed::seed_database, ChequeDirection, FinanceStore, JsonFileStore},
    telegram::{ChatTransport, TelegramBot, TelegramClient},
    AgentError, Result,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfo", version, about = "AI CFO assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot (long polling)
    Bot,
    /// Generate today's briefing and send it to the CFO chat
    Briefing {
        /// Print only, do not send over Telegram
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a snapshot of the finance database
    Status,
    /// Check configuration and connectivity
    Verify,
    /// Write a demo finance database to DATABASE_PATH
    Seed {
        /// Replace an existing database
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = run(cli.command).await;
    if let Err(e) = &result {
        error!("Command failed: {}", e);
    }
    result
}

async fn run(command: Command) -> Result<()> {
    let settings = Settings::from_env()?;

    match command {
        Command::Bot => run_bot(&settings).await,
        Command::Briefing { dry_run } => send_briefing(&settings, dry_run).await,
        Command::Status => print_status(&settings).await,
        Command::Verify => verify(&settings).await,
        Command::Seed { force } => {
            seed_database(&settings.database_path, force).await?;
            println!("✅ Demo database written to {}", settings.database_path.display());
            Ok(())
        }
    }
}

fn telegram_client(settings: &Settings) -> Result<TelegramClient> {
    let token = settings
        .telegram_bot_token
        .as_deref()
        .ok_or_else(|| AgentError::Config("TELEGRAM_BOT_TOKEN not configured".to_string()))?;
    TelegramClient::new(token)
}

async fn run_bot(settings: &Settings) -> Result<()> {
    let client = Arc::new(telegram_client(settings)?);
    let assistant = Assistant::from_settings(settings).await?;

    let bot = Arc::new(TelegramBot::new(
        client,
        assistant.interface.clone(),
        settings.document_dir.clone(),
    ));
    bot.run().await
}

async fn send_briefing(settings: &Settings, dry_run: bool) -> Result<()> {
    let assistant = Assistant::from_settings(settings).await?;
    let conversation_id = settings.cfo_chat_id.clone().unwrap_or_else(|| "cli".to_string());

    info!(conversation_id = %conversation_id, "Generating daily briefing");
    let text = assistant.interface.prepare_briefing(&conversation_id).await?;
    println!("{}", text);

    if dry_run {
        return Ok(());
    }
    match settings.cfo_chat_id.as_deref() {
        Some(chat_id) => {
            telegram_client(settings)?.send_text(chat_id, &text).await?;
            info!(chat_id, "Briefing sent");
        }
        None => warn!("CFO_CHAT_ID not set, briefing printed only"),
    }
    Ok(())
}

async fn print_status(settings: &Settings) -> Result<()> {
    let store = JsonFileStore::open(&settings.database_path).await?;

    let company = store.company_info().await?;
    let name = company
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Company");

    println!("=== {} ===", name);
    println!("Bank balance:          {}", format_currency(store.total_bank_balance().await?));
    println!(
        "Pending payables:      {} ({} bills, {} overdue)",
        format_currency(store.total_pending_payables().await?),
        store.pending_payables().await?.len(),
        store.overdue_payables().await?.len()
    );
    println!(
        "Pending receivables:   {} ({} invoices, {} overdue)",
        format_currency(store.total_pending_receivables().await?),
        store.pending_receivables().await?.len(),
        store.overdue_receivables().await?.len()
    );
    println!(
        "Uncleared cheques:     {} issued, {} received",
        store.uncleared_cheques(ChequeDirection::Issued).await?.len(),
        store.uncleared_cheques(ChequeDirection::Received).await?.len()
    );
    println!("Active vendors:        {}", store.active_vendors().await?.len());
    println!("Active projects:       {}", store.active_projects().await?.len());
    Ok(())
}

async fn verify(settings: &Settings) -> Result<()> {
    let mut failures = 0;

    match JsonFileStore::open(&settings.database_path).await {
        Ok(_) => println!("✅ Finance store: {}", settings.database_path.display()),
        Err(e) => {
            failures += 1;
            println!("❌ Finance store: {} (run `cfo seed` for demo data)", e);
        }
    }

    let gemini = match GeminiClient::new(settings) {
        Ok(client) => client.ping().await,
        Err(e) => Err(e),
    };
    match gemini {
        Ok(()) => println!("✅ Gemini: {}", settings.model),
        Err(e) => {
            failures += 1;
            println!("❌ Gemini: {}", e);
        }
    }

    match telegram_client(settings) {
        Ok(client) => match client.get_me().await {
            Ok(username) => println!("✅ Telegram: @{}", username),
            Err(e) => {
                failures += 1;
                println!("❌ Telegram: {}", e);
            }
        },
        Err(_) => println!("⚠️  Telegram: TELEGRAM_BOT_TOKEN not set"),
    }

    match settings.database_url.as_deref() {
        Some(_) => println!("✅ Conversation context: Postgres"),
        None => println!("⚠️  Conversation context: in-memory (set DATABASE_URL to persist)"),
    }

    if failures > 0 {
        return Err(AgentError::Config(format!("{} check(s) failed", failures)));
    }
    Ok(())
}
