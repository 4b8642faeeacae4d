//! Hashpilot CLI - chat with a Hedera assistant from the terminal
//!
//! The REPL appends user turns to a conversation store; the orchestrator
//! runs model rounds and ledger tools until the assistant answers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use hashpilot_core::config::{ConfigManager, GatewayKind};
use hashpilot_core::{
    ConversationStore, Message, ModelParams, Orchestrator, OrchestratorEvent, Role, build_gateway,
};
use hashpilot_ledger::{
    Alert, AlertSink, LedgerConfig, LedgerContext, LedgerServices, MemoryTokenStore, Network,
    ToolScope, ledger_catalog,
};

const DEFAULT_SYSTEM_PROMPT: &str = "You are Hashpilot, an assistant for the Hedera network. \
Use the provided tools to look up accounts, tokens and topics and to prepare transactions. \
Every transaction is signed in the user's wallet; say what you are about to submit before calling a transaction tool.";

#[derive(Parser)]
#[command(name = "hashpilot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat with an assistant that can act on the Hedera network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use (defaults to config setting)
    #[arg(short, long)]
    model: Option<String>,

    /// Reach the model through this backend function URL
    #[arg(long)]
    proxy: Option<String>,

    /// Hedera network (testnet, mainnet, previewnet)
    #[arg(long)]
    network: Option<String>,

    /// Connected account that signs transactions
    #[arg(long)]
    account: Option<String>,

    /// Tools the model may use (read_only, standard, full)
    #[arg(long)]
    scope: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Execute a single prompt and exit (non-interactive mode)
    #[arg(long)]
    one_shot: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat mode
    Chat,

    /// Show the tool declarations sent to the model
    Tools,

    /// Show configuration
    Config,
}

/// Settings after applying command line overrides
struct Settings {
    manager: ConfigManager,
    ledger: LedgerConfig,
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    let mut ledger = LedgerConfig::load(&manager)?;

    let gateway = &mut manager.config_mut().gateway;
    if let Some(model) = &cli.model {
        gateway.model = model.clone();
    }
    if let Some(url) = &cli.proxy {
        gateway.kind = GatewayKind::Proxy;
        gateway.proxy_url = Some(url.clone());
    }
    if let Some(network) = &cli.network {
        ledger.network = network.parse()?;
    }
    if let Some(account) = &cli.account {
        ledger.account_id = Some(account.clone());
    }
    if let Some(scope) = &cli.scope {
        ledger.scope = scope.parse()?;
    }
    Ok(Settings { manager, ledger })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    // warn by default so logs don't interfere with the prompt; RUST_LOG wins
    let default_filter = if cli.verbose {
        "info,hashpilot_core=debug,hashpilot_ledger=debug".to_string()
    } else {
        settings.manager.config().general.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Some(prompt) = cli.one_shot.as_deref() {
        return run_one_shot(&settings, prompt).await;
    }

    match cli.command {
        Some(Commands::Tools) => show_tools(&settings.ledger),
        Some(Commands::Config) => {
            show_config(&settings);
            Ok(())
        }
        Some(Commands::Chat) | None => run_chat(settings).await,
    }
}

/// Prints tool alerts between transcript lines
struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn alert(&self, alert: Alert) {
        println!();
        println!("  {} {}", style("◆").magenta(), style(&alert.title).bold().magenta());
        println!("    {}", style(&alert.description).dim());
        for line in alert.body.lines() {
            println!("    {line}");
        }
        println!();
    }
}

fn conversation_context(ledger: &LedgerConfig) -> LedgerContext {
    ledger
        .context()
        .with_alerts(Arc::new(ConsoleAlerts))
        .with_token_store(Arc::new(MemoryTokenStore::new()))
}

fn system_message(settings: &Settings) -> Message {
    let prompt = settings
        .manager
        .config()
        .orchestrator
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let ledger = &settings.ledger;
    let account = ledger.account_id.as_deref().unwrap_or("none connected");
    Message::system(format!(
        "{prompt}\n\nNetwork: {}\nConnected account: {account}",
        ledger.network
    ))
}

fn build_orchestrator(
    settings: &Settings,
    services: &LedgerServices,
) -> anyhow::Result<Arc<Orchestrator<LedgerContext>>> {
    let config = settings.manager.config();
    let gateway = build_gateway(&config.gateway)?;
    let catalog = ledger_catalog(services, settings.ledger.scope)?;

    tracing::info!(
        network = %settings.ledger.network,
        scope = %settings.ledger.scope,
        tools = catalog.len(),
        "Starting session"
    );

    let store = ConversationStore::new();
    store.append(system_message(settings));

    let orchestrator = Orchestrator::new(
        store,
        gateway,
        catalog,
        conversation_context(&settings.ledger),
        ModelParams::from_config(&config.gateway),
    )
    .with_max_rounds(config.orchestrator.max_rounds);
    Ok(Arc::new(orchestrator))
}

/// Show tool progress while a turn runs
fn spawn_event_printer(
    mut events: broadcast::Receiver<OrchestratorEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(OrchestratorEvent::ToolStarted { tool, .. }) => {
                    println!("  {} {}", style("[Executing:").dim(), style(&tool).yellow());
                }
                Ok(OrchestratorEvent::ToolFinished {
                    tool,
                    found,
                    is_error,
                    ..
                }) => {
                    let (mark, outcome) = match (found, is_error) {
                        (false, _) => (style("✗").red(), "not found"),
                        (true, true) => (style("✗").red(), "failed"),
                        (true, false) => (style("✓").green(), "completed"),
                    };
                    println!("  {} {}", mark, style(format!("{tool} {outcome}")).dim());
                }
                Ok(OrchestratorEvent::HookFailed { tool, message }) => {
                    let line = format!("{tool}: {message}");
                    println!("  {} {}", style("!").yellow(), style(line).dim());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Run one user turn to completion and print the answer
async fn ask(orchestrator: &Orchestrator<LedgerContext>, prompt: &str) {
    let store = orchestrator.store();
    store.append(Message::user(prompt));

    match orchestrator.run_until_idle().await {
        Ok(()) => {
            let answer = store
                .snapshot()
                .into_iter()
                .rev()
                .find(|m| m.role == Role::Assistant && m.is_visible);
            if let Some(content) = answer.and_then(|m| m.content) {
                println!("{}: {}", style("Assistant").bold().green(), content);
            }
        }
        Err(err) => {
            println!("{}", style(format!("Error: {err}")).red());
            orchestrator.dismiss_error();
        }
    }
}

async fn run_one_shot(settings: &Settings, prompt: &str) -> anyhow::Result<()> {
    let services = settings.ledger.services()?;
    let orchestrator = build_orchestrator(settings, &services)?;
    let printer = spawn_event_printer(orchestrator.subscribe_events());

    ask(&orchestrator, prompt).await;
    printer.abort();
    Ok(())
}

async fn run_chat(mut settings: Settings) -> anyhow::Result<()> {
    let services = settings.ledger.services()?;
    let orchestrator = build_orchestrator(&settings, &services)?;
    let printer = spawn_event_printer(orchestrator.subscribe_events());

    println!(
        "{} on {} ({} tools). Type {} for commands.",
        style("Hashpilot").bold().cyan(),
        style(settings.ledger.network).green(),
        orchestrator.catalog().len(),
        style("/help").yellow()
    );

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline(">> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        if let Some(command) = input.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("exit") | Some("quit"), _) => break,
                (Some("help"), _) => print_help(),
                (Some("clear"), _) => {
                    orchestrator.store().clear();
                    orchestrator.store().append(system_message(&settings));
                    println!("{}", style("Conversation cleared").dim());
                }
                (Some("network"), Some(name)) => match name.parse::<Network>() {
                    Ok(network) => {
                        settings.ledger.network = network;
                        orchestrator.set_context(conversation_context(&settings.ledger));
                        orchestrator.store().update_system_message(system_message(&settings));
                        println!("{} {}", style("Network:").dim(), style(network).green());
                    }
                    Err(err) => println!("{}", style(err).red()),
                },
                (Some("account"), Some(account)) => {
                    settings.ledger.account_id = Some(account.to_string());
                    orchestrator.set_context(conversation_context(&settings.ledger));
                    orchestrator.store().update_system_message(system_message(&settings));
                    println!("{} {}", style("Account:").dim(), style(account).green());
                }
                (Some("scope"), Some(name)) => match name.parse::<ToolScope>() {
                    Ok(scope) => {
                        settings.ledger.scope = scope;
                        orchestrator.set_catalog(ledger_catalog(&services, scope)?);
                        println!(
                            "{} {} ({} tools)",
                            style("Scope:").dim(),
                            style(scope).green(),
                            orchestrator.catalog().len()
                        );
                    }
                    Err(err) => println!("{}", style(err).red()),
                },
                _ => println!("{}", style(format!("Unknown command: /{command}")).red()),
            }
            continue;
        }

        ask(&orchestrator, input).await;
    }

    printer.abort();
    Ok(())
}

fn print_help() {
    println!("{}", style("Commands:").bold());
    for (command, desc) in [
        ("/network <name>", "Switch network (testnet, mainnet, previewnet)"),
        ("/account <id>", "Set the connected signing account"),
        ("/scope <scope>", "Limit tools (read_only, standard, full)"),
        ("/clear", "Start a new conversation"),
        ("/exit", "Quit"),
    ] {
        println!("  {:<18} {}", style(command).cyan(), desc);
    }
}

fn show_tools(ledger: &LedgerConfig) -> anyhow::Result<()> {
    let catalog = ledger_catalog(&ledger.services()?, ledger.scope)?;
    println!("{} ({})", style("Available Tools:").bold(), style(ledger.scope).green());
    println!();
    for declaration in catalog.declarations() {
        println!("  {}", style(declaration.name()).cyan());
        println!("    {}", style(&declaration.function.description).dim());
        let parameters = serde_json::to_string_pretty(&declaration.function.parameters)?;
        for line in parameters.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

fn show_config(settings: &Settings) {
    let config = settings.manager.config();
    let gateway = &config.gateway;
    let ledger = &settings.ledger;

    println!("{}", style("Configuration:").bold());
    println!();
    println!("  Config file: {}", style(settings.manager.path().display()).dim());
    println!();
    println!("  {}", style("[gateway]").bold());
    println!("  Kind: {}", style(format!("{:?}", gateway.kind)).green());
    println!("  Model: {}", style(&gateway.model).green());
    match gateway.kind {
        GatewayKind::Direct => {
            println!("  Base URL: {}", gateway.base_url());
            let key = if gateway.get_api_key().is_some() {
                style("set".to_string()).green()
            } else {
                style(format!("missing (set {})", gateway.api_key_env)).red()
            };
            println!("  API key: {key}");
        }
        GatewayKind::Proxy => {
            println!("  Proxy URL: {}", gateway.proxy_url.as_deref().unwrap_or("N/A"));
        }
    }
    println!(
        "  Timeout: {}s, retries: {} (base delay {}ms)",
        gateway.timeout_secs, gateway.retries, gateway.retry_delay_ms
    );
    println!();
    println!("  {}", style("[orchestrator]").bold());
    println!("  Max rounds: {}", config.orchestrator.max_rounds);
    println!();
    println!("  {}", style("[ledger]").bold());
    println!("  Network: {}", style(ledger.network).green());
    println!(
        "  Mirror node: {}",
        ledger
            .mirror_node_url
            .clone()
            .unwrap_or_else(|| ledger.network.mirror_node_url())
    );
    println!("  Wallet: {}", ledger.wallet_url.as_deref().unwrap_or("not connected"));
    println!("  Account: {}", ledger.account_id.as_deref().unwrap_or("none"));
    println!("  Scope: {}", style(ledger.scope).green());
}
