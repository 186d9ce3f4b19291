use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tollgate::Config;
use tollgate::discovery::{MachineClient, MachineDirectory, NameResolver};
use tollgate::intent::{IntentParser, KeywordIntentParser, RemoteIntentParser};
use tollgate::orchestrator::{
    AutoApprove, QuoteApprover, TaskHistory, TaskOrchestrator, TaskRecord, TaskState,
};
use tollgate::payment::{
    BalanceSource, ConfirmationWatcher, NoWallet, PaymentGateway, PaymentSigner, RpcWallet,
    SpendPolicy, SystemClock,
};
use tollgate::storage::{FileStore, KeyValueStore};
use tollgate::telemetry::{DevicePoller, DeviceSnapshot};

use crate::app::approval::TerminalApprover;
use crate::app::status::{render_policy, render_status};
use crate::cli::commands::{AutonomyCommands, Cli, Commands};

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            intent,
            attended,
            yes,
        } => run_task(&config, &intent, attended, yes).await,
        Commands::Autonomy { autonomy_command } => handle_autonomy(&config, autonomy_command),
        Commands::History { limit } => show_history(&config, limit),
        Commands::Devices { machine, watch } => show_devices(&config, machine.as_deref(), watch).await,
        Commands::Resolve { machine_id } => resolve_machine(&config, &machine_id).await,
        Commands::Status => {
            let policy = load_policy(&config, open_store(&config)?)?;
            println!("{}", render_status(&config, &policy.state()));
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let dir = config.state_dir();
    let store = FileStore::open(&dir)
        .with_context(|| format!("Failed to open state directory {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn load_policy(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Arc<SpendPolicy>> {
    let policy = SpendPolicy::load(
        store,
        Arc::new(SystemClock),
        config.autonomy.default_daily_limit,
    )
    .context("Failed to load spend policy")?;
    Ok(Arc::new(policy))
}

fn machine_client(config: &Config) -> MachineClient {
    MachineClient::new(Duration::from_secs(config.machine.request_timeout_secs))
}

fn build_gateway(config: &Config, policy: Arc<SpendPolicy>) -> Result<PaymentGateway> {
    let client = machine_client(config);
    let gateway = match RpcWallet::from_config(&config.wallet).context("Invalid wallet config")? {
        Some(wallet) => {
            info!(address = wallet.address(), "wallet configured");
            let wallet = Arc::new(wallet);
            let signer: Arc<dyn PaymentSigner> = wallet.clone();
            let watcher: Arc<dyn ConfirmationWatcher> = wallet.clone();
            let balance: Arc<dyn BalanceSource> = wallet;
            PaymentGateway::new(client, policy, signer, watcher)
                .with_balance_source(balance, config.wallet.gas_reserve)
        }
        None => {
            let wallet = Arc::new(NoWallet);
            PaymentGateway::new(client, policy, wallet.clone(), wallet)
        }
    };
    Ok(gateway
        .with_max_auto_pay(config.autonomy.max_auto_pay_amount)
        .with_proof_grace(Duration::from_millis(config.wallet.proof_grace_period_ms)))
}

fn build_parser(config: &Config) -> Arc<dyn IntentParser> {
    match &config.intent.parser_url {
        Some(url) => Arc::new(RemoteIntentParser::new(
            url.clone(),
            Duration::from_secs(config.intent.timeout_secs),
        )),
        None => Arc::new(KeywordIntentParser),
    }
}

fn build_orchestrator(config: &Config, attended: bool) -> Result<TaskOrchestrator> {
    let store = open_store(config)?;
    let policy = load_policy(config, Arc::clone(&store))?;
    let history = TaskHistory::load(store, config.storage.history_limit)
        .context("Failed to load task history")?;
    let client = machine_client(config);
    let resolver = NameResolver::new(client.clone(), &config.machine, &config.resolver);

    Ok(TaskOrchestrator::new(
        build_parser(config),
        MachineDirectory::new(config.machines.clone()),
        resolver,
        client,
        build_gateway(config, policy)?,
        history,
    )
    .attended_only(attended))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  {}", style("Cancelling...").yellow());
            token.cancel();
        }
    });
}

async fn run_task(config: &Config, intent: &str, attended: bool, yes: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, attended)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let approver: Box<dyn QuoteApprover> = if yes {
        Box::new(AutoApprove)
    } else {
        Box::new(TerminalApprover)
    };

    println!("  {} {}", style("▸").cyan().bold(), intent);
    let record = orchestrator
        .run_with_approval(intent, approver.as_ref(), &cancel)
        .await?;
    print_record(&record);
    Ok(())
}

fn print_record(record: &TaskRecord) {
    match record.state {
        TaskState::Success => {
            println!("  {} Done", style("✓").green().bold());
            if let Some(device) = &record.device {
                println!("  {} {} ({})", style("Device:").dim(), device.name, device.id);
            }
            if let Some(tx) = &record.tx_hash {
                println!("  {} {tx}", style("Transaction:").dim());
            }
            if let Some(data) = &record.result_data {
                let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
                println!("{pretty}");
            }
            if record.resolution_degraded {
                println!(
                    "  {} name resolution failed, used the configured URL",
                    style("!").yellow()
                );
            }
        }
        TaskState::Idle => {
            println!("  {}", record.message.as_deref().unwrap_or_default());
        }
        state => println!("  {} task ended in {state}", style("!").yellow()),
    }
}

fn handle_autonomy(config: &Config, command: AutonomyCommands) -> Result<()> {
    let policy = load_policy(config, open_store(config)?)?;
    match command {
        AutonomyCommands::Enable { daily_limit } => {
            let limit = daily_limit.unwrap_or(policy.state().daily_limit);
            policy.enable(limit)?;
            println!(
                "  {} Autonomous payments enabled up to {limit} per day",
                style("✓").green().bold()
            );
        }
        AutonomyCommands::Disable => {
            policy.disable()?;
            println!("  {} Autonomous payments disabled", style("✓").green().bold());
        }
        AutonomyCommands::Status => {}
    }
    for line in render_policy(&policy.state()) {
        println!("{line}");
    }
    Ok(())
}

fn show_history(config: &Config, limit: usize) -> Result<()> {
    let history = TaskHistory::load(open_store(config)?, config.storage.history_limit)?;
    if history.is_empty() {
        println!("  No tasks yet.");
        return Ok(());
    }
    for entry in history.entries().into_iter().take(limit) {
        let marker = match entry.state {
            TaskState::Success => style("✓").green(),
            TaskState::Error => style("✗").red(),
            _ => style("·").dim(),
        };
        println!(
            "  {marker} {}  {}  {}",
            style(entry.timestamp.format("%Y-%m-%d %H:%M")).dim(),
            entry.intent,
            entry
                .tx_hash
                .as_deref()
                .or(entry.error.as_deref())
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// Directory ids, or a bare name-service domain such as `lock.example.eth`.
fn ensure_known(directory: &MachineDirectory, id: &str) -> Result<()> {
    if directory.get(id).is_none() && !id.contains('.') {
        anyhow::bail!("Unknown machine '{id}'");
    }
    Ok(())
}

async fn machine_url(config: &Config, machine: Option<&str>) -> Result<String> {
    let Some(id) = machine else {
        return Ok(config.machine.default_url.clone());
    };
    let directory = MachineDirectory::new(config.machines.clone());
    ensure_known(&directory, id)?;
    let resolver = NameResolver::new(machine_client(config), &config.machine, &config.resolver);
    Ok(resolver.resolve_id(&directory, id).await.machine.base_url)
}

async fn show_devices(config: &Config, machine: Option<&str>, watch: bool) -> Result<()> {
    let base_url = machine_url(config, machine).await?;
    let poller = DevicePoller::new(
        machine_client(config),
        base_url,
        Duration::from_secs(config.telemetry.poll_interval_secs),
    );
    if !watch {
        let snapshot = poller.poll_once().await;
        if let Some(error) = &snapshot.error {
            anyhow::bail!("Failed to list devices: {error}");
        }
        print_devices(&snapshot);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let (mut rx, handle) = poller.spawn(cancel.clone());
    while !cancel.is_cancelled() {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_devices(&rx.borrow_and_update());
            }
        }
    }
    handle.await.context("Device poller panicked")?;
    Ok(())
}

fn print_devices(snapshot: &DeviceSnapshot) {
    if let Some(error) = &snapshot.error {
        println!("  {} {error}", style("!").yellow());
    }
    for device in &snapshot.devices {
        println!(
            "  {} {} [{}] {}",
            style(&device.id).bold(),
            device.name,
            device.device_type,
            style(&device.status).dim()
        );
        for (key, value) in &device.telemetry {
            println!("      {key}: {value}");
        }
    }
}

async fn resolve_machine(config: &Config, machine_id: &str) -> Result<()> {
    let directory = MachineDirectory::new(config.machines.clone());
    ensure_known(&directory, machine_id)?;
    let resolver = NameResolver::new(machine_client(config), &config.machine, &config.resolver);
    let resolution = resolver.resolve_id(&directory, machine_id).await;
    let machine = &resolution.machine;
    println!("  {}  {}", style("Machine:").dim(), machine.display_name);
    println!("  {}      {}", style("URL:").dim(), machine.base_url);
    println!("  {}  {}", style("Pay to:").dim(), machine.payment_address);
    println!("  {}   {}", style("Device:").dim(), machine.device_id);
    if resolution.degraded {
        println!(
            "  {} {}",
            style("degraded:").yellow(),
            resolution.reason.as_deref().unwrap_or("resolution failed")
        );
    }
    Ok(())
}
