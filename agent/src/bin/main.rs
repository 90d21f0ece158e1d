use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use hwpc_power::handler::ReportHandler;
use hwpc_power::report::{HwpcReport, PowerReport, Scope};
use hwpc_power_agent::config::AgentConfig;
use hwpc_power_agent::sink::CsvSink;
use hwpc_power_agent::{carbon, init_logger, source};
use tokio::sync::mpsc;

/// Reads a replayed stream of HWPC reports, runs one power-model handler per
/// (socket, scope) and writes the resulting power reports to CSV.
#[derive(Parser)]
#[command(name = "hwpc-power-agent", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "HWPC_POWER_CONFIG", default_value = "hwpc-power-agent.toml")]
    config: String,

    /// Print the default configuration and exit, instead of running the agent.
    #[arg(long, default_value_t = false)]
    print_default_config: bool,

    /// Override `formula.real_time_mode` from the config file.
    #[arg(long)]
    real_time_mode: bool,

    /// Override `formula.disable_cpu_formula` from the config file.
    #[arg(long)]
    disable_cpu_formula: bool,

    /// Override `formula.disable_dram_formula` from the config file.
    #[arg(long)]
    disable_dram_formula: bool,

    /// Override `source.input_path` from the config file.
    #[arg(long)]
    input: Option<std::path::PathBuf>,

    /// Override `sink.output_path` from the config file.
    #[arg(long)]
    output: Option<std::path::PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, mut config: AgentConfig) -> AgentConfig {
        if self.real_time_mode {
            config.formula.real_time_mode = true;
        }
        if self.disable_cpu_formula {
            config.formula.disable_cpu_formula = true;
        }
        if self.disable_dram_formula {
            config.formula.disable_dram_formula = true;
        }
        if let Some(input) = &self.input {
            config.source.input_path = input.clone();
        }
        if let Some(output) = &self.output {
            config.sink.output_path = output.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    if cli.print_default_config {
        match toml::to_string_pretty(&AgentConfig::default()) {
            Ok(rendered) => {
                println!("{rendered}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                log::error!("failed to render default config: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    let config = cli.apply_overrides(config);

    if let Some(carbon_config) = config.carbon.clone() {
        tokio::spawn(run_carbon_poller(carbon_config));
    }

    let (report_tx, report_rx) = mpsc::unbounded_channel::<PowerReport>();
    let sink_task = tokio::spawn(run_sink(config.sink.clone(), report_rx));

    let mut handler_channels = Vec::new();
    let mut handler_tasks = Vec::new();
    for socket in &config.sockets {
        for scope in enabled_scopes(&config.formula) {
            let (tx, rx) = mpsc::unbounded_channel::<HwpcReport>();
            let handler = ReportHandler::new(config.sensor_name.clone(), socket.clone(), scope, config.formula.clone());
            handler_channels.push(tx);
            handler_tasks.push(tokio::spawn(run_handler(handler, rx, report_tx.clone())));
        }
    }
    drop(report_tx);

    let reports = source::read_jsonl(&config.source.input_path)
        .await
        .with_context(|| format!("failed to read input reports from `{}`", config.source.input_path.display()))?;
    log::info!("replaying {} reports from {}", reports.len(), config.source.input_path.display());

    for report in reports {
        for tx in &handler_channels {
            // A closed handler channel means that handler task already
            // exited (e.g. on a prior fatal error); skip it.
            let _ = tx.send(report.clone());
        }
    }
    handler_channels.clear();

    for task in handler_tasks {
        task.await.context("handler task panicked")?;
    }
    sink_task.await.context("sink task panicked")??;

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<AgentConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).with_context(|| format!("invalid config file `{path}`")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("config file `{path}` not found, using defaults");
            Ok(AgentConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read config file `{path}`")),
    }
}

fn enabled_scopes(formula: &hwpc_power::Config) -> Vec<Scope> {
    let mut scopes = Vec::new();
    if !formula.disable_cpu_formula {
        scopes.push(Scope::Cpu);
    }
    if !formula.disable_dram_formula {
        scopes.push(Scope::Dram);
    }
    scopes
}

/// Owns one handler for the lifetime of the run: ingests every report sent
/// to it, forwarding emitted power reports to the sink, and drains any
/// buffered ticks once the channel closes (spec.md §5 Cancellation).
async fn run_handler(
    mut handler: ReportHandler,
    mut reports: mpsc::UnboundedReceiver<HwpcReport>,
    power_reports: mpsc::UnboundedSender<PowerReport>,
) {
    while let Some(report) = reports.recv().await {
        for power_report in handler.ingest(report) {
            if power_reports.send(power_report).is_err() {
                log::warn!("{}/{}: sink channel closed, dropping remaining output", handler.socket(), handler.scope());
                return;
            }
        }
    }
    for power_report in handler.drain() {
        let _ = power_reports.send(power_report);
    }
}

async fn run_sink(sink_config: hwpc_power_agent::config::SinkConfig, mut reports: mpsc::UnboundedReceiver<PowerReport>) -> anyhow::Result<()> {
    let mut sink = CsvSink::new(
        &sink_config.output_path,
        sink_config.force_flush,
        sink_config.max_retries,
        sink_config.retry_backoff,
    )
    .with_context(|| format!("failed to open sink `{}`", sink_config.output_path.display()))?;

    while let Some(report) = reports.recv().await {
        if let Err(e) = sink.write(&report) {
            log::error!("dropping power report for `{}`: {e}", report.target);
        }
    }
    Ok(())
}

async fn run_carbon_poller(config: hwpc_power_agent::config::CarbonConfig) {
    let poller = carbon::CarbonIntensityPoller::new(config);
    let mut ticker = tokio::time::interval(poller.poll_interval());
    loop {
        ticker.tick().await;
        match poller.fetch_once().await {
            Ok(intensity) => log::info!("carbon intensity: {intensity} gCO2/kWh"),
            Err(e) => log::warn!("carbon intensity poll failed: {e}"),
        }
    }
}
