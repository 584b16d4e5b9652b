use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pulse::notify::Decision;
use pulse::{CheckRunner, RunContext, RunOutcome};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

mod config;
mod grafana;
mod metrics;
mod monitoring;
mod notifier;
mod server;

use config::{Config, Target};
use grafana::GrafanaClient;
use metrics::Metrics;
use monitoring::{MonitoringExecutor, MonitoringScheduler, default_checks};
use notifier::{LogNotifier, forward_reports};

#[derive(Parser)]
#[command(name = "pulse-service")]
#[command(about = "Client-pair health checks with root-cause correlation", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pulse/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every configured target on its schedule until interrupted
    Run,

    /// Check a single client once and print the outcome as JSON
    Check {
        #[arg(long)]
        network: String,

        #[arg(long)]
        client: String,

        /// Also alert on failures no root cause explains
        #[arg(long)]
        alert_unexplained: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    decision: Decision,
    outcome: &'a RunOutcome,
    log: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref())?;

    match cli.command {
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        Command::Run => {
            config.validate()?;
            run_daemon(config).await
        }
        Command::Check {
            network,
            client,
            alert_unexplained,
        } => {
            config.validate()?;
            let target = Target {
                alert_unexplained,
                ..Target::new(network, client)
            };
            check_once(&config, &target).await
        }
    }
}

fn build_runner(config: &Config, metrics: Arc<Metrics>) -> Result<CheckRunner> {
    let token = config.grafana.token();
    if token.is_none() {
        tracing::warn!(
            variable = %config.grafana.token_env,
            "No Grafana token set, querying anonymously"
        );
    }

    let source = Arc::new(
        GrafanaClient::new(&config.grafana, token, metrics)
            .context("failed to build Grafana client")?,
    );
    tracing::debug!(
        url = source.base_url(),
        datasource = %config.grafana.datasource_id,
        "Using Grafana"
    );

    let pre_production = config.analysis.pre_production_clients.iter().cloned();
    let mut runner = CheckRunner::new().with_pre_production(pre_production);
    for check in default_checks(source) {
        runner.register_check(check);
    }

    Ok(runner)
}

/// Flip the shutdown signal on Ctrl-C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                // Without a signal handler the service runs until killed
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    rx
}

async fn run_daemon(config: Config) -> Result<()> {
    if config.targets.is_empty() {
        bail!("no targets configured, add [[targets]] entries to the config file");
    }

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let runner = Arc::new(build_runner(&config, metrics.clone())?);
    let shutdown = shutdown_on_ctrl_c();

    let server = if config.metrics.enabled {
        let addr = config.metrics.socket_addr()?;
        let server = server::run_server(addr, metrics.clone(), shutdown.clone())
            .with_context(|| format!("failed to serve metrics on {addr}"))?;
        Some(server)
    } else {
        None
    };

    let executor = Arc::new(MonitoringExecutor::new(
        runner,
        Duration::from_secs(config.schedule.run_timeout_seconds),
        shutdown.clone(),
        metrics.clone(),
    ));

    let (report_tx, report_rx) = mpsc::channel(config.targets.len().max(1) * 2);
    let forwarder = tokio::spawn(forward_reports(report_rx, Arc::new(LogNotifier), metrics));

    let scheduler = MonitoringScheduler::new(
        executor,
        report_tx,
        Duration::from_secs(config.schedule.interval_seconds),
        shutdown.clone(),
    );

    tracing::info!(
        targets = config.targets.len(),
        interval_seconds = config.schedule.interval_seconds,
        "Starting scheduler"
    );

    let handles = scheduler.schedule_targets(config.targets.clone());
    drop(scheduler);

    let serving = async {
        match server {
            Some(server) => server.await.context("metrics server failed"),
            None => Ok(()),
        }
    };

    let (results, served) = tokio::join!(futures::future::join_all(handles), serving);
    for result in results {
        if let Err(e) = result {
            tracing::error!("Target task panicked: {}", e);
        }
    }

    forwarder.await.context("report forwarder panicked")?;
    served
}

async fn check_once(config: &Config, target: &Target) -> Result<()> {
    let check_config = target.check_config()?;
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let runner = build_runner(config, metrics)?;

    let ctx = RunContext::new()
        .with_timeout(Duration::from_secs(config.schedule.run_timeout_seconds))
        .with_shutdown(shutdown_on_ctrl_c());

    let outcome = runner.run_checks(&ctx, &check_config).await?;

    let report = CheckReport {
        decision: outcome.decision(target.alert_unexplained),
        outcome: &outcome,
        log: ctx.log().lines(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
