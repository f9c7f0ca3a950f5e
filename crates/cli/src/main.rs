use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ethereal_core::{EtherealError, InstanceController, InstanceLookup, OperatorConfig, StateStore};
use ethereal_reconcile::{decide, CycleReport, Reconciler, SchedulerLoop};
use kube::CustomResourceExt;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ethereal-operator", version, about = "Keeps one pod alive per EtherealPod")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Managed namespace (overrides ETHEREAL_NAMESPACE)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile forever until SIGINT/SIGTERM
    Run {
        /// Seconds between cycles
        #[arg(long = "interval-secs")]
        interval_secs: Option<u64>,
        /// Seconds to wait after a cycle that could not list records
        #[arg(long = "backoff-secs")]
        backoff_secs: Option<u64>,
    },
    /// Run a single reconciliation cycle and print what it did
    Once,
    /// List records with their counter and observed instance state
    Ls,
    /// Print the EtherealPod CRD manifest
    Crd,
}

fn init_tracing() {
    let env = std::env::var("ETHEREAL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ETHEREAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid ETHEREAL_METRICS_ADDR; expected host:port");
        }
    }
}

/// Connect or exit: without a control plane there is nothing to reconcile.
async fn connect_or_exit(cfg: &OperatorConfig) -> (Arc<dyn StateStore>, Arc<dyn InstanceController>) {
    match ethereal_kubehub::connect(cfg).await {
        Ok((store, pods)) => {
            let store: Arc<dyn StateStore> = Arc::new(store);
            let pods: Arc<dyn InstanceController> = Arc::new(pods);
            (store, pods)
        }
        Err(e) => {
            error!(error = %e, ns = %cfg.namespace, "cannot establish control-plane connection");
            eprintln!("fatal: {}", e);
            std::process::exit(1);
        }
    }
}

/// Resolves once SIGINT or (on unix) SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let mut cfg = OperatorConfig::from_env();
    if let Some(ns) = cli.namespace.clone() {
        cfg.namespace = ns;
    }

    match cli.command {
        Commands::Run { interval_secs, backoff_secs } => {
            if let Some(s) = interval_secs { cfg.interval = Duration::from_secs(s.max(1)); }
            if let Some(s) = backoff_secs { cfg.backoff = Duration::from_secs(s.max(1)); }
            info!(ns = %cfg.namespace, default_image = %cfg.default_image, "ethereal operator starting");
            let (store, pods) = connect_or_exit(&cfg).await;
            let reconciler = Reconciler::new(store, pods, cfg.default_image.clone());
            let scheduler = SchedulerLoop::new(reconciler, cfg.interval, cfg.backoff);

            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("shutdown requested; finishing current cycle");
                let _ = stop_tx.send(true);
            });
            let summary = scheduler.run(stop_rx).await;
            info!(cycles = summary.cycles, failed = summary.failed_cycles, "ethereal operator stopped");
        }
        Commands::Once => {
            let (store, pods) = connect_or_exit(&cfg).await;
            let reconciler = Reconciler::new(store, pods, cfg.default_image.clone());
            match reconciler.run_cycle().await {
                Ok(report) => print_report(&report, cli.output)?,
                Err(e) => {
                    error!(error = %e, "cycle failed");
                    anyhow::bail!("cycle failed: {}", e);
                }
            }
        }
        Commands::Ls => {
            let (store, pods) = connect_or_exit(&cfg).await;
            let records = store.list().await.map_err(|e| anyhow::anyhow!("listing records: {}", e))?;
            let mut rows = Vec::with_capacity(records.len());
            for r in records {
                let lookup = InstanceLookup::from(pods.get(&r.instance_name()).await);
                let state = instance_state(&r, &lookup, &cfg.default_image);
                rows.push(Row {
                    image: r.effective_image(&cfg.default_image).to_string(),
                    instance: r.instance_name(),
                    resurrections: r.resurrections(),
                    name: r.name,
                    state,
                });
            }
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<24} {:<28} {:<13} {}", "NAME", "INSTANCE", "IMAGE", "RESURRECTIONS", "STATE");
                    for row in &rows {
                        let res = row.resurrections.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
                        println!("{:<20} {:<24} {:<28} {:<13} {}", row.name, row.instance, row.image, res, row.state);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Crd => {
            let crd = ethereal_kubehub::EtherealPod::crd();
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&crd)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&crd)?),
            }
        }
    }

    Ok(())
}

#[derive(serde::Serialize)]
struct Row {
    name: String,
    instance: String,
    image: String,
    resurrections: Option<u64>,
    state: &'static str,
}

fn instance_state(record: &ethereal_core::DesiredRecord, lookup: &InstanceLookup, default_image: &str) -> &'static str {
    match lookup {
        InstanceLookup::Missing => "absent",
        InstanceLookup::Failed(_) => "unknown",
        InstanceLookup::Found(_) => match decide(record, lookup, default_image) {
            ethereal_core::ReconcileAction::NoOp => "matching",
            _ => "mismatched",
        },
    }
}

fn print_report(report: &CycleReport, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            println!("cycle {} • {} records • {} ms", report.cycle_id, report.records(), report.took_ms);
            println!("{:<20} {:<9} {:<13} {}", "RECORD", "ACTION", "RESURRECTIONS", "ERROR");
            for o in &report.outcomes {
                let res = o.resurrections.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
                let err = o.error.as_ref().map(EtherealError::to_string).unwrap_or_default();
                println!("{:<20} {:<9} {:<13} {}", o.record, o.action, res, err);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}
