//! kdeploy - deploy, upgrade and delete kubeware bundles on Kubernetes

use anyhow::Context as _;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use kdeploy::client::{DryRunClient, KubeResourceClient, ResourceClient};
use kdeploy::config::{parse_duration, ClusterConfig, LifecycleSettings, PollOptions};
use kdeploy::controller::{self, Context, KubewareSummary, StrategyName};
use kdeploy::kubeware::Kubeware;
use kdeploy::shutdown::{shutdown_channel, wait_for_signal};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// kdeploy - lifecycle management for versioned kubeware bundles
#[derive(Parser, Debug)]
#[command(name = "kdeploy", version, about, long_about = None)]
struct Cli {
    /// Namespace to operate in
    #[arg(short, long, global = true, env = "KDEPLOY_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Upgrade strategy: recreateAll, rollPreserveServices or rollReplaceServices
    #[arg(
        long,
        global = true,
        env = "KDEPLOY_UPGRADE_STRATEGY",
        default_value_t = StrategyName::RollPreserveServices
    )]
    strategy: StrategyName,

    /// Extra ready replicas allowed during a rolling hand-off
    #[arg(long, global = true, env = "KDEPLOY_MAX_REPLICAS_EXCESS", default_value_t = 1)]
    max_replicas_excess: u32,

    /// Interval between polls while draining or rolling (e.g. "1s", "5m")
    #[arg(
        long,
        global = true,
        env = "KDEPLOY_POLL_INTERVAL",
        default_value = "1s",
        value_parser = duration_arg
    )]
    poll_interval: Duration,

    /// Give up on a drain or rolling hand-off after this long (unbounded if unset)
    #[arg(long, global = true, env = "KDEPLOY_DEADLINE", value_parser = duration_arg)]
    deadline: Option<Duration>,

    /// API server URL (inferred from kubeconfig or the pod environment if unset)
    #[arg(long, global = true, env = "KUBERNETES_ENDPOINT")]
    endpoint: Option<String>,

    /// Skip API server certificate verification
    #[arg(
        long,
        global = true,
        env = "KDEPLOY_INSECURE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    insecure: bool,

    /// Log every change that would be made without making it
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "KDEPLOY_DRYRUN",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'D', long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a kubeware that is not yet deployed in the namespace
    Deploy {
        /// Rendered kubeware bundle (JSON)
        bundle: PathBuf,
    },

    /// Upgrade a deployed kubeware to the bundle's version
    Upgrade {
        /// Rendered kubeware bundle (JSON)
        bundle: PathBuf,
    },

    /// Delete every Service and Workload of a kubeware
    Delete {
        /// Kubeware name
        name: String,
    },

    /// List deployed kubewares
    List {
        /// List across all namespaces
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| {
        format!(
            "invalid duration '{}' (expected a positive number followed by s, m or h)",
            value
        )
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    // Already installed is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(cli).await {
        error!(error = %e, "kdeploy failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cluster = ClusterConfig {
        endpoint: cli.endpoint.clone(),
        accept_invalid_certs: cli.insecure,
    };
    let client = KubeResourceClient::connect(&cluster)
        .await
        .context("Failed to connect to the Kubernetes cluster")?;

    // SIGINT/SIGTERM aborts a drain or rolling hand-off at its next poll
    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                info!(signal, "Cancelling at the next poll");
                shutdown_controller.shutdown();
            }
            Err(e) => warn!(error = %e, "Could not install signal handlers"),
        }
    });

    let mut poll = PollOptions::unbounded(cli.poll_interval).with_cancel(shutdown_signal);
    if let Some(deadline) = cli.deadline {
        poll = poll.with_deadline(deadline);
    }
    let settings = LifecycleSettings {
        max_replicas_excess: cli.max_replicas_excess,
        poll,
    };
    info!(namespace = %cli.namespace, ?settings, "Lifecycle settings");
    let client: Arc<dyn ResourceClient> = Arc::new(client);
    let client: Arc<dyn ResourceClient> = if cli.dry_run {
        warn!("Dry run: changes are logged, not applied");
        Arc::new(DryRunClient::new(client))
    } else {
        client
    };
    let ctx = Context::new(client, settings);
    let suffix = if cli.dry_run { " (dry run)" } else { "" };

    match cli.command {
        Commands::Deploy { bundle } => {
            let kubeware = load_bundle(&bundle).await?;
            controller::deploy(&ctx, &kubeware, &cli.namespace).await?;
            println!(
                "Deployed {} in namespace {}{}",
                kubeware.reference(),
                cli.namespace,
                suffix
            );
        }
        Commands::Upgrade { bundle } => {
            let kubeware = load_bundle(&bundle).await?;
            let upgraded =
                controller::upgrade(&ctx, &kubeware, &cli.namespace, cli.strategy).await?;
            println!(
                "Upgraded {} in namespace {} from version {} ({}){}",
                kubeware.reference(),
                cli.namespace,
                upgraded.previous_version,
                upgraded.strategy,
                suffix
            );
        }
        Commands::Delete { name } => {
            let version = controller::delete(&ctx, &cli.namespace, &name).await?;
            println!(
                "Deleted {}@{} from namespace {}{}",
                name, version, cli.namespace, suffix
            );
        }
        Commands::List { all_namespaces } => {
            let namespace = (!all_namespaces).then_some(cli.namespace.as_str());
            let inventory = controller::list(&ctx, namespace).await?;
            print!("{}", render_inventory(&inventory));
        }
    }
    Ok(())
}

/// Read a rendered bundle from disk
async fn load_bundle(path: &Path) -> anyhow::Result<Kubeware> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read bundle {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundle {}", path.display()))
}

/// Plain text inventory, one block per deployed kubeware
fn render_inventory(inventory: &[KubewareSummary]) -> String {
    if inventory.is_empty() {
        return "No kubeware deployed\n".to_string();
    }

    let mut out = String::new();
    for kubeware in inventory {
        let _ = writeln!(
            out,
            "{}/{}@{}",
            kubeware.namespace, kubeware.name, kubeware.version
        );
        for svc in &kubeware.services {
            let _ = writeln!(
                out,
                "  service   {:<24} {:<16} {}",
                svc.name,
                svc.cluster_ip.as_deref().unwrap_or("-"),
                svc.external.as_deref().unwrap_or("-")
            );
        }
        for rc in &kubeware.workloads {
            let _ = writeln!(
                out,
                "  workload  {:<24} {}/{}",
                rc.name, rc.status_replicas, rc.spec_replicas
            );
        }
    }
    out
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
