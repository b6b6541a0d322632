mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cephmaint::ceph::CephAdapter;
use cephmaint::k8s::{ClusterApi, ClusterClient};
use cephmaint::observation::ObservationSubsystem;
use cephmaint::orchestrator::{execute_down_phase, execute_up_phase, PhaseOptions, ProgressEvent, WaitOptions};
use cephmaint::retry::NeverCancel;
use clap::Parser;
use cli::{Cli, Command, WatchOutput};
use colored::Colorize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.global.into_config();
    let validated = config.validate().map_err(anyhow::Error::msg)?;
    for warning in &validated.warnings {
        log::warn!("{}", warning);
    }
    logging::init(&config.logging);

    let client = ClusterClient::new(
        config.kubeconfig_path.as_deref(),
        config.kube_context.as_deref(),
        Duration::from_secs(config.timeouts.api_call_seconds),
    )
    .await
    .context("failed to construct Kubernetes client")?;
    let cluster: Arc<dyn ClusterApi> = Arc::new(client);
    let ceph = Arc::new(CephAdapter::new(cluster.clone()));

    let wait = WaitOptions::from_config(&config);
    let progress = |event: &ProgressEvent| {
        let line = match event.deployment_id.as_ref() {
            Some(id) => format!("[{}] {} ({})", event.stage, event.description, id),
            None => format!("[{}] {}", event.stage, event.description),
        };
        match event.stage {
            cephmaint::orchestrator::Stage::Error => println!("{}", line.red()),
            cephmaint::orchestrator::Stage::Complete => println!("{}", line.green()),
            _ => println!("{}", line),
        }
    };

    match cli.command {
        Command::Down { node } => {
            let options = PhaseOptions {
                progress: &progress,
                wait,
            };
            execute_down_phase(cluster, ceph.as_ref(), &config, &node, &NeverCancel, &options)
                .await
                .context("down phase failed")?;
        }
        Command::Up { node } => {
            let options = PhaseOptions {
                progress: &progress,
                wait,
            };
            execute_up_phase(cluster, ceph.as_ref(), &config, &node, &NeverCancel, &options)
                .await
                .context("up phase failed")?;
        }
        Command::Watch { output } => {
            let subsystem = ObservationSubsystem::start(
                cluster,
                ceph,
                config.cluster_namespace.clone(),
                config.ui.clone(),
            );
            let mut updates = subsystem.take_updates().expect("updates receiver taken once");
            while let Some(snapshot) = updates.recv().await {
                let rendered = match output {
                    WatchOutput::Json => cephmaint::format::snapshot_to_json(&snapshot)?,
                    WatchOutput::Yaml => cephmaint::format::snapshot_to_yaml(&snapshot)?,
                };
                println!("{}", rendered);
            }
            subsystem.stop().await;
        }
    }

    Ok(())
}
