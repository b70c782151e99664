// Copyright 2025 The Open Cluster Management Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::ControllerArgs;
use crate::context::Context;
use crate::probe::Diagnostics;
use crate::reconcile::{error_policy, reconcile};
use crate::types::v1::cluster_manager::ClusterManager;
use crate::types::v1::klusterlet::Klusterlet;
use crate::types::v1::managed::ManagedResource;
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::CustomResourceExt;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod context;
pub mod probe;
pub mod reconcile;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();
}

/// Runs the hub controller for ClusterManagers.
pub async fn run_hub(args: ControllerArgs) -> Result<(), Box<dyn std::error::Error>> {
    run::<ClusterManager>(args).await
}

/// Runs the agent controller for Klusterlets.
pub async fn run_agent(args: ControllerArgs) -> Result<(), Box<dyn std::error::Error>> {
    run::<Klusterlet>(args).await
}

async fn run<K: ManagedResource>(args: ControllerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let client = Client::try_default().await?;
    let diagnostics = Diagnostics::default();

    let probe_port = args.probe_port;
    let probe_diagnostics = diagnostics.clone();
    tokio::spawn(async move {
        if let Err(e) = probe::run(probe_port, probe_diagnostics).await {
            warn!("probe server stopped: {}", e);
        }
    });

    let context = Context::new(client.clone(), args.into(), diagnostics.clone());

    info!("starting {} controller", K::kind(&()));
    diagnostics.set_ready(true);

    Controller::new(Api::<K>::all(client.clone()), watcher::Config::default())
        .owns(
            Api::<corev1::Namespace>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<corev1::ServiceAccount>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<corev1::Service>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<appsv1::Deployment>::all(client.clone()),
            watcher::Config::default(),
        )
        .run(reconcile::<K>, error_policy::<K>, Arc::new(context))
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => info!("reconciled {}", object.name),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        })
        .await;

    diagnostics.set_ready(false);
    Ok(())
}

/// Writes the ClusterManager and Klusterlet CRDs as one YAML stream.
pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    let documents = [
        serde_yaml_ng::to_string(&ClusterManager::crd())?,
        serde_yaml_ng::to_string(&Klusterlet::crd())?,
    ];

    writer
        .write_all(documents.join("---\n").as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
