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

use crate::types::v1::key::{ResourceKey, SubResourceKind};
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde_json::Value;

/// What happened to one sub-resource during the apply step of a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Live object already matched the desired one.
    Unchanged,
    Failed(String),
}

impl ApplyOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Observed state of one live sub-resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Health {
    pub available: bool,
    pub rolling_out: bool,
    pub message: String,
}

impl Health {
    pub fn ready() -> Self {
        Self {
            available: true,
            rolling_out: false,
            message: String::new(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            rolling_out: false,
            message: message.into(),
        }
    }

    pub fn rolling_out(available: bool, message: impl Into<String>) -> Self {
        Self {
            available,
            rolling_out: true,
            message: message.into(),
        }
    }
}

/// Input of the condition aggregator, one per desired sub-resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub role: String,
    pub key: ResourceKey,
    /// Whether availability of the whole resource depends on this one.
    pub serving: bool,
    pub apply: ApplyOutcome,
    pub health: Health,
}

/// Judges a live sub-resource. `None` means it does not exist.
pub fn assess(kind: SubResourceKind, live: Option<&DynamicObject>) -> Health {
    let Some(object) = live else {
        return Health::unavailable("not found");
    };

    match kind {
        SubResourceKind::Deployment => assess_deployment(object),
        SubResourceKind::CustomResourceDefinition => assess_crd(object),
        _ => Health::ready(),
    }
}

fn int_at(object: &DynamicObject, pointer: &str) -> Option<i64> {
    object.data.pointer(pointer).and_then(Value::as_i64)
}

fn assess_deployment(deployment: &DynamicObject) -> Health {
    let name = deployment.name_any();
    let generation = deployment.metadata.generation.unwrap_or_default();
    let observed = int_at(deployment, "/status/observedGeneration").unwrap_or_default();
    let replicas = int_at(deployment, "/spec/replicas").unwrap_or(1);
    let updated = int_at(deployment, "/status/updatedReplicas").unwrap_or_default();
    let ready = int_at(deployment, "/status/readyReplicas").unwrap_or_default();

    let available = ready >= replicas;

    if observed < generation {
        return Health::rolling_out(
            available,
            format!("deployment {name}: generation {generation} not yet observed"),
        );
    }

    if updated < replicas {
        return Health::rolling_out(
            available,
            format!("deployment {name}: {updated}/{replicas} replicas updated"),
        );
    }

    if !available {
        return Health::unavailable(format!(
            "deployment {name}: {ready}/{replicas} replicas ready"
        ));
    }

    Health::ready()
}

fn assess_crd(crd: &DynamicObject) -> Health {
    let established = crd
        .data
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .any(|c| c["type"] == "Established" && c["status"] == "True");

    if established {
        Health::ready()
    } else {
        Health::rolling_out(
            false,
            format!("crd {}: not yet established", crd.name_any()),
        )
    }
}
