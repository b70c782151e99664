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

use crate::types;
use crate::types::error::{
    InvalidNamespaceSnafu, InvalidServerUrlSnafu, MissingRegistrationImageSnafu,
};
use crate::types::v1::key::SubResourceKind;
use crate::types::v1::managed::{ManagedResource, SubResource, owner_reference};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};

mod agents;

pub const DEFAULT_AGENT_NAMESPACE: &str = "open-cluster-management-agent";

/// Every agent namespace has to carry this prefix.
pub const AGENT_NAMESPACE_PREFIX: &str = "open-cluster-management-";

/// Secret holding the kubeconfig used for the first registration with the hub.
pub const BOOTSTRAP_KUBECONFIG_SECRET: &str = "bootstrap-hub-kubeconfig";

/// Secret the registration agent writes the hub kubeconfig to once accepted.
pub const HUB_KUBECONFIG_SECRET: &str = "hub-kubeconfig-secret";

/// Registration and work agents on a managed cluster.
///
/// The agent namespace must contain a `bootstrap-hub-kubeconfig` secret so the
/// registration agent can reach the hub.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "operator.open-cluster-management.io",
    version = "v1",
    kind = "Klusterlet",
    status = "crate::types::v1::status::Status",
    plural = "klusterlets",
    singular = "klusterlet",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#,
    printcolumn = r#"{"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletSpec {
    /// Namespace the agents are deployed to; `open-cluster-management-agent` when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[x_kube(validation = Rule::new("self != ''").message("registrationImagePullSpec must be set"))]
    pub registration_image_pull_spec: String,

    /// The work agent is not deployed when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_image_pull_spec: String,

    /// Name of the managed cluster on the hub. The registration agent picks
    /// one when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,

    /// Externally reachable apiserver endpoints of this cluster.
    #[serde(
        default,
        rename = "externalServerURLs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub external_server_urls: Vec<ServerUrl>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerUrl {
    pub url: String,

    /// PEM bundle to verify `url`; system roots are used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "ca_bundle_schema")]
    pub ca_bundle: Option<ByteString>,
}

// base64 on the wire
fn ca_bundle_schema(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "string",
        "format": "byte",
    })
}

impl Klusterlet {
    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// Namespace the agents run in, defaulted.
    pub fn agent_namespace(&self) -> String {
        if self.spec.namespace.is_empty() {
            DEFAULT_AGENT_NAMESPACE.to_owned()
        } else {
            self.spec.namespace.clone()
        }
    }

    pub fn work_enabled(&self) -> bool {
        !self.spec.work_image_pull_spec.is_empty()
    }

    pub fn new_namespace(&self) -> corev1::Namespace {
        corev1::Namespace {
            metadata: metav1::ObjectMeta {
                name: Some(self.agent_namespace()),
                owner_references: Some(vec![owner_reference(self)]),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl ManagedResource for Klusterlet {
    fn validate(&self) -> Result<(), types::error::Error> {
        let kind = Self::kind(&()).to_string();

        if self.spec.registration_image_pull_spec.trim().is_empty() {
            return MissingRegistrationImageSnafu {
                kind,
                name: self.name(),
            }
            .fail();
        }

        let namespace = self.agent_namespace();
        if !namespace.starts_with(AGENT_NAMESPACE_PREFIX) {
            return InvalidNamespaceSnafu {
                kind,
                name: self.name(),
                namespace,
                prefix: AGENT_NAMESPACE_PREFIX,
            }
            .fail();
        }

        if let Some(server) = self
            .spec
            .external_server_urls
            .iter()
            .find(|s| !s.url.starts_with("https://") || s.url.len() == "https://".len())
        {
            return InvalidServerUrlSnafu {
                kind,
                name: self.name(),
                url: server.url.clone(),
            }
            .fail();
        }

        Ok(())
    }

    fn desired_sub_resources(&self) -> Result<Vec<SubResource>, types::error::Error> {
        let owner = owner_reference(self);

        let mut resources = vec![SubResource::new(
            "agent-namespace",
            SubResourceKind::Namespace,
            &self.new_namespace(),
        )?];

        resources.extend(self.registration_agent().sub_resources(&owner)?);

        if self.work_enabled() {
            resources.extend(self.work_agent().sub_resources(&owner)?);
        }

        Ok(resources)
    }
}
