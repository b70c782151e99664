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
use crate::types::error::MissingRegistrationImageSnafu;
use crate::types::v1::component::{Component, WEBHOOK_PORT, rule};
use crate::types::v1::key::SubResourceKind;
use crate::types::v1::managed::{ManagedResource, SubResource, owner_reference};
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};

mod crds;
mod webhooks;

/// The only namespace the hub components are deployed to.
pub const HUB_NAMESPACE: &str = "open-cluster-management-hub";

/// Controllers on the hub that govern registration and work distribution for
/// attached Klusterlets.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "operator.open-cluster-management.io",
    version = "v1",
    kind = "ClusterManager",
    status = "crate::types::v1::status::Status",
    plural = "clustermanagers",
    singular = "clustermanager",
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Applied\")].status"}"#,
    printcolumn = r#"{"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterManagerSpec {
    /// Image of the registration controller and webhook.
    #[x_kube(validation = Rule::new("self != ''").message("registrationImagePullSpec must be set"))]
    pub registration_image_pull_spec: String,

    /// Image of the work webhook. The work components are not deployed when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_image_pull_spec: String,
}

impl ClusterManager {
    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    pub fn work_enabled(&self) -> bool {
        !self.spec.work_image_pull_spec.is_empty()
    }

    pub fn new_namespace(&self) -> corev1::Namespace {
        corev1::Namespace {
            metadata: metav1::ObjectMeta {
                name: Some(HUB_NAMESPACE.to_owned()),
                owner_references: Some(vec![owner_reference(self)]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn registration_controller(&self) -> Component {
        Component {
            role: "registration",
            name: format!("{}-registration-controller", self.name()),
            namespace: HUB_NAMESPACE.to_owned(),
            image: self.spec.registration_image_pull_spec.clone(),
            args: vec!["/registration".to_owned(), "controller".to_owned()],
            rules: vec![
                rule(
                    &[""],
                    &["configmaps", "namespaces", "secrets"],
                    &["get", "list", "watch", "create", "update", "delete"],
                ),
                rule(
                    &["", "events.k8s.io"],
                    &["events"],
                    &["create", "patch", "update"],
                ),
                rule(
                    &["rbac.authorization.k8s.io"],
                    &["clusterroles", "clusterrolebindings", "roles", "rolebindings"],
                    &["get", "list", "watch", "create", "update", "delete", "escalate", "bind"],
                ),
                rule(
                    &["certificates.k8s.io"],
                    &[
                        "certificatesigningrequests",
                        "certificatesigningrequests/approval",
                    ],
                    &["get", "list", "watch", "update"],
                ),
                rule(
                    &["cluster.open-cluster-management.io"],
                    &["managedclusters", "managedclusters/status"],
                    &["get", "list", "watch", "update", "patch"],
                ),
            ],
            replicas: 3,
            webhook: false,
            secrets: vec![],
        }
    }

    pub fn registration_webhook(&self) -> Component {
        Component {
            role: "registration-webhook",
            name: format!("{}-registration-webhook", self.name()),
            namespace: HUB_NAMESPACE.to_owned(),
            image: self.spec.registration_image_pull_spec.clone(),
            args: vec![
                "/registration".to_owned(),
                "webhook".to_owned(),
                format!("--secure-port={WEBHOOK_PORT}"),
            ],
            rules: vec![
                rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
                rule(&[""], &["configmaps"], &["get", "list", "watch"]),
            ],
            replicas: 3,
            webhook: true,
            secrets: vec![],
        }
    }

    pub fn work_webhook(&self) -> Component {
        Component {
            role: "work-webhook",
            name: format!("{}-work-webhook", self.name()),
            namespace: HUB_NAMESPACE.to_owned(),
            image: self.spec.work_image_pull_spec.clone(),
            args: vec![
                "/work".to_owned(),
                "webhook".to_owned(),
                format!("--secure-port={WEBHOOK_PORT}"),
            ],
            rules: vec![
                rule(&["authorization.k8s.io"], &["subjectaccessreviews"], &["create"]),
                rule(&[""], &["configmaps"], &["get", "list", "watch"]),
            ],
            replicas: 3,
            webhook: true,
            secrets: vec![],
        }
    }
}

impl ManagedResource for ClusterManager {
    fn validate(&self) -> Result<(), types::error::Error> {
        if self.spec.registration_image_pull_spec.trim().is_empty() {
            return MissingRegistrationImageSnafu {
                kind: Self::kind(&()).to_string(),
                name: self.name(),
            }
            .fail();
        }
        Ok(())
    }

    fn desired_sub_resources(&self) -> Result<Vec<SubResource>, types::error::Error> {
        let owner = owner_reference(self);

        let mut resources = vec![
            SubResource::new(
                "hub-namespace",
                SubResourceKind::Namespace,
                &self.new_namespace(),
            )?,
            SubResource::new(
                "managedcluster-crd",
                SubResourceKind::CustomResourceDefinition,
                &self.new_managed_cluster_crd(),
            )?,
        ];

        resources.extend(self.registration_controller().sub_resources(&owner)?);

        let registration_webhook = self.registration_webhook();
        resources.extend(registration_webhook.sub_resources(&owner)?);
        resources.push(SubResource::new(
            "registration-webhook",
            SubResourceKind::ValidatingWebhookConfiguration,
            &self.new_registration_webhook_configuration(&registration_webhook),
        )?);

        if self.work_enabled() {
            resources.push(SubResource::new(
                "manifestwork-crd",
                SubResourceKind::CustomResourceDefinition,
                &self.new_manifest_work_crd(),
            )?);

            let work_webhook = self.work_webhook();
            resources.extend(work_webhook.sub_resources(&owner)?);
            resources.push(SubResource::new(
                "work-webhook",
                SubResourceKind::ValidatingWebhookConfiguration,
                &self.new_work_webhook_configuration(&work_webhook),
            )?);
        }

        Ok(resources)
    }
}
