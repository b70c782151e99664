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

use super::{BOOTSTRAP_KUBECONFIG_SECRET, HUB_KUBECONFIG_SECRET, Klusterlet};
use crate::types::v1::component::{Component, SecretMount, rule};

const BOOTSTRAP_MOUNT_PATH: &str = "/spoke/bootstrap";
const HUB_KUBECONFIG_MOUNT_PATH: &str = "/spoke/hub-kubeconfig";

impl Klusterlet {
    /// The registration agent: bootstraps against the hub and keeps the
    /// managed cluster's registration alive.
    pub fn registration_agent(&self) -> Component {
        let mut args = vec!["/registration".to_owned(), "agent".to_owned()];
        if !self.spec.cluster_name.is_empty() {
            args.push(format!("--cluster-name={}", self.spec.cluster_name));
        }
        args.push(format!(
            "--bootstrap-kubeconfig={BOOTSTRAP_MOUNT_PATH}/kubeconfig"
        ));
        if !self.spec.external_server_urls.is_empty() {
            let urls: Vec<&str> = self
                .spec
                .external_server_urls
                .iter()
                .map(|s| s.url.as_str())
                .collect();
            args.push(format!("--spoke-external-server-urls={}", urls.join(",")));
        }

        Component {
            role: "registration-agent",
            name: format!("{}-registration-agent", self.name()),
            namespace: self.agent_namespace(),
            image: self.spec.registration_image_pull_spec.clone(),
            args,
            rules: vec![
                rule(
                    &[""],
                    &["secrets", "configmaps"],
                    &["get", "list", "watch", "create", "update", "patch", "delete"],
                ),
                rule(&[""], &["nodes"], &["get", "list", "watch"]),
                rule(
                    &["", "events.k8s.io"],
                    &["events"],
                    &["create", "patch", "update"],
                ),
                rule(
                    &["certificates.k8s.io"],
                    &["certificatesigningrequests"],
                    &["get", "list", "watch", "create"],
                ),
            ],
            replicas: 3,
            webhook: false,
            secrets: vec![
                SecretMount {
                    secret_name: BOOTSTRAP_KUBECONFIG_SECRET.to_owned(),
                    mount_path: BOOTSTRAP_MOUNT_PATH.to_owned(),
                    optional: false,
                },
                SecretMount {
                    secret_name: HUB_KUBECONFIG_SECRET.to_owned(),
                    mount_path: HUB_KUBECONFIG_MOUNT_PATH.to_owned(),
                    optional: true,
                },
            ],
        }
    }

    /// The work agent: applies ManifestWorks from the hub on this cluster.
    pub fn work_agent(&self) -> Component {
        let mut args = vec!["/work".to_owned(), "agent".to_owned()];
        if !self.spec.cluster_name.is_empty() {
            args.push(format!("--spoke-cluster-name={}", self.spec.cluster_name));
        }
        args.push(format!(
            "--hub-kubeconfig={HUB_KUBECONFIG_MOUNT_PATH}/kubeconfig"
        ));

        Component {
            role: "work-agent",
            name: format!("{}-work-agent", self.name()),
            namespace: self.agent_namespace(),
            image: self.spec.work_image_pull_spec.clone(),
            args,
            // applied manifests are arbitrary, the work agent needs full access
            rules: vec![rule(&["*"], &["*"], &["*"])],
            replicas: 3,
            webhook: false,
            secrets: vec![SecretMount {
                secret_name: HUB_KUBECONFIG_SECRET.to_owned(),
                mount_path: HUB_KUBECONFIG_MOUNT_PATH.to_owned(),
                optional: true,
            }],
        }
    }
}
