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

//! Deployment + RBAC bundle shared by the hub and agent components.

use crate::types;
use crate::types::v1::key::SubResourceKind;
use crate::types::v1::managed::SubResource;
use k8s_openapi::Resource as _;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr;
use std::collections::BTreeMap;

pub const WEBHOOK_PORT: i32 = 6443;
const WEBHOOK_SERVICE_PORT: i32 = 443;

/// A secret mounted into the component's pod.
#[derive(Clone, Debug)]
pub struct SecretMount {
    pub secret_name: String,
    pub mount_path: String,
    pub optional: bool,
}

/// One operator-managed controller: its deployment and everything it needs to run.
#[derive(Clone, Debug)]
pub struct Component {
    /// Role prefix, e.g. `registration` or `work-webhook`.
    pub role: &'static str,
    /// Deployment name.
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub args: Vec<String>,
    pub rules: Vec<rbacv1::PolicyRule>,
    pub replicas: i32,
    /// Exposed through a Service on 443 when set.
    pub webhook: bool,
    pub secrets: Vec<SecretMount>,
}

impl Component {
    pub fn service_account_name(&self) -> String {
        format!("{}-sa", self.name)
    }

    pub fn cluster_role_name(&self) -> String {
        format!("open-cluster-management:{}", self.name)
    }

    pub fn service_name(&self) -> String {
        self.name.clone()
    }

    fn labels(&self) -> BTreeMap<String, String> {
        [
            ("app".to_owned(), self.name.clone()),
            (
                "app.kubernetes.io/managed-by".to_owned(),
                "registration-operator".to_owned(),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn metadata(
        &self,
        name: String,
        namespaced: bool,
        owner: &metav1::OwnerReference,
    ) -> metav1::ObjectMeta {
        metav1::ObjectMeta {
            name: Some(name),
            namespace: namespaced.then(|| self.namespace.clone()),
            labels: Some(self.labels()),
            owner_references: Some(vec![owner.clone()]),
            ..Default::default()
        }
    }

    pub fn new_service_account(&self, owner: &metav1::OwnerReference) -> corev1::ServiceAccount {
        corev1::ServiceAccount {
            metadata: self.metadata(self.service_account_name(), true, owner),
            ..Default::default()
        }
    }

    pub fn new_cluster_role(&self, owner: &metav1::OwnerReference) -> rbacv1::ClusterRole {
        rbacv1::ClusterRole {
            metadata: self.metadata(self.cluster_role_name(), false, owner),
            rules: Some(self.rules.clone()),
            ..Default::default()
        }
    }

    pub fn new_cluster_role_binding(
        &self,
        owner: &metav1::OwnerReference,
    ) -> rbacv1::ClusterRoleBinding {
        rbacv1::ClusterRoleBinding {
            metadata: self.metadata(self.cluster_role_name(), false, owner),
            subjects: Some(vec![rbacv1::Subject {
                kind: corev1::ServiceAccount::KIND.to_owned(),
                namespace: Some(self.namespace.clone()),
                name: self.service_account_name(),
                ..Default::default()
            }]),
            role_ref: rbacv1::RoleRef {
                api_group: rbacv1::ClusterRole::GROUP.to_owned(),
                kind: rbacv1::ClusterRole::KIND.to_owned(),
                name: self.cluster_role_name(),
            },
        }
    }

    pub fn new_service(&self, owner: &metav1::OwnerReference) -> corev1::Service {
        corev1::Service {
            metadata: self.metadata(self.service_name(), true, owner),
            spec: Some(corev1::ServiceSpec {
                type_: Some("ClusterIP".to_owned()),
                selector: Some([("app".to_owned(), self.name.clone())].into_iter().collect()),
                ports: Some(vec![corev1::ServicePort {
                    port: WEBHOOK_SERVICE_PORT,
                    target_port: Some(intstr::IntOrString::Int(WEBHOOK_PORT)),
                    name: Some("webhook".to_owned()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn new_deployment(&self, owner: &metav1::OwnerReference) -> appsv1::Deployment {
        let selector: BTreeMap<String, String> =
            [("app".to_owned(), self.name.clone())].into_iter().collect();

        let volumes: Vec<corev1::Volume> = self
            .secrets
            .iter()
            .map(|mount| corev1::Volume {
                name: mount.secret_name.clone(),
                secret: Some(corev1::SecretVolumeSource {
                    secret_name: Some(mount.secret_name.clone()),
                    optional: mount.optional.then_some(true),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        let volume_mounts: Vec<corev1::VolumeMount> = self
            .secrets
            .iter()
            .map(|mount| corev1::VolumeMount {
                name: mount.secret_name.clone(),
                mount_path: mount.mount_path.clone(),
                read_only: Some(true),
                ..Default::default()
            })
            .collect();

        let container = corev1::Container {
            name: self.role.to_owned(),
            image: Some(self.image.clone()),
            args: Some(self.args.clone()),
            ports: self.webhook.then(|| {
                vec![corev1::ContainerPort {
                    container_port: WEBHOOK_PORT,
                    name: Some("webhook".to_owned()),
                    protocol: Some("TCP".to_owned()),
                    ..Default::default()
                }]
            }),
            volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
            ..Default::default()
        };

        appsv1::Deployment {
            metadata: self.metadata(self.name.clone(), true, owner),
            spec: Some(appsv1::DeploymentSpec {
                replicas: Some(self.replicas),
                selector: metav1::LabelSelector {
                    match_labels: Some(selector),
                    ..Default::default()
                },
                template: corev1::PodTemplateSpec {
                    metadata: Some(metav1::ObjectMeta {
                        labels: Some(self.labels()),
                        ..Default::default()
                    }),
                    spec: Some(corev1::PodSpec {
                        service_account_name: Some(self.service_account_name()),
                        containers: vec![container],
                        volumes: (!volumes.is_empty()).then_some(volumes),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Renders the service account, RBAC, optional webhook service and the deployment.
    pub fn sub_resources(
        &self,
        owner: &metav1::OwnerReference,
    ) -> Result<Vec<SubResource>, types::error::Error> {
        let role = |suffix: &str| format!("{}-{}", self.role, suffix);

        let mut resources = vec![
            SubResource::new(
                &role("service-account"),
                SubResourceKind::ServiceAccount,
                &self.new_service_account(owner),
            )?,
            SubResource::new(
                &role("cluster-role"),
                SubResourceKind::ClusterRole,
                &self.new_cluster_role(owner),
            )?,
            SubResource::new(
                &role("cluster-role-binding"),
                SubResourceKind::ClusterRoleBinding,
                &self.new_cluster_role_binding(owner),
            )?,
        ];

        if self.webhook {
            resources.push(SubResource::new(
                &role("service"),
                SubResourceKind::Service,
                &self.new_service(owner),
            )?);
        }

        resources.push(SubResource::new(
            &role("deployment"),
            SubResourceKind::Deployment,
            &self.new_deployment(owner),
        )?);

        Ok(resources)
    }
}

/// `PolicyRule` shorthand.
pub fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> rbacv1::PolicyRule {
    rbacv1::PolicyRule {
        api_groups: Some(api_groups.iter().map(|s| (*s).to_owned()).collect()),
        resources: Some(resources.iter().map(|s| (*s).to_owned()).collect()),
        verbs: verbs.iter().map(|s| (*s).to_owned()).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component() -> Component {
        Component {
            role: "registration",
            name: "cluster-manager-registration-controller".to_owned(),
            namespace: "open-cluster-management-hub".to_owned(),
            image: "quay.io/open-cluster-management/registration:v1".to_owned(),
            args: vec!["/registration".to_owned(), "controller".to_owned()],
            rules: vec![rule(&[""], &["configmaps"], &["get"])],
            replicas: 3,
            webhook: false,
            secrets: vec![],
        }
    }

    fn owner() -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: "operator.open-cluster-management.io/v1".to_owned(),
            kind: "ClusterManager".to_owned(),
            name: "cluster-manager".to_owned(),
            uid: "uid-1".to_owned(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_deployment_structure() {
        let deploy = component().new_deployment(&owner());

        assert_eq!(
            deploy.metadata.name.as_deref(),
            Some("cluster-manager-registration-controller")
        );
        assert_eq!(
            deploy.metadata.namespace.as_deref(),
            Some("open-cluster-management-hub")
        );
        let spec = deploy.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));

        let pod = spec.template.spec.unwrap();
        assert_eq!(
            pod.service_account_name.as_deref(),
            Some("cluster-manager-registration-controller-sa")
        );
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("quay.io/open-cluster-management/registration:v1")
        );
        assert!(pod.containers[0].ports.is_none());
        assert!(pod.volumes.is_none());
    }

    #[test]
    fn test_cluster_scoped_rbac_has_no_namespace() {
        let c = component();
        let role = c.new_cluster_role(&owner());
        assert_eq!(role.metadata.namespace, None);
        assert_eq!(
            role.metadata.name.as_deref(),
            Some("open-cluster-management:cluster-manager-registration-controller")
        );

        let binding = c.new_cluster_role_binding(&owner());
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(
            subject.namespace.as_deref(),
            Some("open-cluster-management-hub")
        );
        assert_eq!(binding.role_ref.kind, "ClusterRole");
    }

    #[test]
    fn test_sub_resources_roles() {
        let plain: Vec<_> = component()
            .sub_resources(&owner())
            .unwrap()
            .into_iter()
            .map(|s| s.role)
            .collect();
        assert_eq!(
            plain,
            [
                "registration-service-account",
                "registration-cluster-role",
                "registration-cluster-role-binding",
                "registration-deployment",
            ]
        );

        let webhook = Component {
            webhook: true,
            ..component()
        };
        let resources = webhook.sub_resources(&owner()).unwrap();
        assert!(resources.iter().any(|s| s.kind == SubResourceKind::Service));
    }

    #[test]
    fn test_secret_mounts() {
        let c = Component {
            secrets: vec![SecretMount {
                secret_name: "bootstrap-hub-kubeconfig".to_owned(),
                mount_path: "/spoke/bootstrap".to_owned(),
                optional: false,
            }],
            ..component()
        };

        let pod = c.new_deployment(&owner()).spec.unwrap().template.spec.unwrap();
        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes[0].name, "bootstrap-hub-kubeconfig");
        assert_eq!(volumes[0].secret.as_ref().unwrap().optional, None);
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/spoke/bootstrap");
    }
}
