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

use super::ClusterManager;
use crate::types::v1::component::Component;
use crate::types::v1::managed::owner_reference;
use k8s_openapi::api::admissionregistration::v1 as admissionv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

const REGISTRATION_WEBHOOK_NAME: &str =
    "managedclustervalidators.admission.cluster.open-cluster-management.io";
const WORK_WEBHOOK_NAME: &str =
    "manifestworkvalidators.admission.work.open-cluster-management.io";

impl ClusterManager {
    pub fn new_registration_webhook_configuration(
        &self,
        webhook: &Component,
    ) -> admissionv1::ValidatingWebhookConfiguration {
        self.new_webhook_configuration(
            REGISTRATION_WEBHOOK_NAME,
            webhook,
            "/apis/admission.cluster.open-cluster-management.io/v1/managedclustervalidators",
            "cluster.open-cluster-management.io",
            "managedclusters",
        )
    }

    pub fn new_work_webhook_configuration(
        &self,
        webhook: &Component,
    ) -> admissionv1::ValidatingWebhookConfiguration {
        self.new_webhook_configuration(
            WORK_WEBHOOK_NAME,
            webhook,
            "/apis/admission.work.open-cluster-management.io/v1/manifestworkvalidators",
            "work.open-cluster-management.io",
            "manifestworks",
        )
    }

    fn new_webhook_configuration(
        &self,
        name: &str,
        webhook: &Component,
        path: &str,
        api_group: &str,
        resource: &str,
    ) -> admissionv1::ValidatingWebhookConfiguration {
        admissionv1::ValidatingWebhookConfiguration {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_owned()),
                owner_references: Some(vec![owner_reference(self)]),
                ..Default::default()
            },
            webhooks: Some(vec![admissionv1::ValidatingWebhook {
                name: name.to_owned(),
                client_config: admissionv1::WebhookClientConfig {
                    service: Some(admissionv1::ServiceReference {
                        name: webhook.service_name(),
                        namespace: webhook.namespace.clone(),
                        path: Some(path.to_owned()),
                        port: Some(443),
                    }),
                    ..Default::default()
                },
                rules: Some(vec![admissionv1::RuleWithOperations {
                    api_groups: Some(vec![api_group.to_owned()]),
                    api_versions: Some(vec!["*".to_owned()]),
                    operations: Some(vec!["CREATE".to_owned(), "UPDATE".to_owned()]),
                    resources: Some(vec![resource.to_owned()]),
                    ..Default::default()
                }]),
                admission_review_versions: vec!["v1beta1".to_owned(), "v1".to_owned()],
                side_effects: "None".to_owned(),
                failure_policy: Some("Fail".to_owned()),
                timeout_seconds: Some(3),
                ..Default::default()
            }]),
        }
    }
}
