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
use crate::types::v1::managed::owner_reference;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

struct CrdNames {
    group: &'static str,
    kind: &'static str,
    plural: &'static str,
    singular: &'static str,
    namespaced: bool,
}

const MANAGED_CLUSTER: CrdNames = CrdNames {
    group: "cluster.open-cluster-management.io",
    kind: "ManagedCluster",
    plural: "managedclusters",
    singular: "managedcluster",
    namespaced: false,
};

const MANIFEST_WORK: CrdNames = CrdNames {
    group: "work.open-cluster-management.io",
    kind: "ManifestWork",
    plural: "manifestworks",
    singular: "manifestwork",
    namespaced: true,
};

impl ClusterManager {
    /// CRD of the ManagedCluster API served on the hub.
    pub fn new_managed_cluster_crd(&self) -> apiextv1::CustomResourceDefinition {
        self.new_crd(&MANAGED_CLUSTER)
    }

    /// CRD of the ManifestWork API served on the hub.
    pub fn new_manifest_work_crd(&self) -> apiextv1::CustomResourceDefinition {
        self.new_crd(&MANIFEST_WORK)
    }

    fn new_crd(&self, names: &CrdNames) -> apiextv1::CustomResourceDefinition {
        // the schema of the hub APIs belongs to their controllers, keep it open here
        let open_object = apiextv1::JSONSchemaProps {
            type_: Some("object".to_owned()),
            x_kubernetes_preserve_unknown_fields: Some(true),
            ..Default::default()
        };

        apiextv1::CustomResourceDefinition {
            metadata: metav1::ObjectMeta {
                name: Some(format!("{}.{}", names.plural, names.group)),
                owner_references: Some(vec![owner_reference(self)]),
                ..Default::default()
            },
            spec: apiextv1::CustomResourceDefinitionSpec {
                group: names.group.to_owned(),
                names: apiextv1::CustomResourceDefinitionNames {
                    kind: names.kind.to_owned(),
                    plural: names.plural.to_owned(),
                    singular: Some(names.singular.to_owned()),
                    list_kind: Some(format!("{}List", names.kind)),
                    ..Default::default()
                },
                scope: if names.namespaced {
                    "Namespaced".to_owned()
                } else {
                    "Cluster".to_owned()
                },
                versions: vec![apiextv1::CustomResourceDefinitionVersion {
                    name: "v1".to_owned(),
                    served: true,
                    storage: true,
                    schema: Some(apiextv1::CustomResourceValidation {
                        open_api_v3_schema: Some(open_object),
                    }),
                    subresources: Some(apiextv1::CustomResourceSubresources {
                        status: Some(apiextv1::CustomResourceSubresourceStatus(
                            serde_json::json!({}),
                        )),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
