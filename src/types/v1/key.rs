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

//! Identity of the sub-resources owned by a ClusterManager or Klusterlet.

use k8s_openapi::api::admissionregistration::v1 as admissionv1;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use kube::core::{ApiResource, GroupVersionKind};
use std::fmt;
use strum::{Display, EnumIter, IntoEnumIterator};

/// `(group, version, resource, namespace, name)` of a sub-resource.
///
/// This is the key shared by `GenerationStatus` and `RelatedResourceMeta`.
/// Cluster-scoped resources have an empty namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: SubResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            group: kind.group().to_owned(),
            version: kind.version().to_owned(),
            resource: kind.plural().to_owned(),
            namespace: if kind.namespaced() {
                namespace.to_owned()
            } else {
                String::new()
            },
            name: name.to_owned(),
        }
    }

    /// The kind this key belongs to, when it is one the operator manages.
    pub fn kind(&self) -> Option<SubResourceKind> {
        SubResourceKind::from_group_resource(&self.group, &self.resource)
    }

    pub fn api_resource(&self) -> ApiResource {
        let kind = self.kind().map(|k| k.to_string()).unwrap_or_default();
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&self.group, &self.version, &kind),
            &self.resource,
        )
    }

    /// Teardown order; resources in later waves are deleted first.
    pub fn wave(&self) -> u8 {
        self.kind().map(SubResourceKind::wave).unwrap_or(1)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group_resource = if self.group.is_empty() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.group)
        };

        if self.namespace.is_empty() {
            write!(f, "{}/{}", group_resource, self.name)
        } else {
            write!(f, "{}/{}/{}", group_resource, self.namespace, self.name)
        }
    }
}

/// Kinds of sub-resources rendered from a ClusterManager or Klusterlet spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum SubResourceKind {
    Namespace,
    ServiceAccount,
    Service,
    ClusterRole,
    ClusterRoleBinding,
    Deployment,
    CustomResourceDefinition,
    ValidatingWebhookConfiguration,
}

fn type_info<T: k8s_openapi::Resource>() -> (&'static str, &'static str, &'static str) {
    (T::GROUP, T::VERSION, T::URL_PATH_SEGMENT)
}

impl SubResourceKind {
    fn type_info(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Namespace => type_info::<corev1::Namespace>(),
            Self::ServiceAccount => type_info::<corev1::ServiceAccount>(),
            Self::Service => type_info::<corev1::Service>(),
            Self::ClusterRole => type_info::<rbacv1::ClusterRole>(),
            Self::ClusterRoleBinding => type_info::<rbacv1::ClusterRoleBinding>(),
            Self::Deployment => type_info::<appsv1::Deployment>(),
            Self::CustomResourceDefinition => type_info::<apiextv1::CustomResourceDefinition>(),
            Self::ValidatingWebhookConfiguration => {
                type_info::<admissionv1::ValidatingWebhookConfiguration>()
            }
        }
    }

    pub fn group(self) -> &'static str {
        self.type_info().0
    }

    pub fn version(self) -> &'static str {
        self.type_info().1
    }

    pub fn plural(self) -> &'static str {
        self.type_info().2
    }

    pub fn namespaced(self) -> bool {
        matches!(self, Self::ServiceAccount | Self::Service | Self::Deployment)
    }

    /// Whether `metadata.generation` is meaningful for this kind and recorded
    /// in `status.generations`. The rest are only tracked as related resources.
    pub fn tracks_generation(self) -> bool {
        matches!(
            self,
            Self::Deployment | Self::CustomResourceDefinition | Self::ValidatingWebhookConfiguration
        )
    }

    /// Whether the resource has to be ready for the components to serve.
    pub fn serving(self) -> bool {
        self.tracks_generation()
    }

    /// Apply order. Namespaces and CRDs go first, everything else after.
    pub fn wave(self) -> u8 {
        match self {
            Self::Namespace | Self::CustomResourceDefinition => 0,
            _ => 1,
        }
    }

    pub fn from_group_resource(group: &str, resource: &str) -> Option<Self> {
        Self::iter().find(|kind| kind.group() == group && kind.plural() == resource)
    }
}
