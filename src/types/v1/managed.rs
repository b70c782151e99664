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
use crate::types::error::RenderSnafu;
use crate::types::v1::key::{ResourceKey, SubResourceKind};
use crate::types::v1::status::Status;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::api::DynamicObject;
use kube::core::object::HasStatus;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use snafu::ResultExt;
use std::fmt::Debug;

pub const SPEC_HASH_ANNOTATION: &str = "operator.open-cluster-management.io/spec-hash";

pub const CLEANUP_FINALIZER: &str = "operator.open-cluster-management.io/cleanup";

/// A top-level resource whose desired state is rendered into sub-resources.
///
/// ClusterManager and Klusterlet both implement this; the reconciler, the
/// generation ledger and the condition aggregator only see this trait.
pub trait ManagedResource:
    Resource<DynamicType = ()>
    + HasStatus<Status = Status>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Rejects specs that can never be applied.
    fn validate(&self) -> Result<(), types::error::Error>;

    /// Renders every sub-resource the spec asks for.
    fn desired_sub_resources(&self) -> Result<Vec<SubResource>, types::error::Error>;
}

/// a new controller owner reference pointing at `owner`
pub fn owner_reference<K: ManagedResource>(owner: &K) -> metav1::OwnerReference {
    metav1::OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// One rendered sub-resource of a desired state.
#[derive(Clone, Debug)]
pub struct SubResource {
    /// What the resource is for, e.g. `registration-deployment`.
    pub role: String,
    pub kind: SubResourceKind,
    pub key: ResourceKey,
    pub object: DynamicObject,
}

impl SubResource {
    /// Renders a typed object and stamps it with the hash of its content.
    pub fn new<T: Serialize>(
        role: &str,
        kind: SubResourceKind,
        object: &T,
    ) -> Result<Self, types::error::Error> {
        let value = serde_json::to_value(object).context(RenderSnafu { role })?;
        let hash = content_hash(&value);

        let mut object: DynamicObject =
            serde_json::from_value(value).context(RenderSnafu { role })?;
        object
            .annotations_mut()
            .insert(SPEC_HASH_ANNOTATION.to_owned(), hash);

        let key = ResourceKey::new(
            kind,
            object.metadata.namespace.as_deref().unwrap_or_default(),
            &object.name_any(),
        );

        Ok(Self {
            role: role.to_owned(),
            kind,
            key,
            object,
        })
    }

    pub fn spec_hash(&self) -> Option<&str> {
        spec_hash(&self.object)
    }

    pub fn tracks_generation(&self) -> bool {
        self.kind.tracks_generation()
    }

    pub fn serving(&self) -> bool {
        self.kind.serving()
    }
}

pub fn spec_hash(object: &DynamicObject) -> Option<&str> {
    object
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
        .map(String::as_str)
}

fn content_hash(value: &serde_json::Value) -> String {
    // rendered objects serialize in field order, so equal objects hash equally
    let digest = Sha256::digest(value.to_string().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
