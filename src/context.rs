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

use crate::config::ControllerConfig;
use crate::probe::Diagnostics;
use crate::store::ResourceStore;
use crate::types::v1::key::ResourceKey;
use crate::types::v1::managed::{ManagedResource, SubResource};
use crate::types::v1::status::Status;
use kube::api::{DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Api, ResourceExt};
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

pub const FIELD_MANAGER: &str = "registration-operator";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("{} '{}' was modified concurrently", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(display("{} timed out after {:?}", operation, timeout))]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube {
                source: kube::Error::Api(e),
            } => e.code == 409,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(e) } if e.code == 404)
    }
}

pub struct Context {
    pub(crate) client: kube::Client,
    pub(crate) config: ControllerConfig,
    pub(crate) diagnostics: Diagnostics,
    failures: Mutex<HashMap<String, u32>>,
}

impl Context {
    pub fn new(client: kube::Client, config: ControllerConfig, diagnostics: Diagnostics) -> Self {
        Self {
            client,
            config,
            diagnostics,
            failures: Mutex::default(),
        }
    }

    /// Counts one more failed pass for `name` and returns the new count.
    pub fn record_failure(&self, name: &str) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(name.to_owned()).or_default();
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset_failures(&self, name: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn dynamic_api(&self, key: &ResourceKey) -> Api<DynamicObject> {
        let resource = key.api_resource();
        if key.namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), &key.namespace, &resource)
        }
    }
}

/// Maps a 409 from a guarded write to [`Error::Conflict`].
fn guarded<K: ManagedResource>(name: &str) -> impl FnOnce(kube::Error) -> Error {
    let name = name.to_owned();
    move |source| match source {
        kube::Error::Api(e) if e.code == 409 => Error::Conflict {
            kind: K::kind(&()).to_string(),
            name,
        },
        source => Error::Kube { source },
    }
}

impl ResourceStore for Context {
    async fn get<K: ManagedResource>(&self, name: &str) -> Result<Option<K>, Error> {
        let api: Api<K> = Api::all(self.client.clone());
        api.get_opt(name).context(KubeSnafu).await
    }

    async fn update_status<K: ManagedResource>(&self, base: &K, status: &Status) -> Result<K, Error> {
        let api: Api<K> = Api::all(self.client.clone());
        let name = base.name_any();

        // the resource version carried by `base` guards the write
        let mut object = base.clone();
        *object.status_mut() = Some(status.clone());
        api.replace_status(&name, &PostParams::default(), &object)
            .await
            .map_err(guarded::<K>(&name))
    }

    async fn update_finalizers<K: ManagedResource>(
        &self,
        base: &K,
        finalizers: Vec<String>,
    ) -> Result<K, Error> {
        let api: Api<K> = Api::all(self.client.clone());
        let name = base.name_any();

        let mut object = base.clone();
        object.meta_mut().finalizers = Some(finalizers);

        api.replace(&name, &PostParams::default(), &object)
            .await
            .map_err(guarded::<K>(&name))
    }

    async fn apply(&self, sub: &SubResource) -> Result<DynamicObject, Error> {
        debug!("applying {} {}", sub.role, sub.key);
        self.dynamic_api(&sub.key)
            .patch(
                &sub.key.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&sub.object),
            )
            .context(KubeSnafu)
            .await
    }

    async fn observe(&self, key: &ResourceKey) -> Result<Option<DynamicObject>, Error> {
        self.dynamic_api(key)
            .get_opt(&key.name)
            .context(KubeSnafu)
            .await
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), Error> {
        let result = self
            .dynamic_api(key)
            .delete(&key.name, &DeleteParams::background())
            .context(KubeSnafu)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
