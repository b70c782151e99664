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

//! The verbs a reconcile pass needs from the resource store.
//!
//! Watching is not part of this trait: change events come from the
//! `kube::runtime::Controller` work-queue that drives the passes.

use crate::context::{Error, TimeoutSnafu};
use crate::types::v1::key::ResourceKey;
use crate::types::v1::managed::{ManagedResource, SubResource};
use crate::types::v1::status::Status;
use kube::api::DynamicObject;
use std::future::Future;
use std::time::Duration;

pub trait ResourceStore: Send + Sync {
    /// Latest copy of a managed resource, `None` once it is gone.
    fn get<K: ManagedResource>(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<K>, Error>> + Send;

    /// Replaces the status of `base`, guarded by its resource version.
    ///
    /// Fails with [`Error::Conflict`] when the stored object moved on.
    fn update_status<K: ManagedResource>(
        &self,
        base: &K,
        status: &Status,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    /// Replaces the finalizers of `base`, guarded by its resource version.
    fn update_finalizers<K: ManagedResource>(
        &self,
        base: &K,
        finalizers: Vec<String>,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    /// Server-side applies a rendered sub-resource and returns the live object.
    fn apply(&self, sub: &SubResource) -> impl Future<Output = Result<DynamicObject, Error>> + Send;

    /// Reads the live sub-resource, `None` when it does not exist.
    fn observe(
        &self,
        key: &ResourceKey,
    ) -> impl Future<Output = Result<Option<DynamicObject>, Error>> + Send;

    /// Deletes a sub-resource. Deleting something that is already gone succeeds.
    fn delete(&self, key: &ResourceKey) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Bounds an external call, turning an elapsed deadline into [`Error::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { operation, timeout }.fail(),
    }
}
