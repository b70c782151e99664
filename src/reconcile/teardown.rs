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
use crate::reconcile::{Error, TeardownSnafu, write_finalizers};
use crate::store::{ResourceStore, with_timeout};
use crate::types::v1::key::ResourceKey;
use crate::types::v1::managed::{CLEANUP_FINALIZER, ManagedResource};
use futures::future::join_all;
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub fn has_cleanup_finalizer<K: ManagedResource>(resource: &K) -> bool {
    resource.finalizers().iter().any(|f| f == CLEANUP_FINALIZER)
}

/// Every sub-resource the status says is owned, plus whatever the spec still
/// renders. The latter covers applies of a pass that never got to write status.
pub fn owned_keys<K: ManagedResource>(resource: &K) -> BTreeSet<ResourceKey> {
    let mut keys = BTreeSet::new();

    if let Some(status) = resource.status() {
        keys.extend(status.generations.iter().map(|g| g.key()));
        keys.extend(status.related_resources.iter().map(|r| r.key()));
    }

    // an invalid spec may name things that were never ours, like kube-system
    if resource.validate().is_ok()
        && let Ok(desired) = resource.desired_sub_resources()
    {
        keys.extend(desired.into_iter().map(|s| s.key));
    }

    keys
}

/// Deletes everything owned, later waves first, then releases the
/// finalizer. Any failed delete keeps the finalizer in place.
pub async fn teardown<K, S>(store: &S, config: &ControllerConfig, resource: K) -> Result<(), Error>
where
    K: ManagedResource,
    S: ResourceStore,
{
    let name = resource.name_any();
    if !has_cleanup_finalizer(&resource) {
        debug!("{} {} has no cleanup finalizer, nothing to tear down", K::kind(&()), name);
        return Ok(());
    }

    let keys = owned_keys(&resource);
    let mut waves: Vec<u8> = keys.iter().map(ResourceKey::wave).collect();
    waves.sort_unstable_by(|a, b| b.cmp(a));
    waves.dedup();

    info!("tearing down {} sub-resources of {} {}", keys.len(), K::kind(&()), name);

    let mut failures = Vec::new();
    for wave in waves {
        let deletes = keys.iter().filter(|k| k.wave() == wave).map(|key| async move {
            let result = with_timeout(config.call_timeout, "delete", store.delete(key)).await;
            (key, result)
        });

        for (key, result) in join_all(deletes).await {
            match result {
                Ok(()) => debug!("deleted {}", key),
                Err(e) => {
                    warn!("failed to delete {}: {}", key, e);
                    failures.push(format!("{key}: {e}"));
                }
            }
        }
    }

    if !failures.is_empty() {
        return TeardownSnafu {
            kind: K::kind(&()).to_string(),
            name,
            failures: failures.join("; "),
        }
        .fail();
    }

    write_finalizers(store, config, resource, |current| {
        has_cleanup_finalizer(current).then(|| {
            current
                .finalizers()
                .iter()
                .filter(|f| *f != CLEANUP_FINALIZER)
                .cloned()
                .collect()
        })
    })
    .await?;

    info!("{} {} torn down", K::kind(&()), name);
    Ok(())
}
