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
use crate::context::Context;
use crate::probe::PassSummary;
use crate::reconcile::conditions::ConditionAggregator;
use crate::reconcile::health::{ApplyOutcome, HealthReport, assess};
use crate::reconcile::ledger::GenerationLedger;
use crate::reconcile::related::RelatedResourceTracker;
use crate::reconcile::teardown::{has_cleanup_finalizer, teardown};
use crate::store::{ResourceStore, with_timeout};
use crate::types::v1::key::ResourceKey;
use crate::types::v1::managed::{CLEANUP_FINALIZER, ManagedResource, SubResource, spec_hash};
use crate::types::v1::status::{ConditionType, Status};
use crate::{context, types};
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::runtime::controller::Action;
use snafu::Snafu;
use std::collections::BTreeSet;
use std::sync::Arc;
use strum::Display;
use tracing::{debug, info, warn};

pub mod conditions;
pub mod health;
pub mod ledger;
pub mod related;
pub mod teardown;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display(
        "status of {} '{}' still conflicting after {} attempts",
        kind,
        name,
        attempts
    ))]
    StatusConflict {
        kind: String,
        name: String,
        attempts: u32,
    },

    #[snafu(display(
        "finalizers of {} '{}' still conflicting after {} attempts",
        kind,
        name,
        attempts
    ))]
    FinalizerConflict {
        kind: String,
        name: String,
        attempts: u32,
    },

    #[snafu(display("teardown of {} '{}' incomplete: {}", kind, name, failures))]
    Teardown {
        kind: String,
        name: String,
        failures: String,
    },
}

/// Where a managed resource stands, derived from what is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ReconcileState {
    /// Nothing written yet.
    Pending,
    Reconciling,
    /// Everything applied and nothing rolling out.
    Settled,
    Deleting,
}

impl ReconcileState {
    pub fn of<K: ManagedResource>(resource: &K) -> Self {
        if resource.meta().deletion_timestamp.is_some() {
            return Self::Deleting;
        }
        match resource.status() {
            Some(status) if !status.conditions.is_empty() => Self::of_status(status),
            _ => Self::Pending,
        }
    }

    pub fn of_status(status: &Status) -> Self {
        if status.conditions.is_true(ConditionType::Applied)
            && !status.conditions.is_true(ConditionType::Progressing)
        {
            Self::Settled
        } else {
            Self::Reconciling
        }
    }
}

/// Result of one reconcile pass.
#[derive(Clone, Debug, PartialEq)]
pub enum PassOutcome {
    /// The resource no longer exists.
    Gone,
    /// The spec was rejected; nothing was applied.
    Invalid(Status),
    /// Sub-resources deleted and the finalizer released.
    TornDown,
    Synced { state: ReconcileState, status: Status },
}

/// One reconcile pass over the managed resource `name`.
///
/// Sub-resource apply failures do not fail the pass; they end up in the
/// `Applied` condition. Errors returned here are store failures the caller
/// should back off on.
pub async fn reconcile_pass<K, S>(
    store: &S,
    config: &ControllerConfig,
    name: &str,
) -> Result<PassOutcome, Error>
where
    K: ManagedResource,
    S: ResourceStore,
{
    let timeout = config.call_timeout;
    let Some(mut resource) = with_timeout(timeout, "get", store.get::<K>(name)).await? else {
        debug!("{} {} not found", K::kind(&()), name);
        return Ok(PassOutcome::Gone);
    };

    if ReconcileState::of(&resource) == ReconcileState::Deleting {
        teardown(store, config, resource).await?;
        return Ok(PassOutcome::TornDown);
    }

    let aggregator = ConditionAggregator::new(config.degraded_grace);
    let generation = resource.meta().generation.unwrap_or_default();

    if let Err(e) = resource.validate() {
        warn!("{} {} rejected: {}", K::kind(&()), name, e);
        let message = e.to_string();
        let persisted = persist_status(store, config, resource, |current| Status {
            conditions: aggregator.invalid(&current.conditions, &message, generation, Utc::now()),
            ..current.clone()
        })
        .await?;
        return finish(store, config, name, persisted, PassOutcome::Invalid).await;
    }

    let Some(latest) = write_finalizers(store, config, resource, |current| {
        let deleting = current.meta().deletion_timestamp.is_some();
        (!deleting && !has_cleanup_finalizer(current)).then(|| {
            let mut finalizers = current.finalizers().to_vec();
            finalizers.push(CLEANUP_FINALIZER.to_owned());
            finalizers
        })
    })
    .await?
    else {
        return Ok(PassOutcome::Gone);
    };
    resource = latest;

    if ReconcileState::of(&resource) == ReconcileState::Deleting {
        teardown(store, config, resource).await?;
        return Ok(PassOutcome::TornDown);
    }

    if ReconcileState::of(&resource) == ReconcileState::Pending {
        let persisted = persist_status(store, config, resource, |current| Status {
            conditions: aggregator.pending(&current.conditions, generation, Utc::now()),
            ..current.clone()
        })
        .await?;
        let Some(latest) = persisted else {
            return finish::<K, _>(store, config, name, None, PassOutcome::Invalid).await;
        };
        resource = latest;
    }

    let base = resource.status().cloned().unwrap_or_default();
    let desired = resource.desired_sub_resources()?;
    let mut ledger = GenerationLedger::from(base.generations.as_slice());
    let mut tracker = RelatedResourceTracker::from(base.related_resources.as_slice());

    info!(
        "reconciling {} {} generation {} ({} sub-resources)",
        K::kind(&()),
        name,
        generation,
        desired.len()
    );

    let mut waves: Vec<u8> = desired.iter().map(|s| s.kind.wave()).collect();
    waves.sort_unstable();
    waves.dedup();

    let mut reports = Vec::with_capacity(desired.len());
    for wave in waves {
        let last_applied = &ledger;
        let syncs = desired
            .iter()
            .filter(|s| s.kind.wave() == wave)
            .map(|sub| async move {
                let (outcome, live) = sync_sub_resource(store, config, last_applied, sub).await;
                (sub, outcome, live)
            });
        let results = join_all(syncs).await;

        for (sub, outcome, live) in results {
            if let ApplyOutcome::Failed(error) = &outcome {
                warn!("failed to apply {} {}: {}", sub.role, sub.key, error);
            } else {
                tracker.track(sub.key.clone());
                if let Some(generation) = live
                    .as_ref()
                    .and_then(|l| l.metadata.generation)
                    .filter(|_| sub.tracks_generation())
                {
                    ledger.record_applied(sub.key.clone(), generation);
                }
            }

            reports.push(HealthReport {
                role: sub.role.clone(),
                key: sub.key.clone(),
                serving: sub.serving(),
                health: assess(sub.kind, live.as_ref()),
                apply: outcome,
            });
        }
    }

    let desired_keys: BTreeSet<ResourceKey> = desired.iter().map(|s| s.key.clone()).collect();
    prune_orphans(store, config, &desired_keys, &mut ledger, &mut tracker).await;

    let applied_all = reports.iter().all(|r| !r.apply.is_failed());
    let observed_before = base.observed_generation;
    let now = Utc::now();
    let generations = ledger.to_status();
    let related_resources = tracker.to_status();

    // re-read so a deletion that happened mid-pass wins over the status write
    let Some(latest) = with_timeout(timeout, "get", store.get::<K>(name)).await? else {
        return Ok(PassOutcome::Gone);
    };

    let persisted = persist_status(store, config, latest, |current| Status {
        observed_generation: if applied_all {
            current.observed_generation.max(generation)
        } else {
            current.observed_generation
        },
        conditions: aggregator.aggregate(
            &current.conditions,
            &reports,
            observed_before,
            generation,
            now,
        ),
        generations: generations.clone(),
        related_resources: related_resources.clone(),
    })
    .await?;

    finish(store, config, name, persisted, |status| PassOutcome::Synced {
        state: ReconcileState::of_status(&status),
        status,
    })
    .await
}

/// Observes one sub-resource and applies it if it drifted from the desired
/// state. Returns the best known live object.
async fn sync_sub_resource<S: ResourceStore>(
    store: &S,
    config: &ControllerConfig,
    ledger: &GenerationLedger,
    sub: &SubResource,
) -> (ApplyOutcome, Option<DynamicObject>) {
    let live = match with_timeout(config.call_timeout, "observe", store.observe(&sub.key)).await {
        Ok(live) => live,
        Err(e) => return (ApplyOutcome::Failed(e.to_string()), None),
    };

    match &live {
        Some(object) if !needs_apply(ledger, sub, object) => {
            return (ApplyOutcome::Unchanged, live);
        }
        _ => {}
    }

    match with_timeout(config.call_timeout, "apply", store.apply(sub)).await {
        Ok(applied) => (ApplyOutcome::Applied, Some(applied)),
        Err(e) => (ApplyOutcome::Failed(e.to_string()), live),
    }
}

fn needs_apply(ledger: &GenerationLedger, sub: &SubResource, live: &DynamicObject) -> bool {
    if spec_hash(live) != sub.spec_hash() {
        return true;
    }
    sub.tracks_generation()
        && ledger.needs_apply(&sub.key, live.metadata.generation.unwrap_or_default())
}

/// Deletes sub-resources that are tracked but no longer desired, later waves
/// first. A failed delete keeps the entries so the next pass retries.
async fn prune_orphans<S: ResourceStore>(
    store: &S,
    config: &ControllerConfig,
    desired: &BTreeSet<ResourceKey>,
    ledger: &mut GenerationLedger,
    tracker: &mut RelatedResourceTracker,
) {
    let snapshot = ledger.clone();
    let mut orphans: BTreeSet<ResourceKey> = ledger.prune(desired).into_iter().collect();
    let (_, untracked) = tracker.diff(desired);
    orphans.extend(untracked);

    let mut orphans: Vec<ResourceKey> = orphans.into_iter().collect();
    orphans.sort_by_key(|k| std::cmp::Reverse(k.wave()));

    for key in orphans {
        match with_timeout(config.call_timeout, "delete", store.delete(&key)).await {
            Ok(()) => {
                info!("deleted orphaned {}", key);
                tracker.untrack(&key);
            }
            Err(e) => {
                warn!("failed to delete orphaned {}: {}", key, e);
                if let Some(generation) = snapshot.last_generation(&key) {
                    ledger.record_applied(key, generation);
                }
            }
        }
    }
}

/// Writes a status computed from the stored one, retrying on conflicts with
/// the freshly read copy as the new base.
///
/// Returns `None` when the resource disappeared or started deleting, in
/// which case nothing was written.
async fn persist_status<K, S, F>(
    store: &S,
    config: &ControllerConfig,
    mut base: K,
    compute: F,
) -> Result<Option<K>, Error>
where
    K: ManagedResource,
    S: ResourceStore,
    F: Fn(&Status) -> Status,
{
    let name = base.name_any();

    for attempt in 1..=config.status_update_retries {
        if base.meta().deletion_timestamp.is_some() {
            debug!("{} {} is deleting, status write abandoned", K::kind(&()), name);
            return Ok(None);
        }

        let current = base.status().cloned().unwrap_or_default();
        let next = compute(&current);
        if next == current {
            return Ok(Some(base));
        }

        match with_timeout(
            config.call_timeout,
            "update status",
            store.update_status(&base, &next),
        )
        .await
        {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() => {
                info!(
                    "status update of {} {} conflicted (attempt {}/{}), retrying on the latest copy",
                    K::kind(&()),
                    name,
                    attempt,
                    config.status_update_retries
                );
                match with_timeout(config.call_timeout, "get", store.get::<K>(&name)).await? {
                    Some(latest) => base = latest,
                    None => return Ok(None),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    StatusConflictSnafu {
        kind: K::kind(&()).to_string(),
        name,
        attempts: config.status_update_retries,
    }
    .fail()
}

/// Rewrites the finalizers of `base`, re-reading and retrying on conflicts.
///
/// `edit` returns the new finalizer list, or `None` when the current copy
/// needs no write. Returns `None` when the resource disappeared.
pub(crate) async fn write_finalizers<K, S, F>(
    store: &S,
    config: &ControllerConfig,
    mut base: K,
    edit: F,
) -> Result<Option<K>, Error>
where
    K: ManagedResource,
    S: ResourceStore,
    F: Fn(&K) -> Option<Vec<String>>,
{
    let name = base.name_any();

    for attempt in 1..=config.status_update_retries {
        let Some(finalizers) = edit(&base) else {
            return Ok(Some(base));
        };

        match with_timeout(
            config.call_timeout,
            "update finalizers",
            store.update_finalizers(&base, finalizers),
        )
        .await
        {
            Ok(updated) => return Ok(Some(updated)),
            Err(e) if e.is_conflict() => {
                info!(
                    "finalizer update of {} {} conflicted (attempt {}/{}), retrying on the latest copy",
                    K::kind(&()),
                    name,
                    attempt,
                    config.status_update_retries
                );
                match with_timeout(config.call_timeout, "get", store.get::<K>(&name)).await? {
                    Some(latest) => base = latest,
                    None => return Ok(None),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    FinalizerConflictSnafu {
        kind: K::kind(&()).to_string(),
        name,
        attempts: config.status_update_retries,
    }
    .fail()
}

/// Turns a persisted status into the pass outcome; an abandoned write means
/// the resource is deleting, so the pass switches to teardown.
async fn finish<K, S>(
    store: &S,
    config: &ControllerConfig,
    name: &str,
    persisted: Option<K>,
    outcome: impl FnOnce(Status) -> PassOutcome,
) -> Result<PassOutcome, Error>
where
    K: ManagedResource,
    S: ResourceStore,
{
    if let Some(resource) = persisted {
        return Ok(outcome(resource.status().cloned().unwrap_or_default()));
    }

    match with_timeout(config.call_timeout, "get", store.get::<K>(name)).await? {
        Some(resource) if ReconcileState::of(&resource) == ReconcileState::Deleting => {
            teardown(store, config, resource).await?;
            Ok(PassOutcome::TornDown)
        }
        _ => Ok(PassOutcome::Gone),
    }
}

fn diagnostics_key<K: ManagedResource>(name: &str) -> String {
    format!("{}/{}", K::kind(&()), name)
}

fn summarize(state: ReconcileState, status: &Status) -> PassSummary {
    PassSummary {
        state: state.to_string(),
        last_pass: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        observed_generation: status.observed_generation,
        conditions: status
            .conditions
            .iter()
            .map(|c| (c.r#type.clone(), c.status.to_string()))
            .collect(),
        error: None,
    }
}

pub async fn reconcile<K: ManagedResource>(
    resource: Arc<K>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = resource.name_any();
    let key = diagnostics_key::<K>(&name);

    let outcome = reconcile_pass::<K, _>(ctx.as_ref(), &ctx.config, &name).await?;
    ctx.reset_failures(&key);

    let action = match outcome {
        PassOutcome::Gone | PassOutcome::TornDown => {
            ctx.diagnostics.forget(&key);
            Action::await_change()
        }
        PassOutcome::Invalid(status) => {
            ctx.diagnostics
                .record(key, summarize(ReconcileState::Reconciling, &status));
            Action::await_change()
        }
        PassOutcome::Synced { state, status } => {
            ctx.diagnostics.record(key, summarize(state, &status));
            if state == ReconcileState::Settled {
                Action::requeue(ctx.config.resync_interval)
            } else {
                Action::requeue(ctx.config.progress_interval)
            }
        }
    };

    Ok(action)
}

pub fn error_policy<K: ManagedResource>(resource: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = diagnostics_key::<K>(&resource.name_any());
    let failures = ctx.record_failure(&key);
    let delay = ctx.config.backoff(failures);

    warn!(
        "reconcile of {} failed ({} in a row), retrying in {:?}: {}",
        key, failures, delay, error
    );
    ctx.diagnostics.record_error(&key, error.to_string());

    Action::requeue(delay)
}
