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

//! Generation ledger: last applied generation per sub-resource.

use crate::types::v1::key::ResourceKey;
use crate::types::v1::status::GenerationStatus;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationLedger {
    entries: BTreeMap<ResourceKey, i64>,
}

impl GenerationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the entry for `key`.
    pub fn record_applied(&mut self, key: ResourceKey, generation: i64) {
        self.entries.insert(key, generation);
    }

    /// Whether the sub-resource has to be applied again.
    ///
    /// Only an exact match with the recorded generation counts as up to date:
    /// a missing entry, a newer generation (edited behind our back) and an
    /// older one (recreated or restored) all need an apply.
    pub fn needs_apply(&self, key: &ResourceKey, current_generation: i64) -> bool {
        self.entries
            .get(key)
            .is_none_or(|last| *last != current_generation)
    }

    pub fn last_generation(&self, key: &ResourceKey) -> Option<i64> {
        self.entries.get(key).copied()
    }

    /// Drops every entry whose key is not desired and returns the dropped keys.
    pub fn prune(&mut self, desired: &BTreeSet<ResourceKey>) -> Vec<ResourceKey> {
        let removed: Vec<ResourceKey> = self
            .entries
            .keys()
            .filter(|key| !desired.contains(*key))
            .cloned()
            .collect();

        for key in &removed {
            self.entries.remove(key);
        }

        removed
    }

    /// Status entries ordered by key.
    pub fn to_status(&self) -> Vec<GenerationStatus> {
        self.entries
            .iter()
            .map(|(key, generation)| GenerationStatus::new(key.clone(), *generation))
            .collect()
    }
}

impl From<&[GenerationStatus]> for GenerationLedger {
    fn from(statuses: &[GenerationStatus]) -> Self {
        Self {
            entries: statuses
                .iter()
                .map(|s| (s.key(), s.last_generation))
                .collect(),
        }
    }
}
