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

use crate::types::v1::key::ResourceKey;
use crate::types::v1::status::RelatedResourceMeta;
use std::collections::BTreeSet;

/// Every sub-resource a managed resource currently owns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelatedResourceTracker {
    tracked: BTreeSet<ResourceKey>,
}

impl RelatedResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the key was already tracked.
    pub fn track(&mut self, key: ResourceKey) -> bool {
        self.tracked.insert(key)
    }

    pub fn untrack(&mut self, key: &ResourceKey) -> bool {
        self.tracked.remove(key)
    }

    /// `(to_add, to_remove)` that would turn the tracked set into `desired`.
    pub fn diff(&self, desired: &BTreeSet<ResourceKey>) -> (Vec<ResourceKey>, Vec<ResourceKey>) {
        let to_add = desired.difference(&self.tracked).cloned().collect();
        let to_remove = self.tracked.difference(desired).cloned().collect();
        (to_add, to_remove)
    }

    pub fn to_status(&self) -> Vec<RelatedResourceMeta> {
        self.tracked
            .iter()
            .cloned()
            .map(RelatedResourceMeta::from)
            .collect()
    }
}

impl From<&[RelatedResourceMeta]> for RelatedResourceTracker {
    fn from(metas: &[RelatedResourceMeta]) -> Self {
        Self {
            tracked: metas.iter().map(RelatedResourceMeta::key).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::v1::key::SubResourceKind;

    fn sa(name: &str) -> ResourceKey {
        ResourceKey::new(SubResourceKind::ServiceAccount, "hub", name)
    }

    #[test]
    fn test_track_is_idempotent() {
        let mut tracker = RelatedResourceTracker::new();
        assert!(tracker.track(sa("a")));
        assert!(!tracker.track(sa("a")));
        assert_eq!(tracker.to_status().len(), 1);

        assert!(tracker.untrack(&sa("a")));
        assert!(!tracker.untrack(&sa("a")));
        assert!(tracker.to_status().is_empty());
    }

    #[test]
    fn test_diff() {
        let mut tracker = RelatedResourceTracker::new();
        tracker.track(sa("a"));
        tracker.track(sa("b"));

        let desired: BTreeSet<_> = [sa("b"), sa("c")].into_iter().collect();
        let (to_add, to_remove) = tracker.diff(&desired);
        assert_eq!(to_add, vec![sa("c")]);
        assert_eq!(to_remove, vec![sa("a")]);

        // diff does not change the tracked set
        assert_eq!(tracker.to_status().len(), 2);
    }

    #[test]
    fn test_status_round_trip_is_sorted() {
        let mut tracker = RelatedResourceTracker::new();
        tracker.track(sa("z"));
        tracker.track(ResourceKey::new(SubResourceKind::Namespace, "", "hub"));

        let metas = tracker.to_status();
        assert_eq!(metas[0].resource, "namespaces");
        assert_eq!(metas[1].name, "z");
        assert_eq!(RelatedResourceTracker::from(metas.as_slice()), tracker);
    }
}
