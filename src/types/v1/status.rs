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
use kube::KubeSchema;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter};

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Status shared by ClusterManager and Klusterlet. Written only by the
/// operator.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, KubeSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Last spec generation the operator fully applied.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub observed_generation: i64,

    /// Applied, Available, Progressing and Degraded.
    #[serde(default)]
    pub conditions: Conditions,

    /// Last applied generation of every owned sub-resource whose generation is tracked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generations: Vec<GenerationStatus>,

    /// Every sub-resource currently owned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_resources: Vec<RelatedResourceMeta>,
}

/// Last generation the operator applied for one sub-resource.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub last_generation: i64,
}

impl GenerationStatus {
    pub fn new(key: ResourceKey, last_generation: i64) -> Self {
        Self {
            group: key.group,
            version: key.version,
            resource: key.resource,
            namespace: key.namespace,
            name: key.name,
            last_generation,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            group: self.group.clone(),
            version: self.version.clone(),
            resource: self.resource.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// A sub-resource owned by the operator, generation or not.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelatedResourceMeta {
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl From<ResourceKey> for RelatedResourceMeta {
    fn from(key: ResourceKey) -> Self {
        Self {
            group: key.group,
            version: key.version,
            resource: key.resource,
            namespace: key.namespace,
            name: key.name,
        }
    }
}

impl RelatedResourceMeta {
    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            group: self.group.clone(),
            version: self.version.clone(),
            resource: self.resource.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// The four top-level condition types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumIter)]
pub enum ConditionType {
    Applied,
    Available,
    Progressing,
    Degraded,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Display)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,

    pub status: ConditionStatus,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub message: String,

    /// RFC3339 time of the last status change.
    #[serde(default)]
    pub last_transition_time: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status,
            reason: reason.to_owned(),
            message: message.to_owned(),
            last_transition_time: String::new(),
            observed_generation: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Conditions keyed by type.
///
/// On the wire this is a list ordered by type; duplicate types collapse to
/// the last entry when decoding.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.get(condition_type.as_ref())
    }

    /// Inserts or replaces the condition of the same type, returning the old one.
    pub fn set(&mut self, condition: Condition) -> Option<Condition> {
        self.0.insert(condition.r#type.clone(), condition)
    }

    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.get(condition_type).is_some_and(Condition::is_true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(
            conditions
                .into_iter()
                .map(|c| (c.r#type.clone(), c))
                .collect(),
        )
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

impl JsonSchema for Conditions {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Conditions")
    }

    fn schema_id() -> Cow<'static, str> {
        Cow::Borrowed(concat!(module_path!(), "::", "Conditions"))
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        let mut schema = <Vec<Condition>>::json_schema(generator);
        let object = schema.ensure_object();
        object.insert("x-kubernetes-list-type".to_owned(), "map".into());
        object.insert(
            "x-kubernetes-list-map-keys".to_owned(),
            serde_json::json!(["type"]),
        );
        schema
    }
}
