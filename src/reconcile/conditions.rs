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

//! Condition aggregation.
//!
//! The aggregator is the only writer of `status.conditions`. It folds the
//! health reports of one pass into `Applied`, `Progressing`, `Available` and
//! `Degraded`, carrying `lastTransitionTime` over from the previous conditions
//! unless the status of that type flipped.

use crate::reconcile::health::{ApplyOutcome, HealthReport};
use crate::types::v1::status::{Condition, ConditionStatus, ConditionType, Conditions};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use strum::IntoEnumIterator;

pub const REASON_APPLY_PENDING: &str = "ApplyPending";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

#[derive(Clone, Debug)]
pub struct ConditionAggregator {
    /// How long `Available=False` is tolerated before `Degraded=True`.
    pub grace: Duration,
}

impl ConditionAggregator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Conditions for one finished pass.
    ///
    /// `observed_generation` is the value stored before this pass, so a pass
    /// that applies a new generation still reports `Progressing=True`.
    pub fn aggregate(
        &self,
        previous: &Conditions,
        reports: &[HealthReport],
        observed_generation: i64,
        generation: i64,
        now: DateTime<Utc>,
    ) -> Conditions {
        let mut next = Transition::new(previous, generation, now);

        let applied = applied(reports);
        let applied_ok = applied.is_true();
        next.set(applied);
        next.set(progressing(reports, observed_generation, generation));

        let available = next.set(available(reports));
        let degraded = if applied_ok && !available.is_true() {
            let down_for = since(&available.last_transition_time, now);
            if down_for >= self.grace {
                Condition::new(
                    ConditionType::Degraded,
                    ConditionStatus::True,
                    "UnavailablePastGrace",
                    &format!(
                        "unavailable for more than {}s: {}",
                        self.grace.as_secs(),
                        available.message
                    ),
                )
            } else {
                Condition::new(
                    ConditionType::Degraded,
                    ConditionStatus::False,
                    "WithinGracePeriod",
                    &available.message,
                )
            }
        } else {
            Condition::new(
                ConditionType::Degraded,
                ConditionStatus::False,
                "AsExpected",
                "",
            )
        };
        next.set(degraded);

        next.finish()
    }

    /// Conditions written before the first apply of a resource.
    pub fn pending(&self, previous: &Conditions, generation: i64, now: DateTime<Utc>) -> Conditions {
        let mut next = Transition::new(previous, generation, now);
        for condition_type in ConditionType::iter() {
            let condition = if condition_type == ConditionType::Applied {
                Condition::new(
                    condition_type,
                    ConditionStatus::False,
                    REASON_APPLY_PENDING,
                    "no sub-resource applied yet",
                )
            } else {
                Condition::new(
                    condition_type,
                    ConditionStatus::Unknown,
                    REASON_APPLY_PENDING,
                    "",
                )
            };
            next.set(condition);
        }
        next.finish()
    }

    /// Conditions for a spec that can never be applied. Whatever was known
    /// about the other condition types is kept.
    pub fn invalid(
        &self,
        previous: &Conditions,
        message: &str,
        generation: i64,
        now: DateTime<Utc>,
    ) -> Conditions {
        let mut next = Transition::new(previous, generation, now);
        next.set(Condition::new(
            ConditionType::Applied,
            ConditionStatus::False,
            REASON_INVALID_SPEC,
            message,
        ));
        for condition_type in ConditionType::iter() {
            if previous.get(condition_type).is_none() && condition_type != ConditionType::Applied {
                next.set(Condition::new(
                    condition_type,
                    ConditionStatus::Unknown,
                    REASON_INVALID_SPEC,
                    "",
                ));
            }
        }
        next.finish()
    }
}

/// Builds the next condition set on top of the previous one.
struct Transition<'a> {
    previous: &'a Conditions,
    next: Conditions,
    generation: i64,
    now: String,
}

impl<'a> Transition<'a> {
    fn new(previous: &'a Conditions, generation: i64, now: DateTime<Utc>) -> Self {
        Self {
            previous,
            next: previous.clone(),
            generation,
            now: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn set(&mut self, mut condition: Condition) -> Condition {
        condition.observed_generation = Some(self.generation);
        condition.last_transition_time = match self
            .previous
            .iter()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(old) if old.status == condition.status && !old.last_transition_time.is_empty() => {
                old.last_transition_time.clone()
            }
            _ => self.now.clone(),
        };
        self.next.set(condition.clone());
        condition
    }

    fn finish(self) -> Conditions {
        self.next
    }
}

fn applied(reports: &[HealthReport]) -> Condition {
    match reports.iter().find(|r| r.apply.is_failed()) {
        Some(failed) => {
            let error = match &failed.apply {
                ApplyOutcome::Failed(error) => error.as_str(),
                _ => "",
            };
            Condition::new(
                ConditionType::Applied,
                ConditionStatus::False,
                &format!("{}ApplyFailed", pascal_case(&failed.role)),
                &format!("{}: {}", failed.key, error),
            )
        }
        None => Condition::new(
            ConditionType::Applied,
            ConditionStatus::True,
            "SubResourcesApplied",
            &format!("{} sub-resources applied", reports.len()),
        ),
    }
}

fn progressing(reports: &[HealthReport], observed_generation: i64, generation: i64) -> Condition {
    if observed_generation < generation {
        return Condition::new(
            ConditionType::Progressing,
            ConditionStatus::True,
            "GenerationChanged",
            &format!("generation {generation} not yet fully applied (observed {observed_generation})"),
        );
    }

    match reports.iter().find(|r| r.health.rolling_out) {
        Some(report) => Condition::new(
            ConditionType::Progressing,
            ConditionStatus::True,
            "SubResourceRollingOut",
            &report.health.message,
        ),
        None => Condition::new(
            ConditionType::Progressing,
            ConditionStatus::False,
            "UpToDate",
            "",
        ),
    }
}

fn available(reports: &[HealthReport]) -> Condition {
    match reports.iter().find(|r| r.serving && !r.health.available) {
        Some(report) => Condition::new(
            ConditionType::Available,
            ConditionStatus::False,
            &format!("{}Unavailable", pascal_case(&report.role)),
            &format!("{}: {}", report.key, report.health.message),
        ),
        None => Condition::new(
            ConditionType::Available,
            ConditionStatus::True,
            "ComponentsAvailable",
            "",
        ),
    }
}

/// Time elapsed since an RFC3339 timestamp; zero when it cannot be parsed.
fn since(timestamp: &str, now: DateTime<Utc>) -> Duration {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .and_then(|t| (now - t.with_timezone(&Utc)).to_std().ok())
        .unwrap_or_default()
}

/// `registration-webhook-deployment` -> `RegistrationWebhookDeployment`
fn pascal_case(role: &str) -> String {
    role.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::health::Health;
    use crate::types::v1::key::{ResourceKey, SubResourceKind};
    use chrono::TimeZone;
    use proptest::prelude::*;

    const GRACE: Duration = Duration::from_secs(300);

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn report(role: &str, apply: ApplyOutcome, health: Health) -> HealthReport {
        HealthReport {
            role: role.to_owned(),
            key: ResourceKey::new(SubResourceKind::Deployment, "hub", role),
            serving: true,
            apply,
            health,
        }
    }

    fn healthy(role: &str) -> HealthReport {
        report(role, ApplyOutcome::Applied, Health::ready())
    }

    fn status_of(conditions: &Conditions, condition_type: ConditionType) -> ConditionStatus {
        conditions.get(condition_type).unwrap().status
    }

    #[test]
    fn test_all_healthy() {
        let aggregator = ConditionAggregator::new(GRACE);
        let reports = [healthy("registration-deployment"), healthy("work-deployment")];
        let conditions = aggregator.aggregate(&Conditions::default(), &reports, 2, 2, t(0));

        assert_eq!(conditions.len(), 4);
        assert_eq!(status_of(&conditions, ConditionType::Applied), ConditionStatus::True);
        assert_eq!(status_of(&conditions, ConditionType::Available), ConditionStatus::True);
        assert_eq!(status_of(&conditions, ConditionType::Progressing), ConditionStatus::False);
        assert_eq!(status_of(&conditions, ConditionType::Degraded), ConditionStatus::False);
        assert!(conditions.iter().all(|c| c.observed_generation == Some(2)));
    }

    #[test]
    fn test_apply_failure_names_sub_resource() {
        let aggregator = ConditionAggregator::new(GRACE);
        let reports = [
            healthy("registration-service-account"),
            report(
                "registration-webhook-deployment",
                ApplyOutcome::Failed("admission denied".to_owned()),
                Health::unavailable("not found"),
            ),
            healthy("registration-deployment"),
        ];
        let conditions = aggregator.aggregate(&Conditions::default(), &reports, 0, 1, t(0));

        let applied = conditions.get(ConditionType::Applied).unwrap();
        assert_eq!(applied.status, ConditionStatus::False);
        assert_eq!(applied.reason, "RegistrationWebhookDeploymentApplyFailed");
        assert!(applied.message.contains("admission denied"));
        assert!(applied.message.contains("registration-webhook-deployment"));

        // nothing is degraded while applies are failing
        assert_eq!(status_of(&conditions, ConditionType::Degraded), ConditionStatus::False);
    }

    #[test]
    fn test_progressing_on_generation_or_rollout() {
        let aggregator = ConditionAggregator::new(GRACE);

        let conditions =
            aggregator.aggregate(&Conditions::default(), &[healthy("a")], 1, 2, t(0));
        let progressing = conditions.get(ConditionType::Progressing).unwrap();
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(progressing.reason, "GenerationChanged");

        let rolling = report("a", ApplyOutcome::Applied, Health::rolling_out(true, "1/3"));
        let conditions = aggregator.aggregate(&Conditions::default(), &[rolling], 2, 2, t(0));
        let progressing = conditions.get(ConditionType::Progressing).unwrap();
        assert_eq!(progressing.status, ConditionStatus::True);
        assert_eq!(progressing.reason, "SubResourceRollingOut");
        assert_eq!(status_of(&conditions, ConditionType::Available), ConditionStatus::True);
    }

    #[test]
    fn test_non_serving_does_not_affect_available() {
        let aggregator = ConditionAggregator::new(GRACE);
        let mut sa = report("sa", ApplyOutcome::Applied, Health::unavailable("not found"));
        sa.serving = false;

        let conditions = aggregator.aggregate(&Conditions::default(), &[sa], 1, 1, t(0));
        assert_eq!(status_of(&conditions, ConditionType::Available), ConditionStatus::True);
    }

    #[test]
    fn test_degraded_after_grace() {
        let aggregator = ConditionAggregator::new(GRACE);
        let down = [report(
            "registration-deployment",
            ApplyOutcome::Unchanged,
            Health::unavailable("0/3 replicas ready"),
        )];

        let first = aggregator.aggregate(&Conditions::default(), &down, 1, 1, t(0));
        let available = first.get(ConditionType::Available).unwrap();
        assert_eq!(available.reason, "RegistrationDeploymentUnavailable");
        assert_eq!(status_of(&first, ConditionType::Degraded), ConditionStatus::False);

        let within = aggregator.aggregate(&first, &down, 1, 1, t(299));
        assert_eq!(status_of(&within, ConditionType::Degraded), ConditionStatus::False);

        let past = aggregator.aggregate(&within, &down, 1, 1, t(300));
        let degraded = past.get(ConditionType::Degraded).unwrap();
        assert_eq!(degraded.status, ConditionStatus::True);
        assert_eq!(degraded.reason, "UnavailablePastGrace");
        assert_eq!(degraded.last_transition_time, "2023-11-14T22:18:20Z");

        // available again clears degraded
        let recovered = aggregator.aggregate(&past, &[healthy("registration-deployment")], 1, 1, t(400));
        assert_eq!(status_of(&recovered, ConditionType::Degraded), ConditionStatus::False);
    }

    #[test]
    fn test_transition_time_only_moves_on_status_change() {
        let aggregator = ConditionAggregator::new(GRACE);
        let first = aggregator.aggregate(&Conditions::default(), &[healthy("a")], 1, 1, t(0));
        let applied_at = first.get(ConditionType::Applied).unwrap().last_transition_time.clone();

        let failing = [report("a", ApplyOutcome::Failed("x".to_owned()), Health::ready())];
        let second = aggregator.aggregate(&first, &failing, 1, 1, t(60));
        let applied = second.get(ConditionType::Applied).unwrap();
        assert_ne!(applied.last_transition_time, applied_at);
        // unchanged types keep their time but get fresh reason/message
        let available = second.get(ConditionType::Available).unwrap();
        assert_eq!(
            available.last_transition_time,
            first.get(ConditionType::Available).unwrap().last_transition_time
        );

        let failing_again = [report("a", ApplyOutcome::Failed("y".to_owned()), Health::ready())];
        let third = aggregator.aggregate(&second, &failing_again, 1, 1, t(120));
        let applied_third = third.get(ConditionType::Applied).unwrap();
        assert_eq!(applied_third.last_transition_time, applied.last_transition_time);
        assert!(applied_third.message.ends_with(": y"));
    }

    #[test]
    fn test_pending_and_invalid() {
        let aggregator = ConditionAggregator::new(GRACE);

        let pending = aggregator.pending(&Conditions::default(), 1, t(0));
        assert_eq!(pending.len(), 4);
        let applied = pending.get(ConditionType::Applied).unwrap();
        assert_eq!(applied.status, ConditionStatus::False);
        assert_eq!(applied.reason, REASON_APPLY_PENDING);
        assert_eq!(status_of(&pending, ConditionType::Available), ConditionStatus::Unknown);

        let settled = aggregator.aggregate(&pending, &[healthy("a")], 1, 1, t(10));
        let invalid = aggregator.invalid(&settled, "bad namespace", 2, t(20));
        let applied = invalid.get(ConditionType::Applied).unwrap();
        assert_eq!(applied.reason, REASON_INVALID_SPEC);
        assert_eq!(applied.message, "bad namespace");
        assert_eq!(invalid.get(ConditionType::Available), settled.get(ConditionType::Available));
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("work-agent-deployment"), "WorkAgentDeployment");
        assert_eq!(pascal_case("hub-namespace"), "HubNamespace");
        assert_eq!(pascal_case(""), "");
    }

    fn arb_report() -> impl Strategy<Value = HealthReport> {
        (
            prop_oneof![Just("a"), Just("b"), Just("c")],
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(role, failed, available, rolling_out, serving)| {
                let apply = if failed {
                    ApplyOutcome::Failed("boom".to_owned())
                } else {
                    ApplyOutcome::Applied
                };
                let mut r = report(
                    role,
                    apply,
                    Health {
                        available,
                        rolling_out,
                        message: "m".to_owned(),
                    },
                );
                r.serving = serving;
                r
            })
    }

    proptest! {
        #[test]
        fn prop_aggregation_is_idempotent(
            reports in proptest::collection::vec(arb_report(), 0..6),
            observed in 0i64..3,
            generation in 0i64..3,
            at in 0i64..1000,
        ) {
            let aggregator = ConditionAggregator::new(GRACE);
            let once = aggregator.aggregate(&Conditions::default(), &reports, observed, generation, t(at));
            let twice = aggregator.aggregate(&once, &reports, observed, generation, t(at));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_transition_time_moves_iff_status_changes(
            before in proptest::collection::vec(arb_report(), 0..6),
            after in proptest::collection::vec(arb_report(), 0..6),
        ) {
            let aggregator = ConditionAggregator::new(GRACE);
            let first = aggregator.aggregate(&Conditions::default(), &before, 1, 1, t(0));
            let second = aggregator.aggregate(&first, &after, 1, 1, t(10));

            for condition_type in ConditionType::iter() {
                let a = first.get(condition_type).unwrap();
                let b = second.get(condition_type).unwrap();
                prop_assert_eq!(
                    a.last_transition_time != b.last_transition_time,
                    a.status != b.status
                );
            }
        }
    }
}
