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

use clap::Args;
use std::time::Duration;

/// Knobs of a reconcile controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long `Available=False` may last before `Degraded=True`.
    pub degraded_grace: Duration,
    /// Attempts at writing status before a pass gives up on conflicts.
    pub status_update_retries: u32,
    /// Deadline of every single store call.
    pub call_timeout: Duration,
    /// Requeue delay while sub-resources are still rolling out.
    pub progress_interval: Duration,
    /// Requeue delay once settled.
    pub resync_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerArgs::default().into()
    }
}

impl ControllerConfig {
    /// Delay before retrying a resource that failed `failures` passes in a row.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }
}

#[derive(Args, Clone, Debug)]
pub struct ControllerArgs {
    #[arg(long, default_value_t = 300)]
    pub degraded_grace_seconds: u64,

    #[arg(long, default_value_t = 5)]
    pub status_update_retries: u32,

    #[arg(long, default_value_t = 10)]
    pub call_timeout_seconds: u64,

    #[arg(long, default_value_t = 15)]
    pub progress_interval_seconds: u64,

    #[arg(long, default_value_t = 300)]
    pub resync_interval_seconds: u64,

    #[arg(long, default_value_t = 5)]
    pub backoff_base_seconds: u64,

    #[arg(long, default_value_t = 300)]
    pub backoff_max_seconds: u64,

    /// Port of the health and diagnostics endpoint.
    #[arg(long, default_value_t = 8080)]
    pub probe_port: u16,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            degraded_grace_seconds: 300,
            status_update_retries: 5,
            call_timeout_seconds: 10,
            progress_interval_seconds: 15,
            resync_interval_seconds: 300,
            backoff_base_seconds: 5,
            backoff_max_seconds: 300,
            probe_port: 8080,
        }
    }
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        Self {
            degraded_grace: Duration::from_secs(args.degraded_grace_seconds),
            status_update_retries: args.status_update_retries.max(1),
            call_timeout: Duration::from_secs(args.call_timeout_seconds),
            progress_interval: Duration::from_secs(args.progress_interval_seconds),
            resync_interval: Duration::from_secs(args.resync_interval_seconds),
            backoff_base: Duration::from_secs(args.backoff_base_seconds),
            backoff_max: Duration::from_secs(args.backoff_max_seconds),
        }
    }
}
