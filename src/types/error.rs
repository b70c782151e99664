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

use snafu::Snafu;

/// Spec validation and rendering failures.
///
/// Everything here is raised before any sub-resource is applied and is not
/// retried: the pass reports it through the `Applied` condition and waits for
/// the spec to change.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}': registrationImagePullSpec must not be empty", kind, name))]
    MissingRegistrationImage { kind: String, name: String },

    #[snafu(display(
        "{} '{}': namespace '{}' must start with '{}'",
        kind,
        name,
        namespace,
        prefix
    ))]
    InvalidNamespace {
        kind: String,
        name: String,
        namespace: String,
        prefix: String,
    },

    #[snafu(display("{} '{}': external server url '{}' must be an https url", kind, name, url))]
    InvalidServerUrl {
        kind: String,
        name: String,
        url: String,
    },

    #[snafu(display("failed to render {}: {}", role, source))]
    Render {
        role: String,
        source: serde_json::Error,
    },
}
