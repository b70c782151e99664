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

//! Health and diagnostics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::trace::TraceLayer;

/// Outcome of the last pass over one managed resource.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub state: String,
    pub last_pass: String,
    pub observed_generation: i64,
    /// condition type -> status
    pub conditions: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared between the controller and the probe server.
#[derive(Clone, Default)]
pub struct Diagnostics {
    passes: Arc<RwLock<BTreeMap<String, PassSummary>>>,
    ready: Arc<AtomicBool>,
}

impl Diagnostics {
    /// `key` is `kind/name`.
    pub fn record(&self, key: String, summary: PassSummary) {
        self.passes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, summary);
    }

    /// Attaches an error to the last summary of `key`, creating one if needed.
    pub fn record_error(&self, key: &str, error: String) {
        self.passes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_owned())
            .or_default()
            .error = Some(error);
    }

    pub fn forget(&self, key: &str) {
        self.passes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn snapshot(&self) -> BTreeMap<String, PassSummary> {
        self.passes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

pub fn router(diagnostics: Diagnostics) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .route("/status", get(status))
        .with_state(diagnostics)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(port: u16, diagnostics: Diagnostics) -> Result<(), std::io::Error> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("probe server listening on http://{}", addr);

    axum::serve(listener, router(diagnostics)).await
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check(State(diagnostics): State<Diagnostics>) -> impl IntoResponse {
    if diagnostics.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Starting")
    }
}

async fn status(State(diagnostics): State<Diagnostics>) -> Json<BTreeMap<String, PassSummary>> {
    Json(diagnostics.snapshot())
}
